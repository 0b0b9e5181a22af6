use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("ROM image too short for a cartridge header ({0} bytes)")]
    TooShort(usize),
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedMapper(u8),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    NoMbc,
    Mbc1,
    Mbc3,
}

/// Fields parsed out of the 0x0100-0x014F header block.
#[derive(Debug, Clone)]
pub struct Header {
    pub title: String,
    pub manufacturer: String,
    pub cgb_flag: u8,
    pub new_licensee: [u8; 2],
    pub old_licensee: u8,
    pub cart_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub destination: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < 0x150 {
            return Err(CartridgeError::TooShort(data.len()));
        }

        let mut title = &data[0x0134..0x0144];
        if let Some(pos) = title.iter().position(|&b| b == 0) {
            title = &title[..pos];
        }

        Ok(Self {
            title: String::from_utf8_lossy(title).trim().to_string(),
            manufacturer: String::from_utf8_lossy(&data[0x013F..0x0143])
                .trim_matches('\0')
                .to_string(),
            cgb_flag: data[0x0143],
            new_licensee: [data[0x0144], data[0x0145]],
            old_licensee: data[0x014B],
            cart_type: data[0x0147],
            rom_size_code: data[0x0148],
            ram_size_code: data[0x0149],
            destination: data[0x014A],
            header_checksum: data[0x014D],
            global_checksum: u16::from_be_bytes([data[0x014E], data[0x014F]]),
        })
    }

    pub fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type {
            0x00 | 0x08 | 0x09 => Ok(MbcType::NoMbc),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x0F..=0x13 => Ok(MbcType::Mbc3),
            other => Err(CartridgeError::UnsupportedMapper(other)),
        }
    }

    pub fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x09 | 0x0F | 0x10 | 0x13)
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    pub fn ram_size(&self) -> usize {
        match self.ram_size_code {
            0x00 => 0,
            0x01 => 0x800,
            0x02 => 0x2000,
            0x03 => 0x8000,
            0x04 => 0x20000,
            0x05 => 0x10000,
            _ => 0x2000,
        }
    }
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc: Option<Mbc3Rtc>,
        latch_pending: bool,
    },
}

const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

/// Live counter state of the MBC3 clock chip.
#[derive(Debug, Clone, Copy, Default)]
struct RtcClock {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcClock {
    /// The five registers 0x08..=0x0C as they appear on the bus.
    fn register_file(&self) -> [u8; 5] {
        let mut control = ((self.days >> 8) as u8) & 0x01;
        control |= (self.halt as u8) << 6;
        control |= (self.carry as u8) << 7;
        [
            self.seconds & 0x3F,
            self.minutes & 0x3F,
            self.hours & 0x1F,
            self.days as u8,
            control,
        ]
    }

    /// One second elapses. Each counter wraps at its register width, so
    /// an out-of-range value written directly (say seconds = 62) ticks
    /// up to the wrap point without carrying into the next field.
    fn tick_second(&mut self) {
        self.seconds = (self.seconds + 1) & 0x3F;
        if self.seconds != 60 {
            return;
        }
        self.seconds = 0;
        self.minutes = (self.minutes + 1) & 0x3F;
        if self.minutes != 60 {
            return;
        }
        self.minutes = 0;
        self.hours = (self.hours + 1) & 0x1F;
        if self.hours != 24 {
            return;
        }
        self.hours = 0;
        self.days += 1;
        if self.days > 0x01FF {
            self.days = 0;
            self.carry = true;
        }
    }
}

/// MBC3 real-time clock driven purely by emulated cycles.
#[derive(Debug, Clone)]
struct Mbc3Rtc {
    clock: RtcClock,
    latched: [u8; 5],
    subsecond_cycles: u32,
}

impl Mbc3Rtc {
    fn new() -> Self {
        let clock = RtcClock::default();
        Self {
            clock,
            latched: clock.register_file(),
            subsecond_cycles: 0,
        }
    }

    fn latch(&mut self) {
        self.latched = self.clock.register_file();
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08..=0x0C => self.latched[(reg - 0x08) as usize],
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.clock.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.clock.minutes = value & 0x3F,
            0x0A => self.clock.hours = value & 0x1F,
            0x0B => self.clock.days = (self.clock.days & 0x0100) | u16::from(value),
            0x0C => {
                self.clock.days = (self.clock.days & 0x00FF) | (u16::from(value & 0x01) << 8);
                self.clock.halt = value & 0x40 != 0;
                self.clock.carry = value & 0x80 != 0;
            }
            _ => {}
        }
        self.latch();
    }

    fn step(&mut self, cycles: u64) {
        if self.clock.halt {
            return;
        }
        let total = u64::from(self.subsecond_cycles) + cycles;
        self.subsecond_cycles = (total % u64::from(RTC_CYCLES_PER_SECOND)) as u32;
        for _ in 0..total / u64::from(RTC_CYCLES_PER_SECOND) {
            self.clock.tick_second();
        }
    }
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub header: Header,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

impl Cartridge {
    /// Parse the header and set up the bank controller. Fails if the
    /// image is smaller than the header block or names a mapper this
    /// core does not implement.
    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let mbc = header.mbc_type()?;

        let mbc_state = match mbc {
            MbcType::NoMbc => MbcState::NoMbc,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc: header.has_rtc().then(Mbc3Rtc::new),
                latch_pending: false,
            },
        };

        let ram = vec![0; header.ram_size()];
        log::info!(
            "loaded cartridge: {:?} ({:?}, {} ROM banks, {} bytes RAM)",
            header.title,
            mbc,
            data.len() / 0x4000,
            ram.len()
        );

        Ok(Self {
            rom: data,
            ram,
            header,
            save_path: None,
            mbc_state,
        })
    }

    /// Load from disk, restoring battery-backed RAM from a sibling
    /// `.sav` file when the cartridge type carries a battery.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::load(data)?;

        if cart.header.has_battery() {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");
            cart.save_path = Some(save.clone());
            if let Ok(bytes) = fs::read(&save) {
                for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                    *d = *s;
                }
            }
        }

        Ok(cart)
    }

    pub fn mbc_type(&self) -> MbcType {
        match self.mbc_state {
            MbcState::NoMbc => MbcType::NoMbc,
            MbcState::Mbc1 { .. } => MbcType::Mbc1,
            MbcState::Mbc3 { .. } => MbcType::Mbc3,
        }
    }

    /// Advance the RTC, if any, by emulated CPU cycles.
    pub fn step_rtc(&mut self, cycles: u32) {
        if let MbcState::Mbc3 { rtc: Some(rtc), .. } = &mut self.mbc_state {
            rtc.step(cycles as u64);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / 0x4000).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::NoMbc, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In banking mode 1 the upper register also steers the
                // low window.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                let offset = bank * 0x4000 + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let mut bank = (((*ram_bank as usize) & 0x03) << 5) | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank %= rom_bank_count;
                let offset = bank * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let bank = (if *rom_bank == 0 { 1 } else { *rom_bank } as usize) % rom_bank_count;
                let offset = bank * 0x4000 + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::NoMbc, 0xA000..=0xBFFF) => self
                .ram
                .get(addr as usize - 0xA000)
                .copied()
                .unwrap_or(0xFF),
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = self.ram_index(addr);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if !*ram_enable {
                    0xFF
                } else {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = (*ram_bank as usize) * 0x2000 + addr as usize - 0xA000;
                            self.ram.get(idx).copied().unwrap_or(0xFF)
                        }
                        0x08..=0x0C => rtc
                            .as_ref()
                            .map(|r| r.read_latched(*ram_bank))
                            .unwrap_or(0xFF),
                        _ => 0xFF,
                    }
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val;
            }
            (
                MbcState::Mbc3 {
                    latch_pending, rtc, ..
                },
                0x6000..=0x7FFF,
            ) => {
                // Writing 0 then 1 latches the clock registers.
                if val == 0 {
                    *latch_pending = true;
                } else {
                    if val == 1
                        && *latch_pending
                        && let Some(rtc) = rtc
                    {
                        rtc.latch();
                    }
                    *latch_pending = false;
                }
            }
            (
                MbcState::Mbc3 {
                    ram_enable,
                    ram_bank,
                    rtc,
                    ..
                },
                0xA000..=0xBFFF,
            ) => {
                if *ram_enable {
                    match *ram_bank {
                        0x00..=0x03 => {
                            let idx = (*ram_bank as usize) * 0x2000 + addr as usize - 0xA000;
                            if let Some(b) = self.ram.get_mut(idx) {
                                *b = val;
                            }
                        }
                        0x08..=0x0C => {
                            if let Some(rtc) = rtc.as_mut() {
                                rtc.write_register(*ram_bank, val);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        let ram_bank_count = self.ram.len().div_ceil(0x2000);
        match &self.mbc_state {
            MbcState::Mbc1 { ram_bank, mode, .. } if *mode == 1 => {
                let bank = if ram_bank_count == 0 {
                    0
                } else {
                    (*ram_bank as usize) % ram_bank_count
                };
                bank * 0x2000 + addr as usize - 0xA000
            }
            _ => addr as usize - 0xA000,
        }
    }

    /// Flush battery-backed RAM to the `.sav` path, when the cartridge
    /// has one.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.header.has_battery(), &self.save_path)
            && !self.ram.is_empty()
        {
            fs::write(path, &self.ram)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_ticks_through_invalid_values() {
        let mut rtc = Mbc3Rtc::new();

        rtc.clock.seconds = 59;
        rtc.clock.minutes = 60;
        rtc.clock.tick_second();
        assert_eq!(rtc.clock.seconds, 0);
        assert_eq!(rtc.clock.minutes, 61);

        rtc.clock.seconds = 63;
        rtc.clock.minutes = 5;
        rtc.clock.tick_second();
        assert_eq!(rtc.clock.seconds, 0);
        assert_eq!(rtc.clock.minutes, 5);
    }

    #[test]
    fn rtc_halt_preserves_subseconds() {
        let mut rtc = Mbc3Rtc::new();
        rtc.subsecond_cycles = RTC_CYCLES_PER_SECOND - 10_000;

        rtc.write_register(0x0C, 0x40);
        rtc.step(RTC_CYCLES_PER_SECOND as u64 * 2);
        assert_eq!(rtc.clock.seconds, 0);

        rtc.write_register(0x0C, 0x00);
        rtc.step(9_999);
        assert_eq!(rtc.clock.seconds, 0);
        rtc.step(1);
        assert_eq!(rtc.clock.seconds, 1);
    }

    #[test]
    fn rtc_day_overflow_sets_carry() {
        let mut rtc = Mbc3Rtc::new();
        rtc.clock.seconds = 59;
        rtc.clock.minutes = 59;
        rtc.clock.hours = 23;
        rtc.clock.days = 0x01FF;

        rtc.clock.tick_second();
        assert_eq!(rtc.clock.days, 0);
        assert!(rtc.clock.carry);
    }

    #[test]
    fn rtc_seconds_write_resets_phase() {
        let mut rtc = Mbc3Rtc::new();
        rtc.subsecond_cycles = RTC_CYCLES_PER_SECOND / 2;

        rtc.write_register(0x09, 0x01);
        assert_eq!(rtc.subsecond_cycles, RTC_CYCLES_PER_SECOND / 2);

        rtc.write_register(0x08, 0x02);
        assert_eq!(rtc.subsecond_cycles, 0);
    }
}

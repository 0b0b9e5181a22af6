use crate::cartridge::Cartridge;
use crate::joypad::Joypad;
use crate::ppu::Ppu;
use crate::serial::Serial;
use crate::timer::Timer;

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;

/// The 64KiB address space and everything hanging off it. All reads and
/// writes funnel through here; unmapped or unusable regions read 0xFF.
pub struct Bus {
    pub cart: Option<Cartridge>,
    pub ppu: Ppu,
    pub timer: Timer,
    pub joypad: Joypad,
    pub serial: Serial,
    wram: [u8; WRAM_SIZE],
    hram: [u8; HRAM_SIZE],
    /// IF register; the unused top 3 bits read back as 1.
    pub if_reg: u8,
    pub ie_reg: u8,
    boot_rom: Option<Vec<u8>>,
    boot_mapped: bool,
}

impl Bus {
    /// Bus in the post-boot state.
    pub fn new() -> Self {
        let mut ppu = Ppu::new();
        ppu.apply_boot_state();
        Self {
            cart: None,
            ppu,
            timer: Timer::new(),
            joypad: Joypad::new(),
            serial: Serial::new(),
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            if_reg: 0xE1,
            ie_reg: 0,
            boot_rom: None,
            boot_mapped: false,
        }
    }

    /// Bus in a neutral power-on state, for running a boot ROM.
    pub fn new_power_on() -> Self {
        Self {
            ppu: Ppu::new(),
            if_reg: 0xE0,
            ..Self::new()
        }
    }

    /// Map a 256-byte boot ROM over 0x0000-0x00FF until 0xFF50 is
    /// written.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.boot_rom = Some(data);
        self.boot_mapped = true;
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_mapped
    }

    /// Interrupts both requested and enabled.
    pub fn pending_interrupts(&self) -> u8 {
        self.if_reg & self.ie_reg & 0x1F
    }

    pub fn request_interrupt(&mut self, bit: u8) {
        self.if_reg |= bit;
    }

    pub fn clear_interrupt(&mut self, bit: u8) {
        self.if_reg &= !bit;
    }

    pub fn reset_div(&mut self) {
        self.timer.reset_div(&mut self.if_reg);
    }

    /// Advance every bus-owned subsystem by the cycles the CPU just
    /// spent.
    pub fn tick(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.if_reg);
        self.ppu.step(cycles, &mut self.if_reg);
        self.serial.step(cycles, &mut self.if_reg);
        self.joypad.sample(&mut self.if_reg, self.ie_reg);
        if let Some(cart) = self.cart.as_mut() {
            cart.step_rtc(cycles);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x00FF if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|rom| rom.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF => self
                .cart
                .as_ref()
                .map(|c| c.read(addr))
                .unwrap_or(0xFF),
            0x8000..=0x9FFF => self.ppu.vram[addr as usize - 0x8000],
            0xA000..=0xBFFF => self
                .cart
                .as_ref()
                .map(|c| c.read(addr))
                .unwrap_or(0xFF),
            0xC000..=0xDFFF => self.wram[addr as usize - 0xC000],
            // Echo RAM mirrors 0xC000-0xDDFF
            0xE000..=0xFDFF => self.wram[addr as usize - 0xE000],
            0xFE00..=0xFE9F => self.ppu.oam[addr as usize - 0xFE00],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF01..=0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg | 0xE0,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80],
            0xFFFF => self.ie_reg,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.vram[addr as usize - 0x8000] = val,
            0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0xC000..=0xDFFF => self.wram[addr as usize - 0xC000] = val,
            0xE000..=0xFDFF => self.wram[addr as usize - 0xE000] = val,
            0xFE00..=0xFE9F => self.ppu.oam[addr as usize - 0xFE00] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(val),
            0xFF01..=0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.if_reg),
            0xFF0F => self.if_reg = val | 0xE0,
            0xFF46 => {
                self.ppu.write_reg(addr, val);
                self.oam_dma(val);
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF50 => {
                if val != 0 {
                    self.boot_mapped = false;
                }
            }
            0xFF80..=0xFFFE => self.hram[addr as usize - 0xFF80] = val,
            0xFFFF => self.ie_reg = val,
            // Audio and other unimplemented I/O.
            _ => log::trace!("ignored write of {val:02X} to {addr:04X}"),
        }
    }

    /// OAM DMA: copy 160 bytes from `page << 8` into OAM. Performed as
    /// one block within the triggering store.
    fn oam_dma(&mut self, page: u8) {
        let src = (page as u16) << 8;
        for i in 0..0xA0u16 {
            self.ppu.oam[i as usize] = self.read(src.wrapping_add(i));
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

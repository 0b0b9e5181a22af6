/// One end of a link cable. The core calls `transfer` once per completed
/// byte; implementations return the byte clocked in from the partner.
pub trait LinkPort: Send {
    fn transfer(&mut self, byte: u8) -> u8;
}

/// Link port with no cable attached: incoming bits are all 1, so any
/// transfer receives 0xFF. With `loopback` the sent byte is echoed back.
#[derive(Default)]
pub struct NullLinkPort {
    loopback: bool,
}

impl NullLinkPort {
    pub fn new(loopback: bool) -> Self {
        Self { loopback }
    }
}

impl LinkPort for NullLinkPort {
    fn transfer(&mut self, byte: u8) -> u8 {
        if self.loopback { byte } else { 0xFF }
    }
}

/// Cycles for a full 8-bit transfer on the internal 8192 Hz clock.
const TRANSFER_CYCLES: u32 = 4096;

/// SB/SC serial registers. A transfer started on the internal clock
/// completes after a fixed delay; one started on the external clock
/// stalls until the partner supplies pulses, which the null port never
/// does.
pub struct Serial {
    sb: u8,
    sc: u8,
    port: Box<dyn LinkPort>,
    /// Cycles left in the active internal-clock transfer.
    countdown: Option<u32>,
    out_buf: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0x7E,
            port: Box::new(NullLinkPort::default()),
            countdown: None,
            out_buf: Vec::new(),
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort>) {
        self.port = port;
    }

    /// Restore the post-boot register state, keeping the link port.
    /// Cancels any in-flight transfer and drops captured output.
    pub fn reset(&mut self) {
        self.sb = 0;
        self.sc = 0x7E;
        self.countdown = None;
        self.out_buf.clear();
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                if val & 0x80 == 0 {
                    self.countdown = None;
                } else if val & 0x01 != 0 {
                    self.countdown = Some(TRANSFER_CYCLES);
                }
                // External clock: SC bit 7 stays asserted until the
                // partner clocks the bits, which never happens here.
            }
            _ => {}
        }
    }

    /// Advance an in-flight transfer, raising the serial interrupt on
    /// completion.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        let Some(remaining) = self.countdown else {
            return;
        };
        if let Some(left) = remaining.checked_sub(cycles) {
            if left > 0 {
                self.countdown = Some(left);
                return;
            }
        }
        self.countdown = None;
        let outgoing = self.sb;
        self.sb = self.port.transfer(outgoing);
        self.out_buf.push(outgoing);
        self.sc &= 0x7F;
        *if_reg |= 0x08;
    }

    /// Drain the bytes sent since the last call. Test ROMs report
    /// results over the link, so harnesses read them here.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out_buf)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.out_buf
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

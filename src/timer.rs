/// DIV/TIMA timer block.
///
/// DIV is the upper byte of a free-running 16-bit counter. TIMA increments
/// on the falling edge of a selected counter bit gated by the TAC enable,
/// which is why writing DIV (resetting the counter) can itself tick TIMA.
pub struct Timer {
    counter: u16,
    pub tima: u8,
    pub tma: u8,
    tac: u8,
    last_edge: bool,
    /// Cycles until an overflowed TIMA reloads from TMA and raises IF.
    reload_in: Option<u8>,
}

const OVERFLOW_RELOAD_DELAY: u8 = 4;

impl Timer {
    pub fn new() -> Self {
        Self {
            counter: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_edge: false,
            reload_in: None,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.counter >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, if_reg: &mut u8) {
        match addr {
            0xFF04 => self.reset_div(if_reg),
            0xFF05 => {
                self.tima = val;
                // A write during the overflow window cancels the reload.
                self.reload_in = None;
            }
            0xFF06 => self.tma = val,
            0xFF07 => {
                let prev = Self::edge(self.counter, self.tac);
                self.tac = val & 0x07;
                let new = Self::edge(self.counter, self.tac);
                if prev && !new {
                    self.increment(if_reg);
                }
                self.last_edge = new;
            }
            _ => {}
        }
    }

    /// Advance by `cycles` CPU cycles, raising the timer bit in `if_reg`
    /// when a TIMA overflow reload completes.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        for _ in 0..cycles {
            if let Some(delay) = self.reload_in {
                if delay == 0 {
                    self.tima = self.tma;
                    *if_reg |= 0x04;
                    self.reload_in = None;
                } else {
                    self.reload_in = Some(delay - 1);
                }
            }
            self.counter = self.counter.wrapping_add(1);
            let edge = Self::edge(self.counter, self.tac);
            if self.last_edge && !edge {
                self.increment(if_reg);
            }
            self.last_edge = edge;
        }
    }

    /// Reset the internal divider counter, applying the TIMA edge logic.
    pub fn reset_div(&mut self, if_reg: &mut u8) {
        let prev = Self::edge(self.counter, self.tac);
        self.counter = 0;
        if prev {
            self.increment(if_reg);
        }
        self.last_edge = false;
    }

    fn increment(&mut self, _if_reg: &mut u8) {
        if self.tima == 0xFF {
            self.tima = 0;
            self.reload_in = Some(OVERFLOW_RELOAD_DELAY - 1);
        } else {
            self.tima += 1;
        }
    }

    fn edge(counter: u16, tac: u8) -> bool {
        if tac & 0x04 == 0 {
            return false;
        }
        let bit = match tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (counter >> bit) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

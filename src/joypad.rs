/// The eight physical buttons.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// (direction row, bit) for the P1 low nibble.
    fn row_bit(self) -> (bool, u8) {
        match self {
            Button::Right => (true, 0x01),
            Button::Left => (true, 0x02),
            Button::Up => (true, 0x04),
            Button::Down => (true, 0x08),
            Button::A => (false, 0x01),
            Button::B => (false, 0x02),
            Button::Select => (false, 0x04),
            Button::Start => (false, 0x08),
        }
    }
}

/// Where button state comes from. Frontends implement this over their
/// key map; the core queries it once per sample.
pub trait InputSource {
    fn button_held(&mut self, button: Button) -> bool;
}

/// Input source with no buttons ever held.
pub struct NullInput;

impl InputSource for NullInput {
    fn button_held(&mut self, _button: Button) -> bool {
        false
    }
}

/// P1/JOYP register. Bits 4 and 5 select (active low) the direction and
/// action rows; selected rows AND their active-low pressed bits onto
/// bits 0-3.
pub struct Joypad {
    /// Row-select bits 4-5 as last written.
    select: u8,
    /// Active-low direction nibble from the last sample.
    directions: u8,
    /// Active-low action nibble from the last sample.
    actions: u8,
    source: Box<dyn InputSource>,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            directions: 0x0F,
            actions: 0x0F,
            source: Box::new(NullInput),
        }
    }

    pub fn set_source(&mut self, source: Box<dyn InputSource>) {
        self.source = source;
    }

    /// Restore the post-boot register state, keeping the input source.
    pub fn reset(&mut self) {
        self.select = 0x30;
        self.directions = 0x0F;
        self.actions = 0x0F;
    }

    pub fn read(&self) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= self.directions;
        }
        if self.select & 0x20 == 0 {
            low &= self.actions;
        }
        0xC0 | self.select | low
    }

    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Re-query the input source. A button newly pressed on a selected
    /// row requests the joypad interrupt, but only while IE has bit 4 set.
    pub fn sample(&mut self, if_reg: &mut u8, ie: u8) {
        let mut directions = 0x0F;
        let mut actions = 0x0F;
        for button in Button::ALL {
            if self.source.button_held(button) {
                let (is_direction, bit) = button.row_bit();
                if is_direction {
                    directions &= !bit;
                } else {
                    actions &= !bit;
                }
            }
        }

        let old = self.selected_nibble(self.directions, self.actions);
        let new = self.selected_nibble(directions, actions);
        // High-to-low transition on a selected line is a press edge.
        if old & !new != 0 && ie & 0x10 != 0 {
            *if_reg |= 0x10;
        }

        self.directions = directions;
        self.actions = actions;
    }

    fn selected_nibble(&self, directions: u8, actions: u8) -> u8 {
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= directions;
        }
        if self.select & 0x20 == 0 {
            low &= actions;
        }
        low
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

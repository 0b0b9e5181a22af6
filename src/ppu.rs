pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Mode durations in CPU cycles
const MODE0_CYCLES: u32 = 204; // HBlank
const MODE1_CYCLES: u32 = 456; // One line during VBlank
const MODE2_CYCLES: u32 = 80; // OAM scan
const MODE3_CYCLES: u32 = 172; // Pixel transfer

const VBLANK_LINES: u8 = 10;

const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;

const VRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;

const WINDOW_X_MAX: u8 = 166;

const BG_MAP_0_BASE: usize = 0x1800;
const BG_MAP_1_BASE: usize = 0x1C00;
const TILE_DATA_0_BASE: usize = 0x0000;
const TILE_DATA_1_BASE: usize = 0x0800;

pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

/// Receives completed frames. The buffer holds one shade index (0-3,
/// 0 lightest) per pixel in row-major order; palette mapping to actual
/// colors is the frontend's business.
pub trait FrameSink {
    fn push_frame(&mut self, frame: &[u8; SCREEN_WIDTH * SCREEN_HEIGHT]);
}

#[derive(Copy, Clone, Default)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
    oam_index: usize,
}

pub struct Ppu {
    pub vram: [u8; VRAM_SIZE],
    pub oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    pub dma: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,

    mode_clock: u32,
    pub mode: u8,

    pub framebuffer: [u8; SCREEN_WIDTH * SCREEN_HEIGHT],
    line_color_zero: [bool; SCREEN_WIDTH],
    /// Latched sprites for the current scanline
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    /// Indicates a completed frame is available in `framebuffer`
    frame_ready: bool,
    stat_irq_line: bool,
    frame_counter: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            dma: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            mode_clock: 0,
            mode: MODE_OAM,
            framebuffer: [0; SCREEN_WIDTH * SCREEN_HEIGHT],
            line_color_zero: [false; SCREEN_WIDTH],
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            frame_ready: false,
            stat_irq_line: false,
            frame_counter: 0,
        }
    }

    /// Registers in the state the boot ROM leaves behind.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.stat = 0x00;
        self.dma = 0xFF;
        self.bgp = 0xFC;
        self.mode = MODE_HBLANK;
        self.ly = 0;
        self.win_line_counter = 0;
        self.lyc_eq_ly = self.ly == self.lyc;
        self.stat_irq_line = false;
    }

    /// True once a full frame has been rendered; cleared by
    /// `clear_frame_flag` after the frame is consumed.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    pub fn framebuffer(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.framebuffer
    }

    /// Frames completed since power-on.
    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcdc(&self) -> u8 {
        self.lcdc
    }

    pub fn stat_bits(&self) -> u8 {
        (self.stat & 0x78) | 0x80 | (self.mode & 0x03) | if self.lyc_eq_ly { 0x04 } else { 0 }
    }

    fn update_lyc_compare(&mut self) {
        if self.lcdc & 0x80 != 0 {
            self.lyc_eq_ly = self.ly == self.lyc;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => self.stat_bits(),
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcdc & 0x80 != 0;
                self.lcdc = val;
                let is_on = self.lcdc & 0x80 != 0;
                if was_on && !is_on {
                    // Turning the LCD off freezes the picture: the mode
                    // machine parks in h-blank with LY 0, but the
                    // framebuffer keeps its last contents.
                    self.mode = MODE_HBLANK;
                    self.mode_clock = 0;
                    self.win_line_counter = 0;
                    self.ly = 0;
                } else if !was_on && is_on {
                    self.mode = MODE_OAM;
                    self.mode_clock = 0;
                    self.ly = 0;
                    self.win_line_counter = 0;
                    self.update_lyc_compare();
                }
            }
            0xFF41 => self.stat = (self.stat & 0x07) | (val & 0xF8),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                self.update_lyc_compare();
            }
            0xFF46 => self.dma = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    /// Advance the mode machine by `cycles` CPU cycles, raising v-blank
    /// and STAT bits in `if_reg` as edges occur. A disabled LCD holds
    /// everything still.
    pub fn step(&mut self, cycles: u32, if_reg: &mut u8) {
        if self.lcdc & 0x80 == 0 {
            return;
        }

        let mut remaining = cycles;
        while remaining > 0 {
            let increment = remaining.min(4);
            remaining -= increment;

            self.update_lyc_compare();
            self.mode_clock += increment;

            match self.mode {
                MODE_OAM => {
                    if self.mode_clock >= MODE2_CYCLES {
                        self.mode_clock -= MODE2_CYCLES;
                        self.oam_scan();
                        self.mode = MODE_TRANSFER;
                    }
                }
                MODE_TRANSFER => {
                    if self.mode_clock >= MODE3_CYCLES {
                        self.mode_clock -= MODE3_CYCLES;
                        self.render_scanline();
                        self.mode = MODE_HBLANK;
                    }
                }
                MODE_HBLANK => {
                    if self.mode_clock >= MODE0_CYCLES {
                        self.mode_clock -= MODE0_CYCLES;
                        self.ly += 1;
                        self.update_lyc_compare();
                        if self.ly == SCREEN_HEIGHT as u8 {
                            self.frame_ready = true;
                            self.mode = MODE_VBLANK;
                            *if_reg |= 0x01;
                        } else {
                            self.mode = MODE_OAM;
                        }
                    }
                }
                MODE_VBLANK => {
                    if self.mode_clock >= MODE1_CYCLES {
                        self.mode_clock -= MODE1_CYCLES;
                        self.ly += 1;
                        self.update_lyc_compare();
                        if self.ly > SCREEN_HEIGHT as u8 + VBLANK_LINES - 1 {
                            self.ly = 0;
                            self.win_line_counter = 0;
                            self.frame_counter = self.frame_counter.wrapping_add(1);
                            self.mode = MODE_OAM;
                            self.update_lyc_compare();
                        }
                    }
                }
                _ => {}
            }

            self.update_stat_irq(if_reg);
        }
    }

    /// STAT interrupts fire on the rising edge of the combined request
    /// line; a new condition while the line is already high is blocked.
    fn update_stat_irq(&mut self, if_reg: &mut u8) {
        let coincidence = self.lyc_eq_ly && self.stat & 0x40 != 0;
        let mode_signal = match self.mode {
            MODE_HBLANK => self.stat & 0x08 != 0,
            MODE_VBLANK => self.stat & 0x10 != 0,
            MODE_OAM => self.stat & 0x20 != 0,
            _ => false,
        };
        let current = coincidence || mode_signal;
        if current && !self.stat_irq_line {
            *if_reg |= 0x02;
        }
        self.stat_irq_line = current;
    }

    /// Collect up to 10 sprites visible on the current scanline, in
    /// DMG priority order (X position, then OAM index).
    fn oam_scan(&mut self) {
        let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            if self.ly as i16 >= y && (self.ly as i16) < y + sprite_height {
                self.line_sprites[self.sprite_count] = Sprite {
                    x: self.oam[base + 1] as i16 - 8,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                    oam_index: i,
                };
                self.sprite_count += 1;
            }
        }
        self.line_sprites[..self.sprite_count].sort_by_key(|s| (s.x, s.oam_index));
    }

    #[inline(always)]
    fn shade(palette: u8, color_id: u8) -> u8 {
        (palette >> (color_id * 2)) & 0x03
    }

    /// Color id (0-3) of a background/window tile pixel.
    fn tile_pixel(&self, map_base: usize, tile_col: usize, tile_row: usize, x: usize, y: usize) -> u8 {
        let tile_index = self.vram[map_base + tile_row * 32 + tile_col];
        let addr = if self.lcdc & 0x10 != 0 {
            TILE_DATA_0_BASE + tile_index as usize * 16
        } else {
            TILE_DATA_1_BASE + ((tile_index as i8 as i16 + 128) as usize) * 16
        };
        let lo = self.vram[addr + y * 2];
        let hi = self.vram[addr + y * 2 + 1];
        let bit = 7 - x;
        ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1)
    }

    fn render_scanline(&mut self) {
        if self.ly as usize >= SCREEN_HEIGHT {
            return;
        }

        let line_base = self.ly as usize * SCREEN_WIDTH;

        // With the background disabled the line is shade(BGP, 0) and
        // sprites see it as color 0 everywhere.
        let blank = Self::shade(self.bgp, 0);
        self.framebuffer[line_base..line_base + SCREEN_WIDTH].fill(blank);
        self.line_color_zero.fill(true);

        if self.lcdc & 0x01 != 0 {
            let map_base = if self.lcdc & 0x08 != 0 {
                BG_MAP_1_BASE
            } else {
                BG_MAP_0_BASE
            };
            let bg_y = (self.ly as usize + self.scy as usize) & 0xFF;
            for x in 0..SCREEN_WIDTH {
                let bg_x = (x + self.scx as usize) & 0xFF;
                let color_id =
                    self.tile_pixel(map_base, bg_x / 8, bg_y / 8, bg_x % 8, bg_y % 8);
                self.framebuffer[line_base + x] = Self::shade(self.bgp, color_id);
                self.line_color_zero[x] = color_id == 0;
            }

            if self.lcdc & 0x20 != 0 && self.ly >= self.wy && self.wx <= WINDOW_X_MAX {
                let map_base = if self.lcdc & 0x40 != 0 {
                    BG_MAP_1_BASE
                } else {
                    BG_MAP_0_BASE
                };
                // The window origin is WX-7; WX below 7 clips its left
                // columns off the screen edge.
                let wx = self.wx as i16 - 7;
                let win_y = self.win_line_counter as usize;
                for x in wx.max(0) as usize..SCREEN_WIDTH {
                    let win_x = (x as i16 - wx) as usize;
                    let color_id =
                        self.tile_pixel(map_base, win_x / 8, win_y / 8, win_x % 8, win_y % 8);
                    self.framebuffer[line_base + x] = Self::shade(self.bgp, color_id);
                    self.line_color_zero[x] = color_id == 0;
                }
                self.win_line_counter = self.win_line_counter.wrapping_add(1);
            }
        }

        if self.lcdc & 0x02 != 0 {
            self.render_sprites(line_base);
        }
    }

    fn render_sprites(&mut self, line_base: usize) {
        let sprite_height: i16 = if self.lcdc & 0x04 != 0 { 16 } else { 8 };
        let mut drawn = [false; SCREEN_WIDTH];
        for s in &self.line_sprites[..self.sprite_count] {
            let mut tile = s.tile;
            if sprite_height == 16 {
                tile &= 0xFE;
            }
            let mut line_idx = self.ly as i16 - s.y;
            if s.flags & 0x40 != 0 {
                line_idx = sprite_height - 1 - line_idx;
            }
            let palette = if s.flags & 0x10 != 0 {
                self.obp1
            } else {
                self.obp0
            };
            let addr = (tile + ((line_idx as usize) >> 3) as u8) as usize * 16
                + (line_idx as usize & 7) * 2;
            let lo = self.vram[addr];
            let hi = self.vram[addr + 1];
            for px in 0..8 {
                let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                let color_id = ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1);
                if color_id == 0 {
                    continue;
                }
                let sx = s.x + px as i16;
                if !(0i16..SCREEN_WIDTH as i16).contains(&sx) || drawn[sx as usize] {
                    continue;
                }
                let bg_zero = self.lcdc & 0x01 == 0 || self.line_color_zero[sx as usize];
                // OBJ-to-BG priority hides the sprite behind nonzero
                // background pixels.
                if s.flags & 0x80 != 0 && !bg_zero {
                    continue;
                }
                self.framebuffer[line_base + sx as usize] = Self::shade(palette, color_id);
                drawn[sx as usize] = true;
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

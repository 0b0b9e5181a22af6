use std::path::Path;

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::cpu::Cpu;
use crate::joypad::InputSource;
use crate::ppu::{FrameSink, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::serial::LinkPort;

/// Cycles in one complete frame (154 scanlines of 456 cycles).
pub const CYCLES_PER_FRAME: u32 = 70224;

/// The whole machine: CPU plus the bus that owns everything else.
pub struct GameBoy {
    pub cpu: Cpu,
    pub bus: Bus,
    sink: Option<Box<dyn FrameSink>>,
}

/// Point-in-time view of the machine for debuggers and monitors.
/// Plain values, so it can cross a thread boundary by copy.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
    pub halted: bool,
    pub lcdc: u8,
    pub stat: u8,
    pub ly: u8,
    pub ie: u8,
    pub if_: u8,
    pub cycles: u64,
}

impl GameBoy {
    /// Machine in the post-boot state, ready to execute from 0x0100.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            sink: None,
        }
    }

    /// Machine in the power-on state; pair with `load_boot_rom` to run
    /// a boot ROM from 0x0000.
    pub fn new_power_on() -> Self {
        Self {
            cpu: Cpu::new_power_on(),
            bus: Bus::new_power_on(),
            sink: None,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.bus.cart = Some(cart);
    }

    pub fn load_rom(&mut self, data: Vec<u8>) -> Result<(), CartridgeError> {
        self.load_cart(Cartridge::load(data)?);
        Ok(())
    }

    pub fn load_rom_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CartridgeError> {
        self.load_cart(Cartridge::from_file(path)?);
        Ok(())
    }

    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.bus.load_boot_rom(data);
    }

    pub fn set_input_source(&mut self, source: Box<dyn InputSource>) {
        self.bus.joypad.set_source(source);
    }

    pub fn set_frame_sink(&mut self, sink: Box<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    pub fn connect_serial(&mut self, port: Box<dyn LinkPort>) {
        self.bus.serial.connect(port);
    }

    /// Execute one CPU step and advance the rest of the machine by the
    /// same cycle count. Returns the cycles consumed.
    pub fn step(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.bus);
        self.bus.tick(cycles);
        cycles
    }

    /// Run until the PPU completes a frame, then hand the framebuffer
    /// to the sink (if any) exactly once. With the LCD disabled no
    /// frame ever completes, so the loop is capped at one frame's worth
    /// of cycles.
    pub fn run_frame(&mut self) {
        let mut budget = CYCLES_PER_FRAME as i64;
        while !self.bus.ppu.frame_ready() && budget > 0 {
            budget -= self.step() as i64;
        }
        if self.bus.ppu.frame_ready() {
            if let Some(sink) = self.sink.as_mut() {
                sink.push_frame(self.bus.ppu.framebuffer());
            }
            self.bus.ppu.clear_frame_flag();
            // Drain the v-blank lines so the next call starts a fresh
            // frame.
            while self.bus.ppu.ly() >= SCREEN_HEIGHT as u8 && budget > -(CYCLES_PER_FRAME as i64) {
                budget -= self.step() as i64;
            }
        }
    }

    pub fn framebuffer(&self) -> &[u8; SCREEN_WIDTH * SCREEN_HEIGHT] {
        self.bus.ppu.framebuffer()
    }

    /// Bytes written out the serial port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.bus.serial.take_output()
    }

    /// Flush battery-backed cartridge RAM, when present.
    pub fn save_ram(&self) -> std::io::Result<()> {
        match &self.bus.cart {
            Some(cart) => cart.save_ram(),
            None => Ok(()),
        }
    }

    /// Reset to the post-boot state, keeping the cartridge (its RAM
    /// included) and the attached sink, input source, and link port.
    pub fn reset(&mut self) {
        self.cpu = Cpu::new();
        let cart = self.bus.cart.take();
        let mut bus = Bus::new();
        bus.cart = cart;
        // Carry the trait objects over, but none of the register state.
        std::mem::swap(&mut bus.joypad, &mut self.bus.joypad);
        std::mem::swap(&mut bus.serial, &mut self.bus.serial);
        bus.joypad.reset();
        bus.serial.reset();
        self.bus = bus;
    }

    pub fn snapshot(&self) -> Snapshot {
        use crate::registers::Reg8;
        let regs = &self.cpu.regs;
        Snapshot {
            a: regs.a(),
            f: regs.f(),
            b: regs.get(Reg8::B),
            c: regs.get(Reg8::C),
            d: regs.get(Reg8::D),
            e: regs.get(Reg8::E),
            h: regs.get(Reg8::H),
            l: regs.get(Reg8::L),
            sp: regs.sp,
            pc: regs.pc,
            ime: self.cpu.ime,
            halted: self.cpu.halted,
            lcdc: self.bus.ppu.lcdc(),
            stat: self.bus.ppu.stat_bits(),
            ly: self.bus.ppu.ly(),
            ie: self.bus.ie_reg,
            if_: self.bus.if_reg | 0xE0,
            cycles: self.cpu.cycles,
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}

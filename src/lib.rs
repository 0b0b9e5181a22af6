//! Cycle-counted Game Boy (DMG) emulation core.
//!
//! This crate contains the platform-agnostic emulator logic (CPU, bus,
//! PPU, timer, cartridge, joypad). Frontends drive it through the
//! [`gameboy`] facade and receive pixels and input callbacks via the
//! [`ppu::FrameSink`] and [`joypad::InputSource`] seams.

/// 64KiB address space, echo RAM, and I/O register plumbing.
pub mod bus;

/// Cartridge mappers (MBC) and ROM/RAM/RTC handling.
pub mod cartridge;

/// SM83 CPU executor.
pub mod cpu;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod gameboy;

/// Joypad input register and edge-triggered interrupt behavior.
pub mod joypad;

/// Instruction decoding: opcode bytes to tagged operations.
pub mod opcodes;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// CPU register file and flag constants.
pub mod registers;

/// Serial unit and link cable plumbing.
pub mod serial;

/// Divider/timer unit.
pub mod timer;

pub use cartridge::{Cartridge, CartridgeError};
pub use gameboy::{GameBoy, Snapshot};
pub use joypad::{Button, InputSource};
pub use ppu::FrameSink;
pub use serial::{LinkPort, NullLinkPort};

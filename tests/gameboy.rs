use std::cell::RefCell;
use std::rc::Rc;

use dotmatrix_core::ppu::{FrameSink, SCREEN_HEIGHT, SCREEN_WIDTH};
use dotmatrix_core::GameBoy;

#[derive(Clone, Default)]
struct CountingSink {
    frames: Rc<RefCell<u32>>,
}

impl FrameSink for CountingSink {
    fn push_frame(&mut self, _frame: &[u8; SCREEN_WIDTH * SCREEN_HEIGHT]) {
        *self.frames.borrow_mut() += 1;
    }
}

fn make_rom(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    rom
}

#[test]
fn run_frame_pushes_exactly_one_frame() {
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[0x18, 0xFE])).unwrap(); // JR -2
    let sink = CountingSink::default();
    let frames = sink.frames.clone();
    gb.set_frame_sink(Box::new(sink));

    gb.run_frame();
    assert_eq!(*frames.borrow(), 1);

    gb.run_frame();
    gb.run_frame();
    assert_eq!(*frames.borrow(), 3);
}

#[test]
fn run_frame_with_lcd_disabled_pushes_nothing() {
    let mut gb = GameBoy::new();
    // LD A,0x00 / LDH (0x40),A / JR -2
    gb.load_rom(make_rom(&[0x3E, 0x00, 0xE0, 0x40, 0x18, 0xFE]))
        .unwrap();
    let sink = CountingSink::default();
    let frames = sink.frames.clone();
    gb.set_frame_sink(Box::new(sink));

    gb.run_frame();
    assert_eq!(*frames.borrow(), 0);
}

#[test]
fn snapshot_reflects_post_boot_state() {
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[0x00])).unwrap();

    let snap = gb.snapshot();
    assert_eq!(snap.a, 0x01);
    assert_eq!(snap.f, 0xB0);
    assert_eq!(snap.pc, 0x0100);
    assert_eq!(snap.sp, 0xFFFE);
    assert_eq!(snap.lcdc, 0x91);
    assert_eq!(snap.if_ & 0xE0, 0xE0);
    assert!(!snap.halted);
}

#[test]
fn snapshot_is_side_effect_free() {
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[0x00])).unwrap();
    gb.step();
    let a = gb.snapshot();
    let b = gb.snapshot();
    assert_eq!(a.pc, b.pc);
    assert_eq!(a.cycles, b.cycles);
}

#[test]
fn serial_output_is_captured() {
    // LD A,'H' / LDH (0x01),A / LD A,0x81 / LDH (0x02),A / JR -2
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[
        0x3E, b'H', 0xE0, 0x01, 0x3E, 0x81, 0xE0, 0x02, 0x18, 0xFE,
    ]))
    .unwrap();

    gb.run_frame();
    assert_eq!(gb.take_serial_output(), vec![b'H']);
    assert!(gb.take_serial_output().is_empty());
}

#[test]
fn reset_keeps_cartridge_ram() {
    // MBC1 with battery-backed RAM.
    let mut rom = make_rom(&[0x18, 0xFE]);
    rom[0x0147] = 0x03;
    rom[0x0149] = 0x02;
    let mut gb = GameBoy::new();
    gb.load_rom(rom).unwrap();

    gb.bus.write(0x0000, 0x0A);
    gb.bus.write(0xA000, 0x5A);
    gb.run_frame();

    gb.reset();
    gb.bus.write(0x0000, 0x0A);
    assert_eq!(gb.bus.read(0xA000), 0x5A);
    assert_eq!(gb.snapshot().pc, 0x0100);
}

#[test]
fn reset_clears_io_register_state() {
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[0x18, 0xFE])).unwrap();

    // Dirty SB, start a transfer, and select a joypad row.
    gb.bus.write(0xFF01, b'X');
    gb.bus.write(0xFF02, 0x81);
    gb.bus.write(0xFF00, 0x20);
    gb.step();

    gb.reset();
    assert_eq!(gb.bus.read(0xFF01), 0x00);
    assert_eq!(gb.bus.read(0xFF02), 0x7E);
    assert_eq!(gb.bus.read(0xFF00), 0xFF);
    assert!(gb.take_serial_output().is_empty());

    // The cancelled transfer never completes after the reset.
    gb.run_frame();
    assert_eq!(gb.bus.read(0xFF02), 0x7E);
    assert!(gb.take_serial_output().is_empty());
}

#[test]
fn frame_has_full_height() {
    let mut gb = GameBoy::new();
    gb.load_rom(make_rom(&[0x18, 0xFE])).unwrap();
    gb.run_frame();
    assert_eq!(gb.framebuffer().len(), SCREEN_WIDTH * SCREEN_HEIGHT);
    assert!(gb.framebuffer().iter().all(|&p| p < 4));
}

use dotmatrix_core::ppu::{
    Ppu, MODE_HBLANK, MODE_OAM, MODE_TRANSFER, MODE_VBLANK, SCREEN_WIDTH,
};

const LINE_CYCLES: u32 = 456;

fn enabled_ppu() -> Ppu {
    let mut ppu = Ppu::new();
    ppu.write_reg(0xFF40, 0x91);
    ppu
}

#[test]
fn scanline_mode_sequence() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;

    assert_eq!(ppu.mode, MODE_OAM);
    ppu.step(80, &mut if_reg);
    assert_eq!(ppu.mode, MODE_TRANSFER);
    ppu.step(172, &mut if_reg);
    assert_eq!(ppu.mode, MODE_HBLANK);
    assert_eq!(ppu.ly(), 0);
    ppu.step(204, &mut if_reg);
    assert_eq!(ppu.mode, MODE_OAM);
    assert_eq!(ppu.ly(), 1);
}

#[test]
fn one_vblank_request_per_frame() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;

    ppu.step(LINE_CYCLES * 144, &mut if_reg);
    assert_eq!(ppu.mode, MODE_VBLANK);
    assert_eq!(ppu.ly(), 144);
    assert_ne!(if_reg & 0x01, 0);
    assert!(ppu.frame_ready());

    // The rest of v-blank raises no further v-blank request.
    if_reg = 0;
    ppu.step(LINE_CYCLES * 10, &mut if_reg);
    assert_eq!(if_reg & 0x01, 0);
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.mode, MODE_OAM);
}

#[test]
fn ly_walks_all_154_lines() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    for line in 0..154u32 {
        assert_eq!(ppu.ly() as u32, line);
        ppu.step(LINE_CYCLES, &mut if_reg);
    }
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.frames(), 1);
}

#[test]
fn disabled_lcd_freezes_and_reenable_restarts() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;

    ppu.step(LINE_CYCLES * 3, &mut if_reg);
    assert_eq!(ppu.ly(), 3);
    ppu.framebuffer[0] = 3;

    ppu.write_reg(0xFF40, 0x11);
    assert_eq!(ppu.ly(), 0);
    if_reg = 0;
    ppu.step(LINE_CYCLES * 200, &mut if_reg);
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.mode, MODE_HBLANK);
    assert_eq!(if_reg, 0);
    // The picture is frozen, not cleared.
    assert_eq!(ppu.framebuffer[0], 3);

    ppu.write_reg(0xFF40, 0x91);
    assert_eq!(ppu.ly(), 0);
    assert_eq!(ppu.mode, MODE_OAM);
    ppu.step(LINE_CYCLES, &mut if_reg);
    assert_eq!(ppu.ly(), 1);
}

#[test]
fn lyc_coincidence_stat_interrupt() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF45, 5);
    ppu.write_reg(0xFF41, 0x40);

    ppu.step(LINE_CYCLES * 4, &mut if_reg);
    assert_eq!(if_reg & 0x02, 0);
    ppu.step(LINE_CYCLES, &mut if_reg);
    assert_ne!(if_reg & 0x02, 0);
    assert_ne!(ppu.read_reg(0xFF41) & 0x04, 0);
}

#[test]
fn stat_mode_interrupt_is_edge_triggered() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    // H-blank interrupt source.
    ppu.write_reg(0xFF41, 0x08);

    ppu.step(80 + 172, &mut if_reg);
    assert_ne!(if_reg & 0x02, 0);

    // Staying in h-blank raises no second request.
    if_reg = 0;
    ppu.step(100, &mut if_reg);
    assert_eq!(if_reg & 0x02, 0);
}

#[test]
fn background_scanline_uses_bgp_shades() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF47, 0xE4); // identity palette

    // Tile 0: every pixel color id 3. Map defaults to tile 0.
    for b in ppu.vram[..16].iter_mut() {
        *b = 0xFF;
    }

    ppu.step(80 + 172, &mut if_reg);
    assert!(ppu.framebuffer()[..SCREEN_WIDTH].iter().all(|&p| p == 3));
}

#[test]
fn window_overlays_background() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF47, 0xE4);
    // BG on map 0 shows tile 0 (color 3), window on map 1 shows tile 1
    // (color 1) from the left edge.
    ppu.write_reg(0xFF40, 0xF1);
    ppu.write_reg(0xFF4A, 0); // WY
    ppu.write_reg(0xFF4B, 7); // WX

    for b in ppu.vram[..16].iter_mut() {
        *b = 0xFF;
    }
    for row in 0..8 {
        ppu.vram[16 + row * 2] = 0xFF; // tile 1, lo plane only
    }
    for b in ppu.vram[0x1C00..0x1C00 + 32].iter_mut() {
        *b = 1;
    }

    ppu.step(80 + 172, &mut if_reg);
    assert!(ppu.framebuffer()[..SCREEN_WIDTH].iter().all(|&p| p == 1));
}

#[test]
fn window_left_clips_when_wx_below_seven() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF47, 0xE4);
    ppu.write_reg(0xFF40, 0xF1);
    ppu.write_reg(0xFF4A, 0); // WY
    ppu.write_reg(0xFF4B, 0); // WX: origin 7 pixels off-screen

    for b in ppu.vram[..16].iter_mut() {
        *b = 0xFF; // BG tile 0: color 3
    }
    for row in 0..8 {
        ppu.vram[16 + row * 2] = 0xFF; // window tile 1: color 1
    }
    for b in ppu.vram[0x1C00..0x1C00 + 32].iter_mut() {
        *b = 1;
    }

    // The visible part of the window still covers the whole line.
    ppu.step(80 + 172, &mut if_reg);
    assert!(ppu.framebuffer()[..SCREEN_WIDTH].iter().all(|&p| p == 1));
}

#[test]
fn sprite_renders_over_zero_background() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF40, 0x93);
    ppu.write_reg(0xFF47, 0xE4);
    ppu.write_reg(0xFF48, 0xE4); // OBP0 identity

    // Tile 1: color id 1 everywhere.
    for row in 0..8 {
        ppu.vram[16 + row * 2] = 0xFF;
    }
    // Sprite 0 at screen (0,0).
    ppu.oam[0] = 16;
    ppu.oam[1] = 8;
    ppu.oam[2] = 1;
    ppu.oam[3] = 0;

    ppu.step(80 + 172, &mut if_reg);
    let line = &ppu.framebuffer()[..SCREEN_WIDTH];
    assert!(line[..8].iter().all(|&p| p == 1));
    assert!(line[8..].iter().all(|&p| p == 0));
}

#[test]
fn obj_behind_bg_priority_flag() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.write_reg(0xFF40, 0x93);
    ppu.write_reg(0xFF47, 0xE4);
    ppu.write_reg(0xFF48, 0xE4);

    // Background color 3 everywhere, sprite flagged behind-background.
    for b in ppu.vram[..16].iter_mut() {
        *b = 0xFF;
    }
    for row in 0..8 {
        ppu.vram[16 + row * 2] = 0xFF;
    }
    ppu.oam[0] = 16;
    ppu.oam[1] = 8;
    ppu.oam[2] = 1;
    ppu.oam[3] = 0x80;

    ppu.step(80 + 172, &mut if_reg);
    assert!(ppu.framebuffer()[..8].iter().all(|&p| p == 3));
}

#[test]
fn ly_write_is_ignored() {
    let mut ppu = enabled_ppu();
    let mut if_reg = 0u8;
    ppu.step(LINE_CYCLES * 2, &mut if_reg);
    ppu.write_reg(0xFF44, 0x99);
    assert_eq!(ppu.read_reg(0xFF44), 2);
}

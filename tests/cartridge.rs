use dotmatrix_core::cartridge::{Cartridge, CartridgeError, MbcType};

/// ROM image of `banks` 16KiB banks, each filled with its bank number,
/// with the header fields tests care about patched in.
fn make_rom(cart_type: u8, banks: usize, ram_size_code: u8) -> Vec<u8> {
    let mut rom = vec![0u8; banks * 0x4000];
    for (bank, chunk) in rom.chunks_mut(0x4000).enumerate() {
        chunk.fill(bank as u8);
    }
    rom[0x0134..0x0144].copy_from_slice(b"BANKTEST\0\0\0\0\0\0\0\0");
    rom[0x0147] = cart_type;
    rom[0x0149] = ram_size_code;
    rom
}

#[test]
fn header_fields_parse() {
    let rom = make_rom(0x01, 2, 0x02);
    let cart = Cartridge::load(rom).unwrap();
    assert_eq!(cart.header.title, "BANKTEST");
    assert_eq!(cart.header.cart_type, 0x01);
    assert_eq!(cart.header.ram_size(), 0x2000);
    assert_eq!(cart.mbc_type(), MbcType::Mbc1);
}

#[test]
fn short_image_is_rejected() {
    let err = Cartridge::load(vec![0u8; 0x100]).unwrap_err();
    assert!(matches!(err, CartridgeError::TooShort(0x100)));
}

#[test]
fn unsupported_mapper_is_rejected() {
    // MBC5
    let err = Cartridge::load(make_rom(0x19, 2, 0)).unwrap_err();
    assert!(matches!(err, CartridgeError::UnsupportedMapper(0x19)));
}

#[test]
fn mbc1_bank_zero_selects_bank_one() {
    for banks in [2usize, 4, 8, 16, 32] {
        let mut cart = Cartridge::load(make_rom(0x01, banks, 0)).unwrap();
        cart.write(0x2000, 0x00);
        assert_eq!(cart.read(0x4000), 1, "{banks} banks");
        cart.write(0x2000, 0x01);
        assert_eq!(cart.read(0x4000), 1);
    }
}

#[test]
fn mbc1_bank_select_masks_to_rom_size() {
    let mut cart = Cartridge::load(make_rom(0x01, 4, 0)).unwrap();
    // Bank 5 on a 4-bank ROM wraps to bank 1.
    cart.write(0x2000, 0x05);
    assert_eq!(cart.read(0x4000), 1);
    cart.write(0x2000, 0x03);
    assert_eq!(cart.read(0x4000), 3);
    assert_eq!(cart.read(0x0000), 0);
}

#[test]
fn mbc1_ram_requires_enable_sequence() {
    let mut cart = Cartridge::load(make_rom(0x03, 2, 0x02)).unwrap();

    cart.write(0xA000, 0x42);
    assert_eq!(cart.read(0xA000), 0xFF);

    cart.write(0x0000, 0x0A);
    cart.write(0xA000, 0x42);
    assert_eq!(cart.read(0xA000), 0x42);

    cart.write(0x0000, 0x00);
    assert_eq!(cart.read(0xA000), 0xFF);
    cart.write(0x0000, 0x0A);
    assert_eq!(cart.read(0xA000), 0x42);
}

#[test]
fn mbc1_mode_one_banks_ram() {
    let mut cart = Cartridge::load(make_rom(0x03, 2, 0x03)).unwrap(); // 32KiB RAM
    cart.write(0x0000, 0x0A);
    cart.write(0x6000, 0x01); // banking mode

    cart.write(0x4000, 0x00);
    cart.write(0xA000, 0x11);
    cart.write(0x4000, 0x02);
    cart.write(0xA000, 0x22);

    cart.write(0x4000, 0x00);
    assert_eq!(cart.read(0xA000), 0x11);
    cart.write(0x4000, 0x02);
    assert_eq!(cart.read(0xA000), 0x22);
}

#[test]
fn mbc3_rom_banking_seven_bits() {
    let mut cart = Cartridge::load(make_rom(0x11, 128, 0)).unwrap();
    cart.write(0x2000, 0x00);
    assert_eq!(cart.read(0x4000), 1);
    cart.write(0x2000, 0x7F);
    assert_eq!(cart.read(0x4000), 0x7F);
    cart.write(0x2000, 0x42);
    assert_eq!(cart.read(0x4000), 0x42);
}

#[test]
fn mbc3_rtc_latch_and_halt() {
    let mut cart = Cartridge::load(make_rom(0x0F, 2, 0x02)).unwrap();
    cart.write(0x0000, 0x0A);

    // One emulated second on the clock.
    cart.step_rtc(4_194_304);

    // Latch and read the seconds register.
    cart.write(0x6000, 0x00);
    cart.write(0x6000, 0x01);
    cart.write(0x4000, 0x08);
    assert_eq!(cart.read(0xA000), 1);

    // The latched copy holds still while the clock keeps running.
    cart.step_rtc(4_194_304 * 2);
    assert_eq!(cart.read(0xA000), 1);
    cart.write(0x6000, 0x00);
    cart.write(0x6000, 0x01);
    assert_eq!(cart.read(0xA000), 3);

    // Halt stops the counter.
    cart.write(0x4000, 0x0C);
    cart.write(0xA000, 0x40);
    cart.step_rtc(4_194_304 * 5);
    cart.write(0x4000, 0x08);
    cart.write(0x6000, 0x00);
    cart.write(0x6000, 0x01);
    assert_eq!(cart.read(0xA000), 3);
}

#[test]
fn mbc3_ram_banks_are_distinct() {
    let mut cart = Cartridge::load(make_rom(0x10, 2, 0x03)).unwrap();
    cart.write(0x0000, 0x0A);
    cart.write(0x4000, 0x00);
    cart.write(0xA000, 0xAA);
    cart.write(0x4000, 0x01);
    cart.write(0xA000, 0xBB);
    cart.write(0x4000, 0x00);
    assert_eq!(cart.read(0xA000), 0xAA);
    cart.write(0x4000, 0x01);
    assert_eq!(cart.read(0xA000), 0xBB);
}

#[test]
fn battery_ram_round_trips_through_sav_file() {
    let dir = tempfile::tempdir().unwrap();
    let rom_path = dir.path().join("game.gb");
    std::fs::write(&rom_path, make_rom(0x03, 2, 0x02)).unwrap();

    {
        let mut cart = Cartridge::from_file(&rom_path).unwrap();
        cart.write(0x0000, 0x0A);
        cart.write(0xA000, 0x77);
        cart.write(0xA123, 0x88);
        cart.save_ram().unwrap();
    }
    assert!(rom_path.with_extension("sav").exists());

    let mut cart = Cartridge::from_file(&rom_path).unwrap();
    cart.write(0x0000, 0x0A);
    assert_eq!(cart.read(0xA000), 0x77);
    assert_eq!(cart.read(0xA123), 0x88);
}

#[test]
fn rom_only_ignores_bank_writes() {
    let mut cart = Cartridge::load(make_rom(0x00, 2, 0)).unwrap();
    cart.write(0x2000, 0x05);
    assert_eq!(cart.read(0x0000), 0);
    assert_eq!(cart.read(0x4000), 1);
}

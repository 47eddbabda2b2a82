//! The 16-bit memory bus: address decode, bank routing, MBC register writes.
//!
//! The LCD register window 0xFF40-0xFF4B is owned by the PPU and intercepted
//! one level up, before these methods are reached; the bus keeps no shadow
//! copy of those bytes. Everything else decodes here. All accesses are total:
//! out-of-range reads yield 0xFF and out-of-range writes are dropped.

use crate::joypad::{self, JoypadLines};
use crate::mbc::{self, MbcKind};
use crate::memory_map::*;

pub struct MemoryBus {
    rom: Vec<u8>,
    vram: Box<[u8; VRAM_BANK_SIZE * VRAM_BANKS]>,
    wram: Box<[u8; WRAM_BANK_SIZE * WRAM_BANKS]>,
    eram: Vec<u8>,
    oam: Box<[u8; OAM_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,
    io: Box<[u8; IO_SIZE + 1]>, // trailing slot holds IE

    // Banking state
    pub(crate) rom_bank: usize,
    pub(crate) ram_bank: usize,
    pub(crate) wram_bank: usize,
    pub(crate) vram_bank: usize,
    pub(crate) ram_enabled: bool,
    pub(crate) mbc_mode: u8,
    pub(crate) mbc_type: MbcKind,

    /// Platform joypad nibbles, copied in by value at each poll point.
    pub joypad: JoypadLines,
}

impl MemoryBus {
    pub fn new() -> Self {
        let mut bus = MemoryBus {
            rom: Vec::new(),
            vram: Box::new([0; VRAM_BANK_SIZE * VRAM_BANKS]),
            wram: Box::new([0; WRAM_BANK_SIZE * WRAM_BANKS]),
            eram: Vec::new(),
            oam: Box::new([0; OAM_SIZE]),
            hram: Box::new([0; HRAM_SIZE]),
            io: Box::new([0; IO_SIZE + 1]),
            rom_bank: 1,
            ram_bank: 0,
            wram_bank: 1,
            vram_bank: 0,
            ram_enabled: false,
            mbc_mode: 0,
            mbc_type: MbcKind::None,
            joypad: JoypadLines::default(),
        };
        bus.reset();
        bus
    }

    /// Restores the DMG post-boot I/O bytes and banking defaults. ROM and
    /// ERAM contents are left alone.
    pub fn reset(&mut self) {
        self.io.fill(0);
        self.io[0x00] = 0xCF; // P1
        self.io[0x01] = 0x00; // SB
        self.io[0x02] = 0x7E; // SC
        self.io[0x04] = 0xAB; // DIV
        self.io[0x07] = 0xF8; // TAC
        self.io[0x0F] = 0xE1; // IF
        self.io[0x10] = 0x80; // NR10
        self.io[0x11] = 0xBF; // NR11
        self.io[0x12] = 0xF3; // NR12
        self.io[0x14] = 0xBF; // NR14
        self.io[0x16] = 0x3F; // NR21
        self.io[0x19] = 0xBF; // NR24
        self.io[0x1A] = 0x7F; // NR30
        self.io[0x1B] = 0xFF; // NR31
        self.io[0x1C] = 0x9F; // NR32
        self.io[0x1E] = 0xBF; // NR34
        self.io[0x20] = 0xFF; // NR41
        self.io[0x23] = 0xBF; // NR44
        self.io[0x24] = 0x77; // NR50
        self.io[0x25] = 0xF3; // NR51
        self.io[0x26] = 0xF1; // NR52
        self.io[IE_SLOT] = 0x00;

        self.rom_bank = 1;
        self.ram_bank = 0;
        self.wram_bank = 1;
        self.vram_bank = 0;
        self.ram_enabled = false;
        self.mbc_mode = 0;
        self.joypad = JoypadLines::default();
    }

    /// Stores the ROM image and sizes external RAM from the header.
    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), String> {
        if data.len() < 0x150 {
            return Err(format!(
                "ROM image too small to hold a header ({} bytes)",
                data.len()
            ));
        }

        self.mbc_type = MbcKind::from_header(data[HEADER_MBC_TYPE]);
        let eram_size = mbc::eram_size(data[HEADER_RAM_SIZE], self.mbc_type);
        self.eram = vec![0; eram_size];
        self.rom = data.to_vec();

        self.rom_bank = 1;
        self.ram_bank = 0;
        self.ram_enabled = false;
        self.mbc_mode = 0;

        log::info!(
            "ROM loaded: {} bytes, {:?}, {} bytes external RAM",
            self.rom.len(),
            self.mbc_type,
            self.eram.len()
        );
        Ok(())
    }

    pub fn read8(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_0_END => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            ROM_BANK_N_START..=ROM_BANK_N_END => {
                let offset =
                    self.rom_bank * ROM_BANK_SIZE + (addr - ROM_BANK_N_START) as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            VRAM_START..=VRAM_END => {
                self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr - VRAM_START) as usize]
            }
            ERAM_START..=ERAM_END => {
                if !self.ram_enabled {
                    return 0xFF;
                }
                let offset =
                    self.ram_bank * ERAM_BANK_SIZE + (addr - ERAM_START) as usize;
                self.eram.get(offset).copied().unwrap_or(0xFF)
            }
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram[(addr - WRAM_BANK_0_START) as usize]
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram[self.wram_bank * WRAM_BANK_SIZE + (addr - WRAM_BANK_N_START) as usize]
            }
            ECHO_START..=ECHO_END => self.read8(addr - 0x2000),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            UNUSABLE_START..=UNUSABLE_END => 0xFF,
            P1_ADDR => joypad::read_p1(self.io[0x00], self.joypad),
            IO_START..=IO_END => self.io[(addr - IO_START) as usize],
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            IE_ADDR => self.io[IE_SLOT],
        }
    }

    pub fn write8(&mut self, addr: u16, value: u8) {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self.mbc_write(addr, value),
            VRAM_START..=VRAM_END => {
                self.vram[self.vram_bank * VRAM_BANK_SIZE + (addr - VRAM_START) as usize] =
                    value;
            }
            ERAM_START..=ERAM_END => {
                if !self.ram_enabled {
                    return;
                }
                let offset =
                    self.ram_bank * ERAM_BANK_SIZE + (addr - ERAM_START) as usize;
                if let Some(slot) = self.eram.get_mut(offset) {
                    *slot = value;
                }
            }
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram[(addr - WRAM_BANK_0_START) as usize] = value;
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram
                    [self.wram_bank * WRAM_BANK_SIZE + (addr - WRAM_BANK_N_START) as usize] =
                    value;
            }
            ECHO_START..=ECHO_END => self.write8(addr - 0x2000, value),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize] = value,
            UNUSABLE_START..=UNUSABLE_END => {}
            SVBK_ADDR => {
                // WRAM bank select: 1-7, zero coerces to 1.
                self.wram_bank = ((value & 0x07) as usize).max(1);
                self.io[(addr - IO_START) as usize] = value;
            }
            VBK_ADDR => {
                self.vram_bank = (value & 0x01) as usize;
                self.io[(addr - IO_START) as usize] = value;
            }
            IO_START..=IO_END => self.io[(addr - IO_START) as usize] = value,
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize] = value,
            IE_ADDR => self.io[IE_SLOT] = value,
        }
    }

    /// MBC1 control registers, decoded from ROM-range writes.
    fn mbc_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enabled = (value & 0x0F) == 0x0A,
            0x2000..=0x3FFF => self.rom_bank = (value as usize).max(1),
            0x4000..=0x5FFF => self.ram_bank = (value & 0x03) as usize,
            0x6000..=0x7FFF => self.mbc_mode = value & 0x01,
            _ => unreachable!(),
        }
    }

    /// Sets an interrupt request bit (0-4) in IF.
    pub fn request_interrupt(&mut self, bit: u8) {
        if bit < 5 {
            self.io[(IF_ADDR - IO_START) as usize] |= 1 << bit;
        }
    }

    /// OAM DMA: copies 160 bytes from `page << 8` into OAM through the
    /// normal read path. Sources at or above 0xFE00 are refused.
    pub fn oam_dma(&mut self, page: u8) {
        let source = (page as u16) << 8;
        if source >= OAM_START {
            log::warn!("OAM DMA from restricted source {:04X} ignored", source);
            return;
        }
        for i in 0..OAM_SIZE as u16 {
            self.oam[i as usize] = self.read8(source + i);
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rom(banks: usize) -> Vec<u8> {
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[HEADER_MBC_TYPE] = 0x03; // MBC1+RAM+BATTERY
        rom[HEADER_RAM_SIZE] = 0x03; // 32 KiB
        // Tag the first byte of each bank with its index.
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
        }
        rom
    }

    fn loaded_bus() -> MemoryBus {
        let mut bus = MemoryBus::new();
        bus.load_rom(&test_rom(8)).unwrap();
        bus
    }

    #[test]
    fn wram_hram_oam_round_trip() {
        let mut bus = loaded_bus();
        for &(addr, value) in &[(0xC123u16, 0x42u8), (0xD456, 0x17), (0xFF85, 0x99), (0xFE20, 0xAB)]
        {
            bus.write8(addr, value);
            assert_eq!(bus.read8(addr), value, "round trip at {:04X}", addr);
        }
    }

    #[test]
    fn writable_regions_round_trip_exhaustively() {
        let mut bus = loaded_bus();
        bus.write8(0x0000, 0x0A); // open the ERAM gate
        let ranges = [
            (VRAM_START, VRAM_END),
            (ERAM_START, ERAM_END),
            (WRAM_BANK_0_START, WRAM_BANK_N_END),
            (OAM_START, OAM_END),
            (HRAM_START, HRAM_END),
        ];
        for (start, end) in ranges {
            for addr in start..=end {
                let value = (addr ^ (addr >> 8)) as u8;
                bus.write8(addr, value);
                assert_eq!(bus.read8(addr), value, "round trip at {:04X}", addr);
            }
        }
        for addr in UNUSABLE_START..=UNUSABLE_END {
            bus.write8(addr, 0x55);
            assert_eq!(bus.read8(addr), 0xFF, "unusable at {:04X}", addr);
        }
    }

    #[test]
    fn echo_range_mirrors_exhaustively() {
        let mut bus = loaded_bus();
        for addr in ECHO_START..=ECHO_END {
            let value = addr as u8;
            bus.write8(addr, value);
            assert_eq!(bus.read8(addr - 0x2000), value);
            assert_eq!(bus.read8(addr), value);
        }
    }

    #[test]
    fn echo_mirrors_wram() {
        let mut bus = loaded_bus();
        bus.write8(0xC100, 0x5A);
        assert_eq!(bus.read8(0xE100), 0x5A);
        bus.write8(0xF000, 0xA5);
        assert_eq!(bus.read8(0xD000), 0xA5);
    }

    #[test]
    fn unusable_range_reads_ff_and_drops_writes() {
        let mut bus = loaded_bus();
        bus.write8(0xFEA5, 0x12);
        assert_eq!(bus.read8(0xFEA5), 0xFF);
    }

    #[test]
    fn rom_bank_select_coerces_zero_to_one() {
        let mut bus = loaded_bus();
        for value in 0..=0xFFu16 {
            bus.write8(0x2000, value as u8);
            assert_eq!(bus.rom_bank, (value as usize).max(1));
        }
    }

    #[test]
    fn rom_bank_boundary() {
        let mut bus = MemoryBus::new();
        bus.load_rom(&test_rom(8)).unwrap(); // 128 KiB
        bus.write8(0x2100, 5);
        assert_eq!(bus.read8(0x4000), 5);
        bus.write8(0x2100, 0);
        assert_eq!(bus.read8(0x4000), 1); // bank 0 coerces to 1
    }

    #[test]
    fn rom_bank_out_of_range_reads_ff() {
        let mut bus = loaded_bus();
        bus.write8(0x2000, 0x40); // beyond the 8-bank image
        assert_eq!(bus.read8(0x4000), 0xFF);
    }

    #[test]
    fn eram_gated_by_enable() {
        let mut bus = loaded_bus();
        assert_eq!(bus.read8(0xA000), 0xFF);

        bus.write8(0x0000, 0x0A);
        bus.write8(0xA000, 0x33);
        assert_eq!(bus.read8(0xA000), 0x33);

        bus.write8(0x0000, 0x00);
        bus.write8(0xA000, 0x44); // dropped
        assert_eq!(bus.read8(0xA000), 0xFF);
        bus.write8(0x0000, 0x0A);
        assert_eq!(bus.read8(0xA000), 0x33);
    }

    #[test]
    fn eram_banks_are_distinct() {
        let mut bus = loaded_bus();
        bus.write8(0x0000, 0x0A);
        bus.write8(0xA000, 0x11);
        bus.write8(0x4000, 0x01); // RAM bank 1
        assert_eq!(bus.read8(0xA000), 0x00);
        bus.write8(0xA000, 0x22);
        bus.write8(0x4000, 0x00);
        assert_eq!(bus.read8(0xA000), 0x11);
    }

    #[test]
    fn absent_eram_reads_ff_even_when_enabled() {
        let mut rom = test_rom(2);
        rom[HEADER_MBC_TYPE] = 0x01; // MBC1, no RAM
        rom[HEADER_RAM_SIZE] = 0x00;
        let mut bus = MemoryBus::new();
        bus.load_rom(&rom).unwrap();
        bus.write8(0x0000, 0x0A);
        bus.write8(0xA000, 0x55);
        assert_eq!(bus.read8(0xA000), 0xFF);
    }

    #[test]
    fn wram_bank_select_wraps_zero_to_one() {
        let mut bus = loaded_bus();
        bus.write8(0xD000, 0x01); // bank 1
        bus.write8(SVBK_ADDR, 0x03);
        bus.write8(0xD000, 0x03);
        bus.write8(SVBK_ADDR, 0x00); // coerces to bank 1
        assert_eq!(bus.read8(0xD000), 0x01);
        bus.write8(SVBK_ADDR, 0x03);
        assert_eq!(bus.read8(0xD000), 0x03);
        // Bank 0 at 0xC000 is unaffected by the select.
        bus.write8(0xC000, 0x77);
        assert_eq!(bus.read8(0xC000), 0x77);
    }

    #[test]
    fn joypad_read_merges_selected_nibbles() {
        let mut bus = loaded_bus();
        bus.joypad = JoypadLines { dpad: 0x0E, buttons: 0x07 };

        bus.write8(P1_ADDR, 0x10);
        assert_eq!(bus.read8(P1_ADDR), 0xFE);
        bus.write8(P1_ADDR, 0x20);
        assert_eq!(bus.read8(P1_ADDR), 0xF7);
        bus.write8(P1_ADDR, 0x00);
        assert_eq!(bus.read8(P1_ADDR), 0xFF);
        bus.write8(P1_ADDR, 0x30);
        assert_eq!(bus.read8(P1_ADDR), 0xF6);
    }

    #[test]
    fn ie_lives_in_the_tail_slot() {
        let mut bus = loaded_bus();
        bus.write8(IE_ADDR, 0x1F);
        assert_eq!(bus.read8(IE_ADDR), 0x1F);
        // IE is not aliased by any in-range I/O byte.
        assert_eq!(bus.read8(0xFF7F), 0x00);
    }

    #[test]
    fn oam_dma_copies_a_page() {
        let mut bus = loaded_bus();
        for i in 0..OAM_SIZE as u16 {
            bus.write8(0xC000 + i, i as u8);
        }
        bus.oam_dma(0xC0);
        for i in 0..OAM_SIZE as u16 {
            assert_eq!(bus.read8(OAM_START + i), i as u8);
        }
    }

    #[test]
    fn oam_dma_refuses_high_sources() {
        let mut bus = loaded_bus();
        bus.write8(0xFE00, 0x12);
        bus.oam_dma(0xFE);
        assert_eq!(bus.read8(0xFE00), 0x12); // untouched
    }
}

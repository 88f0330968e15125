//! Retro Replay cartridge engine.
//!
//! The cartridge pairs 128 KiB of flash (8 KiB pages, one of two 64 KiB
//! physical banks selected by the bank jumper) with 32 KiB of battery
//! backed RAM in four 8 KiB banks. Two I/O windows and the ROM windows
//! expose it to the bus:
//!
//! | Window | Range        | Contents                                  |
//! |--------|--------------|-------------------------------------------|
//! | IO1    | $DE00-$DEFF  | Control registers at $DE00/$DE01; cart RAM |
//! |        |              | or ROM under the REU-compatible map        |
//! | IO2    | $DF00-$DFFF  | Cart RAM or ROM under the standard map     |
//! | ROML   | $8000-$9FFF  | Flash or RAM bank                          |
//! | ROMH   | $A000/$E000  | Flash bank                                 |
//!
//! Unclaimed window reads return `None` so the host bus can apply its
//! floating-value semantics. Map-change and clockport notifications are
//! buffered and drained by the host through [`RetroReplay::take_map_change`]
//! and [`RetroReplay::take_clockport_change`].

use std::path::PathBuf;

use amd_29f010::Am29f010;

use crate::config::RetroReplayConfig;
use crate::image::{self, CartridgeImage, ImageError, ImageFormat};
use crate::registers::{MapMode, MapRequest, RegisterState};

/// RAM overlay size: four 8 KiB banks.
const RAM_SIZE: usize = 0x8000;

/// Offset mask within one 8 KiB page.
const PAGE_MASK: usize = 0x1FFF;

/// Clockport pass-through claims the first 16 bytes of IO1.
const CLOCKPORT_END: u8 = 0x10;

/// Absolute flash offset of a bank-relative access.
///
/// `rom_offset` selects the physical 64 KiB half (0 or `0x10000`) and is
/// fixed by the bank jumper at attach time.
#[must_use]
pub fn translate(bank: u8, offset: usize, rom_offset: usize) -> usize {
    rom_offset + (usize::from(bank) << 13) + (offset & PAGE_MASK)
}

/// Peripheral sitting on the clockport connector (e.g. an RR-Net
/// ethernet adapter). Accesses to the low 16 bytes of IO1 are forwarded
/// here while the clockport is enabled.
pub trait ClockportDevice {
    /// Read a clockport register.
    fn read(&mut self, addr: u16) -> u8;

    /// Write a clockport register.
    fn write(&mut self, addr: u16, value: u8);
}

/// An attached Retro Replay cartridge.
///
/// Dropping the value detaches without saving; use
/// [`RetroReplay::detach`] to honor the save-on-detach configuration.
pub struct RetroReplay {
    /// Flash chip backing the ROM windows.
    flash: Am29f010,
    /// 32 KiB RAM overlay.
    ram: Vec<u8>,
    /// Software-visible register state.
    regs: RegisterState,
    /// Jumper and persistence configuration.
    config: RetroReplayConfig,
    /// RAM instead of flash backs the mapped windows. Mirrors the
    /// export-RAM flag of the most recent map change.
    export_ram: bool,
    /// Format the image was loaded from, for saving.
    format: ImageFormat,
    /// Raw file length, for saving.
    raw_len: usize,
    /// Origin file, for save-on-detach.
    path: Option<PathBuf>,
    /// Most recent undelivered map-change request.
    pending_map: Option<MapRequest>,
    /// An undelivered clockport enable/disable transition.
    pending_clockport: bool,
    /// Optional clockport peripheral.
    clockport: Option<Box<dyn ClockportDevice>>,
}

impl RetroReplay {
    /// Attach a cartridge from a loaded image.
    #[must_use]
    pub fn attach(image: CartridgeImage, config: RetroReplayConfig) -> Self {
        let mut flash = Am29f010::new();
        flash.load(&image.data);

        let mut cart = Self {
            flash,
            ram: vec![0; RAM_SIZE],
            regs: RegisterState::at_attach(),
            config,
            export_ram: false,
            format: image.format,
            raw_len: image.raw_len,
            path: image.path,
            pending_map: None,
            pending_clockport: false,
            clockport: None,
        };
        cart.apply_default_map();
        cart.flash.reset();
        cart
    }

    /// Attach a cartridge from a file, detecting the format.
    pub fn attach_file(
        path: impl Into<PathBuf>,
        config: RetroReplayConfig,
    ) -> Result<Self, ImageError> {
        let image = CartridgeImage::load(&path.into())?;
        Ok(Self::attach(image, config))
    }

    /// Connect a clockport peripheral.
    pub fn set_clockport_device(&mut self, device: Box<dyn ClockportDevice>) {
        self.clockport = Some(device);
    }

    /// Read from the IO1 window ($DE00-$DEFF). `None` means the access
    /// is not claimed and the bus value floats.
    pub fn io1_read(&mut self, addr: u16) -> Option<u8> {
        if !self.regs.active {
            return None;
        }
        let offset = (addr & 0xFF) as u8;
        match offset {
            0x00 | 0x01 => Some(self.regs.status(self.config.flash_jumper)),
            _ => {
                if offset < CLOCKPORT_END && self.regs.clockport_enabled {
                    if let Some(device) = self.clockport.as_mut() {
                        return Some(device.read(addr));
                    }
                }
                if !self.regs.reu_mapping {
                    return None;
                }
                if self.export_ram {
                    Some(self.ram[self.io_ram_page(0x1E00) + usize::from(offset)])
                } else {
                    // REU-compatible alias into the current flash bank.
                    Some(self.flash.read(translate(
                        self.regs.bank,
                        0x1E00 | usize::from(offset),
                        self.config.rom_offset(),
                    )))
                }
            }
        }
    }

    /// Write to the IO1 window ($DE00-$DEFF).
    pub fn io1_write(&mut self, addr: u16, value: u8) {
        if !self.regs.active {
            return;
        }
        let offset = (addr & 0xFF) as u8;
        match offset {
            0x00 => {
                let map = self.regs.write_control(value, self.config.flash_jumper);
                self.emit_map(map);
            }
            0x01 => {
                if self.regs.write_extended(
                    value,
                    self.config.flash_jumper,
                    self.config.bank_jumper,
                ) {
                    self.pending_clockport = true;
                }
            }
            _ => {
                if offset < CLOCKPORT_END && self.regs.clockport_enabled {
                    if let Some(device) = self.clockport.as_mut() {
                        device.write(addr, value);
                        return;
                    }
                }
                if self.regs.reu_mapping && self.export_ram {
                    let page = self.io_ram_page(0x1E00);
                    self.ram[page + usize::from(offset)] = value;
                }
            }
        }
    }

    /// Read from the IO2 window ($DF00-$DFFF).
    pub fn io2_read(&mut self, addr: u16) -> Option<u8> {
        if !self.regs.active || self.regs.reu_mapping {
            return None;
        }
        let offset = usize::from(addr & 0xFF);
        if self.export_ram {
            Some(self.ram[self.io_ram_page(0x1F00) + offset])
        } else {
            Some(self.flash.read(translate(
                self.regs.bank,
                0x1F00 | offset,
                self.config.rom_offset(),
            )))
        }
    }

    /// Write to the IO2 window ($DF00-$DFFF).
    pub fn io2_write(&mut self, addr: u16, value: u8) {
        if !self.regs.active || self.regs.reu_mapping {
            return;
        }
        if self.export_ram {
            let page = self.io_ram_page(0x1F00);
            self.ram[page + usize::from(addr & 0xFF)] = value;
        }
    }

    /// Read from the ROML window ($8000-$9FFF).
    #[must_use]
    pub fn roml_read(&self, addr: u16) -> u8 {
        let offset = usize::from(addr) & PAGE_MASK;
        if self.export_ram {
            self.ram[self.roml_ram_bank() + offset]
        } else {
            self.flash
                .read(translate(self.regs.bank, offset, self.config.rom_offset()))
        }
    }

    /// Write to the ROML window. Flash writes are disabled entirely
    /// without the flash jumper.
    pub fn roml_write(&mut self, addr: u16, value: u8) {
        let offset = usize::from(addr) & PAGE_MASK;
        if self.export_ram {
            let bank = self.roml_ram_bank();
            self.ram[bank + offset] = value;
        } else if self.config.flash_jumper {
            self.flash.store(
                translate(self.regs.bank, offset, self.config.rom_offset()),
                value,
            );
        }
    }

    /// Write to the ROML range while the bus signals a non-ultimax
    /// mapping. RAM writes always land; flash writes still require the
    /// jumper. Returns true when the write was serviced by RAM.
    pub fn roml_write_no_ultimax(&mut self, addr: u16, value: u8) -> bool {
        let offset = usize::from(addr) & PAGE_MASK;
        if self.export_ram {
            let bank = self.roml_ram_bank();
            self.ram[bank + offset] = value;
            true
        } else {
            if self.config.flash_jumper {
                self.flash.store(
                    translate(self.regs.bank, offset, self.config.rom_offset()),
                    value,
                );
            }
            false
        }
    }

    /// Read from the ROMH window. Always flash, never the RAM overlay.
    #[must_use]
    pub fn romh_read(&self, addr: u16) -> u8 {
        self.flash.read(translate(
            self.regs.bank,
            usize::from(addr) & PAGE_MASK,
            self.config.rom_offset(),
        ))
    }

    /// Press the freeze button. Disabled in flash mode; otherwise the
    /// cartridge reactivates and requests the freeze memory map.
    pub fn freeze(&mut self) {
        if self.config.flash_jumper {
            return;
        }
        self.regs.active = true;
        self.emit_map(MapRequest {
            game_line: 3,
            exrom_bank: 3,
            mode: MapMode {
                write: false,
                release_freeze: false,
                export_ram: true,
            },
        });
    }

    /// The freeze button is wired through unless software set NoFreeze.
    #[must_use]
    pub fn freeze_allowed(&self) -> bool {
        !self.regs.no_freeze
    }

    /// Soft reset: reactivate and restore the jumper-dependent default
    /// map. Bank, AllowBank, REU mapping, the write-once lock and the
    /// clockport flag survive; only attach clears them.
    pub fn reset(&mut self) {
        self.regs.active = true;
        self.apply_default_map();
        self.flash.reset();
    }

    /// Save the image back to its origin file in the loaded format.
    pub fn save(&self) -> Result<(), ImageError> {
        let path = self.path.as_ref().ok_or(ImageError::NoImage)?;
        image::save(path, self.format, self.raw_len, self.flash.data())
    }

    /// Detach the cartridge, saving first when configured to.
    pub fn detach(self) -> Result<(), ImageError> {
        if self.config.save_on_detach {
            self.save()?;
        }
        Ok(())
    }

    /// Drain the most recent map-change request.
    pub fn take_map_change(&mut self) -> Option<MapRequest> {
        self.pending_map.take()
    }

    /// Drain a pending clockport enable/disable transition.
    pub fn take_clockport_change(&mut self) -> bool {
        std::mem::take(&mut self.pending_clockport)
    }

    /// Cartridge responds to its windows.
    #[must_use]
    pub fn active(&self) -> bool {
        self.regs.active
    }

    /// A flash program or erase has modified the image since attach.
    #[must_use]
    pub fn image_modified(&self) -> bool {
        self.flash.dirty()
    }

    /// Format the attached image was loaded from.
    #[must_use]
    pub fn image_format(&self) -> ImageFormat {
        self.format
    }

    fn emit_map(&mut self, map: MapRequest) {
        self.export_ram = map.mode.export_ram;
        self.pending_map = Some(map);
    }

    fn apply_default_map(&mut self) {
        let lines = if self.config.flash_jumper { 2 } else { 0 };
        self.emit_map(MapRequest {
            game_line: lines,
            exrom_bank: lines,
            mode: MapMode::READ,
        });
    }

    /// RAM base for the I/O windows: AllowBank selects among the four
    /// banks, otherwise bank 0. `page` is $1E00 for IO1, $1F00 for IO2.
    fn io_ram_page(&self, page: usize) -> usize {
        let bank = if self.regs.allow_bank {
            usize::from(self.regs.bank & 3)
        } else {
            0
        };
        (bank << 13) + page
    }

    /// RAM base for the ROML window: always banked.
    fn roml_ram_bank(&self) -> usize {
        usize::from(self.regs.bank & 3) << 13
    }
}

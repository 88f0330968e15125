//! Cartridge configuration: hardware jumpers and persistence.

/// Base offset of physical flash bank 1 within the 128 KiB array.
pub const PHYS_BANK_1: usize = 0x10000;

/// Configuration for attaching a Retro Replay cartridge.
///
/// The jumpers sit on the cartridge board and cannot change while the
/// machine runs, so they are fixed at attach time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetroReplayConfig {
    /// Flash jumper: selects programming mode. Enables flash writes
    /// through the ROM window, disables the freeze button and the
    /// write-once register lock.
    pub flash_jumper: bool,
    /// Bank jumper: selects which physical 64 KiB half of the flash is
    /// the active bank. Set selects bank 0, unset bank 1.
    pub bank_jumper: bool,
    /// Write the (possibly reprogrammed) image back to its origin file
    /// when the cartridge is detached.
    pub save_on_detach: bool,
}

impl RetroReplayConfig {
    /// Base offset of the active physical flash bank.
    #[must_use]
    pub fn rom_offset(self) -> usize {
        if self.bank_jumper { 0 } else { PHYS_BANK_1 }
    }
}

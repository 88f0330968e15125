//! Control registers at $DE00/$DE01.
//!
//! Reading either register returns the same status byte:
//!
//! | Bit | Meaning                                  |
//! |-----|------------------------------------------|
//! | 0   | Flash jumper set                         |
//! | 1   | AllowBank feedback                       |
//! | 2   | Freeze button pressed (always 0 here)    |
//! | 3-4 | Bank bits 0-1 feedback                   |
//! | 5   | Bank bit 3 feedback (A16)                |
//! | 6   | REU-compatible map active                |
//! | 7   | Bank bit 2 feedback (A15)                |
//!
//! # $DE00 write
//!
//! | Bit | Meaning                                  |
//! |-----|------------------------------------------|
//! | 0   | GAME line                                |
//! | 1   | EXROM line                               |
//! | 2   | Disable cartridge entirely               |
//! | 3-4 | Bank bits 0-1                            |
//! | 5   | Map RAM instead of ROM                   |
//! | 6   | Release freeze, restore normal map       |
//! | 7   | Bank bit 2                               |
//!
//! Under the flash jumper a value whose low two bits are %11 or %01 is
//! coerced to 0 before the GAME/EXROM bits and the disable bit take
//! effect. The bank bits are latched from the original value.
//!
//! # $DE01 write (extended control)
//!
//! | Bit | Meaning                                  |
//! |-----|------------------------------------------|
//! | 0   | Enable clockport connector               |
//! | 1   | AllowBank: RAM banking in the I/O windows|
//! | 2   | NoFreeze: disable the freeze button      |
//! | 3-4 | Bank bits 0-1 (mirror of $DE00)          |
//! | 5   | Bank bit 3 / A16 (flash mode only)       |
//! | 6   | REU-compatible memory map                |
//! | 7   | Bank bit 2 (mirror of $DE00)             |
//!
//! Without the flash jumper this register takes effect once per attach
//! and then locks. With it, the register never locks, the REU bit cannot
//! be set, and — when the bank jumper is also set — bit 5 contributes an
//! inverted bank bit 3.

/// Shift folding the ROM bank into the map-change bank bits.
pub const BANK_SHIFT: u32 = 4;

/// Memory-map mode flags carried by a [`MapRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapMode {
    /// The map is being changed from a register write.
    pub write: bool,
    /// Restore the pre-freeze memory map.
    pub release_freeze: bool,
    /// Back the mapped windows with cartridge RAM instead of flash.
    pub export_ram: bool,
}

impl MapMode {
    /// Plain read-only map change (attach, reset).
    pub const READ: Self = Self {
        write: false,
        release_freeze: false,
        export_ram: false,
    };
}

/// Memory-map reconfiguration request for the external memory controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    /// Control-line state driven during the VIC phase.
    pub game_line: u8,
    /// GAME/EXROM pair in the low two bits, ROM bank from
    /// [`BANK_SHIFT`] upward.
    pub exrom_bank: u8,
    /// Mode flags.
    pub mode: MapMode,
}

/// Bank number encoded in a control-register value: bits 3-4 give bank
/// bits 0-1, bit 7 gives bank bit 2.
#[must_use]
pub fn control_bank(value: u8) -> u8 {
    ((value >> 3) & 3) | ((value >> 5) & 4)
}

/// Bank number encoded in an extended-control value written in flash
/// mode. With the bank jumper set, bit 5 contributes an inverted bank
/// bit 3 (A16), reaching into the other physical 64 KiB half.
#[must_use]
pub fn extended_bank(value: u8, bank_jumper: bool) -> u8 {
    let bank = control_bank(value);
    if bank_jumper {
        bank | (((value >> 2) & 8) ^ 8)
    } else {
        bank
    }
}

/// Software-visible register state of the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterState {
    /// Cartridge responds to its windows.
    pub active: bool,
    /// Current ROM/RAM bank.
    pub bank: u8,
    /// RAM banking allowed in the I/O windows.
    pub allow_bank: bool,
    /// Freeze button disabled by software.
    pub no_freeze: bool,
    /// REU-compatible address aliasing active.
    pub reu_mapping: bool,
    /// Clockport connector enabled.
    pub clockport_enabled: bool,
    /// Extended control register has been written (non-flash mode).
    pub write_once_locked: bool,
}

impl RegisterState {
    /// Power-on state: only attach (not reset) produces this.
    #[must_use]
    pub fn at_attach() -> Self {
        Self {
            active: true,
            bank: 0,
            allow_bank: false,
            no_freeze: false,
            reu_mapping: false,
            clockport_enabled: false,
            write_once_locked: false,
        }
    }

    /// Status byte returned for reads of either register.
    #[must_use]
    pub fn status(&self, flash_jumper: bool) -> u8 {
        ((self.bank & 3) << 3)
            | ((self.bank & 4) << 5)
            | ((self.bank & 8) << 2)
            | (u8::from(self.allow_bank) << 1)
            | (u8::from(self.reu_mapping) << 6)
            | u8::from(flash_jumper)
    }

    /// Apply a $DE00 write. Returns the map change to pass on to the
    /// external memory controller. May deactivate the cartridge (bit 2).
    pub fn write_control(&mut self, value: u8, flash_jumper: bool) -> MapRequest {
        self.bank = control_bank(value);
        let mode = MapMode {
            write: true,
            release_freeze: value & 0x40 != 0,
            export_ram: value & 0x20 != 0,
        };

        // Hardware quirk: with the flash jumper set, %11 and %01 in the
        // low bits read back as if 0 had been written.
        let value = if flash_jumper && matches!(value & 3, 1 | 3) {
            0
        } else {
            value
        };

        if value & 0x04 != 0 {
            self.active = false;
        }

        MapRequest {
            game_line: 0,
            exrom_bank: (value & 3) | (self.bank << BANK_SHIFT),
            mode,
        }
    }

    /// Apply a $DE01 write. Returns true when `clockport_enabled`
    /// changed (the transition must be propagated to the clockport
    /// peripheral).
    pub fn write_extended(&mut self, value: u8, flash_jumper: bool, bank_jumper: bool) -> bool {
        if flash_jumper {
            self.bank = extended_bank(value, bank_jumper);
            self.allow_bank = value & 0x02 != 0;
            self.no_freeze = value & 0x04 != 0;
            // REU mapping cannot be set in flash mode
            self.reu_mapping = false;
            false
        } else if self.write_once_locked {
            false
        } else {
            self.bank = control_bank(value);
            self.allow_bank = value & 0x02 != 0;
            self.no_freeze = value & 0x04 != 0;
            self.reu_mapping = value & 0x40 != 0;
            let clockport = value & 0x01 != 0;
            let changed = clockport != self.clockport_enabled;
            self.clockport_enabled = clockport;
            self.write_once_locked = true;
            changed
        }
    }
}

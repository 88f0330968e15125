//! Retro Replay cartridge emulation.
//!
//! The Retro Replay is a bank-switched flash cartridge for the C64:
//! 128 KiB of Am29F010 flash (two 64 KiB physical banks, eight 8 KiB
//! pages each), 32 KiB of battery backed RAM, a freeze button, and a
//! clockport connector for add-on peripherals. Control registers at
//! $DE00/$DE01 select the bank, switch the mapped windows between flash
//! and RAM, and drive the GAME/EXROM lines.
//!
//! The engine services bus accesses on the IO1/IO2 and ROML/ROMH
//! windows, drives the flash program/erase state machine, and loads and
//! saves cartridge images as raw dumps or CRT containers.

mod cartridge;
pub mod config;
pub mod image;
pub mod registers;

pub use cartridge::{translate, ClockportDevice, RetroReplay};
pub use config::RetroReplayConfig;
pub use image::{CartridgeImage, ImageError, ImageFormat};
pub use registers::{MapMode, MapRequest, RegisterState};

//! Cartridge image load and save.
//!
//! Two on-disk formats are supported and remembered for saving:
//!
//! - Raw binary dumps of 32 KiB, 64 KiB or 128 KiB. The file convention
//!   puts the default image first: file offset 0 maps to physical flash
//!   bank 1 (`0x10000`), and the second half of a 128 KiB dump maps to
//!   physical bank 0.
//! - CRT containers: the 64-byte preamble followed by exactly eight
//!   8 KiB CHIP packets, each placed by the bank byte in its header. The
//!   64 KiB image lands in physical bank 1 and is duplicated into bank 0.
//!
//! Loads parse fully in memory before committing; saves assemble the
//! whole file in memory and write it in one call, so a failure never
//! leaves the in-memory image half-updated.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use amd_29f010::FLASH_SIZE;
use format_crt::{Chip, CrtError, CrtHeader, CHIP_TYPE_FLASH};

use crate::config::PHYS_BANK_1;

/// 8 KiB bank, the placement unit of CHIP packets.
const BANK_SIZE: usize = 0x2000;

/// Hardware type assigned to Retro Replay in the CRT type registry.
pub const CRT_HARDWARE_TYPE: u16 = 36;

/// Cartridge name written into saved containers.
const CRT_NAME: &str = "Retro Replay";

/// On-disk format an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Headerless dump (32 KiB, 64 KiB or 128 KiB).
    Raw,
    /// CRT container.
    Container,
}

/// Image load/save error.
#[derive(Debug)]
pub enum ImageError {
    /// Raw image length is not one of the three accepted sizes, or a
    /// container chunk does not carry exactly 8 KiB.
    SizeInvalid(usize),
    /// Container chunk addressed to a bank outside 0-7.
    ChunkBankOutOfRange(u8),
    /// Container is not for this cartridge type.
    WrongHardwareType(u16),
    /// Malformed or truncated container.
    Container(CrtError),
    /// File I/O failure.
    Io(io::Error),
    /// Save requested but no origin file is known.
    NoImage,
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeInvalid(len) => write!(
                f,
                "invalid image size: {len} bytes (expected 32, 64 or 128 KiB)",
            ),
            Self::ChunkBankOutOfRange(bank) => {
                write!(f, "container chunk addresses bank {bank} (valid: 0-7)")
            }
            Self::WrongHardwareType(ty) => write!(
                f,
                "container hardware type {ty} (expected {CRT_HARDWARE_TYPE})",
            ),
            Self::Container(err) => write!(f, "container: {err}"),
            Self::Io(err) => write!(f, "image i/o: {err}"),
            Self::NoImage => write!(f, "no image file to save to"),
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Container(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CrtError> for ImageError {
    fn from(err: CrtError) -> Self {
        Self::Container(err)
    }
}

impl From<io::Error> for ImageError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A loaded cartridge image in physical flash layout, plus the identity
/// needed to save it back.
pub struct CartridgeImage {
    /// 128 KiB array in physical layout.
    pub(crate) data: Vec<u8>,
    pub(crate) format: ImageFormat,
    /// Length of the raw file this image came from (containers count as
    /// their 64 KiB payload).
    pub(crate) raw_len: usize,
    pub(crate) path: Option<PathBuf>,
}

impl CartridgeImage {
    /// Load a raw dump. Accepts exactly 32, 64 or 128 KiB.
    pub fn from_raw(bytes: &[u8]) -> Result<Self, ImageError> {
        match bytes.len() {
            0x8000 | 0x10000 | 0x20000 => {}
            other => return Err(ImageError::SizeInvalid(other)),
        }

        // File offset 0 is physical bank 1; a 128 KiB dump carries
        // physical bank 0 in its second half.
        let mut data = vec![0u8; FLASH_SIZE];
        let low = bytes.len().min(PHYS_BANK_1);
        data[PHYS_BANK_1..PHYS_BANK_1 + low].copy_from_slice(&bytes[..low]);
        if bytes.len() > PHYS_BANK_1 {
            data[..bytes.len() - PHYS_BANK_1].copy_from_slice(&bytes[PHYS_BANK_1..]);
        }

        Ok(Self {
            data,
            format: ImageFormat::Raw,
            raw_len: bytes.len(),
            path: None,
        })
    }

    /// Load a CRT container: preamble plus exactly eight 8 KiB chunks.
    pub fn from_container(bytes: &[u8]) -> Result<Self, ImageError> {
        let (header, mut offset) = CrtHeader::parse(bytes)?;
        if header.hardware_type != CRT_HARDWARE_TYPE {
            return Err(ImageError::WrongHardwareType(header.hardware_type));
        }

        let mut staging = vec![0u8; PHYS_BANK_1];
        for _ in 0..8 {
            let (chip, next) = Chip::parse(bytes, offset)?;
            // Placement uses the bank byte at header offset $0B.
            let bank = (chip.bank & 0xFF) as u8;
            if bank > 7 {
                return Err(ImageError::ChunkBankOutOfRange(bank));
            }
            if chip.data.len() != BANK_SIZE {
                return Err(ImageError::SizeInvalid(chip.data.len()));
            }
            let start = usize::from(bank) << 13;
            staging[start..start + BANK_SIZE].copy_from_slice(&chip.data);
            offset = next;
        }

        // Physical bank 1 holds the image; bank 0 is a duplicate so the
        // cartridge works under either bank jumper setting.
        let mut data = staging.clone();
        data.extend_from_slice(&staging);

        Ok(Self {
            data,
            format: ImageFormat::Container,
            raw_len: PHYS_BANK_1,
            path: None,
        })
    }

    /// Load from bytes, detecting the format by the container signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() >= 16 && &bytes[..16] == format_crt::CRT_SIGNATURE {
            Self::from_container(bytes)
        } else {
            Self::from_raw(bytes)
        }
    }

    /// Load from a file, remembering the path for save-on-detach.
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        let bytes = fs::read(path)?;
        let mut image = Self::from_bytes(&bytes)?;
        image.path = Some(path.to_path_buf());
        Ok(image)
    }

    /// The image in physical flash layout.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Format the image was loaded from.
    #[must_use]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Length of the originating raw file.
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Origin file, if loaded from disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Extract a raw dump of `raw_len` bytes from a physical flash array,
/// inverting the load placement so a load/save cycle is byte-exact.
#[must_use]
pub fn export_raw(flash: &[u8], raw_len: usize) -> Vec<u8> {
    if raw_len == FLASH_SIZE {
        let mut out = Vec::with_capacity(FLASH_SIZE);
        out.extend_from_slice(&flash[PHYS_BANK_1..]);
        out.extend_from_slice(&flash[..PHYS_BANK_1]);
        out
    } else {
        flash[PHYS_BANK_1..PHYS_BANK_1 + raw_len].to_vec()
    }
}

/// Build a CRT container from physical bank 1 of a flash array: the
/// preamble plus eight flash chunks tagged with ascending bank indices.
#[must_use]
pub fn export_container(flash: &[u8]) -> Vec<u8> {
    let header = CrtHeader {
        version: 0x0100,
        hardware_type: CRT_HARDWARE_TYPE,
        exrom: 1,
        game: 0,
        name: CRT_NAME.to_string(),
    };

    let mut out = Vec::with_capacity(format_crt::HEADER_LEN + 8 * (format_crt::CHIP_HEADER_LEN + BANK_SIZE));
    out.extend_from_slice(&header.to_bytes());
    for bank in 0..8u16 {
        let start = PHYS_BANK_1 + usize::from(bank) * BANK_SIZE;
        let chip = Chip {
            chip_type: CHIP_TYPE_FLASH,
            bank,
            load_address: 0x8000,
            data: flash[start..start + BANK_SIZE].to_vec(),
        };
        out.extend_from_slice(&chip.to_bytes());
    }
    out
}

/// Save a flash array back to `path` in the format it was loaded from.
pub fn save(
    path: &Path,
    format: ImageFormat,
    raw_len: usize,
    flash: &[u8],
) -> Result<(), ImageError> {
    let bytes = match format {
        ImageFormat::Raw => export_raw(flash, raw_len),
        ImageFormat::Container => export_container(flash),
    };
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Raw image whose byte at each offset encodes that offset.
    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i >> 8) as u8 ^ i as u8).collect()
    }

    fn container_with_banks(order: &[u8]) -> Vec<u8> {
        let header = CrtHeader {
            version: 0x0100,
            hardware_type: CRT_HARDWARE_TYPE,
            exrom: 1,
            game: 0,
            name: "Test".to_string(),
        };
        let mut out = Vec::new();
        out.extend_from_slice(&header.to_bytes());
        for &bank in order {
            let chip = Chip {
                chip_type: CHIP_TYPE_FLASH,
                bank: u16::from(bank),
                load_address: 0x8000,
                data: vec![bank.wrapping_mul(0x11); BANK_SIZE],
            };
            out.extend_from_slice(&chip.to_bytes());
        }
        out
    }

    #[test]
    fn raw_rejects_odd_sizes() {
        for len in [0usize, 0x4000, 0x8001, 0x30000] {
            assert!(matches!(
                CartridgeImage::from_raw(&vec![0; len]),
                Err(ImageError::SizeInvalid(l)) if l == len
            ));
        }
    }

    #[test]
    fn raw_64k_lands_in_physical_bank_1() {
        let file = patterned(0x10000);
        let image = CartridgeImage::from_raw(&file).expect("valid size");
        assert_eq!(&image.data()[PHYS_BANK_1..], &file[..]);
        assert!(image.data()[..PHYS_BANK_1].iter().all(|&b| b == 0));
        assert_eq!(image.raw_len(), 0x10000);
        assert_eq!(image.format(), ImageFormat::Raw);
    }

    #[test]
    fn raw_128k_splits_across_banks() {
        let file = patterned(0x20000);
        let image = CartridgeImage::from_raw(&file).expect("valid size");
        assert_eq!(&image.data()[PHYS_BANK_1..], &file[..PHYS_BANK_1]);
        assert_eq!(&image.data()[..PHYS_BANK_1], &file[PHYS_BANK_1..]);
    }

    #[test]
    fn raw_round_trips_all_sizes() {
        for len in [0x8000usize, 0x10000, 0x20000] {
            let file = patterned(len);
            let image = CartridgeImage::from_raw(&file).expect("valid size");
            assert_eq!(export_raw(image.data(), len), file, "{len:#x}");
        }
    }

    #[test]
    fn container_places_chunks_by_bank_byte() {
        let file = container_with_banks(&[3, 0, 7, 1, 2, 6, 4, 5]);
        let image = CartridgeImage::from_container(&file).expect("well-formed");
        for bank in 0..8usize {
            let start = PHYS_BANK_1 + (bank << 13);
            assert!(
                image.data()[start..start + BANK_SIZE]
                    .iter()
                    .all(|&b| b == (bank as u8).wrapping_mul(0x11)),
                "bank {bank}"
            );
        }
        assert_eq!(image.raw_len(), 0x10000);
    }

    #[test]
    fn container_duplicates_into_physical_bank_0() {
        let file = container_with_banks(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let image = CartridgeImage::from_container(&file).expect("well-formed");
        assert_eq!(image.data()[..PHYS_BANK_1], image.data()[PHYS_BANK_1..]);
    }

    #[test]
    fn container_rejects_bank_8() {
        let file = container_with_banks(&[0, 1, 2, 3, 4, 5, 6, 8]);
        assert!(matches!(
            CartridgeImage::from_container(&file),
            Err(ImageError::ChunkBankOutOfRange(8))
        ));
    }

    #[test]
    fn container_rejects_missing_chunk() {
        let file = container_with_banks(&[0, 1, 2, 3, 4, 5, 6]);
        assert!(matches!(
            CartridgeImage::from_container(&file),
            Err(ImageError::Container(CrtError::Truncated))
        ));
    }

    #[test]
    fn container_rejects_foreign_hardware_type() {
        let mut file = container_with_banks(&[0, 1, 2, 3, 4, 5, 6, 7]);
        file[0x16..0x18].copy_from_slice(&32u16.to_be_bytes());
        assert!(matches!(
            CartridgeImage::from_container(&file),
            Err(ImageError::WrongHardwareType(32))
        ));
    }

    #[test]
    fn container_round_trips_with_ascending_banks() {
        let file = container_with_banks(&[5, 2, 7, 0, 3, 6, 1, 4]);
        let image = CartridgeImage::from_container(&file).expect("well-formed");
        let saved = export_container(image.data());

        let (header, mut offset) = CrtHeader::parse(&saved).expect("header");
        assert_eq!(header.hardware_type, CRT_HARDWARE_TYPE);
        assert_eq!(header.exrom, 1);
        assert_eq!(header.game, 0);
        assert_eq!(header.name, CRT_NAME);

        for bank in 0..8u16 {
            let (chip, next) = Chip::parse(&saved, offset).expect("chunk");
            assert_eq!(chip.bank, bank, "banks saved in ascending order");
            assert_eq!(chip.chip_type, CHIP_TYPE_FLASH);
            assert_eq!(chip.load_address, 0x8000);
            assert!(chip.data.iter().all(|&b| b == (bank as u8).wrapping_mul(0x11)));
            offset = next;
        }
        assert_eq!(offset, saved.len());
    }

    #[test]
    fn from_bytes_detects_format() {
        let raw = CartridgeImage::from_bytes(&patterned(0x8000)).expect("raw");
        assert_eq!(raw.format(), ImageFormat::Raw);
        let crt = CartridgeImage::from_bytes(&container_with_banks(&[0, 1, 2, 3, 4, 5, 6, 7]))
            .expect("container");
        assert_eq!(crt.format(), ImageFormat::Container);
    }
}

//! C64 CRT cartridge container format.
//!
//! A CRT file wraps cartridge ROM images with a header describing the
//! hardware type and EXROM/GAME line configuration, followed by CHIP
//! packets carrying the ROM data. All multi-byte fields are big-endian.
//!
//! # File header (64 bytes)
//!
//! | Offset | Size | Field                               |
//! |--------|------|-------------------------------------|
//! | $00    | 16   | Signature `C64 CARTRIDGE   `        |
//! | $10    | 4    | Header length (usually $40)         |
//! | $14    | 2    | Version (hi.lo)                     |
//! | $16    | 2    | Hardware type                       |
//! | $18    | 1    | EXROM line                          |
//! | $19    | 1    | GAME line                           |
//! | $1A    | 6    | Reserved                            |
//! | $20    | 32   | Name, NUL-padded                    |
//!
//! # CHIP packet (16-byte header + data)
//!
//! | Offset | Size | Field                               |
//! |--------|------|-------------------------------------|
//! | $00    | 4    | Signature `CHIP`                    |
//! | $04    | 4    | Total packet length ($10 + data)    |
//! | $08    | 2    | Chip type (0=ROM, 1=RAM, 2=Flash)   |
//! | $0A    | 2    | Bank number                         |
//! | $0C    | 2    | Load address                        |
//! | $0E    | 2    | Data size                           |

use std::fmt;

/// CRT file signature.
pub const CRT_SIGNATURE: &[u8; 16] = b"C64 CARTRIDGE   ";

/// CHIP packet signature.
pub const CHIP_SIGNATURE: &[u8; 4] = b"CHIP";

/// Standard file header length.
pub const HEADER_LEN: usize = 0x40;

/// CHIP packet header length (excluding data).
pub const CHIP_HEADER_LEN: usize = 0x10;

/// CHIP packet carries ROM data.
pub const CHIP_TYPE_ROM: u16 = 0;

/// CHIP packet describes a RAM region (no data stored).
pub const CHIP_TYPE_RAM: u16 = 1;

/// CHIP packet carries flash ROM data.
pub const CHIP_TYPE_FLASH: u16 = 2;

/// CRT container error.
#[derive(Debug)]
pub enum CrtError {
    /// File shorter than a complete header.
    TooShort,
    /// File header signature mismatch.
    BadSignature,
    /// Header length field is smaller than the fixed fields or runs past
    /// the end of the file.
    BadHeaderLength(usize),
    /// CHIP signature mismatch at the given file offset.
    BadChipSignature(usize),
    /// CHIP packet length field inconsistent with its data size or the
    /// file size, at the given file offset.
    BadChipLength(usize),
    /// CHIP packet data extends past the end of the file.
    Truncated,
}

impl fmt::Display for CrtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "file too short for CRT header"),
            Self::BadSignature => write!(f, "invalid CRT signature"),
            Self::BadHeaderLength(len) => write!(f, "invalid CRT header length: {len}"),
            Self::BadChipSignature(offset) => {
                write!(f, "expected CHIP signature at offset {offset}")
            }
            Self::BadChipLength(offset) => {
                write!(f, "invalid CHIP packet length at offset {offset}")
            }
            Self::Truncated => write!(f, "CHIP data extends past end of file"),
        }
    }
}

impl std::error::Error for CrtError {}

/// Parsed CRT file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrtHeader {
    /// Format version (hi byte major, lo byte minor).
    pub version: u16,
    /// Cartridge hardware type.
    pub hardware_type: u16,
    /// EXROM line state from the header.
    pub exrom: u8,
    /// GAME line state from the header.
    pub game: u8,
    /// Cartridge name (NUL padding stripped).
    pub name: String,
}

impl CrtHeader {
    /// Parse the file header. Returns the header and the offset of the
    /// first CHIP packet (the header length field, which may exceed $40).
    pub fn parse(data: &[u8]) -> Result<(Self, usize), CrtError> {
        if data.len() < HEADER_LEN {
            return Err(CrtError::TooShort);
        }
        if &data[0..16] != CRT_SIGNATURE {
            return Err(CrtError::BadSignature);
        }
        let header_len = read_be_u32(data, 0x10) as usize;
        if header_len < HEADER_LEN || header_len > data.len() {
            return Err(CrtError::BadHeaderLength(header_len));
        }

        let name_bytes = &data[0x20..0x40];
        let end = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..end])
            .trim()
            .to_string();

        Ok((
            Self {
                version: read_be_u16(data, 0x14),
                hardware_type: read_be_u16(data, 0x16),
                exrom: data[0x18],
                game: data[0x19],
                name,
            },
            header_len,
        ))
    }

    /// Emit the 64-byte file header. Names longer than 32 bytes are
    /// truncated.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..16].copy_from_slice(CRT_SIGNATURE);
        header[0x10..0x14].copy_from_slice(&(HEADER_LEN as u32).to_be_bytes());
        header[0x14..0x16].copy_from_slice(&self.version.to_be_bytes());
        header[0x16..0x18].copy_from_slice(&self.hardware_type.to_be_bytes());
        header[0x18] = self.exrom;
        header[0x19] = self.game;
        let name = self.name.as_bytes();
        let len = name.len().min(32);
        header[0x20..0x20 + len].copy_from_slice(&name[..len]);
        header
    }
}

/// A CHIP packet (ROM bank) within a CRT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    /// Chip type (0 = ROM, 1 = RAM, 2 = Flash).
    pub chip_type: u16,
    /// Bank number.
    pub bank: u16,
    /// Load address ($8000 for ROML, $A000 or $E000 for ROMH).
    pub load_address: u16,
    /// ROM data.
    pub data: Vec<u8>,
}

impl Chip {
    /// Parse one CHIP packet at `offset`. Returns the packet and the
    /// offset of the next one.
    pub fn parse(data: &[u8], offset: usize) -> Result<(Self, usize), CrtError> {
        if offset + CHIP_HEADER_LEN > data.len() {
            return Err(CrtError::Truncated);
        }
        if &data[offset..offset + 4] != CHIP_SIGNATURE {
            return Err(CrtError::BadChipSignature(offset));
        }
        let packet_len = read_be_u32(data, offset + 0x04) as usize;
        let size = read_be_u16(data, offset + 0x0E) as usize;
        if packet_len < CHIP_HEADER_LEN + size {
            return Err(CrtError::BadChipLength(offset));
        }
        let data_start = offset + CHIP_HEADER_LEN;
        let data_end = data_start + size;
        if data_end > data.len() || offset + packet_len > data.len() {
            return Err(CrtError::Truncated);
        }

        Ok((
            Self {
                chip_type: read_be_u16(data, offset + 0x08),
                bank: read_be_u16(data, offset + 0x0A),
                load_address: read_be_u16(data, offset + 0x0C),
                data: data[data_start..data_end].to_vec(),
            },
            offset + packet_len,
        ))
    }

    /// Emit the packet: 16-byte header followed by the data.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(CHIP_HEADER_LEN + self.data.len());
        packet.extend_from_slice(CHIP_SIGNATURE);
        packet.extend_from_slice(&((CHIP_HEADER_LEN + self.data.len()) as u32).to_be_bytes());
        packet.extend_from_slice(&self.chip_type.to_be_bytes());
        packet.extend_from_slice(&self.bank.to_be_bytes());
        packet.extend_from_slice(&self.load_address.to_be_bytes());
        packet.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        packet.extend_from_slice(&self.data);
        packet
    }
}

/// Read a big-endian u16 from a byte slice.
fn read_be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

/// Read a big-endian u32 from a byte slice.
fn read_be_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> CrtHeader {
        CrtHeader {
            version: 0x0100,
            hardware_type: 36,
            exrom: 1,
            game: 0,
            name: "Test Cart".to_string(),
        }
    }

    #[test]
    fn header_round_trip() {
        let bytes = sample_header().to_bytes();
        let (parsed, first_chip) = CrtHeader::parse(&bytes).expect("should parse");
        assert_eq!(parsed, sample_header());
        assert_eq!(first_chip, HEADER_LEN);
    }

    #[test]
    fn header_rejects_bad_signature() {
        let mut bytes = sample_header().to_bytes();
        bytes[0..16].copy_from_slice(b"NOT A CARTRIDGE!");
        assert!(matches!(
            CrtHeader::parse(&bytes),
            Err(CrtError::BadSignature)
        ));
    }

    #[test]
    fn header_rejects_short_file() {
        assert!(matches!(CrtHeader::parse(&[0; 10]), Err(CrtError::TooShort)));
    }

    #[test]
    fn header_rejects_bad_length_field() {
        let mut bytes = sample_header().to_bytes();
        bytes[0x10..0x14].copy_from_slice(&0x10u32.to_be_bytes());
        assert!(matches!(
            CrtHeader::parse(&bytes),
            Err(CrtError::BadHeaderLength(0x10))
        ));
    }

    #[test]
    fn header_name_is_nul_stripped() {
        let mut header = sample_header();
        header.name = "X".to_string();
        let (parsed, _) = CrtHeader::parse(&header.to_bytes()).expect("should parse");
        assert_eq!(parsed.name, "X");
    }

    #[test]
    fn chip_round_trip() {
        let chip = Chip {
            chip_type: CHIP_TYPE_FLASH,
            bank: 5,
            load_address: 0x8000,
            data: vec![0xA5; 0x2000],
        };
        let bytes = chip.to_bytes();
        assert_eq!(bytes.len(), CHIP_HEADER_LEN + 0x2000);
        let (parsed, next) = Chip::parse(&bytes, 0).expect("should parse");
        assert_eq!(parsed, chip);
        assert_eq!(next, bytes.len());
    }

    #[test]
    fn chip_bank_low_byte_is_at_offset_0xb() {
        let chip = Chip {
            chip_type: CHIP_TYPE_ROM,
            bank: 7,
            load_address: 0x8000,
            data: vec![0; 16],
        };
        let bytes = chip.to_bytes();
        assert_eq!(bytes[0x0A], 0);
        assert_eq!(bytes[0x0B], 7);
    }

    #[test]
    fn chip_rejects_bad_signature() {
        let mut bytes = Chip {
            chip_type: CHIP_TYPE_ROM,
            bank: 0,
            load_address: 0x8000,
            data: vec![0; 16],
        }
        .to_bytes();
        bytes[0..4].copy_from_slice(b"CHIX");
        assert!(matches!(
            Chip::parse(&bytes, 0),
            Err(CrtError::BadChipSignature(0))
        ));
    }

    #[test]
    fn chip_rejects_truncated_data() {
        let bytes = Chip {
            chip_type: CHIP_TYPE_ROM,
            bank: 0,
            load_address: 0x8000,
            data: vec![0; 0x2000],
        }
        .to_bytes();
        assert!(matches!(
            Chip::parse(&bytes[..0x100], 0),
            Err(CrtError::Truncated)
        ));
    }

    #[test]
    fn chip_rejects_inconsistent_length() {
        let mut bytes = Chip {
            chip_type: CHIP_TYPE_ROM,
            bank: 0,
            load_address: 0x8000,
            data: vec![0; 16],
        }
        .to_bytes();
        // Claim a packet shorter than header + data size.
        bytes[0x04..0x08].copy_from_slice(&0x08u32.to_be_bytes());
        assert!(matches!(
            Chip::parse(&bytes, 0),
            Err(CrtError::BadChipLength(0))
        ));
    }

    #[test]
    fn consecutive_chips_parse_in_sequence() {
        let mut file = Vec::new();
        for bank in 0..3u16 {
            file.extend(
                Chip {
                    chip_type: CHIP_TYPE_ROM,
                    bank,
                    load_address: 0x8000,
                    data: vec![bank as u8; 32],
                }
                .to_bytes(),
            );
        }
        let mut offset = 0;
        for bank in 0..3u16 {
            let (chip, next) = Chip::parse(&file, offset).expect("should parse");
            assert_eq!(chip.bank, bank);
            assert_eq!(chip.data[0], bank as u8);
            offset = next;
        }
        assert_eq!(offset, file.len());
    }
}

//! The fixed 12-byte container header.
//!
//! ```text
//! offset  size  field
//!      0     7  magic "BLENDER"
//!      7     1  pointer width marker   '-' = 8 bytes, anything else = 4 ('_' on write)
//!      8     1  endianness marker      'V' = big, anything else = little ('v' on write)
//!      9     3  version, ASCII decimal digits, zero padded
//! ```

use serde::{Deserialize, Serialize};

use crate::endian::{EndianSwitch, Endianness};
use crate::error::{Result, SplitError};

pub const MAGIC: &[u8; 7] = b"BLENDER";
pub const HEADER_SIZE: usize = 12;
pub const MAX_VERSION: u16 = 999;

const MARKER_PTR8: u8 = b'-';
const MARKER_PTR4: u8 = b'_';
const MARKER_BIG: u8 = b'V';
const MARKER_LITTLE: u8 = b'v';

/// Byte width of the address token in every record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PointerWidth {
    Four,
    Eight,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Four  => 4,
            PointerWidth::Eight => 8,
        }
    }
}

impl TryFrom<u8> for PointerWidth {
    type Error = String;
    fn try_from(v: u8) -> std::result::Result<Self, String> {
        match v {
            4 => Ok(PointerWidth::Four),
            8 => Ok(PointerWidth::Eight),
            n => Err(format!("pointer size must be 4 or 8, got {n}")),
        }
    }
}

impl From<PointerWidth> for u8 {
    fn from(w: PointerWidth) -> u8 {
        w.bytes() as u8
    }
}

/// Parsed container header.  Governs the interpretation of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHeader {
    pub version:      u16,
    pub endianness:   Endianness,
    #[serde(rename = "pointer_size")]
    pub pointer_width: PointerWidth,
}

impl ContainerHeader {
    /// Parse the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(SplitError::HeaderParse(format!(
                "need {HEADER_SIZE} bytes, got {}", bytes.len()
            )));
        }
        if &bytes[..7] != MAGIC {
            return Err(SplitError::HeaderParse("magic tag mismatch".into()));
        }

        let pointer_width = if bytes[7] == MARKER_PTR8 { PointerWidth::Eight } else { PointerWidth::Four };
        let endianness    = if bytes[8] == MARKER_BIG { Endianness::Big } else { Endianness::Little };

        let digits = &bytes[9..HEADER_SIZE];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(SplitError::HeaderParse(format!(
                "version is not three decimal digits: {:?}",
                String::from_utf8_lossy(digits)
            )));
        }
        let version = digits.iter().fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));

        Ok(Self { version, endianness, pointer_width })
    }

    /// Serialise to the exact 12-byte wire form.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        if self.version > MAX_VERSION {
            return Err(SplitError::ManifestFormat(format!(
                "version {} does not fit in three digits", self.version
            )));
        }
        let mut out = [0u8; HEADER_SIZE];
        out[..7].copy_from_slice(MAGIC);
        out[7] = match self.pointer_width {
            PointerWidth::Eight => MARKER_PTR8,
            PointerWidth::Four  => MARKER_PTR4,
        };
        out[8] = match self.endianness {
            Endianness::Big    => MARKER_BIG,
            Endianness::Little => MARKER_LITTLE,
        };
        out[9..].copy_from_slice(format!("{:03}", self.version).as_bytes());
        Ok(out)
    }

    /// Switch used to bring multi-byte record fields into host order.
    pub fn endian_switch(&self) -> EndianSwitch {
        EndianSwitch::new(self.endianness)
    }
}

//! Record ("block") headers.
//!
//! Two on-disk layouts share one logical shape and differ only in the width
//! of the address token:
//!
//! ```text
//! 4-byte pointers (20 B)          8-byte pointers (24 B)
//!   0  code    [u8; 4]              0  code    [u8; 4]
//!   4  length  i32                  4  length  i32
//!   8  old     u32                  8  old     u64
//!  12  sdna    i32                 16  sdna    i32
//!  16  count   i32                 20  count   i32
//! ```
//!
//! Fields are stored in the byte order of the machine that wrote the file.
//! They are read in host order and then corrected through [`EndianSwitch`];
//! the address token is opaque and never corrected.

use byteorder::{NativeEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Read};

use crate::endian::EndianSwitch;
use crate::error::{Result, SplitError};
use crate::header::{ContainerHeader, PointerWidth};

/// Four-byte record tag.  Not required to be printable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockCode(pub [u8; 4]);

impl BlockCode {
    /// Terminal sentinel; ends the record sequence.
    pub const END: BlockCode = BlockCode(*b"ENDB");
    /// Schema table record.
    pub const DNA: BlockCode = BlockCode(*b"DNA1");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_end(&self) -> bool {
        *self == Self::END
    }
}

impl fmt::Display for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// Normalised record header, independent of pointer width and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub code:         BlockCode,
    pub length:       u32,
    pub old_address:  u64,
    pub schema_index: i32,
    pub count:        i32,
}

/// Selects the on-disk header variant and the byte-order correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub width: PointerWidth,
    pub swap:  EndianSwitch,
}

impl BlockLayout {
    pub fn new(width: PointerWidth, swap: EndianSwitch) -> Self {
        Self { width, swap }
    }

    pub fn for_header(header: &ContainerHeader) -> Self {
        Self::new(header.pointer_width, header.endian_switch())
    }

    /// Size of one encoded record header.
    pub fn header_size(&self) -> usize {
        16 + self.width.bytes()
    }
}

impl RecordHeader {
    /// Read one header from `reader` and normalise it.
    pub fn read<R: Read>(mut reader: R, layout: BlockLayout) -> io::Result<Self> {
        let mut raw = [0u8; 4];
        reader.read_exact(&mut raw)?;
        let mut length = reader.read_i32::<NativeEndian>()? as u32;
        let old_address = match layout.width {
            PointerWidth::Four  => u64::from(reader.read_u32::<NativeEndian>()?),
            PointerWidth::Eight => reader.read_u64::<NativeEndian>()?,
        };
        let mut schema_index = reader.read_i32::<NativeEndian>()?;
        let mut count        = reader.read_i32::<NativeEndian>()?;

        let mut code = u32::from_ne_bytes(raw);
        if layout.swap.is_active() {
            // Legacy two-character codes written on the other byte order.
            if code & 0xFFFF == 0 {
                code >>= 16;
            }
            if BlockCode(code.to_ne_bytes()) != BlockCode::END {
                layout.swap.apply(&mut length);
                layout.swap.apply(&mut schema_index);
                layout.swap.apply(&mut count);
            }
        }

        Ok(Self {
            code: BlockCode(code.to_ne_bytes()),
            length,
            old_address,
            schema_index,
            count,
        })
    }

    /// Decode the header at `offset` within `data`.
    pub fn decode(data: &[u8], offset: usize, layout: BlockLayout) -> Result<Self> {
        let needed    = layout.header_size();
        let available = data.len().saturating_sub(offset);
        if available < needed {
            return Err(SplitError::TruncatedRecord { offset, needed, available });
        }
        Self::read(&data[offset..offset + needed], layout)
            .map_err(|_| SplitError::TruncatedRecord { offset, needed, available })
    }

    /// Encode in the inverse order of [`read`](Self::read): byte order and
    /// short-code placement first, then the width-specific layout.
    pub fn encode(&self, layout: BlockLayout) -> Result<Vec<u8>> {
        let mut code         = u32::from_ne_bytes(self.code.0);
        let mut length       = self.length;
        let mut schema_index = self.schema_index;
        let mut count        = self.count;

        if layout.swap.is_active() {
            if !self.code.is_end() {
                layout.swap.apply(&mut length);
                layout.swap.apply(&mut schema_index);
                layout.swap.apply(&mut count);
            }
            if code != 0 && code & 0xFFFF_0000 == 0 {
                code <<= 16;
            }
        }

        let mut out = Vec::with_capacity(layout.header_size());
        out.extend_from_slice(&code.to_ne_bytes());
        out.extend_from_slice(&length.to_ne_bytes());
        match layout.width {
            PointerWidth::Four => {
                let old = u32::try_from(self.old_address).map_err(|_| SplitError::ManifestFormat(format!(
                    "address token {:#x} does not fit a 4-byte pointer", self.old_address
                )))?;
                out.extend_from_slice(&old.to_ne_bytes());
            }
            PointerWidth::Eight => out.extend_from_slice(&self.old_address.to_ne_bytes()),
        }
        out.extend_from_slice(&schema_index.to_ne_bytes());
        out.extend_from_slice(&count.to_ne_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::Endianness;

    fn foreign() -> EndianSwitch {
        let other = match Endianness::HOST {
            Endianness::Big    => Endianness::Little,
            Endianness::Little => Endianness::Big,
        };
        EndianSwitch::new(other)
    }

    fn sample(code: &[u8; 4]) -> RecordHeader {
        RecordHeader {
            code:         BlockCode(*code),
            length:       0x0000_0140,
            old_address:  0x7ffe_1234_5678,
            schema_index: 42,
            count:        3,
        }
    }

    #[test]
    fn header_sizes() {
        assert_eq!(BlockLayout::new(PointerWidth::Four, EndianSwitch::identity()).header_size(), 20);
        assert_eq!(BlockLayout::new(PointerWidth::Eight, EndianSwitch::identity()).header_size(), 24);
    }

    #[test]
    fn native_roundtrip_both_widths() {
        for width in [PointerWidth::Four, PointerWidth::Eight] {
            let layout = BlockLayout::new(width, EndianSwitch::identity());
            let mut h = sample(b"DATA");
            if width == PointerWidth::Four {
                h.old_address = 0xdead_beef;
            }
            let bytes = h.encode(layout).unwrap();
            assert_eq!(bytes.len(), layout.header_size());
            assert_eq!(RecordHeader::decode(&bytes, 0, layout).unwrap(), h);
        }
    }

    #[test]
    fn foreign_order_swaps_numeric_fields() {
        let layout = BlockLayout::new(PointerWidth::Eight, foreign());
        let h = sample(b"DATA");
        let bytes = h.encode(layout).unwrap();
        let raw_len = u32::from_ne_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(raw_len, h.length.swap_bytes());
        assert_eq!(RecordHeader::decode(&bytes, 0, layout).unwrap(), h);
    }

    #[test]
    fn end_sentinel_is_never_swapped() {
        let layout = BlockLayout::new(PointerWidth::Eight, foreign());
        let h = RecordHeader { code: BlockCode::END, length: 0, old_address: 0, schema_index: 0, count: 7 };
        let bytes = h.encode(layout).unwrap();
        assert_eq!(&bytes[..4], b"ENDB");
        assert_eq!(i32::from_ne_bytes(bytes[20..24].try_into().unwrap()), 7);
        assert_eq!(RecordHeader::decode(&bytes, 0, layout).unwrap(), h);
    }

    #[test]
    #[cfg(target_endian = "little")]
    fn short_code_moves_to_low_half() {
        let layout = BlockLayout::new(PointerWidth::Four, foreign());
        // Two-character code as a foreign-order writer placed it.
        let written = u32::from_ne_bytes(*b"OB\0\0") << 16;
        let mut raw = written.to_ne_bytes().to_vec();
        raw.extend_from_slice(&0x10u32.swap_bytes().to_ne_bytes());
        raw.extend_from_slice(&0x1000u32.to_ne_bytes());
        raw.extend_from_slice(&5i32.swap_bytes().to_ne_bytes());
        raw.extend_from_slice(&1i32.swap_bytes().to_ne_bytes());

        let h = RecordHeader::decode(&raw, 0, layout).unwrap();
        assert_eq!(h.code, BlockCode(*b"OB\0\0"));
        assert_eq!(h.length, 0x10);
        assert_eq!(h.schema_index, 5);
        assert_eq!(h.count, 1);
        assert_eq!(h.encode(layout).unwrap(), raw);
    }

    #[test]
    fn truncated_header() {
        let layout = BlockLayout::new(PointerWidth::Eight, EndianSwitch::identity());
        let bytes = sample(b"TEST").encode(layout).unwrap();
        match RecordHeader::decode(&bytes[..23], 0, layout) {
            Err(SplitError::TruncatedRecord { offset: 0, needed: 24, available: 23 }) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wide_address_rejected_for_four_byte_layout() {
        let layout = BlockLayout::new(PointerWidth::Four, EndianSwitch::identity());
        assert!(matches!(sample(b"DATA").encode(layout), Err(SplitError::ManifestFormat(_))));
    }

    #[test]
    fn display_escapes_unprintable_bytes() {
        assert_eq!(BlockCode(*b"OB\0\0").to_string(), "OB\\x00\\x00");
        assert_eq!(BlockCode::DNA.to_string(), "DNA1");
    }
}

//! Container input and output.
//!
//! # Reading
//! [`Container`] maps the source file read-only, parses the 12-byte header
//! and, when the raw bytes are not a header, tries the decompression
//! strategies in [`crate::codec`] before parsing again.  [`Records`] then
//! walks record headers sequentially up to and including `ENDB`, borrowing
//! payloads straight from the mapping.
//!
//! # Writing
//! [`ContainerWriter`] emits the header and then record header + payload
//! pairs in call order.  Nothing is buffered beyond what the wrapped writer
//! does; a failed write leaves a partial file behind.

use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::block::{BlockLayout, RecordHeader};
use crate::codec::{decompress_with, default_decoders};
use crate::error::{Result, SplitError};
use crate::header::{ContainerHeader, HEADER_SIZE};

// ── Reader ───────────────────────────────────────────────────────────────────

enum ContainerBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for ContainerBytes {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            ContainerBytes::Mapped(m) => &m[..],
            ContainerBytes::Owned(v)  => &v[..],
        }
    }
}

pub struct Container {
    bytes:           ContainerBytes,
    pub header:      ContainerHeader,
    /// Name of the decoder that unwrapped the file, if it was compressed.
    pub compression: Option<&'static str>,
}

impl Container {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(SplitError::input(path))?;
        // SAFETY: the mapping is read-only and lives as long as the container;
        // the source file is never written by this process.
        let map = unsafe { Mmap::map(&file) }.map_err(SplitError::input(path))?;
        Self::load(ContainerBytes::Mapped(map))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::load(ContainerBytes::Owned(bytes))
    }

    fn load(bytes: ContainerBytes) -> Result<Self> {
        let raw_err = match ContainerHeader::parse(&bytes) {
            Ok(header) => return Ok(Self { bytes, header, compression: None }),
            Err(e)     => e,
        };

        match decompress_with(&default_decoders(), &bytes)? {
            Some((name, inflated)) => {
                let header = ContainerHeader::parse(&inflated)?;
                Ok(Self { bytes: ContainerBytes::Owned(inflated), header, compression: Some(name) })
            }
            None => Err(raw_err),
        }
    }

    /// Header plus record bytes, after any decompression.
    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn layout(&self) -> BlockLayout {
        BlockLayout::for_header(&self.header)
    }

    pub fn records(&self) -> Records<'_> {
        Records { data: self.data(), layout: self.layout(), pos: HEADER_SIZE, done: false }
    }
}

/// One decoded record, borrowing its payload from the container.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Offset of the record header within [`Container::data`].
    pub offset:  usize,
    pub header:  RecordHeader,
    pub payload: &'a [u8],
}

/// Sequential record walk.  Stops after `ENDB`, at a clean end of data, or
/// on the first error.
pub struct Records<'a> {
    data:   &'a [u8],
    layout: BlockLayout,
    pos:    usize,
    done:   bool,
}

impl<'a> Records<'a> {
    fn next_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.pos == self.data.len() {
            log::warn!("container ends without an ENDB record");
            return Ok(None);
        }

        let offset = self.pos;
        let header = RecordHeader::decode(self.data, offset, self.layout)?;
        let start  = offset + self.layout.header_size();
        let needed = header.length as usize;
        let available = self.data.len() - start;
        if needed > available {
            return Err(SplitError::TruncatedRecord { offset: start, needed, available });
        }

        let payload = &self.data[start..start + needed];
        self.pos = start + needed;
        log::debug!("record {} at {offset}: {} bytes, sdna {}", header.code, header.length, header.schema_index);

        if header.code.is_end() {
            self.done = true;
            let trailing = self.data.len() - self.pos;
            if trailing > 0 {
                log::warn!("ignoring {trailing} bytes after ENDB");
            }
        }
        Ok(Some(Record { offset, header, payload }))
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_record();
        if !matches!(item, Ok(Some(_))) {
            self.done = true;
        }
        item.transpose()
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write> {
    writer:  W,
    layout:  BlockLayout,
    /// Path used in diagnostics.
    target:  PathBuf,
    pub records_written: usize,
    pub bytes_written:   u64,
}

impl<W: Write> ContainerWriter<W> {
    /// Write the container header and prepare for records.
    pub fn new(mut writer: W, header: &ContainerHeader, target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let bytes  = header.to_bytes()?;
        writer.write_all(&bytes).map_err(SplitError::output(&target))?;
        Ok(Self {
            writer,
            layout: BlockLayout::for_header(header),
            target,
            records_written: 0,
            bytes_written:   HEADER_SIZE as u64,
        })
    }

    /// Write one record.  `header.length` is replaced by the payload length.
    pub fn write_record(&mut self, header: &RecordHeader, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len()).map_err(|_| SplitError::ManifestFormat(format!(
            "{} payload of {} bytes exceeds the 32-bit length field", header.code, payload.len()
        )))?;
        let encoded = RecordHeader { length, ..*header }.encode(self.layout)?;

        self.writer.write_all(&encoded).map_err(SplitError::output(&self.target))?;
        self.writer.write_all(payload).map_err(SplitError::output(&self.target))?;

        self.records_written += 1;
        self.bytes_written   += (encoded.len() + payload.len()) as u64;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().map_err(SplitError::output(&self.target))?;
        Ok(self.writer)
    }
}

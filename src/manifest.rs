//! JSON manifest describing a container: its header plus one entry per record.
//!
//! ```json
//! {
//!   "header": { "version": 302, "endianness": "little", "pointer_size": 8 },
//!   "datablocks": [
//!     { "code": "REND", "old": "7ffd4a10", "data": "AAAAAQ==" },
//!     { "code": "OB\u0000\u0000", "old": "7ffd5b00", "schema_index": 12,
//!       "type": "Object", "name": "OBCube", "file": "objectobcube_1f2e3d4c" }
//!   ]
//! }
//! ```
//!
//! Text fields (`code`, `type`, `name`) are plain JSON strings when the bytes
//! are valid UTF-8 and `{"base64": "..."}` otherwise.  Inline payloads are
//! always base64.  Default values (`old` = 0, `count` = 1, `schema_index` = 0)
//! are omitted.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::block::{BlockCode, RecordHeader};
use crate::error::{Result, SplitError};
use crate::header::{ContainerHeader, MAX_VERSION};

/// Where an entry's payload bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Name of a sidecar file in the datablocks directory.
    File(String),
    Inline(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EntryRepr", into = "EntryRepr")]
pub struct ManifestEntry {
    pub code:         BlockCode,
    pub old_address:  u64,
    pub count:        i32,
    pub schema_index: i32,
    pub type_name:    Option<Vec<u8>>,
    pub id_name:      Option<Vec<u8>>,
    /// The schema reported this record's struct as removed.
    pub removed:      bool,
    pub payload:      Payload,
}

impl ManifestEntry {
    /// Entry mirroring `header`, without derived names.
    pub fn new(header: &RecordHeader, payload: Payload) -> Self {
        Self {
            code:         header.code,
            old_address:  header.old_address,
            count:        header.count,
            schema_index: header.schema_index,
            type_name:    None,
            id_name:      None,
            removed:      false,
            payload,
        }
    }

    /// Record header for a payload of `length` bytes.
    pub fn record_header(&self, length: u32) -> RecordHeader {
        RecordHeader {
            code:         self.code,
            length,
            old_address:  self.old_address,
            schema_index: self.schema_index,
            count:        self.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub header:     ContainerHeader,
    pub datablocks: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(header: ContainerHeader) -> Self {
        Self { header, datablocks: Vec::new() }
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.datablocks.push(entry);
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = serde_json::to_vec_pretty(self)?;
        out.push(b'\n');
        Ok(out)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        if manifest.header.version > MAX_VERSION {
            return Err(SplitError::ManifestFormat(format!(
                "version {} does not fit in three digits", manifest.header.version
            )));
        }
        Ok(manifest)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(SplitError::output(path))
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path  = path.as_ref();
        let bytes = fs::read(path).map_err(SplitError::input(path))?;
        Self::from_json(&bytes)
    }
}

// ── Wire representation ──────────────────────────────────────────────────────

/// A byte string embedded as JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SafeText {
    Text(String),
    Binary { base64: String },
}

impl SafeText {
    fn encode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(s)  => SafeText::Text(s.to_owned()),
            Err(_) => SafeText::Binary { base64: B64.encode(bytes) },
        }
    }

    fn decode(self) -> std::result::Result<Vec<u8>, String> {
        match self {
            SafeText::Text(s)             => Ok(s.into_bytes()),
            SafeText::Binary { base64 }   => B64.decode(base64).map_err(|e| format!("bad base64 text: {e}")),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct EntryRepr {
    code: SafeText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    old: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_index: Option<i32>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    type_name: Option<SafeText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<SafeText>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    removed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl From<ManifestEntry> for EntryRepr {
    fn from(e: ManifestEntry) -> Self {
        let (file, data) = match e.payload {
            Payload::File(name)    => (Some(name), None),
            Payload::Inline(bytes) => (None, Some(B64.encode(bytes))),
        };
        EntryRepr {
            code:         SafeText::encode(&e.code.0),
            old:          (e.old_address != 0).then(|| format!("{:x}", e.old_address)),
            count:        (e.count != 1).then_some(e.count),
            schema_index: (e.schema_index != 0).then_some(e.schema_index),
            type_name:    e.type_name.as_deref().map(SafeText::encode),
            name:         e.id_name.as_deref().map(SafeText::encode),
            removed:      e.removed,
            file,
            data,
        }
    }
}

impl TryFrom<EntryRepr> for ManifestEntry {
    type Error = String;

    fn try_from(raw: EntryRepr) -> std::result::Result<Self, String> {
        let code_bytes = raw.code.decode()?;
        let code: [u8; 4] = code_bytes.as_slice().try_into()
            .map_err(|_| format!("code must be exactly 4 bytes, got {}", code_bytes.len()))?;

        let old_address = match raw.old {
            Some(s) => parse_address(&s)?,
            None    => 0,
        };

        let payload = match (raw.file, raw.data) {
            (Some(_), Some(_)) => return Err("entry has both 'file' and 'data'".into()),
            (None, None)       => return Err("entry has neither 'file' nor 'data'".into()),
            (Some(file), None) => {
                validate_sidecar_name(&file)?;
                Payload::File(file)
            }
            (None, Some(data)) => Payload::Inline(
                B64.decode(data).map_err(|e| format!("bad inline data: {e}"))?,
            ),
        };

        Ok(ManifestEntry {
            code:         BlockCode(code),
            old_address,
            count:        raw.count.unwrap_or(1),
            schema_index: raw.schema_index.unwrap_or(0),
            type_name:    raw.type_name.map(SafeText::decode).transpose()?,
            id_name:      raw.name.map(SafeText::decode).transpose()?,
            removed:      raw.removed,
            payload,
        })
    }
}

/// Hex address token; an optional `0x` prefix is accepted.
fn parse_address(s: &str) -> std::result::Result<u64, String> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| format!("bad address token {s:?}: {e}"))
}

fn validate_sidecar_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(format!("sidecar name {name:?} is not a plain file name"));
    }
    Ok(())
}

//! Explode: container → manifest + sidecar files.
//!
//! One pass over the records in file order.  Each record becomes one
//! [`ManifestEntry`]; payloads up to `inline_limit` bytes are embedded in
//! the manifest, larger ones are written to the sidecar directory under a
//! deterministic, collision-safe name.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::block::BlockCode;
use crate::error::{Result, SplitError};
use crate::header::ContainerHeader;
use crate::io_stream::{Container, Record};
use crate::manifest::{Manifest, ManifestEntry, Payload};
use crate::schema::{SchemaBroker, StructCompare, TableBroker};

/// Payloads of at most this many bytes are inlined.
pub const DEFAULT_INLINE_LIMIT: usize = 100;
/// Sidecar directory created beside the input file.
pub const DEFAULT_SIDECAR_DIR: &str = "datablocks";
/// Hex characters of the identifier hash appended to sidecar names.
const NAME_HASH_CHARS: usize = 8;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExplodeOptions {
    pub inline_limit: usize,
    pub sidecar_dir:  String,
}

impl Default for ExplodeOptions {
    fn default() -> Self {
        Self {
            inline_limit: DEFAULT_INLINE_LIMIT,
            sidecar_dir:  DEFAULT_SIDECAR_DIR.to_owned(),
        }
    }
}

// ── Sidecar naming ───────────────────────────────────────────────────────────

/// Keep `[A-Za-z0-9_-]`, lower-cased.  Idempotent.
pub fn sanitize(name: &[u8]) -> String {
    name.iter()
        .filter(|b| b.is_ascii_alphanumeric() || **b == b'_' || **b == b'-')
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

/// Sanitised identifier plus a short hash of the unsanitised one, so that
/// identifiers differing only in dropped characters still get distinct names.
pub fn safe_filename(identifier: &[u8]) -> String {
    let digest = blake3::hash(identifier);
    let hex    = hex::encode(&digest.as_bytes()[..NAME_HASH_CHARS / 2]);
    format!("{}_{hex}", sanitize(identifier))
}

/// Per-run state for sidecar naming.  A fresh context per explode keeps
/// repeated runs independent and reproducible.
#[derive(Debug, Default)]
pub struct SplitContext {
    seen: HashMap<String, u32>,
}

impl SplitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `base`; the second and later claims get `_002`, `_003`, ...
    pub fn claim(&mut self, base: String) -> String {
        let n = self.seen.entry(base.clone()).or_insert(0);
        *n += 1;
        if *n > 1 {
            format!("{base}_{:03}", *n)
        } else {
            base
        }
    }
}

// ── Splitter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SplitStats {
    pub records:       usize,
    pub inlined:       usize,
    pub externalized:  usize,
    pub reconstructed: usize,
    pub removed:       usize,
}

pub struct RecordSplitter<'b, B: SchemaBroker + ?Sized> {
    broker:       &'b B,
    context:      SplitContext,
    sidecar_dir:  PathBuf,
    inline_limit: usize,
    stats:        SplitStats,
}

impl<'b, B: SchemaBroker + ?Sized> RecordSplitter<'b, B> {
    /// `sidecar_dir` must already exist.
    pub fn new(broker: &'b B, sidecar_dir: impl Into<PathBuf>, options: &ExplodeOptions) -> Self {
        Self {
            broker,
            context:      SplitContext::new(),
            sidecar_dir:  sidecar_dir.into(),
            inline_limit: options.inline_limit,
            stats:        SplitStats::default(),
        }
    }

    pub fn split<'a, I>(mut self, header: ContainerHeader, records: I) -> Result<(Manifest, SplitStats)>
    where
        I: IntoIterator<Item = Record<'a>>,
    {
        let mut manifest = Manifest::new(header);
        for record in records {
            let entry = self.split_record(&record)?;
            manifest.push(entry);
        }
        Ok((manifest, self.stats))
    }

    fn split_record(&mut self, record: &Record<'_>) -> Result<ManifestEntry> {
        let h = &record.header;
        self.stats.records += 1;

        let compare = if h.schema_index == 0 || record.payload.is_empty() {
            StructCompare::Unknown
        } else {
            self.broker.classify(h.schema_index)
        };

        let bytes: Cow<'_, [u8]> = match compare {
            StructCompare::Changed => {
                let rebuilt = self.broker.reconstruct(h.schema_index, h.count, record.payload)?;
                log::debug!(
                    "{} at {}: rebuilt {} -> {} bytes",
                    h.code, record.offset, record.payload.len(), rebuilt.len()
                );
                self.stats.reconstructed += 1;
                Cow::Owned(rebuilt)
            }
            _ => Cow::Borrowed(record.payload),
        };

        let mut entry = ManifestEntry::new(h, Payload::Inline(Vec::new()));
        if compare == StructCompare::Removed {
            entry.removed = true;
            self.stats.removed += 1;
        }

        if !bytes.is_empty() && h.schema_index != 0 {
            entry.type_name = self.broker.name_of(h.schema_index).map(<[u8]>::to_vec);
            if self.broker.has_leading_identity(h.schema_index) {
                entry.id_name = self.broker.identity_name(h.schema_index, &bytes);
            }
        }

        entry.payload = if bytes.len() <= self.inline_limit {
            self.stats.inlined += 1;
            Payload::Inline(bytes.into_owned())
        } else {
            let base = safe_filename(&sidecar_identifier(&entry));
            let name = self.context.claim(base);
            let path = self.sidecar_dir.join(&name);
            fs::write(&path, &bytes).map_err(SplitError::output(&path))?;
            log::debug!("{} at {}: {} bytes -> {}", h.code, record.offset, bytes.len(), name);
            self.stats.externalized += 1;
            Payload::File(name)
        };

        Ok(entry)
    }
}

/// Best available identifier: type + entity name, type name, or raw code.
fn sidecar_identifier(entry: &ManifestEntry) -> Vec<u8> {
    let type_name = entry.type_name.as_deref().unwrap_or_default();
    match entry.id_name.as_deref() {
        Some(id) if !id.is_empty() => [type_name, id].concat(),
        _ if !type_name.is_empty() => type_name.to_vec(),
        _                          => entry.code.as_bytes().to_vec(),
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExplodeReport {
    pub manifest_path: PathBuf,
    pub sidecar_dir:   PathBuf,
    pub compression:   Option<&'static str>,
    pub stats:         SplitStats,
}

/// Manifest written for `input`: same directory and stem, `.json` extension.
/// An input already named `*.json` gets `.json` appended so the source is
/// never overwritten.
pub fn manifest_path_for(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == "json") {
        let mut name = input.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    } else {
        input.with_extension("json")
    }
}

/// Split an already loaded container using `broker`.
pub fn explode_container<B: SchemaBroker + ?Sized>(
    container:   &Container,
    broker:      &B,
    sidecar_dir: &Path,
    options:     &ExplodeOptions,
) -> Result<(Manifest, SplitStats)> {
    let records = container.records().collect::<Result<Vec<_>>>()?;
    fs::create_dir_all(sidecar_dir).map_err(SplitError::output(sidecar_dir))?;
    RecordSplitter::new(broker, sidecar_dir, options).split(container.header, records)
}

/// Explode `input` using the container's own schema table.
pub fn explode_file<P: AsRef<Path>>(input: P, options: &ExplodeOptions) -> Result<ExplodeReport> {
    let input     = input.as_ref();
    let container = Container::open(input)?;
    log::info!(
        "{}: version {}, {}-byte pointers, {} endian",
        input.display(),
        container.header.version,
        container.header.pointer_width.bytes(),
        container.header.endianness.name(),
    );
    if let Some(codec) = container.compression {
        log::info!("{}: {codec}-compressed input", input.display());
    }

    let broker = {
        let mut records = container.records();
        let table = loop {
            match records.next() {
                Some(Ok(r)) if r.header.code == BlockCode::DNA => break r,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e),
                None => return Err(SplitError::MissingSchemaTable),
            }
        };
        TableBroker::from_payload(table.payload, &container.header)?
    };

    let base_dir    = input.parent().unwrap_or_else(|| Path::new(""));
    let sidecar_dir = base_dir.join(&options.sidecar_dir);
    let (manifest, stats) = explode_container(&container, &broker, &sidecar_dir, options)?;

    let manifest_path = manifest_path_for(input);
    manifest.write_to_path(&manifest_path)?;
    log::info!(
        "exploded {} records ({} inline, {} in {}) -> {}",
        stats.records,
        stats.inlined,
        stats.externalized,
        sidecar_dir.display(),
        manifest_path.display(),
    );

    Ok(ExplodeReport { manifest_path, sidecar_dir, compression: container.compression, stats })
}

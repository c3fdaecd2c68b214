//! Implode: manifest + sidecar files → container.
//!
//! Records are written in manifest order.  Each record's length comes from
//! the resolved payload, never from the manifest, so an edited sidecar of a
//! different size produces a consistent container.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, SplitError};
use crate::explode::DEFAULT_SIDECAR_DIR;
use crate::io_stream::ContainerWriter;
use crate::manifest::{Manifest, ManifestEntry, Payload};

#[derive(Debug, Clone)]
pub struct ImplodeOptions {
    /// Destination container.  Defaults to the manifest path with a
    /// `.blend.tmp` extension.
    pub output:      Option<PathBuf>,
    pub sidecar_dir: String,
}

impl Default for ImplodeOptions {
    fn default() -> Self {
        Self { output: None, sidecar_dir: DEFAULT_SIDECAR_DIR.to_owned() }
    }
}

/// Default implode destination for `manifest`.
pub fn default_output_for(manifest: &Path) -> PathBuf {
    manifest.with_extension("blend.tmp")
}

pub struct RecordAssembler {
    sidecar_dir: PathBuf,
}

impl RecordAssembler {
    pub fn new(sidecar_dir: impl Into<PathBuf>) -> Self {
        Self { sidecar_dir: sidecar_dir.into() }
    }

    /// Payload bytes for `entry`: inline data, or the sidecar file's contents.
    pub fn resolve_payload<'e>(&self, entry: &'e ManifestEntry) -> Result<Cow<'e, [u8]>> {
        match &entry.payload {
            Payload::Inline(bytes) => Ok(Cow::Borrowed(bytes)),
            Payload::File(name) => {
                let path = self.sidecar_dir.join(name);
                let bytes = fs::read(&path).map_err(SplitError::input(&path))?;
                Ok(Cow::Owned(bytes))
            }
        }
    }

    /// Write the whole container described by `manifest` into `writer`.
    pub fn assemble<W: Write>(
        &self,
        manifest: &Manifest,
        writer:   W,
        target:   impl Into<PathBuf>,
    ) -> Result<(W, u64)> {
        let mut out = ContainerWriter::new(writer, &manifest.header, target)?;
        for entry in &manifest.datablocks {
            let payload = self.resolve_payload(entry)?;
            if entry.removed {
                log::debug!("{}: writing record whose struct was removed from the schema", entry.code);
            }
            out.write_record(&entry.record_header(0), &payload)?;
        }
        if !manifest.datablocks.last().is_some_and(|e| e.code.is_end()) {
            log::warn!("manifest does not end with an ENDB record");
        }
        let bytes = out.bytes_written;
        Ok((out.finish()?, bytes))
    }
}

#[derive(Debug, Clone)]
pub struct ImplodeReport {
    pub output:        PathBuf,
    pub records:       usize,
    pub bytes_written: u64,
}

/// Rebuild a container from the manifest at `manifest_path`.  Sidecars are
/// read from the configured directory beside the manifest.
pub fn implode_file<P: AsRef<Path>>(manifest_path: P, options: &ImplodeOptions) -> Result<ImplodeReport> {
    let manifest_path = manifest_path.as_ref();
    let manifest = Manifest::read_from_path(manifest_path)?;

    let base_dir  = manifest_path.parent().unwrap_or_else(|| Path::new(""));
    let assembler = RecordAssembler::new(base_dir.join(&options.sidecar_dir));
    let output    = options.output.clone().unwrap_or_else(|| default_output_for(manifest_path));

    let file = File::create(&output).map_err(SplitError::output(&output))?;
    let (_, bytes_written) = assembler.assemble(&manifest, BufWriter::new(file), &output)?;

    log::info!(
        "imploded {} records ({} bytes) -> {}",
        manifest.datablocks.len(),
        bytes_written,
        output.display(),
    );
    Ok(ImplodeReport { output, records: manifest.datablocks.len(), bytes_written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockCode, RecordHeader};
    use crate::endian::Endianness;
    use crate::header::{ContainerHeader, PointerWidth, HEADER_SIZE};
    use crate::io_stream::Container;
    use tempfile::tempdir;

    fn manifest() -> Manifest {
        let header = ContainerHeader {
            version:       280,
            endianness:    Endianness::HOST,
            pointer_width: PointerWidth::Four,
        };
        let mut m = Manifest::new(header);
        let rec = |code: &[u8; 4]| RecordHeader {
            code:         BlockCode(*code),
            length:       999,
            old_address:  0x40,
            schema_index: 0,
            count:        1,
        };
        m.push(ManifestEntry::new(&rec(b"REND"), Payload::Inline(vec![3; 6])));
        m.push(ManifestEntry::new(&rec(b"DATA"), Payload::File("data_0000".into())));
        m.push(ManifestEntry::new(&rec(b"ENDB"), Payload::Inline(Vec::new())));
        m
    }

    #[test]
    fn lengths_follow_resolved_payloads() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data_0000"), vec![8u8; 250]).unwrap();
        let (bytes, written) = RecordAssembler::new(dir.path())
            .assemble(&manifest(), Vec::new(), "memory")
            .unwrap();
        // 12 + 3 * 20 header bytes + payloads.
        assert_eq!(written as usize, HEADER_SIZE + 3 * 20 + 6 + 250);
        assert_eq!(bytes.len() as u64, written);
        assert_eq!(&bytes[..8], b"BLENDER_");
        assert_eq!(&bytes[9..12], b"280");

        let c = Container::from_bytes(bytes).unwrap();
        let r: Vec<_> = c.records().collect::<Result<_>>().unwrap();
        assert_eq!(r[1].header.length, 250);
        assert_eq!(r[1].header.old_address, 0x40);
        assert_eq!(r[1].payload, &[8u8; 250][..]);
    }

    #[test]
    fn missing_sidecar_is_input_error() {
        let dir = tempdir().unwrap();
        let err = RecordAssembler::new(dir.path())
            .assemble(&manifest(), Vec::new(), "memory")
            .unwrap_err();
        assert!(matches!(err, SplitError::InputRead { .. }));
    }

    #[test]
    fn implode_file_defaults_output_beside_manifest() {
        let dir = tempdir().unwrap();
        let sidecars = dir.path().join(DEFAULT_SIDECAR_DIR);
        fs::create_dir(&sidecars).unwrap();
        fs::write(sidecars.join("data_0000"), b"payload").unwrap();
        let manifest_path = dir.path().join("scene.json");
        manifest().write_to_path(&manifest_path).unwrap();

        let report = implode_file(&manifest_path, &ImplodeOptions::default()).unwrap();
        assert_eq!(report.output, dir.path().join("scene.blend.tmp"));
        assert_eq!(report.records, 3);
        let written = fs::read(&report.output).unwrap();
        assert_eq!(written.len() as u64, report.bytes_written);
    }

    #[test]
    fn explicit_output_is_honoured() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("blobs")).unwrap();
        fs::write(dir.path().join("blobs").join("data_0000"), b"x").unwrap();
        let manifest_path = dir.path().join("m.json");
        manifest().write_to_path(&manifest_path).unwrap();

        let out = dir.path().join("rebuilt.blend");
        let opts = ImplodeOptions { output: Some(out.clone()), sidecar_dir: "blobs".into() };
        implode_file(&manifest_path, &opts).unwrap();
        assert!(out.exists());
        assert!(!dir.path().join("m.blend.tmp").exists());
    }
}

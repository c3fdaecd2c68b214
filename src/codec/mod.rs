//! Whole-container decompression, selected by trial.
//!
//! A container that does not start with a raw header may be a compressed
//! frame wrapping one.  Each supported format is a [`FrameDecoder`]; the
//! registry probes them in order and the first whose magic matches decodes
//! the entire body.  Adding a format means adding a decoder to
//! [`default_decoders`], nothing else.

use std::io::Read;

use flate2::read::MultiGzDecoder;
use zstd::stream::raw::{Decoder, InBuffer, Operation, OutBuffer};

use crate::error::{Result, SplitError};

/// Zstandard frame magic (little-endian 0xFD2FB528).
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// Gzip member magic.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Smallest output buffer the streaming decoder starts with.
const MIN_OUTPUT: usize = 4096;

pub trait FrameDecoder {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
    /// Cheap check on the leading bytes; never decodes.
    fn probe(&self, data: &[u8]) -> bool;
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// ── Zstandard ────────────────────────────────────────────────────────────────

pub struct ZstdFrameDecoder;

impl FrameDecoder for ZstdFrameDecoder {
    fn name(&self) -> &'static str { "zstd" }

    fn probe(&self, data: &[u8]) -> bool {
        data.starts_with(&ZSTD_MAGIC)
    }

    /// Streaming decode into a growable buffer.  The buffer doubles each time
    /// the decoder fills it; any decoder error ends the loop.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let fail = |reason: String| SplitError::Decompression { codec: "zstd", reason };

        let mut decoder = Decoder::new().map_err(|e| fail(e.to_string()))?;
        let mut out     = vec![0u8; (data.len() / 2).max(MIN_OUTPUT)];
        let mut input   = InBuffer::around(data);
        let mut written = 0usize;

        loop {
            let (hint, pos) = {
                let mut output = OutBuffer::around_pos(&mut out[..], written);
                let hint = decoder.run(&mut input, &mut output).map_err(|e| fail(e.to_string()))?;
                (hint, output.pos())
            };
            written = pos;

            let input_done = input.pos() == data.len();
            if hint == 0 && input_done {
                break;
            }
            if written == out.len() {
                // Output too small: grow and resume where the decoder stopped.
                let grown = out.len() * 2;
                log::debug!("zstd: growing output buffer to {grown} bytes");
                out.resize(grown, 0);
                continue;
            }
            if input_done {
                return Err(fail("frame is truncated".into()));
            }
        }

        out.truncate(written);
        Ok(out)
    }
}

// ── Gzip ─────────────────────────────────────────────────────────────────────

/// Older containers were written as a plain gzip stream.
pub struct GzipFrameDecoder;

impl FrameDecoder for GzipFrameDecoder {
    fn name(&self) -> &'static str { "gzip" }

    fn probe(&self, data: &[u8]) -> bool {
        data.starts_with(&GZIP_MAGIC)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len().saturating_mul(2));
        MultiGzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| SplitError::Decompression { codec: "gzip", reason: e.to_string() })?;
        Ok(out)
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

pub fn default_decoders() -> Vec<Box<dyn FrameDecoder>> {
    vec![Box::new(ZstdFrameDecoder), Box::new(GzipFrameDecoder)]
}

/// Decode `data` with the first decoder whose probe matches.
///
/// Returns `Ok(None)` when no decoder recognises the data.
pub fn decompress_with(
    decoders: &[Box<dyn FrameDecoder>],
    data: &[u8],
) -> Result<Option<(&'static str, Vec<u8>)>> {
    for decoder in decoders {
        if decoder.probe(data) {
            let out = decoder.decode(data)?;
            log::info!("decompressed {} -> {} bytes with {}", data.len(), out.len(), decoder.name());
            return Ok(Some((decoder.name(), out)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> Vec<u8> {
        (0..50_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    #[test]
    fn zstd_grows_output_past_initial_guess() {
        let raw = sample();
        let packed = zstd::encode_all(&raw[..], 19).unwrap();
        // Highly compressible input: the first output buffer is far too small.
        assert!((packed.len() / 2).max(MIN_OUTPUT) < raw.len());
        assert!(ZstdFrameDecoder.probe(&packed));
        assert_eq!(ZstdFrameDecoder.decode(&packed).unwrap(), raw);
    }

    #[test]
    fn zstd_concatenated_frames() {
        let mut packed = zstd::encode_all(&b"first "[..], 3).unwrap();
        packed.extend(zstd::encode_all(&b"second"[..], 3).unwrap());
        assert_eq!(ZstdFrameDecoder.decode(&packed).unwrap(), b"first second");
    }

    #[test]
    fn zstd_corrupt_frame_is_fatal() {
        let mut packed = zstd::encode_all(&sample()[..], 3).unwrap();
        let cut = packed.len() / 2;
        packed.truncate(cut);
        assert!(matches!(
            ZstdFrameDecoder.decode(&packed),
            Err(SplitError::Decompression { codec: "zstd", .. })
        ));
    }

    #[test]
    fn gzip_roundtrip() {
        let raw = sample();
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&raw).unwrap();
        let packed = enc.finish().unwrap();
        assert!(GzipFrameDecoder.probe(&packed));
        assert!(!ZstdFrameDecoder.probe(&packed));
        assert_eq!(GzipFrameDecoder.decode(&packed).unwrap(), raw);
    }

    #[test]
    fn registry_reports_unrecognised_data() {
        let decoders = default_decoders();
        assert!(decompress_with(&decoders, b"BLENDER-v300").unwrap().is_none());
        let packed = zstd::encode_all(&b"BLENDER-v300"[..], 1).unwrap();
        let (name, out) = decompress_with(&decoders, &packed).unwrap().unwrap();
        assert_eq!(name, "zstd");
        assert_eq!(out, b"BLENDER-v300");
    }
}

//! Content-encoding decoding for capture previews.
//!
//! Only the retained prefix of a body is decoded, never the forwarded
//! stream. A truncated prefix yields whatever decoded before the data ran
//! out.

use std::io::{ErrorKind, Read};

use brotli::Decompressor;
use flate2::read::{GzDecoder, ZlibDecoder};

const BROTLI_BUFFER: usize = 4096;

/// Decode up to `limit` bytes of `raw` under `encoding`.
///
/// `None` when the encoding is unsupported or nothing could be decoded.
pub fn decode_prefix(raw: &[u8], encoding: &str, limit: usize) -> Option<Vec<u8>> {
    let decoded = match encoding {
        "gzip" | "x-gzip" => read_prefix(GzDecoder::new(raw), limit),
        "deflate" => read_prefix(ZlibDecoder::new(raw), limit),
        "br" => read_prefix(Decompressor::new(raw, BROTLI_BUFFER), limit),
        _ => return None,
    };
    (!decoded.is_empty()).then_some(decoded)
}

fn read_prefix(mut reader: impl Read, limit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    while out.len() < limit {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Truncated or corrupt input: keep what decoded so far.
            Err(_) => break,
        }
    }
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip_encode(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn brotli_encode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    fn search_results(count: usize) -> String {
        let items: Vec<String> = (0..count)
            .map(|i| format!(r#"{{"guid":"{i}","title":"Dune.Part.{i}.2160p","size":{}}}"#, i * 7919))
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn decodes_gzip() {
        let body = br#"[{"title":"Dune.2021.2160p"}]"#;
        let decoded = decode_prefix(&gzip_encode(body), "gzip", 3000).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn decodes_brotli() {
        let body = br#"{"records":[{"series":"Foundation"}]}"#;
        let decoded = decode_prefix(&brotli_encode(body), "br", 3000).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn output_is_capped_at_limit() {
        let body = search_results(50);
        let decoded = decode_prefix(&gzip_encode(body.as_bytes()), "gzip", 64).unwrap();
        assert_eq!(decoded, &body.as_bytes()[..64]);
    }

    #[test]
    fn truncated_gzip_keeps_decoded_prefix() {
        let body = search_results(200);
        let compressed = gzip_encode(body.as_bytes());
        let prefix = &compressed[..compressed.len() / 2];

        let decoded = decode_prefix(prefix, "gzip", 100_000).unwrap();
        assert!(!decoded.is_empty());
        assert!(decoded.len() < body.len());
        assert!(body.as_bytes().starts_with(&decoded));
    }

    #[test]
    fn unknown_or_undecodable_input_is_none() {
        assert!(decode_prefix(b"abc", "zstd", 100).is_none());
        assert!(decode_prefix(b"not gzip at all", "gzip", 100).is_none());
        assert!(decode_prefix(b"", "br", 100).is_none());
    }
}

//! Payload decoders.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::archive::format::Compression;
use crate::error::{AssetError, AssetResult};

/// Upper bound on LZ4 block expansion per input byte.
const LZ4_MAX_RATIO: usize = 255;

/// Decode `raw` according to `compression`. `name` is only used in errors.
pub fn decompress(name: &str, compression: Compression, raw: Vec<u8>) -> AssetResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(raw),
        Compression::Lz4 => decompress_lz4(name, &raw),
        Compression::Deflate => {
            let mut out = Vec::with_capacity(raw.len() * 2);
            ZlibDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| AssetError::Decompression {
                    name: name.to_string(),
                    message: format!("zlib: {}", e),
                })?;
            Ok(out)
        }
    }
}

/// Decode a size-prepended LZ4 block, requiring the output to match the prefix exactly.
fn decompress_lz4(name: &str, raw: &[u8]) -> AssetResult<Vec<u8>> {
    let corrupt = |message: String| AssetError::Decompression {
        name: name.to_string(),
        message: format!("lz4: {}", message),
    };

    let Some((prefix, block)) = raw.split_first_chunk::<4>() else {
        return Err(corrupt(format!("payload of {} bytes has no size prefix", raw.len())));
    };
    let declared = u32::from_le_bytes(*prefix) as usize;
    if declared > block.len().saturating_mul(LZ4_MAX_RATIO) {
        return Err(corrupt(format!(
            "declared size {} is impossible for a {} byte block",
            declared,
            block.len()
        )));
    }

    let out = lz4_flex::block::decompress(block, declared).map_err(|e| corrupt(e.to_string()))?;
    if out.len() != declared {
        return Err(corrupt(format!(
            "decoded {} bytes, header declares {}",
            out.len(),
            declared
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::Compression as Level;
    use flate2::write::ZlibEncoder;

    const TEXT: &[u8] = b"the quick brown fox jumps over the lazy dog, again and again and again";

    #[test]
    fn test_stored_passthrough() {
        let out = decompress("A.TXT", Compression::None, TEXT.to_vec()).unwrap();
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_lz4() {
        let packed = lz4_flex::block::compress_prepend_size(TEXT);
        let out = decompress("A.TXT", Compression::Lz4, packed).unwrap();
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_deflate() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
        encoder.write_all(TEXT).unwrap();
        let packed = encoder.finish().unwrap();

        let out = decompress("A.TXT", Compression::Deflate, packed).unwrap();
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_corrupt_payload() {
        let err = decompress("A.TXT", Compression::Deflate, b"not zlib".to_vec()).unwrap_err();
        assert!(matches!(err, AssetError::Decompression { .. }));

        // Declares 1 KiB of output but carries no data.
        let err = decompress("A.TXT", Compression::Lz4, vec![0, 4, 0, 0]).unwrap_err();
        assert!(matches!(err, AssetError::Decompression { .. }));

        let err = decompress("A.TXT", Compression::Lz4, vec![1, 0]).unwrap_err();
        assert!(matches!(err, AssetError::Decompression { .. }));
    }

    #[test]
    fn test_lz4_size_mismatch() {
        // About 4 GiB declared, one literal byte of data.
        let err = decompress("A.BIN", Compression::Lz4, vec![0xF0, 0xFF, 0xFF, 0xFF, 0x10, b'a'])
            .unwrap_err();
        assert!(matches!(err, AssetError::Decompression { ref name, .. } if name == "A.BIN"));

        // A plausible but too large prefix must not truncate silently.
        let mut packed = lz4_flex::block::compress_prepend_size(TEXT);
        let declared = (TEXT.len() + 8) as u32;
        packed[..4].copy_from_slice(&declared.to_le_bytes());
        let err = decompress("A.TXT", Compression::Lz4, packed).unwrap_err();
        assert!(matches!(err, AssetError::Decompression { .. }));

        // And one too small is rejected rather than cut short.
        let mut packed = lz4_flex::block::compress_prepend_size(TEXT);
        let declared = (TEXT.len() - 8) as u32;
        packed[..4].copy_from_slice(&declared.to_le_bytes());
        let err = decompress("A.TXT", Compression::Lz4, packed).unwrap_err();
        assert!(matches!(err, AssetError::Decompression { .. }));
    }
}

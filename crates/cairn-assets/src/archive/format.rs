//! On-disk layout of asset archives.
//!
//! ```text
//! header     : b"CAIR" b"ARCV"
//! chunk*     : tag[4] len:u32 body[len]          unknown tags are skipped
//! DIRX body  : b"DATA" payload_start:u32 entry*  len covers marker and entries
//! entry      : name_len:u16 name kind:u8
//!   kind 0   : data_offset:u32 size:u32 compression:u8
//!   kind 1   : target_len:u16 target             pointer to another archive
//! ```
//!
//! All integers are little-endian and names are UTF-8.

use crate::error::{AssetError, AssetResult};

/// Product identifier, first four bytes of every archive.
pub const PRODUCT_TAG: [u8; 4] = *b"CAIR";
/// Container-type identifier, bytes 4..8.
pub const CONTAINER_TAG: [u8; 4] = *b"ARCV";
/// Directory chunk tag.
pub const DIRECTORY_TAG: [u8; 4] = *b"DIRX";
/// Payload marker nested at the start of the directory chunk.
pub const PAYLOAD_TAG: [u8; 4] = *b"DATA";

/// Size of the fixed header.
pub const HEADER_LEN: u64 = 8;
/// Size of a chunk header (tag + length).
pub const CHUNK_HEADER_LEN: u64 = 8;

const ENTRY_KIND_DATA: u8 = 0;
const ENTRY_KIND_POINTER: u8 = 1;

/// Compression applied to an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// Stored as-is.
    #[default]
    None,
    /// LZ4 block prefixed with the little-endian u32 uncompressed size.
    Lz4,
    /// zlib stream.
    Deflate,
}

impl Compression {
    /// Decode the on-disk compression code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Compression::None),
            1 => Some(Compression::Lz4),
            2 => Some(Compression::Deflate),
            _ => None,
        }
    }

    /// The on-disk compression code.
    pub fn code(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Deflate => 2,
        }
    }
}

/// One asset's metadata in an archive directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Upper-cased entry name.
    pub name: String,
    /// Offset relative to the archive's payload start.
    pub data_offset: u32,
    /// Number of bytes stored on disk.
    pub size: u32,
    /// Payload compression.
    pub compression: Compression,
    /// For pointer entries, the name of the archive that holds the real data.
    ///
    /// Pointer entries carry zero offset and size.
    pub pointer_target: Option<String>,
}

impl ArchiveEntry {
    /// Whether this entry aliases the same-named entry of another archive.
    pub fn is_pointer(&self) -> bool {
        self.pointer_target.is_some()
    }
}

/// Fold a name to the key used for case-insensitive lookups.
pub(crate) fn fold_name(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Little-endian reader over an in-memory chunk body.
pub(crate) struct ByteCursor<'a> {
    label: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(label: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            label,
            bytes,
            pos: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> AssetResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(AssetError::invalid_format(
                self.label,
                format!(
                    "truncated {} at directory offset {} (need {} bytes, {} left)",
                    what,
                    self.pos,
                    len,
                    self.remaining()
                ),
            ));
        }
        let bytes = self.bytes;
        let slice = &bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn tag(&mut self, what: &str) -> AssetResult<[u8; 4]> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.take(4, what)?);
        Ok(tag)
    }

    pub(crate) fn u8(&mut self, what: &str) -> AssetResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &str) -> AssetResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self, what: &str) -> AssetResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn name(&mut self, what: &str) -> AssetResult<String> {
        let len = self.u16(what)? as usize;
        let bytes = self.take(len, what)?;
        if bytes.is_empty() {
            return Err(AssetError::invalid_format(
                self.label,
                format!("empty {}", what),
            ));
        }
        std::str::from_utf8(bytes).map(fold_name).map_err(|e| {
            AssetError::invalid_format(self.label, format!("{} is not UTF-8: {}", what, e))
        })
    }

    /// Parse the next directory entry.
    pub(crate) fn entry(&mut self) -> AssetResult<ArchiveEntry> {
        let name = self.name("entry name")?;
        match self.u8("entry kind")? {
            ENTRY_KIND_DATA => {
                let data_offset = self.u32("data offset")?;
                let size = self.u32("data size")?;
                let code = self.u8("compression code")?;
                let compression = Compression::from_code(code).ok_or_else(|| {
                    AssetError::invalid_format(
                        self.label,
                        format!("unknown compression code {} for '{}'", code, name),
                    )
                })?;
                Ok(ArchiveEntry {
                    name,
                    data_offset,
                    size,
                    compression,
                    pointer_target: None,
                })
            }
            ENTRY_KIND_POINTER => {
                let target = self.name("pointer target")?;
                Ok(ArchiveEntry {
                    name,
                    data_offset: 0,
                    size: 0,
                    compression: Compression::None,
                    pointer_target: Some(target),
                })
            }
            kind => Err(AssetError::invalid_format(
                self.label,
                format!("unknown entry kind {} for '{}'", kind, name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_entry(name: &str, offset: u32, size: u32, code: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(ENTRY_KIND_DATA);
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.push(code);
        out
    }

    #[test]
    fn test_compression_codes() {
        for c in [Compression::None, Compression::Lz4, Compression::Deflate] {
            assert_eq!(Compression::from_code(c.code()), Some(c));
        }
        assert_eq!(Compression::from_code(3), None);
    }

    #[test]
    fn test_parse_data_entry_folds_case() {
        let bytes = data_entry("textures/Grass.png", 16, 64, 1);
        let mut cursor = ByteCursor::new("test.arc", &bytes);
        let entry = cursor.entry().unwrap();

        assert_eq!(entry.name, "TEXTURES/GRASS.PNG");
        assert_eq!(entry.data_offset, 16);
        assert_eq!(entry.size, 64);
        assert_eq!(entry.compression, Compression::Lz4);
        assert!(!entry.is_pointer());
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_parse_pointer_entry() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5u16.to_le_bytes());
        bytes.extend_from_slice(b"a.txt");
        bytes.push(ENTRY_KIND_POINTER);
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(b"dlc.arc");

        let entry = ByteCursor::new("test.arc", &bytes).entry().unwrap();
        assert_eq!(entry.pointer_target.as_deref(), Some("DLC.ARC"));
        assert_eq!(entry.size, 0);
        assert_eq!(entry.data_offset, 0);
    }

    #[test]
    fn test_truncated_entry_is_invalid_format() {
        let bytes = data_entry("a.txt", 0, 4, 0);
        let mut cursor = ByteCursor::new("test.arc", &bytes[..bytes.len() - 3]);
        let err = cursor.entry().unwrap_err();
        assert!(matches!(err, AssetError::InvalidFormat { .. }));
    }

    #[test]
    fn test_unknown_compression_rejected() {
        let bytes = data_entry("a.txt", 0, 4, 9);
        let err = ByteCursor::new("test.arc", &bytes).entry().unwrap_err();
        assert!(err.to_string().contains("compression code 9"));
    }
}

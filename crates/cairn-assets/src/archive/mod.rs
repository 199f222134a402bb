//! Read-only asset archives.
//!
//! An [`Archive`] is parsed once into an in-memory directory; payload bytes
//! stay on disk (or in the backing reader) until [`Archive::extract`] asks for
//! them. The read cursor is shared behind a lock that is held only for the
//! seek and read, so several threads can extract from one archive and
//! decompress in parallel.

pub mod compression;
pub mod format;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use cairn_core::alloc::HashMap;
use parking_lot::Mutex;

use crate::error::{AssetError, AssetResult};
pub use format::{ArchiveEntry, Compression};
use format::{
    ByteCursor, CHUNK_HEADER_LEN, CONTAINER_TAG, DIRECTORY_TAG, HEADER_LEN, PAYLOAD_TAG,
    PRODUCT_TAG, fold_name,
};

/// Anything an archive can be read from.
pub trait ArchiveStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ArchiveStream for T {}

/// A parsed, read-only asset archive.
pub struct Archive {
    label: String,
    payload_start: u64,
    entries: HashMap<String, ArchiveEntry>,
    order: Vec<String>,
    pointer_targets: Vec<String>,
    stream: Mutex<Box<dyn ArchiveStream>>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("label", &self.label)
            .field("payload_start", &self.payload_start)
            .field("entries", &self.order.len())
            .field("pointer_targets", &self.pointer_targets)
            .finish()
    }
}

impl Archive {
    /// Open and parse the archive at `path`.
    pub fn open(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| AssetError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_reader(path.display().to_string(), BufReader::new(file))
    }

    /// Parse an archive from any seekable reader. `label` names it in diagnostics.
    pub fn from_reader(label: impl Into<String>, reader: impl ArchiveStream + 'static) -> AssetResult<Self> {
        let label = label.into();
        let mut stream: Box<dyn ArchiveStream> = Box::new(reader);

        let io_err = |label: &str, e: std::io::Error| AssetError::IoError {
            path: label.into(),
            source: e,
        };

        let file_len = stream
            .seek(SeekFrom::End(0))
            .and_then(|len| stream.seek(SeekFrom::Start(0)).map(|_| len))
            .map_err(|e| io_err(&label, e))?;

        if file_len < HEADER_LEN {
            return Err(AssetError::invalid_format(&label, "file shorter than header"));
        }

        let mut header = [0u8; HEADER_LEN as usize];
        stream.read_exact(&mut header).map_err(|e| io_err(&label, e))?;
        if header[..4] != PRODUCT_TAG || header[4..] != CONTAINER_TAG {
            return Err(AssetError::invalid_format(
                &label,
                format!("bad magic {:02x?}", header),
            ));
        }

        let directory = read_directory_chunk(&label, stream.as_mut(), file_len)?;
        let mut cursor = ByteCursor::new(&label, &directory);

        if cursor.tag("payload marker")? != PAYLOAD_TAG {
            return Err(AssetError::invalid_format(
                &label,
                "directory does not start with a payload marker",
            ));
        }
        let payload_start = cursor.u32("payload offset")? as u64;
        if payload_start > file_len {
            return Err(AssetError::invalid_format(
                &label,
                format!("payload offset {} beyond end of file", payload_start),
            ));
        }

        let mut entries = HashMap::new();
        let mut order = Vec::new();
        let mut pointer_targets: Vec<String> = Vec::new();

        while cursor.remaining() > 0 {
            let entry = cursor.entry()?;

            if let Some(target) = &entry.pointer_target {
                if !pointer_targets.contains(target) {
                    pointer_targets.push(target.clone());
                }
            } else {
                let end = payload_start + entry.data_offset as u64 + entry.size as u64;
                if end > file_len {
                    return Err(AssetError::invalid_format(
                        &label,
                        format!("'{}' extends past end of file", entry.name),
                    ));
                }
            }

            if entries.contains_key(&entry.name) {
                tracing::warn!(
                    "Duplicate entry '{}' in archive '{}', keeping the first",
                    entry.name,
                    label
                );
                continue;
            }
            order.push(entry.name.clone());
            entries.insert(entry.name.clone(), entry);
        }

        tracing::debug!(
            "Parsed archive '{}': {} entries, {} pointer targets",
            label,
            order.len(),
            pointer_targets.len()
        );

        Ok(Self {
            label,
            payload_start,
            entries,
            order,
            pointer_targets,
            stream: Mutex::new(stream),
        })
    }

    /// The path or label the archive was opened from.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Absolute offset where payload bytes begin.
    pub fn payload_start(&self) -> u64 {
        self.payload_start
    }

    /// Number of directory entries, pointers included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Case-insensitive directory lookup.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        match self.entries.get(name) {
            Some(entry) => Some(entry),
            None => self.entries.get(&fold_name(name)),
        }
    }

    /// Check whether the directory contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Iterate entries in directory order.
    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }

    /// Names of the archives this archive's pointer entries refer to.
    pub fn pointer_targets(&self) -> &[String] {
        &self.pointer_targets
    }

    /// Read and decompress one entry's payload.
    pub fn extract(&self, entry: &ArchiveEntry) -> AssetResult<Vec<u8>> {
        if let Some(target) = &entry.pointer_target {
            return Err(AssetError::UnresolvedPointer {
                name: entry.name.clone(),
                archive: self.label.clone(),
                target: target.clone(),
            });
        }

        let mut raw = vec![0u8; entry.size as usize];
        {
            let mut stream = self.stream.lock();
            stream
                .seek(SeekFrom::Start(self.payload_start + entry.data_offset as u64))
                .and_then(|_| stream.read_exact(&mut raw))
                .map_err(|e| AssetError::IoError {
                    path: self.label.clone().into(),
                    source: e,
                })?;
        }

        compression::decompress(&entry.name, entry.compression, raw)
    }

    /// Look up `name` and extract it.
    pub fn read(&self, name: &str) -> AssetResult<Vec<u8>> {
        let entry = self.entry(name).ok_or_else(|| AssetError::NotFound {
            path: format!("{}:{}", self.label, name),
        })?;
        self.extract(entry)
    }
}

/// Walk top-level chunks until the directory chunk and return its body.
fn read_directory_chunk(label: &str, stream: &mut dyn ArchiveStream, file_len: u64) -> AssetResult<Vec<u8>> {
    let mut pos = HEADER_LEN;

    loop {
        if pos + CHUNK_HEADER_LEN > file_len {
            return Err(AssetError::invalid_format(label, "no directory chunk"));
        }

        let mut chunk = [0u8; CHUNK_HEADER_LEN as usize];
        stream.read_exact(&mut chunk).map_err(|e| AssetError::IoError {
            path: label.into(),
            source: e,
        })?;
        let tag = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let len = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
        pos += CHUNK_HEADER_LEN;

        if pos + len > file_len {
            return Err(AssetError::invalid_format(
                label,
                format!(
                    "chunk {:?} declares {} bytes, only {} left",
                    String::from_utf8_lossy(&tag),
                    len,
                    file_len - pos
                ),
            ));
        }

        if tag == DIRECTORY_TAG {
            let mut body = vec![0u8; len as usize];
            stream.read_exact(&mut body).map_err(|e| AssetError::IoError {
                path: label.into(),
                source: e,
            })?;
            return Ok(body);
        }

        tracing::trace!(
            "Skipping chunk {:?} ({} bytes) in '{}'",
            String::from_utf8_lossy(&tag),
            len,
            label
        );
        pos = stream
            .seek(SeekFrom::Current(len as i64))
            .map_err(|e| AssetError::IoError {
                path: label.into(),
                source: e,
            })?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use cairn_test_utils::{ArchiveBuilder, Codec};

    fn open(bytes: Vec<u8>) -> AssetResult<Archive> {
        Archive::from_reader("test.arc", Cursor::new(bytes))
    }

    #[test]
    fn test_parse_and_extract() {
        let bytes = ArchiveBuilder::new()
            .file("hello.txt", b"hello")
            .file_with("big.bin", &[7u8; 4096], Codec::Lz4)
            .file_with("level.dat", b"level data level data", Codec::Deflate)
            .pointer("shared.png", "common.arc")
            .build();

        let archive = open(bytes).unwrap();
        assert_eq!(archive.len(), 4);
        assert_eq!(archive.pointer_targets(), ["COMMON.ARC".to_string()]);

        assert_eq!(archive.read("hello.txt").unwrap(), b"hello");
        assert_eq!(archive.read("HELLO.TXT").unwrap(), b"hello");
        assert_eq!(archive.read("big.bin").unwrap(), vec![7u8; 4096]);
        assert_eq!(archive.read("Level.Dat").unwrap(), b"level data level data");

        let names: Vec<_> = archive.entries().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["HELLO.TXT", "BIG.BIN", "LEVEL.DAT", "SHARED.PNG"]);
    }

    #[test]
    fn test_compressed_size_is_on_disk_size() {
        let bytes = ArchiveBuilder::new()
            .file_with("big.bin", &[0u8; 8192], Codec::Lz4)
            .build();
        let archive = open(bytes).unwrap();
        let entry = archive.entry("big.bin").unwrap();

        assert_eq!(entry.compression, Compression::Lz4);
        assert!((entry.size as usize) < 8192);
    }

    #[test]
    fn test_missing_name_is_not_found() {
        let archive = open(ArchiveBuilder::new().file("a.txt", b"a").build()).unwrap();
        let err = archive.read("b.txt").unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));
    }

    #[test]
    fn test_pointer_cannot_be_extracted_directly() {
        let archive = open(ArchiveBuilder::new().pointer("a.txt", "dlc.arc").build()).unwrap();
        let entry = archive.entry("a.txt").unwrap();
        assert!(entry.is_pointer());

        let err = archive.extract(entry).unwrap_err();
        assert!(matches!(err, AssetError::UnresolvedPointer { ref target, .. } if target == "DLC.ARC"));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = ArchiveBuilder::new().file("a.txt", b"a").build();
        bytes[0] = b'X';
        assert!(matches!(open(bytes).unwrap_err(), AssetError::InvalidFormat { .. }));

        let mut bytes = ArchiveBuilder::new().file("a.txt", b"a").build();
        bytes[5] = b'X';
        assert!(matches!(open(bytes).unwrap_err(), AssetError::InvalidFormat { .. }));
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let bytes = ArchiveBuilder::new()
            .extra_chunk(*b"META", b"built by tests")
            .file("a.txt", b"a")
            .build();
        let archive = open(bytes).unwrap();
        assert_eq!(archive.read("a.txt").unwrap(), b"a");
    }

    #[test]
    fn test_truncated_file() {
        let bytes = ArchiveBuilder::new().file("a.txt", b"abcdef").build();
        let cut = bytes.len() - 3;
        let err = open(bytes[..cut].to_vec()).unwrap_err();
        assert!(matches!(err, AssetError::InvalidFormat { .. }));

        assert!(matches!(open(b"CAIR".to_vec()).unwrap_err(), AssetError::InvalidFormat { .. }));
    }

    #[test]
    fn test_duplicate_entries_keep_first() {
        let bytes = ArchiveBuilder::new()
            .file("a.txt", b"first")
            .file("A.TXT", b"second")
            .build();
        let archive = open(bytes).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.read("a.txt").unwrap(), b"first");
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archive::open(dir.path().join("nope.arc")).unwrap_err();
        assert!(matches!(err, AssetError::IoError { .. }));
    }

    #[test]
    fn test_parallel_extraction() {
        let mut builder = ArchiveBuilder::new();
        for i in 0..32 {
            builder = builder.file_with(&format!("f{}.bin", i), &vec![i as u8; 1000 + i], Codec::Lz4);
        }
        let archive = std::sync::Arc::new(open(builder.build()).unwrap());

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let archive = archive.clone();
                std::thread::spawn(move || {
                    for i in (t..32).step_by(4) {
                        let bytes = archive.read(&format!("f{}.bin", i)).unwrap();
                        assert_eq!(bytes, vec![i as u8; 1000 + i]);
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }
}

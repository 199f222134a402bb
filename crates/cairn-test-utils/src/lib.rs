//! Test utilities for Cairn.
//!
//! - [`ArchiveBuilder`] writes asset archives in the on-disk container format,
//!   so tests can produce fixtures without checking binaries into the tree.
//! - [`TestTree`] is a temporary directory with helpers for dropping loose
//!   files and archives into it.
//!
//! This crate deliberately does not depend on `cairn-assets`; the few format
//! constants it needs are repeated here.
//!
//! # Example
//!
//! ```rust
//! use cairn_test_utils::{ArchiveBuilder, Codec, TestTree};
//!
//! let tree = TestTree::new();
//! let path = tree.archive(
//!     "core.arc",
//!     ArchiveBuilder::new()
//!         .file("hello.txt", b"a")
//!         .file_with("level.dat", &[0u8; 512], Codec::Lz4),
//! );
//! assert!(path.exists());
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

const PRODUCT_TAG: [u8; 4] = *b"CAIR";
const CONTAINER_TAG: [u8; 4] = *b"ARCV";
const DIRECTORY_TAG: [u8; 4] = *b"DIRX";
const PAYLOAD_TAG: [u8; 4] = *b"DATA";

/// Payload encoding for a built entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Stored,
    Lz4,
    Deflate,
}

impl Codec {
    fn code(self) -> u8 {
        match self {
            Codec::Stored => 0,
            Codec::Lz4 => 1,
            Codec::Deflate => 2,
        }
    }

    fn encode(self, data: &[u8]) -> Vec<u8> {
        match self {
            Codec::Stored => data.to_vec(),
            Codec::Lz4 => lz4_flex::block::compress_prepend_size(data),
            Codec::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(data)
                    .expect("writing to a Vec cannot fail");
                encoder.finish().expect("writing to a Vec cannot fail")
            }
        }
    }
}

enum BuiltEntry {
    Data {
        name: String,
        codec: Codec,
        payload: Vec<u8>,
    },
    Pointer {
        name: String,
        target: String,
    },
}

/// Builds an archive image in memory.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<BuiltEntry>,
    extra_chunks: Vec<([u8; 4], Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an uncompressed entry.
    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.file_with(name, data, Codec::Stored)
    }

    /// Add an entry encoded with `codec`.
    pub fn file_with(mut self, name: &str, data: &[u8], codec: Codec) -> Self {
        self.entries.push(BuiltEntry::Data {
            name: name.to_string(),
            codec,
            payload: codec.encode(data),
        });
        self
    }

    /// Add a pointer entry aliasing `name` in the archive `target`.
    pub fn pointer(mut self, name: &str, target: &str) -> Self {
        self.entries.push(BuiltEntry::Pointer {
            name: name.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Add an unrelated top-level chunk before the directory.
    pub fn extra_chunk(mut self, tag: [u8; 4], body: &[u8]) -> Self {
        self.extra_chunks.push((tag, body.to_vec()));
        self
    }

    /// Serialize the archive.
    pub fn build(&self) -> Vec<u8> {
        let mut directory = Vec::new();
        let mut payload = Vec::new();

        for entry in &self.entries {
            match entry {
                BuiltEntry::Data {
                    name,
                    codec,
                    payload: bytes,
                } => {
                    put_name(&mut directory, name);
                    directory.push(0);
                    directory.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                    directory.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                    directory.push(codec.code());
                    payload.extend_from_slice(bytes);
                }
                BuiltEntry::Pointer { name, target } => {
                    put_name(&mut directory, name);
                    directory.push(1);
                    put_name(&mut directory, target);
                }
            }
        }

        let extra_len: usize = self.extra_chunks.iter().map(|(_, b)| 8 + b.len()).sum();
        // header + extra chunks + directory chunk header + DATA marker + offset
        let payload_start = 8 + extra_len + 8 + 8 + directory.len();

        let mut out = Vec::with_capacity(payload_start + payload.len());
        out.extend_from_slice(&PRODUCT_TAG);
        out.extend_from_slice(&CONTAINER_TAG);

        for (tag, body) in &self.extra_chunks {
            out.extend_from_slice(tag);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(body);
        }

        out.extend_from_slice(&DIRECTORY_TAG);
        out.extend_from_slice(&((8 + directory.len()) as u32).to_le_bytes());
        out.extend_from_slice(&PAYLOAD_TAG);
        out.extend_from_slice(&(payload_start as u32).to_le_bytes());
        out.extend_from_slice(&directory);

        debug_assert_eq!(out.len(), payload_start);
        out.extend_from_slice(&payload);
        out
    }

    /// Serialize the archive to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
}

/// A temporary directory that is removed on drop.
pub struct TestTree {
    dir: tempfile::TempDir,
}

impl TestTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of `rel` inside the tree, without creating anything.
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a loose file, creating parent directories as needed.
    pub fn file(&self, rel: impl AsRef<Path>, data: impl AsRef<[u8]>) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(&path, data).expect("failed to write test file");
        path
    }

    /// Write a built archive into the tree.
    pub fn archive(&self, rel: impl AsRef<Path>, builder: ArchiveBuilder) -> PathBuf {
        self.file(rel, builder.build())
    }

    /// Create an empty subdirectory.
    pub fn dir(&self, rel: impl AsRef<Path>) -> PathBuf {
        let path = self.join(rel);
        std::fs::create_dir_all(&path).expect("failed to create dir");
        path
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

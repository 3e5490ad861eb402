// src/engine/io.rs
//
// File plumbing for the batch driver: zero-copy input sources and
// atomic output writes.

use crate::error::ListingImageError;
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

type IoResult<T> = std::result::Result<T, ListingImageError>;

/// Input bytes for one normalization, however they arrived.
///
/// `Mapped` is what the batch driver produces: the kernel pages the file in
/// as the decoder touches it, and nothing is copied up front. `Memory` covers
/// callers that already hold a buffer. `Path` defers the read entirely.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data.
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file, zero-copy access.
    Mapped(Arc<Mmap>),
    /// File path, read only when the bytes are first needed.
    Path(PathBuf),
}

impl Source {
    /// The bytes without any copying. None only for `Path`, which has not
    /// been read yet; use [`Source::load`] for those.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    /// Materialize the bytes. `Mapped` copies here, so prefer
    /// [`Source::as_bytes`] anywhere a slice is enough.
    pub fn load(&self) -> IoResult<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Mapped(mmap) => Ok(Arc::new(mmap.as_ref().to_vec())),
            Source::Path(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    ListingImageError::file_read_failed(path.display().to_string(), e)
                })?;
                Ok(Arc::new(data))
            }
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Source::Path(p) => Some(p),
            Source::Memory(_) | Source::Mapped(_) => None,
        }
    }

    /// Known byte length; 0 for an unread `Path`.
    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
            Source::Path(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Open an input file as a read-only memory map.
///
/// Zero-length files skip the mapping (mmap rejects them) and come back as
/// an empty `Memory` source; the decoder rejects those with a proper error.
pub fn open_mapped(path: &Path) -> IoResult<Source> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ListingImageError::file_not_found(path.display().to_string())
        } else {
            ListingImageError::file_read_failed(path.display().to_string(), e)
        }
    })?;
    let metadata = file
        .metadata()
        .map_err(|e| ListingImageError::file_read_failed(path.display().to_string(), e))?;
    if metadata.len() == 0 {
        return Ok(Source::Memory(Arc::new(Vec::new())));
    }
    // Safety: the map is read-only and batch inputs are treated as immutable
    // for the duration of a run.
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| ListingImageError::mmap_failed(path.display().to_string(), e))?;
    Ok(Source::Mapped(Arc::new(mmap)))
}

/// Write encoded bytes to `path` atomically: a temp file in the same
/// directory, fsync, then rename. Readers never observe a partial file, and
/// a failed item leaves no output behind.
pub fn write_atomic(path: &Path, bytes: &[u8], overwrite: bool) -> IoResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let write_err =
        |e: std::io::Error| ListingImageError::file_write_failed(path.display().to_string(), e);

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    if overwrite {
        tmp.persist(path).map_err(|e| write_err(e.error))?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| write_err(e.error))?;
    }
    Ok(())
}

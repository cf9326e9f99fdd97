//! File Source: named image blobs in persistent storage.
//!
//! Decoders never see the storage medium. They get an [`ImageSource`], which
//! is an `embedded-io` reader that can also seek and report its size, and
//! they pull bytes through it. Stores resolve every bare filename under
//! [`IMAGE_ROOT`].
//!
//! Opening a source borrows the store mutably, so a store can only have one
//! open handle at a time. Dropping the handle closes it.

use alloc::{
    collections::BTreeMap,
    format,
    string::String,
    vec::Vec,
};
use core::fmt;

use embedded_io::{
    ErrorKind,
    ErrorType,
    Read,
    Seek,
    SeekFrom,
};

use crate::config::IMAGE_ROOT;

/// Storage-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// No image with that name under the image root.
    NotFound,
    /// Seek target lies outside the file.
    InvalidSeek,
    /// The store's capacity would be exceeded.
    OutOfSpace,
    /// Name does not fit a directory entry.
    NameTooLong,
    /// The flash device failed a read, write or erase.
    Flash,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("file not found"),
            Self::InvalidSeek => f.write_str("seek outside file"),
            Self::OutOfSpace => f.write_str("storage full"),
            Self::NameTooLong => f.write_str("name too long"),
            Self::Flash => f.write_str("flash error"),
        }
    }
}

impl embedded_io::Error for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidSeek => ErrorKind::InvalidInput,
            Self::OutOfSpace => ErrorKind::OutOfMemory,
            Self::NameTooLong => ErrorKind::InvalidInput,
            Self::Flash => ErrorKind::Other,
        }
    }
}

/// An open image: a seekable byte stream of known size.
pub trait ImageSource: Read + Seek {
    /// Bare filename the source was opened with.
    fn name(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u32;
}

/// A directory of images addressed by bare filename.
pub trait ImageStore {
    type Source<'a>: ImageSource
    where
        Self: 'a;

    /// Whether `name` exists under the image root.
    fn exists(&self, name: &str) -> bool;

    /// Size in bytes of `name`, if it exists.
    fn size(&self, name: &str) -> Option<u32>;

    /// Opens `name` for reading.
    fn open(&mut self, name: &str) -> Result<Self::Source<'_>, StorageError>;
}

/// Full storage path for a bare filename.
#[must_use]
pub fn resolve_path(name: &str) -> String {
    format!("{IMAGE_ROOT}{name}")
}

// ── In-memory store ─────────────────────────────────────────────────────────

/// One listed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEntry<'a> {
    pub name: &'a str,
    pub size: u32,
}

/// Heap-backed image store.
///
/// This is what the web layer writes uploads into and what the renderer
/// reads from. Keys are full paths under [`IMAGE_ROOT`].
pub struct MemoryStore {
    files: BTreeMap<String, Vec<u8>>,
    capacity: usize,
}

impl MemoryStore {
    /// Creates an empty store holding at most `capacity` bytes of image data.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently used by stored images.
    pub fn usage(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Stores `bytes` as `name`, replacing any previous image of that name.
    pub fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = resolve_path(name);
        let replaced = self.files.get(&path).map_or(0, Vec::len);
        if self.usage() - replaced + bytes.len() > self.capacity {
            warn!("store: no room for {} ({} bytes)", name, bytes.len());
            return Err(StorageError::OutOfSpace);
        }

        self.files.insert(path, bytes.to_vec());
        info!("store: wrote {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    /// Appends an upload chunk to `name`, creating it when `offset` is zero.
    ///
    /// Mirrors a chunked HTTP upload: the first chunk truncates any existing
    /// file, later chunks extend it.
    pub fn append(&mut self, name: &str, offset: usize, chunk: &[u8]) -> Result<(), StorageError> {
        if offset == 0 {
            return self.write(name, chunk);
        }
        if self.usage() + chunk.len() > self.capacity {
            warn!("store: upload of {} overflows at offset {}", name, offset);
            return Err(StorageError::OutOfSpace);
        }

        let file = self
            .files
            .get_mut(&resolve_path(name))
            .ok_or(StorageError::NotFound)?;
        file.extend_from_slice(chunk);
        debug!("store: {} now {} bytes", name, file.len());
        Ok(())
    }

    /// Deletes `name`.
    pub fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match self.files.remove(&resolve_path(name)) {
            Some(_) => {
                info!("store: deleted {}", name);
                Ok(())
            }
            None => Err(StorageError::NotFound),
        }
    }

    /// Stored images in name order.
    pub fn list(&self) -> impl Iterator<Item = ImageEntry<'_>> {
        self.files.iter().filter_map(|(path, data)| {
            path.strip_prefix(IMAGE_ROOT).map(|name| ImageEntry {
                name,
                size: data.len() as u32,
            })
        })
    }
}

impl ImageStore for MemoryStore {
    type Source<'a> = MemoryFile<'a>;

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(&resolve_path(name))
    }

    fn size(&self, name: &str) -> Option<u32> {
        self.files
            .get(&resolve_path(name))
            .map(|data| data.len() as u32)
    }

    fn open(&mut self, name: &str) -> Result<MemoryFile<'_>, StorageError> {
        let path = resolve_path(name);
        let Some((path, data)) = self.files.get_key_value(&path) else {
            warn!("store: failed to open {}", name);
            return Err(StorageError::NotFound);
        };

        debug!("store: opened {} ({} bytes)", name, data.len());
        Ok(MemoryFile {
            name: &path[IMAGE_ROOT.len()..],
            data,
            pos: 0,
        })
    }
}

/// Read handle into a [`MemoryStore`] image.
pub struct MemoryFile<'a> {
    name: &'a str,
    data: &'a [u8],
    pos: usize,
}

impl ErrorType for MemoryFile<'_> {
    type Error = StorageError;
}

impl Read for MemoryFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let rest = &self.data[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for MemoryFile<'_> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StorageError> {
        let len = self.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::End(delta) => len.saturating_add(delta),
            SeekFrom::Current(delta) => (self.pos as i64).saturating_add(delta),
        };
        if !(0..=len).contains(&target) {
            return Err(StorageError::InvalidSeek);
        }

        self.pos = target as usize;
        Ok(target as u64)
    }
}

impl ImageSource for MemoryFile<'_> {
    fn name(&self) -> &str {
        self.name
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(name: &str, bytes: &[u8]) -> MemoryStore {
        let mut store = MemoryStore::new(1024);
        store.write(name, bytes).unwrap();
        store
    }

    #[test]
    fn names_resolve_under_image_root() {
        assert_eq!(resolve_path("photo.png"), "/images/photo.png");

        let store = store_with("photo.png", b"abc");
        assert!(store.exists("photo.png"));
        assert!(!store.exists("/images/photo.png"));
        assert!(!store.exists("other.png"));
    }

    #[test]
    fn open_missing_is_not_found() {
        let mut store = MemoryStore::new(16);
        assert_eq!(store.open("missing.jpg").err(), Some(StorageError::NotFound));
    }

    #[test]
    fn read_seek_and_size() {
        let mut store = store_with("a.png", b"0123456789");
        let mut file = store.open("a.png").unwrap();
        assert_eq!(file.name(), "a.png");
        assert_eq!(file.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");

        assert_eq!(file.seek(SeekFrom::Current(2)).unwrap(), 6);
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"6789");
        assert_eq!(file.read(&mut buf).unwrap(), 0);

        assert_eq!(file.seek(SeekFrom::End(-3)).unwrap(), 7);
        assert_eq!(file.seek(SeekFrom::Start(11)), Err(StorageError::InvalidSeek));
        assert_eq!(file.seek(SeekFrom::Current(-8)), Err(StorageError::InvalidSeek));
        assert_eq!(file.stream_position().unwrap(), 7);
    }

    #[test]
    fn chunked_upload_then_list_and_remove() {
        let mut store = MemoryStore::new(64);
        store.append("b.jpg", 0, b"head").unwrap();
        store.append("b.jpg", 4, b"tail").unwrap();
        store.write("a.png", b"xy").unwrap();

        let listed: Vec<_> = store.list().collect();
        assert_eq!(
            listed,
            [
                ImageEntry { name: "a.png", size: 2 },
                ImageEntry { name: "b.jpg", size: 8 },
            ]
        );
        assert_eq!(store.usage(), 10);

        // A fresh upload of the same name starts over.
        store.append("b.jpg", 0, b"new").unwrap();
        assert_eq!(store.size("b.jpg"), Some(3));

        store.remove("a.png").unwrap();
        assert_eq!(store.remove("a.png"), Err(StorageError::NotFound));
        assert_eq!(store.append("gone.png", 10, b"x"), Err(StorageError::NotFound));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut store = MemoryStore::new(8);
        store.write("a.png", &[0; 6]).unwrap();
        assert_eq!(store.write("b.png", &[0; 3]), Err(StorageError::OutOfSpace));
        // Replacing counts only the difference.
        store.write("a.png", &[0; 8]).unwrap();
        assert_eq!(store.append("a.png", 8, &[0]), Err(StorageError::OutOfSpace));
    }
}

//! Image store on a NOR flash partition.
//!
//! Uploaded images survive a reboot. The first erase sector of the partition
//! is the directory and the rest is cut into equal slots, one image per slot.
//! Directory entry `i` describes slot `i`: a magic word, the image size and
//! the full path, NUL padded, all little-endian. An erased entry reads back
//! as `0xFF` and marks its slot free.
//!
//! Image data is written front to back and each sector is erased just before
//! the first write into it. The directory is cached in RAM and rewritten with
//! a single sector erase whenever it changes.

use alloc::{
    string::String,
    vec,
    vec::Vec,
};
use core::ops::Range;

use embedded_io::{
    ErrorType,
    Read,
    Seek,
    SeekFrom,
};
use embedded_storage::nor_flash::{
    NorFlash,
    ReadNorFlash,
};

use crate::{
    config::IMAGE_ROOT,
    source::{
        ImageEntry,
        ImageSource,
        ImageStore,
        StorageError,
        resolve_path,
    },
};

/// Bytes per directory entry.
pub const ENTRY_SIZE: usize = 64;
/// Longest full path a directory entry holds.
pub const MAX_PATH_LEN: usize = ENTRY_SIZE - 8;

const ENTRY_MAGIC: u32 = u32::from_le_bytes(*b"IMG1");

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    path: String,
    size: u32,
}

impl Entry {
    fn encode(&self, raw: &mut [u8]) {
        raw.fill(0);
        raw[..4].copy_from_slice(&ENTRY_MAGIC.to_le_bytes());
        raw[4..8].copy_from_slice(&self.size.to_le_bytes());
        raw[8..8 + self.path.len()].copy_from_slice(self.path.as_bytes());
    }

    fn decode(raw: &[u8], slot_size: u32) -> Option<Self> {
        let magic = u32::from_le_bytes(raw[..4].try_into().ok()?);
        let size = u32::from_le_bytes(raw[4..8].try_into().ok()?);
        if magic != ENTRY_MAGIC || size > slot_size {
            return None;
        }

        let name = &raw[8..];
        let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let path = core::str::from_utf8(&name[..len]).ok()?;
        path.starts_with(IMAGE_ROOT).then(|| Self {
            path: path.into(),
            size,
        })
    }
}

fn device(op: &'static str) -> StorageError {
    error!("flash: {} failed", op);
    StorageError::Flash
}

/// Persistent image store over a NOR flash partition.
pub struct FlashStore<F> {
    flash: F,
    range: Range<u32>,
    slot_size: u32,
    slots: Vec<Option<Entry>>,
    dirty: bool,
}

impl<F: NorFlash> FlashStore<F> {
    /// Loads the directory at the start of `range`.
    ///
    /// `range` and `slot_size` must be whole erase sectors. A blank partition
    /// mounts as an empty store.
    pub fn mount(mut flash: F, range: Range<u32>, slot_size: u32) -> Result<Self, StorageError> {
        let sector = F::ERASE_SIZE as u32;
        let aligned = range.start % sector == 0 && range.end % sector == 0 && slot_size % sector == 0;
        if !aligned || slot_size == 0 || ENTRY_SIZE % F::READ_SIZE != 0 || ENTRY_SIZE % F::WRITE_SIZE != 0 {
            error!("flash: partition layout does not match the device sectors");
            return Err(StorageError::Flash);
        }

        let data = range.end.saturating_sub(range.start).saturating_sub(sector);
        let count = ((data / slot_size) as usize).min(F::ERASE_SIZE / ENTRY_SIZE);
        if count == 0 {
            error!("flash: partition has no room for a slot");
            return Err(StorageError::OutOfSpace);
        }

        let mut dir = vec![0_u8; count * ENTRY_SIZE];
        flash.read(range.start, &mut dir).map_err(|_| device("read"))?;
        let slots: Vec<_> = dir
            .chunks_exact(ENTRY_SIZE)
            .map(|raw| Entry::decode(raw, slot_size))
            .collect();

        info!(
            "flash: mounted {} slots of {} bytes, {} images",
            count,
            slot_size,
            slots.iter().flatten().count()
        );
        Ok(Self {
            flash,
            range,
            slot_size,
            slots,
            dirty: false,
        })
    }

    /// Gives the flash device back.
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Largest image one slot holds.
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn capacity(&self) -> usize {
        self.slots.len() * self.slot_size as usize
    }

    /// Bytes currently used by stored images.
    pub fn usage(&self) -> usize {
        self.slots.iter().flatten().map(|e| e.size as usize).sum()
    }

    /// Stores `bytes` as `name`, replacing any previous image of that name.
    pub fn write(&mut self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = resolve_path(name);
        if path.len() > MAX_PATH_LEN {
            warn!("flash: name {} too long", name);
            return Err(StorageError::NameTooLong);
        }
        if bytes.len() > self.slot_size as usize {
            warn!("flash: no room for {} ({} bytes)", name, bytes.len());
            return Err(StorageError::OutOfSpace);
        }
        let Some(slot) = self.find(&path).or_else(|| self.slots.iter().position(Option::is_none)) else {
            warn!("flash: no free slot for {}", name);
            return Err(StorageError::OutOfSpace);
        };

        if self.slots[slot].take().is_some() {
            self.dirty = true;
        }
        self.program(slot, 0, bytes)?;
        self.slots[slot] = Some(Entry {
            path,
            size: bytes.len() as u32,
        });
        self.dirty = true;
        self.sync()?;
        info!("flash: wrote {} ({} bytes) to slot {}", name, bytes.len(), slot);
        Ok(())
    }

    /// Appends an upload chunk to `name`, creating it when `offset` is zero.
    ///
    /// The first chunk is written like [`write`](Self::write). Later chunks
    /// extend the image, and the grown size reaches flash on the next
    /// [`sync`](Self::sync).
    pub fn append(&mut self, name: &str, offset: usize, chunk: &[u8]) -> Result<(), StorageError> {
        if offset == 0 {
            return self.write(name, chunk);
        }

        let slot = self.find(&resolve_path(name)).ok_or(StorageError::NotFound)?;
        let start = self.slots[slot].as_ref().map_or(0, |e| e.size);
        let end = start as usize + chunk.len();
        if end > self.slot_size as usize {
            warn!("flash: upload of {} overflows at offset {}", name, offset);
            return Err(StorageError::OutOfSpace);
        }

        self.program(slot, start, chunk)?;
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.size = end as u32;
        }
        self.dirty = true;
        debug!("flash: {} now {} bytes", name, end);
        Ok(())
    }

    /// Writes the directory back if it changed.
    pub fn sync(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }

        let mut dir = vec![0xFF_u8; self.slots.len() * ENTRY_SIZE];
        for (raw, entry) in dir.chunks_exact_mut(ENTRY_SIZE).zip(&self.slots) {
            if let Some(entry) = entry {
                entry.encode(raw);
            }
        }

        let start = self.range.start;
        self.flash
            .erase(start, start + F::ERASE_SIZE as u32)
            .map_err(|_| device("erase"))?;
        self.flash.write(start, &dir).map_err(|_| device("write"))?;
        self.dirty = false;
        debug!("flash: directory written");
        Ok(())
    }

    /// Deletes `name`. Its slot is erased again when it is reused.
    pub fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        let slot = self.find(&resolve_path(name)).ok_or(StorageError::NotFound)?;
        self.slots[slot] = None;
        self.dirty = true;
        self.sync()?;
        info!("flash: deleted {}", name);
        Ok(())
    }

    /// Erases the whole partition.
    pub fn erase_all(&mut self) -> Result<(), StorageError> {
        self.flash
            .erase(self.range.start, self.range.end)
            .map_err(|_| device("erase"))?;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.dirty = false;
        info!("flash: partition erased");
        Ok(())
    }

    /// Stored images in slot order.
    pub fn list(&self) -> impl Iterator<Item = ImageEntry<'_>> {
        self.slots.iter().flatten().map(|entry| ImageEntry {
            name: &entry.path[IMAGE_ROOT.len()..],
            size: entry.size,
        })
    }

    fn find(&self, path: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.path == path))
    }

    fn slot_base(&self, slot: usize) -> u32 {
        self.range.start + F::ERASE_SIZE as u32 + slot as u32 * self.slot_size
    }

    fn program(&mut self, slot: usize, offset: u32, bytes: &[u8]) -> Result<(), StorageError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let sector = F::ERASE_SIZE as u32;
        let base = self.slot_base(slot);
        // Sectors from the first boundary at or past `offset` hold stale data.
        let fresh = offset.next_multiple_of(sector);
        let erase_to = (offset + bytes.len() as u32).next_multiple_of(sector);
        if fresh < erase_to {
            self.flash
                .erase(base + fresh, base + erase_to)
                .map_err(|_| device("erase"))?;
        }
        write_padded(&mut self.flash, base + offset, bytes).map_err(|_| device("write"))
    }
}

/// Programs `bytes` at any address, padding to the write size with `0xFF`.
///
/// Padding leaves already written neighbours untouched, since programming
/// can only clear bits.
fn write_padded<F: NorFlash>(flash: &mut F, addr: u32, bytes: &[u8]) -> Result<(), F::Error> {
    let align = F::WRITE_SIZE;
    let mut buf = [0xFF_u8; 256];
    let mut lead = addr as usize % align;
    let mut at = addr - lead as u32;
    let mut rest = bytes;

    while !rest.is_empty() {
        let n = (buf.len() - lead).min(rest.len());
        buf.fill(0xFF);
        buf[lead..lead + n].copy_from_slice(&rest[..n]);
        let len = (lead + n).next_multiple_of(align);
        flash.write(at, &buf[..len])?;

        at += len as u32;
        rest = &rest[n..];
        lead = 0;
    }
    Ok(())
}

/// Reads `out.len()` bytes from any address, bouncing unaligned edges.
fn read_unaligned<F: ReadNorFlash>(flash: &mut F, addr: u32, out: &mut [u8]) -> Result<(), F::Error> {
    let align = F::READ_SIZE;
    let mut bounce = [0_u8; ENTRY_SIZE];
    let mut at = addr;
    let mut out = out;

    while !out.is_empty() {
        let skip = at as usize % align;
        let n = if skip == 0 && out.len() >= align {
            let n = out.len() - out.len() % align;
            flash.read(at, &mut out[..n])?;
            n
        } else {
            let n = (bounce.len() - skip).min(out.len());
            let len = (skip + n).next_multiple_of(align);
            flash.read(at - skip as u32, &mut bounce[..len])?;
            out[..n].copy_from_slice(&bounce[skip..skip + n]);
            n
        };

        at += n as u32;
        out = &mut core::mem::take(&mut out)[n..];
    }
    Ok(())
}

impl<F: NorFlash> ImageStore for FlashStore<F> {
    type Source<'a>
        = FlashFile<'a, F>
    where
        Self: 'a;

    fn exists(&self, name: &str) -> bool {
        self.find(&resolve_path(name)).is_some()
    }

    fn size(&self, name: &str) -> Option<u32> {
        let slot = self.find(&resolve_path(name))?;
        self.slots[slot].as_ref().map(|e| e.size)
    }

    fn open(&mut self, name: &str) -> Result<FlashFile<'_, F>, StorageError> {
        let found = self.find(&resolve_path(name));
        let Some(slot) = found else {
            warn!("flash: failed to open {}", name);
            return Err(StorageError::NotFound);
        };
        let base = self.slot_base(slot);
        let Some(entry) = self.slots[slot].as_ref() else {
            return Err(StorageError::NotFound);
        };

        debug!("flash: opened {} ({} bytes)", name, entry.size);
        Ok(FlashFile {
            flash: &mut self.flash,
            name: &entry.path[IMAGE_ROOT.len()..],
            base,
            size: entry.size,
            pos: 0,
        })
    }
}

/// Read handle into a [`FlashStore`] image.
pub struct FlashFile<'a, F> {
    flash: &'a mut F,
    name: &'a str,
    base: u32,
    size: u32,
    pos: u32,
}

impl<F: NorFlash> ErrorType for FlashFile<'_, F> {
    type Error = StorageError;
}

impl<F: NorFlash> Read for FlashFile<'_, F> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = ((self.size - self.pos) as usize).min(buf.len());
        read_unaligned(&mut *self.flash, self.base + self.pos, &mut buf[..n]).map_err(|_| device("read"))?;
        self.pos += n as u32;
        Ok(n)
    }
}

impl<F: NorFlash> Seek for FlashFile<'_, F> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, StorageError> {
        let len = i64::from(self.size);
        let target = match pos {
            SeekFrom::Start(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
            SeekFrom::End(delta) => len.saturating_add(delta),
            SeekFrom::Current(delta) => i64::from(self.pos).saturating_add(delta),
        };
        if !(0..=len).contains(&target) {
            return Err(StorageError::InvalidSeek);
        }

        self.pos = target as u32;
        Ok(target as u64)
    }
}

impl<F: NorFlash> ImageSource for FlashFile<'_, F> {
    fn name(&self) -> &str {
        self.name
    }

    fn size(&self) -> u32 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemFlash;

    const SECTOR: u32 = 4096;
    const PARTITION: Range<u32> = 0..16 * SECTOR;
    const SLOT: u32 = 4 * SECTOR;

    fn blank() -> FlashStore<MemFlash> {
        FlashStore::mount(MemFlash::new(PARTITION.end as usize), PARTITION, SLOT).unwrap()
    }

    fn remount(store: FlashStore<MemFlash>) -> FlashStore<MemFlash> {
        FlashStore::mount(store.into_inner(), PARTITION, SLOT).unwrap()
    }

    fn contents(store: &mut FlashStore<MemFlash>, name: &str) -> Vec<u8> {
        let mut file = store.open(name).unwrap();
        let mut out = vec![0; file.size() as usize];
        file.read_exact(&mut out).unwrap();
        out
    }

    #[test]
    fn blank_partition_mounts_empty() {
        let store = blank();
        // One directory sector, then three whole slots.
        assert_eq!(store.capacity(), 3 * SLOT as usize);
        assert_eq!(store.usage(), 0);
        assert_eq!(store.list().count(), 0);
        assert!(!store.exists("photo.png"));
    }

    #[test]
    fn misaligned_partition_is_rejected() {
        let flash = MemFlash::new(PARTITION.end as usize);
        assert_eq!(FlashStore::mount(flash, 100..PARTITION.end, SLOT).err(), Some(StorageError::Flash));

        let flash = MemFlash::new(PARTITION.end as usize);
        assert_eq!(FlashStore::mount(flash, 0..SECTOR, SLOT).err(), Some(StorageError::OutOfSpace));
    }

    #[test]
    fn uploads_survive_a_remount() {
        let mut store = blank();
        store.write("a.png", b"first image").unwrap();

        let body: Vec<u8> = (0..5000_u32).map(|i| (i * 7 + i / 256) as u8).collect();
        store.append("b.jpg", 0, &body[..3]).unwrap();
        store.append("b.jpg", 3, &body[3..4101]).unwrap();
        store.append("b.jpg", 4101, &body[4101..]).unwrap();
        store.sync().unwrap();

        let mut store = remount(store);
        let listed: Vec<_> = store.list().collect();
        assert_eq!(
            listed,
            [
                ImageEntry { name: "a.png", size: 11 },
                ImageEntry { name: "b.jpg", size: 5000 },
            ]
        );
        assert_eq!(store.usage(), 5011);
        assert_eq!(contents(&mut store, "a.png"), b"first image");
        assert_eq!(contents(&mut store, "b.jpg"), body);
    }

    #[test]
    fn growth_since_the_last_sync_is_not_persisted() {
        let mut store = blank();
        store.append("c.png", 0, b"head").unwrap();
        store.append("c.png", 4, b"tail").unwrap();
        assert_eq!(store.size("c.png"), Some(8));

        let mut store = remount(store);
        assert_eq!(store.size("c.png"), Some(4));
        assert_eq!(contents(&mut store, "c.png"), b"head");
    }

    #[test]
    fn reads_and_seeks_at_odd_offsets() {
        let mut store = blank();
        let body: Vec<u8> = (0..300_u32).map(|i| i as u8).collect();
        store.write("odd.png", &body).unwrap();

        let mut file = store.open("odd.png").unwrap();
        assert_eq!(file.name(), "odd.png");
        assert_eq!(file.size(), 300);

        let mut buf = [0_u8; 7];
        assert_eq!(file.seek(SeekFrom::Start(3)).unwrap(), 3);
        assert_eq!(file.read(&mut buf).unwrap(), 7);
        assert_eq!(buf, [3, 4, 5, 6, 7, 8, 9]);

        let mut wide = [0_u8; 130];
        assert_eq!(file.seek(SeekFrom::Current(1)).unwrap(), 11);
        assert_eq!(file.read(&mut wide).unwrap(), 130);
        assert_eq!(wide.as_slice(), &body[11..141]);

        assert_eq!(file.seek(SeekFrom::End(-5)).unwrap(), 295);
        assert_eq!(file.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &body[295..]);
        assert_eq!(file.read(&mut buf).unwrap(), 0);

        assert_eq!(file.seek(SeekFrom::Start(301)), Err(StorageError::InvalidSeek));
        assert_eq!(file.seek(SeekFrom::Current(-400)), Err(StorageError::InvalidSeek));
    }

    #[test]
    fn rewriting_a_name_reuses_its_slot() {
        let mut store = blank();
        store.write("a.png", &[0; 100]).unwrap();
        store.write("a.png", b"xyz").unwrap();

        assert_eq!(store.list().count(), 1);
        assert_eq!(contents(&mut store, "a.png"), b"xyz");
        let mut store = remount(store);
        assert_eq!(contents(&mut store, "a.png"), b"xyz");
    }

    #[test]
    fn slots_names_and_sizes_are_bounded() {
        let mut store = blank();
        for name in ["a.png", "b.png", "c.png"] {
            store.write(name, b"data").unwrap();
        }
        assert_eq!(store.write("d.png", b"data"), Err(StorageError::OutOfSpace));

        store.remove("b.png").unwrap();
        assert_eq!(store.remove("b.png"), Err(StorageError::NotFound));
        store.write("d.png", b"data").unwrap();
        assert!(remount(store).exists("d.png"));

        let mut store = blank();
        let big = vec![0_u8; SLOT as usize + 1];
        assert_eq!(store.write("big.jpg", &big), Err(StorageError::OutOfSpace));
        assert_eq!(store.write(&"n".repeat(60), b"x"), Err(StorageError::NameTooLong));
        assert_eq!(store.append("gone.png", 10, b"x"), Err(StorageError::NotFound));

        store.write("full.jpg", &big[1..]).unwrap();
        assert_eq!(store.append("full.jpg", SLOT as usize, b"x"), Err(StorageError::OutOfSpace));
    }

    #[test]
    fn erase_all_forgets_everything() {
        let mut store = blank();
        store.write("a.png", b"abc").unwrap();
        store.erase_all().unwrap();
        assert_eq!(store.list().count(), 0);
        assert!(!remount(store).exists("a.png"));
    }

    #[test]
    fn unchanged_directory_is_not_rewritten() {
        let mut store = blank();
        store.write("a.png", b"abc").unwrap();
        store.sync().unwrap();
        let erases = store.into_inner().erases;
        // One for the data sector, one for the directory.
        assert_eq!(erases, 2);
    }
}

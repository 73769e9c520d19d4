//! File slot pool and directory operations over a [`FileSystem`]

use embassy_time::Duration;
use heapless::String;
use kiln_hal::fs::MAX_NAME_LENGTH;
use kiln_hal::{DirEntry, FileSystem, OpenMode};

use super::error::{Path, StorageError};
use super::file_store::FileStore;
use crate::fmt::{debug, info, warn};

/// Handle of an open file slot
///
/// Carries the slot's open count at the time it was issued, so a handle
/// kept past its final close cannot reach a file opened later in the same
/// slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileId {
    index: usize,
    generation: u16,
}

impl FileId {
    /// Slot index
    pub fn index(self) -> usize {
        self.index
    }
}

/// One directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FileInfo {
    /// Entry name
    pub file_name: String<MAX_NAME_LENGTH>,
    /// Size in bytes
    pub size: u32,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Day of month, 1-31
    pub day: u8,
    /// Month, 1-12 (0 if the medium holds none)
    pub month: u8,
    /// Calendar year
    pub year: u16,
}

impl From<DirEntry> for FileInfo {
    fn from(entry: DirEntry) -> Self {
        // Day 0 shows up when a transfer was never completed
        let day = match (entry.fat_date & 0x1F) as u8 {
            0 => 1,
            day => day,
        };
        Self {
            file_name: entry.name,
            size: entry.size,
            is_directory: entry.is_directory,
            day,
            month: ((entry.fat_date & 0x01E0) >> 5) as u8,
            year: (entry.fat_date >> 9) + 1980,
        }
    }
}

const MONTH_NAMES: [&str; 13] = [
    "???", "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Three-letter month name, `"???"` for anything outside 1-12
pub fn month_name(month: u8) -> &'static str {
    MONTH_NAMES.get(month as usize).copied().unwrap_or(MONTH_NAMES[0])
}

/// Join a directory and a file name with exactly one `/`
///
/// Either part ends at its first newline.
pub fn combine_name(directory: Option<&str>, file_name: &str) -> Result<Path, StorageError> {
    fn until_newline(text: &str) -> &str {
        text.split('\n').next().unwrap_or("")
    }

    let mut path = Path::new();
    if let Some(directory) = directory.map(until_newline) {
        path.push_str(directory).map_err(|_| StorageError::PathTooLong)?;
        if !directory.is_empty() && !directory.ends_with('/') {
            path.push('/').map_err(|_| StorageError::PathTooLong)?;
        }
    }
    path.push_str(until_newline(file_name))
        .map_err(|_| StorageError::PathTooLong)?;
    Ok(path)
}

/// Pool of `N` buffered file slots plus the directory scan state
pub struct MassStorage<FS: FileSystem, const N: usize> {
    fs: FS,
    mounted: bool,
    slots: [FileStore<FS::File>; N],
    generations: [u16; N],
    find_dir: Option<FS::Dir>,
    longest_write: Duration,
}

impl<FS: FileSystem, const N: usize> MassStorage<FS, N> {
    /// Wrap a filesystem driver; nothing is mounted yet
    pub fn new(fs: FS) -> Self {
        Self {
            fs,
            mounted: false,
            slots: core::array::from_fn(|_| FileStore::new()),
            generations: [0; N],
            find_dir: None,
            longest_write: Duration::from_ticks(0),
        }
    }

    /// Mount the volume
    pub fn init(&mut self) -> Result<(), StorageError> {
        match self.fs.mount() {
            Ok(()) => {
                info!("filesystem mounted");
                self.mounted = true;
                Ok(())
            }
            Err(e) => {
                warn!("mount failed: {}", e);
                self.mounted = false;
                Err(StorageError::Mount(e))
            }
        }
    }

    /// Whether [`MassStorage::init`] succeeded
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn require_mounted(&self) -> Result<(), StorageError> {
        if self.mounted {
            Ok(())
        } else {
            Err(StorageError::NotMounted)
        }
    }

    /// Open `file_name`, optionally inside `directory`, in a free slot
    pub fn open_file(
        &mut self,
        directory: Option<&str>,
        file_name: &str,
        mode: OpenMode,
    ) -> Result<FileId, StorageError> {
        self.require_mounted()?;
        let index = self
            .slots
            .iter()
            .position(|slot| !slot.in_use())
            .ok_or(StorageError::NoFreeHandle)?;
        let path = combine_name(directory, file_name)?;

        let file = self.fs.open(&path, mode).map_err(|error| StorageError::Open {
            path: path.clone(),
            mode,
            error,
        })?;
        debug!("opened {} in slot {}", path.as_str(), index);
        self.slots[index].attach(file, mode == OpenMode::Write);
        self.generations[index] = self.generations[index].wrapping_add(1);
        Ok(FileId {
            index,
            generation: self.generations[index],
        })
    }

    /// Number of free slots
    pub fn free_file_entries(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.in_use()).count()
    }

    /// Slot behind a handle
    pub fn file(&self, id: FileId) -> Result<&FileStore<FS::File>, StorageError> {
        self.check(id)?;
        self.slots.get(id.index).ok_or(StorageError::InvalidHandle)
    }

    fn check(&self, id: FileId) -> Result<(), StorageError> {
        match self.generations.get(id.index) {
            Some(&generation) if generation == id.generation => Ok(()),
            _ => Err(StorageError::InvalidHandle),
        }
    }

    fn parts(
        &mut self,
        id: FileId,
    ) -> Result<(&mut FS, &mut FileStore<FS::File>, &mut Duration), StorageError> {
        self.check(id)?;
        let slot = self.slots.get_mut(id.index).ok_or(StorageError::InvalidHandle)?;
        Ok((&mut self.fs, slot, &mut self.longest_write))
    }

    /// Add a holder to an open file
    pub fn duplicate(&mut self, id: FileId) -> Result<(), StorageError> {
        let (_, slot, _) = self.parts(id)?;
        slot.duplicate()
    }

    /// Drop a holder; the last one flushes and closes
    pub fn close(&mut self, id: FileId) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.close(fs, longest)
    }

    /// Move to an absolute position
    pub fn seek(&mut self, id: FileId, position: u32) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.seek(fs, position, longest)
    }

    /// Move to the end of the file
    pub fn go_to_end(&mut self, id: FileId) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.go_to_end(fs, longest)
    }

    /// File length in bytes
    pub fn length(&self, id: FileId) -> Result<u32, StorageError> {
        self.file(id)?.length(&self.fs)
    }

    /// Whether buffered data may be read
    pub fn status(&self, id: FileId) -> bool {
        self.file(id).map(FileStore::status).unwrap_or(false)
    }

    /// Read one byte, `None` at end of file
    pub fn read_byte(&mut self, id: FileId) -> Result<Option<u8>, StorageError> {
        let (fs, slot, _) = self.parts(id)?;
        slot.read_byte(fs)
    }

    /// Read a block directly
    pub fn read_block(&mut self, id: FileId, buffer: &mut [u8]) -> Result<usize, StorageError> {
        let (fs, slot, _) = self.parts(id)?;
        slot.read_block(fs, buffer)
    }

    /// Write one byte through the buffer
    pub fn write_byte(&mut self, id: FileId, byte: u8) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.write_byte(fs, byte, longest)
    }

    /// Write a string through the buffer
    pub fn write_str(&mut self, id: FileId, text: &str) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.write_str(fs, text, longest)
    }

    /// Write a block directly, after any buffered bytes
    pub fn write_block(&mut self, id: FileId, data: &[u8]) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.write_block(fs, data, longest)
    }

    /// Write buffered bytes and sync
    pub fn flush(&mut self, id: FileId) -> Result<(), StorageError> {
        let (fs, slot, longest) = self.parts(id)?;
        slot.flush(fs, longest)
    }

    /// Start listing `directory`
    ///
    /// A trailing `/` is ignored. `.` and `..` are never reported.
    ///
    /// # Returns
    /// The first entry, or `None` for an empty directory.
    pub fn find_first(&mut self, directory: &str) -> Result<Option<FileInfo>, StorageError> {
        self.require_mounted()?;
        let directory = directory.strip_suffix('/').unwrap_or(directory);
        self.find_dir = None;
        let dir = self.fs.open_dir(directory).map_err(StorageError::Directory)?;
        self.find_dir = Some(dir);
        self.find_next()
    }

    /// Next entry of the listing started by [`MassStorage::find_first`]
    pub fn find_next(&mut self) -> Result<Option<FileInfo>, StorageError> {
        let Some(dir) = self.find_dir.as_mut() else {
            return Ok(None);
        };
        loop {
            match self.fs.read_dir(dir) {
                Ok(Some(entry)) if entry.name == "." || entry.name == ".." => continue,
                Ok(Some(entry)) => return Ok(Some(entry.into())),
                Ok(None) => {
                    self.find_dir = None;
                    return Ok(None);
                }
                Err(e) => {
                    self.find_dir = None;
                    return Err(StorageError::Directory(e));
                }
            }
        }
    }

    /// Delete a file or empty directory
    pub fn delete(&mut self, directory: Option<&str>, file_name: &str) -> Result<(), StorageError> {
        let path = combine_name(directory, file_name)?;
        self.fs.remove(&path).map_err(|_| StorageError::Delete(path))
    }

    /// Create a directory, optionally inside `parent`
    pub fn make_directory(&mut self, parent: Option<&str>, name: &str) -> Result<(), StorageError> {
        let path = combine_name(parent, name)?;
        self.fs.make_dir(&path).map_err(|_| StorageError::MakeDirectory(path))
    }

    /// Rename or move a file or directory
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        self.fs.rename(from, to).map_err(|_| StorageError::Rename {
            from: combine_name(None, from).unwrap_or_default(),
            to: combine_name(None, to).unwrap_or_default(),
        })
    }

    /// Whether `path` names an existing file or directory
    pub fn path_exists(&mut self, path: &str) -> bool {
        self.fs.exists(path)
    }

    /// Slowest single write since the last call, then reset
    pub fn get_and_clear_longest_write_time(&mut self) -> Duration {
        core::mem::replace(&mut self.longest_write, Duration::from_ticks(0))
    }

    /// The filesystem driver
    pub fn fs(&self) -> &FS {
        &self.fs
    }

    /// Mutable access to the filesystem driver
    pub fn fs_mut(&mut self) -> &mut FS {
        &mut self.fs
    }
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;

    use super::*;
    use crate::config::limits::FILE_BUF_LEN;
    use crate::storage::FileOp;
    use embassy_time::MockDriver;
    use kiln_hal::FsError;
    use std::collections::{BTreeMap, BTreeSet};
    use std::string::{String as StdString, ToString};
    use std::vec::Vec;

    /// In-memory FAT stand-in
    ///
    /// Writes land in `files` immediately; `capacity` caps the total stored
    /// bytes so writes go short, and `write_delay` advances the mock clock on
    /// every write.
    #[derive(Default)]
    pub(crate) struct FakeFs {
        pub files: BTreeMap<StdString, Vec<u8>>,
        pub dirs: BTreeSet<StdString>,
        pub fat_date: u16,
        pub capacity: Option<usize>,
        pub write_delay: Option<Duration>,
        pub mount_error: Option<FsError>,
        pub sync_error: Option<FsError>,
        pub reads: usize,
        pub syncs: usize,
        pub closes: usize,
    }

    pub(crate) struct FakeFile {
        path: StdString,
        pos: usize,
    }

    pub(crate) struct FakeDir {
        entries: Vec<DirEntry>,
        next: usize,
    }

    impl FakeFs {
        pub fn with_file(mut self, path: &str, contents: &[u8]) -> Self {
            self.files.insert(path.to_string(), contents.to_vec());
            self
        }

        pub fn with_dir(mut self, path: &str) -> Self {
            self.dirs.insert(path.to_string());
            self
        }

        pub fn contents(&self, path: &str) -> &[u8] {
            self.files.get(path).map(Vec::as_slice).unwrap_or(&[])
        }

        fn parent(path: &str) -> &str {
            path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
        }

        fn leaf(path: &str) -> &str {
            path.rsplit_once('/').map(|(_, leaf)| leaf).unwrap_or(path)
        }

        fn entry(&self, name: &str, size: u32, is_directory: bool) -> DirEntry {
            let mut entry_name = String::new();
            entry_name.push_str(name).unwrap();
            DirEntry {
                name: entry_name,
                size,
                is_directory,
                fat_date: self.fat_date,
            }
        }
    }

    impl FileSystem for FakeFs {
        type File = FakeFile;
        type Dir = FakeDir;

        fn mount(&mut self) -> Result<(), FsError> {
            match self.mount_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn open(&mut self, path: &str, mode: OpenMode) -> Result<FakeFile, FsError> {
            match mode {
                OpenMode::Read if !self.files.contains_key(path) => Err(FsError::NoFile),
                OpenMode::Read => Ok(FakeFile { path: path.to_string(), pos: 0 }),
                OpenMode::Write => {
                    let parent = Self::parent(path);
                    if !parent.is_empty() && !self.dirs.contains(parent) {
                        return Err(FsError::NoPath);
                    }
                    self.files.insert(path.to_string(), Vec::new());
                    Ok(FakeFile { path: path.to_string(), pos: 0 })
                }
            }
        }

        fn read(&mut self, file: &mut FakeFile, buffer: &mut [u8]) -> Result<usize, FsError> {
            self.reads += 1;
            let data = self.files.get(&file.path).ok_or(FsError::NoFile)?;
            let start = file.pos.min(data.len());
            let n = buffer.len().min(data.len() - start);
            buffer[..n].copy_from_slice(&data[start..start + n]);
            file.pos = start + n;
            Ok(n)
        }

        fn write(&mut self, file: &mut FakeFile, data: &[u8]) -> Result<usize, FsError> {
            if let Some(delay) = self.write_delay {
                MockDriver::get().advance(delay);
            }
            let used: usize = self.files.values().map(Vec::len).sum();
            let allowed = match self.capacity {
                Some(capacity) => data.len().min(capacity.saturating_sub(used)),
                None => data.len(),
            };
            let stored = self.files.get_mut(&file.path).ok_or(FsError::NoFile)?;
            for &byte in &data[..allowed] {
                if file.pos < stored.len() {
                    stored[file.pos] = byte;
                } else {
                    stored.push(byte);
                }
                file.pos += 1;
            }
            Ok(allowed)
        }

        fn seek(&mut self, file: &mut FakeFile, position: u32) -> Result<(), FsError> {
            file.pos = position as usize;
            Ok(())
        }

        fn length(&self, file: &FakeFile) -> u32 {
            self.contents(&file.path).len() as u32
        }

        fn sync(&mut self, _file: &mut FakeFile) -> Result<(), FsError> {
            self.syncs += 1;
            match self.sync_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }

        fn close(&mut self, _file: FakeFile) -> Result<(), FsError> {
            self.closes += 1;
            Ok(())
        }

        fn open_dir(&mut self, path: &str) -> Result<FakeDir, FsError> {
            if !path.is_empty() && !self.dirs.contains(path) {
                return Err(FsError::NoPath);
            }
            let mut entries = Vec::new();
            if !path.is_empty() {
                entries.push(self.entry(".", 0, true));
                entries.push(self.entry("..", 0, true));
            }
            for dir in self.dirs.iter().filter(|d| Self::parent(d) == path) {
                entries.push(self.entry(Self::leaf(dir), 0, true));
            }
            for (name, data) in self.files.iter().filter(|(f, _)| Self::parent(f) == path) {
                entries.push(self.entry(Self::leaf(name), data.len() as u32, false));
            }
            Ok(FakeDir { entries, next: 0 })
        }

        fn read_dir(&mut self, dir: &mut FakeDir) -> Result<Option<DirEntry>, FsError> {
            let entry = dir.entries.get(dir.next).cloned();
            dir.next += 1;
            Ok(entry)
        }

        fn remove(&mut self, path: &str) -> Result<(), FsError> {
            if self.files.remove(path).is_some() || self.dirs.remove(path) {
                Ok(())
            } else {
                Err(FsError::NoFile)
            }
        }

        fn make_dir(&mut self, path: &str) -> Result<(), FsError> {
            if self.dirs.insert(path.to_string()) {
                Ok(())
            } else {
                Err(FsError::Exists)
            }
        }

        fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
            let data = self.files.remove(from).ok_or(FsError::NoFile)?;
            self.files.insert(to.to_string(), data);
            Ok(())
        }

        fn exists(&mut self, path: &str) -> bool {
            self.files.contains_key(path) || self.dirs.contains(path)
        }
    }

    fn mounted<const N: usize>(fs: FakeFs) -> MassStorage<FakeFs, N> {
        let mut storage = MassStorage::new(fs);
        storage.init().unwrap();
        storage
    }

    #[test]
    fn test_combine_name() {
        assert_eq!(combine_name(Some("gcodes"), "a.g").unwrap(), "gcodes/a.g");
        assert_eq!(combine_name(Some("gcodes/"), "a.g").unwrap(), "gcodes/a.g");
        assert_eq!(combine_name(Some(""), "a.g").unwrap(), "a.g");
        assert_eq!(combine_name(None, "a.g\nignored").unwrap(), "a.g");
        assert_eq!(combine_name(Some("sys\n"), "config.g").unwrap(), "sys/config.g");

        let long: StdString = core::iter::repeat('x').take(200).collect();
        assert_eq!(combine_name(Some("gcodes"), &long), Err(StorageError::PathTooLong));
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), "Jan");
        assert_eq!(month_name(12), "Dec");
        assert_eq!(month_name(0), "???");
        assert_eq!(month_name(13), "???");
    }

    #[test]
    fn test_open_requires_mount() {
        let mut storage: MassStorage<FakeFs, 2> = MassStorage::new(FakeFs::default());
        assert_eq!(
            storage.open_file(None, "a.g", OpenMode::Write),
            Err(StorageError::NotMounted)
        );

        let fs = FakeFs {
            mount_error: Some(FsError::NoFilesystem),
            ..Default::default()
        };
        let mut storage: MassStorage<FakeFs, 2> = MassStorage::new(fs);
        assert_eq!(storage.init(), Err(StorageError::Mount(FsError::NoFilesystem)));
        assert!(!storage.is_mounted());
    }

    #[test]
    fn test_pool_exhaustion_and_reuse() {
        let mut storage = mounted::<2>(FakeFs::default());
        let a = storage.open_file(None, "a.g", OpenMode::Write).unwrap();
        let _b = storage.open_file(None, "b.g", OpenMode::Write).unwrap();
        assert_eq!(storage.free_file_entries(), 0);
        assert_eq!(
            storage.open_file(None, "c.g", OpenMode::Write),
            Err(StorageError::NoFreeHandle)
        );

        storage.close(a).unwrap();
        assert_eq!(storage.free_file_entries(), 1);
        let c = storage.open_file(None, "c.g", OpenMode::Write).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
    }

    #[test]
    fn test_open_failure_reports_path() {
        let mut storage = mounted::<2>(FakeFs::default());
        let err = storage.open_file(Some("gcodes"), "missing.g", OpenMode::Read).unwrap_err();
        assert_eq!(err.to_string(), "Can't open gcodes/missing.g to read, error code 4");
        assert_eq!(storage.free_file_entries(), 2);
    }

    #[test]
    fn test_small_writes_stay_buffered_until_flush() {
        let mut storage = mounted::<2>(FakeFs::default());
        let id = storage.open_file(None, "out.g", OpenMode::Write).unwrap();
        storage.write_str(id, "G1 X10\n").unwrap();
        assert_eq!(storage.fs().contents("out.g"), b"");

        storage.flush(id).unwrap();
        assert_eq!(storage.fs().contents("out.g"), b"G1 X10\n");
        assert_eq!(storage.fs().syncs, 1);
    }

    #[test]
    fn test_full_buffer_is_written_out() {
        let mut storage = mounted::<1>(FakeFs::default());
        let id = storage.open_file(None, "out.g", OpenMode::Write).unwrap();
        for i in 0..FILE_BUF_LEN + 3 {
            storage.write_byte(id, i as u8).unwrap();
        }
        assert_eq!(storage.fs().contents("out.g").len(), FILE_BUF_LEN);
        storage.close(id).unwrap();
        assert_eq!(storage.fs().contents("out.g").len(), FILE_BUF_LEN + 3);
    }

    #[test]
    fn test_block_write_follows_buffered_bytes() {
        let mut storage = mounted::<1>(FakeFs::default());
        let id = storage.open_file(None, "out.g", OpenMode::Write).unwrap();
        storage.write_str(id, "ab").unwrap();
        storage.write_block(id, b"cd").unwrap();
        storage.write_byte(id, b'e').unwrap();
        storage.close(id).unwrap();
        assert_eq!(storage.fs().contents("out.g"), b"abcde");
    }

    #[test]
    fn test_shared_file_closes_on_last_holder() {
        let mut storage = mounted::<2>(FakeFs::default());
        let id = storage.open_file(None, "log.txt", OpenMode::Write).unwrap();
        storage.duplicate(id).unwrap();
        storage.write_str(id, "hello").unwrap();

        storage.close(id).unwrap();
        assert!(storage.file(id).unwrap().in_use());
        assert_eq!(storage.fs().closes, 0);
        assert_eq!(storage.fs().contents("log.txt"), b"");

        storage.close(id).unwrap();
        assert!(!storage.file(id).unwrap().in_use());
        assert_eq!(storage.fs().closes, 1);
        assert_eq!(storage.fs().contents("log.txt"), b"hello");
    }

    #[test]
    fn test_read_through_buffer_to_end() {
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut storage = mounted::<1>(FakeFs::default().with_file("job.g", &data));
        let id = storage.open_file(None, "job.g", OpenMode::Read).unwrap();
        // Nothing buffered until the first read
        assert!(!storage.status(id));
        assert_eq!(storage.fs().reads, 0);

        let mut got = Vec::new();
        while let Some(byte) = storage.read_byte(id).unwrap() {
            got.push(byte);
        }
        assert_eq!(got, data);
        assert_eq!(storage.fs().reads, 2);
        assert!(!storage.status(id));
        assert_eq!(storage.read_byte(id).unwrap(), None);
    }

    #[test]
    fn test_block_read_invalidates_buffer() {
        let data: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
        let mut storage = mounted::<1>(FakeFs::default().with_file("job.g", &data));
        let id = storage.open_file(None, "job.g", OpenMode::Read).unwrap();

        assert_eq!(storage.read_byte(id).unwrap(), Some(data[0]));
        let mut block = [0u8; 10];
        assert_eq!(storage.read_block(id, &mut block).unwrap(), 10);
        assert_eq!(&block[..], &data[FILE_BUF_LEN..FILE_BUF_LEN + 10]);
        // Next buffered read refills from where the block read stopped
        assert_eq!(storage.read_byte(id).unwrap(), Some(data[FILE_BUF_LEN + 10]));
    }

    #[test]
    fn test_seek_and_go_to_end() {
        let mut storage = mounted::<1>(FakeFs::default().with_file("job.g", b"0123456789"));
        let id = storage.open_file(None, "job.g", OpenMode::Read).unwrap();
        assert_eq!(storage.read_byte(id).unwrap(), Some(b'0'));
        storage.seek(id, 7).unwrap();
        assert_eq!(storage.read_byte(id).unwrap(), Some(b'7'));
        assert_eq!(storage.length(id).unwrap(), 10);
        storage.close(id).unwrap();

        let id = storage.open_file(None, "log.txt", OpenMode::Write).unwrap();
        storage.write_str(id, "abc").unwrap();
        storage.seek(id, 1).unwrap();
        storage.write_str(id, "X").unwrap();
        storage.go_to_end(id).unwrap();
        storage.write_str(id, "d").unwrap();
        storage.close(id).unwrap();
        assert_eq!(storage.fs().contents("log.txt"), b"aXcd");
    }

    #[test]
    fn test_closed_handle_is_rejected() {
        let mut storage = mounted::<1>(FakeFs::default());
        let id = storage.open_file(None, "a.g", OpenMode::Write).unwrap();
        storage.close(id).unwrap();

        let err = storage.write_byte(id, b'x').unwrap_err();
        assert_eq!(err.to_string(), "Attempt to write byte to a non-open file.");
        assert!(matches!(storage.close(id), Err(StorageError::NotOpen(_))));
        assert!(matches!(storage.read_byte(id), Err(StorageError::NotOpen(_))));
        let out_of_range = FileId {
            index: 5,
            generation: id.generation,
        };
        assert_eq!(storage.seek(out_of_range, 0), Err(StorageError::InvalidHandle));
    }

    #[test]
    fn test_stale_handle_cannot_reach_reused_slot() {
        let mut storage = mounted::<1>(FakeFs::default());
        let old = storage.open_file(None, "a.g", OpenMode::Write).unwrap();
        storage.close(old).unwrap();

        let new = storage.open_file(None, "b.g", OpenMode::Write).unwrap();
        storage.write_str(new, "kept").unwrap();
        assert_eq!(storage.close(old), Err(StorageError::InvalidHandle));
        assert_eq!(storage.write_byte(old, b'x'), Err(StorageError::InvalidHandle));
        assert!(!storage.status(old));

        assert!(storage.file(new).unwrap().in_use());
        storage.close(new).unwrap();
        assert_eq!(storage.fs().contents("b.g"), b"kept");
    }

    #[test]
    fn test_handle_mode_is_enforced() {
        let mut storage = mounted::<2>(FakeFs::default().with_file("job.g", b"G28\n"));
        let read = storage.open_file(None, "job.g", OpenMode::Read).unwrap();
        assert_eq!(
            storage.write_byte(read, b'x'),
            Err(StorageError::WrongMode(FileOp::WriteByte))
        );
        assert_eq!(
            storage.write_block(read, b"Z"),
            Err(StorageError::WrongMode(FileOp::WriteBlock))
        );
        assert_eq!(
            storage.write_str(read, "Z"),
            Err(StorageError::WrongMode(FileOp::WriteString))
        );
        assert_eq!(storage.flush(read), Err(StorageError::WrongMode(FileOp::Flush)));
        // The file is untouched and still readable from the start
        assert_eq!(storage.length(read).unwrap(), 4);
        assert_eq!(storage.read_byte(read).unwrap(), Some(b'G'));
        storage.close(read).unwrap();
        assert_eq!(storage.fs().contents("job.g"), b"G28\n");

        let write = storage.open_file(None, "out.g", OpenMode::Write).unwrap();
        storage.write_str(write, "M105").unwrap();
        assert_eq!(storage.read_byte(write), Err(StorageError::WrongMode(FileOp::Read)));
        let mut block = [0u8; 4];
        assert_eq!(
            storage.read_block(write, &mut block),
            Err(StorageError::WrongMode(FileOp::Read))
        );
        storage.close(write).unwrap();
        assert_eq!(storage.fs().contents("out.g"), b"M105");
    }

    #[test]
    fn test_short_write_is_an_error() {
        let fs = FakeFs {
            capacity: Some(4),
            ..Default::default()
        };
        let mut storage = mounted::<1>(fs);
        let id = storage.open_file(None, "big.g", OpenMode::Write).unwrap();
        storage.write_str(id, "0123456789").unwrap();
        assert_eq!(storage.flush(id), Err(StorageError::Write));
        // Slot is still released by the last close
        let _ = storage.close(id);
        assert_eq!(storage.free_file_entries(), 1);
    }

    #[test]
    fn test_sync_failure_is_not_a_close_failure() {
        let fs = FakeFs {
            sync_error: Some(FsError::Denied),
            ..Default::default()
        };
        let mut storage = mounted::<1>(fs);
        let id = storage.open_file(None, "a.g", OpenMode::Write).unwrap();
        storage.write_str(id, "M84").unwrap();
        let err = storage.flush(id).unwrap_err();
        assert_eq!(err, StorageError::Sync(FsError::Denied));
        assert_eq!(err.to_string(), "Error syncing file, code 7");
        assert_eq!(storage.fs().contents("a.g"), b"M84");
    }

    #[test]
    fn test_longest_write_time_is_tracked_and_cleared() {
        let fs = FakeFs {
            write_delay: Some(Duration::from_millis(40)),
            ..Default::default()
        };
        let mut storage = mounted::<1>(fs);
        let id = storage.open_file(None, "a.g", OpenMode::Write).unwrap();
        storage.write_block(id, b"data").unwrap();
        assert!(storage.get_and_clear_longest_write_time() >= Duration::from_millis(40));
        assert_eq!(storage.get_and_clear_longest_write_time(), Duration::from_ticks(0));
    }

    #[test]
    fn test_directory_listing() {
        let fs = FakeFs {
            fat_date: (44 << 9) | (3 << 5),
            ..Default::default()
        }
        .with_dir("gcodes")
        .with_dir("gcodes/old")
        .with_file("gcodes/part.g", b"G28\n")
        .with_file("other.g", b"");
        let mut storage = mounted::<1>(fs);

        let first = storage.find_first("gcodes/").unwrap().unwrap();
        assert_eq!(first.file_name, "old");
        assert!(first.is_directory);
        assert_eq!((first.day, first.month, first.year), (1, 3, 2024));

        let second = storage.find_next().unwrap().unwrap();
        assert_eq!(second.file_name, "part.g");
        assert_eq!(second.size, 4);
        assert!(!second.is_directory);

        assert_eq!(storage.find_next().unwrap(), None);
        assert_eq!(storage.find_next().unwrap(), None);

        assert!(matches!(
            storage.find_first("missing"),
            Err(StorageError::Directory(FsError::NoPath))
        ));
    }

    #[test]
    fn test_directory_operations() {
        let mut storage = mounted::<1>(FakeFs::default().with_file("a.g", b"x"));
        storage.make_directory(None, "macros").unwrap();
        assert!(storage.path_exists("macros"));
        assert_eq!(
            storage.make_directory(None, "macros").unwrap_err().to_string(),
            "Can't create directory macros"
        );

        storage.rename("a.g", "macros/b.g").unwrap();
        assert!(storage.path_exists("macros/b.g"));
        assert_eq!(
            storage.rename("a.g", "c.g").unwrap_err().to_string(),
            "Can't rename file or directory a.g to c.g"
        );

        storage.delete(Some("macros"), "b.g").unwrap();
        assert!(!storage.path_exists("macros/b.g"));
        assert_eq!(
            storage.delete(Some("macros"), "b.g").unwrap_err().to_string(),
            "Can't delete file macros/b.g"
        );
    }
}

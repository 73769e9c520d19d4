//! Block filesystem abstraction
//!
//! Models a FAT volume on removable media (SD card). All calls are
//! blocking and only made from the foreground loop. File and directory
//! handles are opaque values owned by the caller and passed back in.

use heapless::String;

/// Longest file or directory name a [`DirEntry`] carries
pub const MAX_NAME_LENGTH: usize = 64;

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Open an existing file for reading
    Read,
    /// Create the file, truncating any existing one, for writing
    Write,
}

impl OpenMode {
    /// Human-readable verb, as used in diagnostics ("Can't open x to write")
    pub fn verb(self) -> &'static str {
        match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
        }
    }
}

/// Errors reported by the filesystem driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsError {
    /// Low level disk I/O failed
    Disk,
    /// Medium missing or not initialised
    NotReady,
    /// No such file
    NoFile,
    /// No such path
    NoPath,
    /// Malformed name
    InvalidName,
    /// Access denied or directory full
    Denied,
    /// Object already exists
    Exists,
    /// No valid FAT volume
    NoFilesystem,
    /// Too many files open in the driver
    TooManyOpen,
    /// Any other driver-specific failure
    Other(u8),
}

impl FsError {
    /// Numeric code for diagnostics (matches the FatFs result codes)
    pub fn code(self) -> u8 {
        match self {
            FsError::Disk => 1,
            FsError::NotReady => 3,
            FsError::NoFile => 4,
            FsError::NoPath => 5,
            FsError::InvalidName => 6,
            FsError::Denied => 7,
            FsError::Exists => 8,
            FsError::NoFilesystem => 13,
            FsError::TooManyOpen => 18,
            FsError::Other(code) => code,
        }
    }
}

/// One directory entry as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirEntry {
    /// Entry name without path
    pub name: String<MAX_NAME_LENGTH>,
    /// File size in bytes (0 for directories)
    pub size: u32,
    /// Whether the entry is a directory
    pub is_directory: bool,
    /// Last modification date, FAT packed: day in bits 0-4, month in bits
    /// 5-8, years since 1980 in bits 9-15
    pub fat_date: u16,
}

/// Filesystem driver
pub trait FileSystem {
    /// Open file handle
    type File;
    /// Open directory iterator
    type Dir;

    /// Mount the volume
    fn mount(&mut self) -> Result<(), FsError>;

    /// Open `path` in the given mode
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::File, FsError>;

    /// Read up to `buffer.len()` bytes at the file position
    ///
    /// # Returns
    /// Bytes read; fewer than requested only at end of file.
    fn read(&mut self, file: &mut Self::File, buffer: &mut [u8]) -> Result<usize, FsError>;

    /// Write `data` at the file position
    ///
    /// # Returns
    /// Bytes written; fewer than requested when the volume is full.
    fn write(&mut self, file: &mut Self::File, data: &[u8]) -> Result<usize, FsError>;

    /// Move the file position to an absolute offset
    fn seek(&mut self, file: &mut Self::File, position: u32) -> Result<(), FsError>;

    /// Current file length in bytes
    fn length(&self, file: &Self::File) -> u32;

    /// Commit cached data and directory entry to the medium
    fn sync(&mut self, file: &mut Self::File) -> Result<(), FsError>;

    /// Close a file handle
    fn close(&mut self, file: Self::File) -> Result<(), FsError>;

    /// Open a directory for enumeration
    fn open_dir(&mut self, path: &str) -> Result<Self::Dir, FsError>;

    /// Next entry of an open directory, `None` at the end
    fn read_dir(&mut self, dir: &mut Self::Dir) -> Result<Option<DirEntry>, FsError>;

    /// Delete a file or empty directory
    fn remove(&mut self, path: &str) -> Result<(), FsError>;

    /// Create a directory
    fn make_dir(&mut self, path: &str) -> Result<(), FsError>;

    /// Rename or move a file or directory
    fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError>;

    /// Check whether a file or directory exists
    fn exists(&mut self, path: &str) -> bool;
}

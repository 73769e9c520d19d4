//! One buffered file slot
//!
//! Reads refill a fixed buffer from the filesystem; writes accumulate in it
//! and go out when it is full, on seek, on flush and on the final close.
//! The slot is reference counted so a print job and the web interface can
//! share an open file.

use embassy_time::{Duration, Instant};
use kiln_hal::FileSystem;

use super::error::{FileOp, StorageError};
use crate::config::limits::FILE_BUF_LEN;

/// Buffered file slot holding a driver handle of type `F`
pub struct FileStore<F> {
    file: Option<F>,
    buf: [u8; FILE_BUF_LEN],
    buffer_pointer: usize,
    last_buffer_entry: usize,
    writing: bool,
    open_count: u8,
}

impl<F> FileStore<F> {
    /// An unused slot
    pub const fn new() -> Self {
        Self {
            file: None,
            buf: [0; FILE_BUF_LEN],
            buffer_pointer: 0,
            last_buffer_entry: 0,
            writing: false,
            open_count: 0,
        }
    }

    /// Whether the slot holds an open file
    pub fn in_use(&self) -> bool {
        self.file.is_some()
    }

    /// Whether the open file was opened for writing
    pub fn is_writing(&self) -> bool {
        self.writing
    }

    /// Number of holders of the open file
    pub fn open_count(&self) -> u8 {
        self.open_count
    }

    /// Take ownership of a freshly opened driver handle
    pub(crate) fn attach(&mut self, file: F, writing: bool) {
        self.file = Some(file);
        self.writing = writing;
        // A read slot starts with an exhausted buffer so the first read refills it
        self.buffer_pointer = if writing { 0 } else { FILE_BUF_LEN };
        self.last_buffer_entry = FILE_BUF_LEN - 1;
        self.open_count = 1;
    }

    fn require_open(&self, op: FileOp) -> Result<(), StorageError> {
        if self.in_use() {
            Ok(())
        } else {
            Err(StorageError::NotOpen(op))
        }
    }

    fn require_mode(&self, op: FileOp, writing: bool) -> Result<(), StorageError> {
        self.require_open(op)?;
        if self.writing == writing {
            Ok(())
        } else {
            Err(StorageError::WrongMode(op))
        }
    }

    /// Add a holder to the open file
    pub fn duplicate(&mut self) -> Result<(), StorageError> {
        self.require_open(FileOp::Duplicate)?;
        self.open_count = self.open_count.saturating_add(1);
        Ok(())
    }

    /// Whether a buffered read would return a byte without touching the
    /// filesystem, or the last refill filled the whole buffer
    pub fn status(&self) -> bool {
        let more = self.last_buffer_entry == FILE_BUF_LEN;
        self.in_use() && (more || self.buffer_pointer < self.last_buffer_entry)
    }

    /// Drop one holder; the last one flushes pending writes and closes
    ///
    /// The slot is freed even if the flush or close fails.
    pub fn close<FS>(&mut self, fs: &mut FS, longest: &mut Duration) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_open(FileOp::Close)?;
        self.open_count -= 1;
        if self.open_count != 0 {
            return Ok(());
        }

        let flushed = if self.writing {
            self.flush(fs, longest)
        } else {
            Ok(())
        };
        let closed = match self.file.take() {
            Some(file) => fs.close(file).map_err(StorageError::Close),
            None => Ok(()),
        };
        self.writing = false;
        self.buffer_pointer = 0;
        self.last_buffer_entry = 0;
        flushed.and(closed)
    }

    /// Move to an absolute position, writing out pending data first
    pub fn seek<FS>(
        &mut self,
        fs: &mut FS,
        position: u32,
        longest: &mut Duration,
    ) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_open(FileOp::Seek)?;
        let written = if self.writing {
            self.write_buffer(fs, longest)
        } else {
            Ok(())
        };
        let sought = match self.file.as_mut() {
            Some(file) => fs.seek(file, position).map_err(StorageError::Seek),
            None => Err(StorageError::NotOpen(FileOp::Seek)),
        };
        self.buffer_pointer = if self.writing { 0 } else { FILE_BUF_LEN };
        written.and(sought)
    }

    /// Move to the end of the file, for appending
    pub fn go_to_end<FS>(&mut self, fs: &mut FS, longest: &mut Duration) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        let end = self.length(fs)?;
        self.seek(fs, end, longest)
    }

    /// Current length of the file
    pub fn length<FS>(&self, fs: &FS) -> Result<u32, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        match self.file.as_ref() {
            Some(file) => Ok(fs.length(file)),
            None => Err(StorageError::NotOpen(FileOp::Length)),
        }
    }

    /// Read one byte through the buffer
    ///
    /// # Returns
    /// `None` at end of file.
    pub fn read_byte<FS>(&mut self, fs: &mut FS) -> Result<Option<u8>, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::Read, false)?;
        let file = self.file.as_mut().ok_or(StorageError::NotOpen(FileOp::Read))?;
        if self.buffer_pointer >= FILE_BUF_LEN {
            self.last_buffer_entry = fs.read(file, &mut self.buf).map_err(StorageError::Read)?;
            self.buffer_pointer = 0;
        }
        if self.buffer_pointer >= self.last_buffer_entry {
            return Ok(None);
        }
        let byte = self.buf[self.buffer_pointer];
        self.buffer_pointer += 1;
        Ok(Some(byte))
    }

    /// Read directly into `buffer`, bypassing and invalidating the slot buffer
    pub fn read_block<FS>(&mut self, fs: &mut FS, buffer: &mut [u8]) -> Result<usize, StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::Read, false)?;
        let file = self.file.as_mut().ok_or(StorageError::NotOpen(FileOp::Read))?;
        self.buffer_pointer = FILE_BUF_LEN;
        fs.read(file, buffer).map_err(StorageError::Read)
    }

    /// Append one byte, writing the buffer out when it fills
    pub fn write_byte<FS>(
        &mut self,
        fs: &mut FS,
        byte: u8,
        longest: &mut Duration,
    ) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::WriteByte, true)?;
        self.buf[self.buffer_pointer] = byte;
        self.buffer_pointer += 1;
        if self.buffer_pointer >= FILE_BUF_LEN {
            self.write_buffer(fs, longest)?;
        }
        Ok(())
    }

    /// Append every byte of `text`
    pub fn write_str<FS>(
        &mut self,
        fs: &mut FS,
        text: &str,
        longest: &mut Duration,
    ) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::WriteString, true)?;
        for &byte in text.as_bytes() {
            self.write_byte(fs, byte, longest)?;
        }
        Ok(())
    }

    /// Write pending buffered data, then `data` directly
    pub fn write_block<FS>(
        &mut self,
        fs: &mut FS,
        data: &[u8],
        longest: &mut Duration,
    ) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::WriteBlock, true)?;
        self.write_buffer(fs, longest)?;
        match self.file.as_mut() {
            Some(file) => timed_write(fs, file, data, longest),
            None => Err(StorageError::NotOpen(FileOp::WriteBlock)),
        }
    }

    /// Write pending data and commit it to the medium
    pub fn flush<FS>(&mut self, fs: &mut FS, longest: &mut Duration) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        self.require_mode(FileOp::Flush, true)?;
        self.write_buffer(fs, longest)?;
        match self.file.as_mut() {
            Some(file) => fs.sync(file).map_err(StorageError::Sync),
            None => Err(StorageError::NotOpen(FileOp::Flush)),
        }
    }

    fn write_buffer<FS>(&mut self, fs: &mut FS, longest: &mut Duration) -> Result<(), StorageError>
    where
        FS: FileSystem<File = F>,
    {
        if self.buffer_pointer == 0 {
            return Ok(());
        }
        let file = self.file.as_mut().ok_or(StorageError::NotOpen(FileOp::Flush))?;
        timed_write(fs, file, &self.buf[..self.buffer_pointer], longest)?;
        self.buffer_pointer = 0;
        Ok(())
    }
}

impl<F> Default for FileStore<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `data` in one driver call, tracking the slowest call seen
///
/// A short write means the volume is full and is an error.
fn timed_write<FS: FileSystem>(
    fs: &mut FS,
    file: &mut FS::File,
    data: &[u8],
    longest: &mut Duration,
) -> Result<(), StorageError> {
    let start = Instant::now();
    let result = fs.write(file, data);
    let elapsed = start.elapsed();
    if elapsed > *longest {
        *longest = elapsed;
    }
    match result {
        Ok(written) if written == data.len() => Ok(()),
        _ => Err(StorageError::Write),
    }
}

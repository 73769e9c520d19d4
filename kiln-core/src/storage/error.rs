//! File store errors and their user-facing diagnostics

use core::fmt;

use heapless::String;
use kiln_hal::{FsError, OpenMode};

use crate::config::limits::MAX_PATH_LENGTH;
use crate::transport::MessageType;

/// A combined directory and file name
pub type Path = String<MAX_PATH_LENGTH>;

/// Operation attempted on a file handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FileOp {
    /// Duplicate
    Duplicate,
    /// Close
    Close,
    /// Seek
    Seek,
    /// Length query
    Length,
    /// Read
    Read,
    /// Single byte write
    WriteByte,
    /// String write
    WriteString,
    /// Block write
    WriteBlock,
    /// Flush
    Flush,
}

impl FileOp {
    fn phrase(self) -> &'static str {
        match self {
            FileOp::Duplicate => "dup",
            FileOp::Close => "close",
            FileOp::Seek => "seek on",
            FileOp::Length => "size",
            FileOp::Read => "read from",
            FileOp::WriteByte => "write byte to",
            FileOp::WriteString => "write string to",
            FileOp::WriteBlock => "write block to",
            FileOp::Flush => "flush",
        }
    }
}

/// File store failure
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The filesystem has not been mounted
    NotMounted,
    /// Mounting failed
    Mount(FsError),
    /// Every file slot is in use
    NoFreeHandle,
    /// Handle does not name a slot
    InvalidHandle,
    /// Operation on a slot that is not open
    NotOpen(FileOp),
    /// Read on a file opened for writing, or write on one opened for reading
    WrongMode(FileOp),
    /// Combined path does not fit
    PathTooLong,
    /// The driver refused to open a file
    Open {
        /// Path that was opened
        path: Path,
        /// Requested mode
        mode: OpenMode,
        /// Driver error
        error: FsError,
    },
    /// Reading failed
    Read(FsError),
    /// Writing failed or wrote short
    Write,
    /// Seeking failed
    Seek(FsError),
    /// Committing written data failed
    Sync(FsError),
    /// Closing failed
    Close(FsError),
    /// Listing a directory failed
    Directory(FsError),
    /// Deleting failed
    Delete(Path),
    /// Creating a directory failed
    MakeDirectory(Path),
    /// Renaming failed
    Rename {
        /// Old name
        from: Path,
        /// New name
        to: Path,
    },
}

impl StorageError {
    /// Message kind the diagnostic is reported with
    pub fn message_type(&self) -> MessageType {
        match self {
            StorageError::NotMounted | StorageError::Mount(_) | StorageError::NoFreeHandle => {
                MessageType::Host
            }
            StorageError::InvalidHandle
            | StorageError::NotOpen(_)
            | StorageError::WrongMode(_)
            | StorageError::PathTooLong => MessageType::BothError,
            _ => MessageType::Both,
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotMounted => write!(f, "File system not mounted."),
            StorageError::Mount(e) => write!(f, "Can't mount filesystem 0: code {}", e.code()),
            StorageError::NoFreeHandle => write!(f, "Max open file count exceeded."),
            StorageError::InvalidHandle => write!(f, "Invalid file handle."),
            StorageError::NotOpen(op) => write!(f, "Attempt to {} a non-open file.", op.phrase()),
            StorageError::WrongMode(op) => {
                let opened = if *op == FileOp::Read { "writing" } else { "reading" };
                write!(f, "Attempt to {} a file opened for {}.", op.phrase(), opened)
            }
            StorageError::PathTooLong => write!(f, "CombineName() buffer overflow."),
            StorageError::Open { path, mode, error } => write!(
                f,
                "Can't open {} to {}, error code {}",
                path,
                mode.verb(),
                error.code()
            ),
            StorageError::Read(_) => write!(f, "Error reading file."),
            StorageError::Write => write!(f, "Error writing file. Disc may be full."),
            StorageError::Seek(e) => write!(f, "Error seeking file, code {}", e.code()),
            StorageError::Sync(e) => write!(f, "Error syncing file, code {}", e.code()),
            StorageError::Close(e) => write!(f, "Error closing file, code {}", e.code()),
            StorageError::Directory(e) => write!(f, "Can't read directory, code {}", e.code()),
            StorageError::Delete(path) => write!(f, "Can't delete file {}", path),
            StorageError::MakeDirectory(path) => write!(f, "Can't create directory {}", path),
            StorageError::Rename { from, to } => {
                write!(f, "Can't rename file or directory {} to {}", from, to)
            }
        }
    }
}

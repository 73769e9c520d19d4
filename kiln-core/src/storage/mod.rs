//! Buffered file storage
//!
//! A fixed pool of buffered file slots over a FAT filesystem driver, plus
//! directory listing and housekeeping. Handles are small [`FileId`] values;
//! the pool owns the slots and the driver.

pub mod error;
pub mod file_store;
pub mod mass_storage;

pub use error::{FileOp, Path, StorageError};
pub use file_store::FileStore;
pub use mass_storage::{combine_name, month_name, FileId, FileInfo, MassStorage};

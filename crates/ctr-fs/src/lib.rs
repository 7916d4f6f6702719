//! Host filesystem backing for guest archives.
//!
//! Archive contents live in ordinary host files. Guest reads and writes are staged through a
//! host buffer and copied to or from guest memory with [`AddressSpace`](ctr_mem::AddressSpace)
//! bulk transfers; opened files and directories become FILE / DIR kernel objects.

mod archive;
mod dir_entry;
mod error;
mod host;
mod path;

pub use archive::{Archive, OpenFlags};
pub use ctr_kernel::{GuestDir, GuestFile};
pub use dir_entry::{DirEntryRecord, DIR_ENTRY_SIZE};
pub use error::{result, FsError, FsResult};
pub use host::{HostArchive, HostDir, HostFile, ARCHIVE_ID_LEN};
pub use path::{archive_dir_name, resolve};

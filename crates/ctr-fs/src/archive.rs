use bitflags::bitflags;
use ctr_kernel::{GuestDir, GuestFile, Handle, HandleTable, KernelObject, KernelResult};

use crate::error::FsResult;

bitflags! {
    /// Open mode passed by the guest to `OpenFile`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct OpenFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
    }
}

/// A mounted archive: a tree of files addressed by guest paths.
pub trait Archive {
    fn open_file(&mut self, path: &str, flags: OpenFlags) -> FsResult<Box<dyn GuestFile>>;
    /// Creates `path` with `size` zero bytes. Fails if it already exists.
    fn create_file(&mut self, path: &str, size: u64) -> FsResult<()>;
    fn delete_file(&mut self, path: &str) -> FsResult<()>;
    fn delete_dir(&mut self, path: &str) -> FsResult<()>;
    fn open_dir(&mut self, path: &str) -> FsResult<Box<dyn GuestDir>>;
    fn file_exists(&self, path: &str) -> bool;

    /// Opens `path` and registers it in `handles` as a FILE object.
    fn open_file_handle(
        &mut self,
        handles: &mut HandleTable,
        path: &str,
        flags: OpenFlags,
    ) -> KernelResult<Handle> {
        let file = self.open_file(path, flags)?;
        handles.insert(KernelObject::File(file))
    }

    /// Opens `path` and registers it in `handles` as a DIR object.
    fn open_dir_handle(&mut self, handles: &mut HandleTable, path: &str) -> KernelResult<Handle> {
        let dir = self.open_dir(path)?;
        handles.insert(KernelObject::Dir(dir))
    }
}

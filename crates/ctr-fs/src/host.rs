use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ctr_kernel::{GuestDir, GuestFile, KernelResult};
use ctr_mem::{AccessKind, AddressSpace, MemoryError};
use tracing::{debug, error, warn};

use crate::archive::{Archive, OpenFlags};
use crate::dir_entry::{DirEntryRecord, DIR_ENTRY_SIZE};
use crate::error::{FsError, FsResult};
use crate::path::{archive_dir_name, resolve};

/// Length of the binary id naming a shared extdata archive.
pub const ARCHIVE_ID_LEN: usize = 12;

/// Host buffer size for file transfers staged through guest memory.
const STAGING_CHUNK: usize = 0x1_0000;

/// Archive backed by a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct HostArchive {
    root: PathBuf,
}

impl HostArchive {
    /// Mounts an existing host directory.
    pub fn new(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FsError::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// Mounts the shared extdata archive `id` found under `base`, i.e. `<base>/<hex id>/`.
    pub fn open_shared_extdata(base: &Path, id: &[u8]) -> FsResult<Self> {
        if id.len() != ARCHIVE_ID_LEN {
            return Err(FsError::InvalidArchivePath("archive id must be 12 bytes"));
        }
        let root = base.join(archive_dir_name(id));
        debug!("opening shared extdata {}", root.display());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> FsResult<PathBuf> {
        resolve(&self.root, path).map_err(|err| {
            error!("refusing guest path {path:?}");
            err
        })
    }
}

impl Archive for HostArchive {
    fn open_file(&mut self, path: &str, flags: OpenFlags) -> FsResult<Box<dyn GuestFile>> {
        let host = self.host_path(path)?;
        if !host.is_file() {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(FsError::NotFound(path.to_owned()));
            }
            self.create_file(path, 0)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(flags.contains(OpenFlags::WRITE))
            .open(&host)
            .map_err(|err| FsError::from_host(err, path))?;
        debug!("opened {} ({flags:?})", host.display());
        Ok(Box::new(HostFile::new(file, path)))
    }

    fn create_file(&mut self, path: &str, size: u64) -> FsResult<()> {
        let host = self.host_path(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&host)
            .map_err(|err| FsError::from_host(err, path))?;
        file.set_len(size)
            .map_err(|err| FsError::from_host(err, path))?;
        debug!("created {} ({size} bytes)", host.display());
        Ok(())
    }

    fn delete_file(&mut self, path: &str) -> FsResult<()> {
        let host = self.host_path(path)?;
        fs::remove_file(&host).map_err(|err| FsError::from_host(err, path))
    }

    fn delete_dir(&mut self, path: &str) -> FsResult<()> {
        let host = self.host_path(path)?;
        fs::remove_dir(&host).map_err(|err| FsError::from_host(err, path))
    }

    fn open_dir(&mut self, path: &str) -> FsResult<Box<dyn GuestDir>> {
        let host = self.host_path(path)?;
        Ok(Box::new(HostDir::open(&host, path)?))
    }

    fn file_exists(&self, path: &str) -> bool {
        self.host_path(path).map_or(false, |p| p.is_file())
    }
}

/// File opened from a [`HostArchive`].
pub struct HostFile {
    file: Option<File>,
    path: String,
}

impl HostFile {
    fn new(file: File, path: &str) -> Self {
        Self {
            file: Some(file),
            path: path.to_owned(),
        }
    }

    fn file(&mut self) -> FsResult<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| FsError::NotFound(self.path.clone()))
    }

    /// Reads exactly `len` bytes at `offset` and stores them at guest `addr`.
    ///
    /// Bytes move through a fixed staging buffer; a failure part way leaves the chunks before
    /// it in guest memory.
    pub fn read_at(
        &mut self,
        mem: &mut AddressSpace,
        offset: u64,
        addr: u32,
        len: u32,
    ) -> FsResult<u32> {
        check_offset(offset)?;
        check_guest_range(addr, len, AccessKind::Write)?;

        let path = self.path.clone();
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; STAGING_CHUNK.min(len as usize)];
        let mut done = 0usize;
        while done < len as usize {
            let chunk = &mut buf[..STAGING_CHUNK.min(len as usize - done)];
            let got = read_full(file, chunk)?;
            if got != chunk.len() {
                error!("short read of {path}: {} of {len} bytes", done + got);
                return Err(FsError::ShortTransfer {
                    expected: len as usize,
                    actual: done + got,
                });
            }
            mem.write(addr + done as u32, chunk)?;
            done += got;
        }
        Ok(len)
    }

    /// Copies `len` bytes from guest `addr` into the file at `offset`.
    pub fn write_at(
        &mut self,
        mem: &mut AddressSpace,
        offset: u64,
        addr: u32,
        len: u32,
        flush: bool,
    ) -> FsResult<u32> {
        check_offset(offset)?;
        check_guest_range(addr, len, AccessKind::Read)?;

        let path = self.path.clone();
        let file = self.file()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; STAGING_CHUNK.min(len as usize)];
        let mut done = 0usize;
        while done < len as usize {
            let chunk = &mut buf[..STAGING_CHUNK.min(len as usize - done)];
            mem.read(addr + done as u32, chunk)?;
            file.write_all(chunk)
                .map_err(|err| FsError::from_host(err, &path))?;
            done += chunk.len();
        }
        if flush {
            file.flush()?;
        }
        Ok(len)
    }

    pub fn len(&mut self) -> FsResult<u64> {
        Ok(self.file()?.metadata()?.len())
    }
}

/// Guest ranges must not wrap past the top of the address space.
fn check_guest_range(addr: u32, len: u32, kind: AccessKind) -> FsResult<()> {
    if u64::from(addr) + u64::from(len) > 1 << 32 {
        return Err(MemoryError::UnmappedAccess {
            addr,
            len: len as usize,
            kind,
        }
        .into());
    }
    Ok(())
}

fn check_offset(offset: u64) -> FsResult<()> {
    if offset >> 32 != 0 {
        error!("64-bit file offsets are not supported (0x{offset:x})");
        return Err(FsError::UnsupportedWideOffset { offset });
    }
    Ok(())
}

fn read_full(file: &mut File, buf: &mut [u8]) -> FsResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}

impl GuestFile for HostFile {
    fn read(&mut self, mem: &mut AddressSpace, offset: u64, addr: u32, len: u32) -> KernelResult<u32> {
        Ok(self.read_at(mem, offset, addr, len)?)
    }

    fn write(
        &mut self,
        mem: &mut AddressSpace,
        offset: u64,
        addr: u32,
        len: u32,
        flush: bool,
    ) -> KernelResult<u32> {
        Ok(self.write_at(mem, offset, addr, len, flush)?)
    }

    fn size(&mut self) -> KernelResult<u64> {
        Ok(self.len()?)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closed {}", self.path);
        }
    }
}

impl fmt::Debug for HostFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFile")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish()
    }
}

/// Directory listing captured when the directory was opened.
#[derive(Debug)]
pub struct HostDir {
    path: String,
    entries: Vec<DirEntryRecord>,
    cursor: usize,
}

impl HostDir {
    fn open(host: &Path, path: &str) -> FsResult<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(host).map_err(|err| FsError::from_host(err, path))? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                warn!("skipping non UTF-8 entry in {}", host.display());
                continue;
            };
            let mut record = if meta.is_dir() {
                DirEntryRecord::dir(name)
            } else {
                DirEntryRecord::file(name, meta.len())
            };
            record.read_only = meta.permissions().readonly();
            entries.push(record);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self {
            path: path.to_owned(),
            entries,
            cursor: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Writes up to `count` records at `addr` and advances past them.
    pub fn read_into(&mut self, mem: &mut AddressSpace, addr: u32, count: u32) -> FsResult<u32> {
        let n = (count as usize).min(self.remaining());
        for (i, record) in self.entries[self.cursor..self.cursor + n].iter().enumerate() {
            let at = addr.wrapping_add((i * DIR_ENTRY_SIZE) as u32);
            record.write_to(mem, at)?;
        }
        self.cursor += n;
        Ok(n as u32)
    }
}

impl GuestDir for HostDir {
    fn read_entries(&mut self, mem: &mut AddressSpace, addr: u32, count: u32) -> KernelResult<u32> {
        Ok(self.read_into(mem, addr, count)?)
    }

    fn close(&mut self) {
        debug!("closed dir {}", self.path);
        self.entries.clear();
        self.cursor = 0;
    }
}

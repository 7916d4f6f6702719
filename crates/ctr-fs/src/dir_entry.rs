use ctr_mem::AddressSpace;

use crate::error::FsResult;

/// Size of one entry written by `ReadDir`.
pub const DIR_ENTRY_SIZE: usize = 0x228;

/// UTF-16 units of the long name field, including the terminator.
const NAME_UNITS: usize = 0x100;

const SHORT_NAME: usize = 0x20C;
const SHORT_NAME_LEN: usize = 8;
const SHORT_NAME_TERM: usize = 0x215;
const SHORT_EXT: usize = 0x216;
const SHORT_EXT_LEN: usize = 3;
const ATTR_UNKNOWN_A: usize = 0x21A;
const ATTR_UNKNOWN_B: usize = 0x21B;
const ATTR_DIRECTORY: usize = 0x21C;
const ATTR_HIDDEN: usize = 0x21D;
const ATTR_ARCHIVE: usize = 0x21E;
const ATTR_READ_ONLY: usize = 0x21F;
const SIZE_LO: usize = 0x220;
const SIZE_HI: usize = 0x224;

/// One directory entry in the guest's on-disk record format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryRecord {
    pub name: String,
    pub is_dir: bool,
    pub hidden: bool,
    pub archive: bool,
    pub read_only: bool,
    pub size: u64,
}

impl DirEntryRecord {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            hidden: false,
            archive: false,
            read_only: false,
            size,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            is_dir: true,
            ..Self::file(name, 0)
        }
    }

    /// Upper-cased 8.3 short name and extension, space padded.
    pub fn short_name(&self) -> ([u8; SHORT_NAME_LEN], [u8; SHORT_EXT_LEN]) {
        let (stem, ext) = match self.name.rsplit_once('.') {
            Some((stem, ext)) if !self.is_dir && !stem.is_empty() => (stem, ext),
            _ => (self.name.as_str(), ""),
        };
        (pad_short(stem), pad_short(ext))
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut out = [0u8; DIR_ENTRY_SIZE];

        for (i, unit) in self.name.encode_utf16().take(NAME_UNITS - 1).enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }

        let (stem, ext) = self.short_name();
        out[SHORT_NAME..SHORT_NAME + SHORT_NAME_LEN].copy_from_slice(&stem);
        out[SHORT_NAME_TERM] = 0x0A;
        if self.is_dir {
            out[SHORT_EXT..SHORT_EXT + SHORT_EXT_LEN].fill(b' ');
        } else {
            out[SHORT_EXT..SHORT_EXT + SHORT_EXT_LEN].copy_from_slice(&ext);
        }

        out[ATTR_UNKNOWN_A] = 0x01;
        out[ATTR_UNKNOWN_B] = 0x00;
        out[ATTR_DIRECTORY] = u8::from(self.is_dir);
        out[ATTR_HIDDEN] = u8::from(self.hidden);
        out[ATTR_ARCHIVE] = u8::from(self.archive);
        out[ATTR_READ_ONLY] = u8::from(self.read_only);

        if !self.is_dir {
            out[SIZE_LO..SIZE_LO + 4].copy_from_slice(&(self.size as u32).to_le_bytes());
            out[SIZE_HI..SIZE_HI + 4].copy_from_slice(&((self.size >> 32) as u32).to_le_bytes());
        }
        out
    }

    pub fn write_to(&self, mem: &mut AddressSpace, addr: u32) -> FsResult<()> {
        mem.write(addr, &self.to_bytes())?;
        Ok(())
    }
}

fn pad_short<const N: usize>(part: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (slot, c) in out.iter_mut().zip(part.chars().filter(|c| *c != ' ')) {
        *slot = if c.is_ascii_graphic() {
            c.to_ascii_uppercase() as u8
        } else {
            b'_'
        };
    }
    out
}

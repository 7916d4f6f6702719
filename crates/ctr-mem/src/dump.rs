use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::address_space::AddressSpace;

/// Writes the contents of every mapping to `dir/dump{BASE:08X} {SIZE:08X}.bin`.
///
/// Returns the written paths in mapping order.
pub fn dump_mappings(space: &AddressSpace, dir: &Path) -> io::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(space.len());
    for info in space.mappings() {
        let path = dir.join(format!("dump{:08X} {:08X}.bin", info.base, info.size));
        let view = space
            .raw(info.base, info.size as usize)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(&path, &*view)?;
        info!("dumped 0x{:08x} ({} bytes) to {}", info.base, info.size, path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_names_files_after_base_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut space = AddressSpace::default();
        space.add_segment(0x0010_0000, 4, Some(&[1, 2, 3, 4])).unwrap();
        space.add_mapping(0x1FF8_0000, 0x10).unwrap();

        let paths = dump_mappings(&space, dir.path()).unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(
            paths[0].file_name().unwrap().to_str().unwrap(),
            "dump00100000 00000004.bin"
        );
        assert_eq!(fs::read(&paths[0]).unwrap(), [1, 2, 3, 4]);
        assert_eq!(fs::read(&paths[1]).unwrap(), vec![0u8; 0x10]);
    }
}

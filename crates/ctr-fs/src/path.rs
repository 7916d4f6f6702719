use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, FsResult};

/// Joins a guest-supplied relative path onto `root`, rejecting anything that could escape it.
///
/// Leading `/` is accepted, as guests address archive contents from the archive root. `..`,
/// drive prefixes and embedded NULs are not.
pub fn resolve(root: &Path, guest: &str) -> FsResult<PathBuf> {
    if guest.contains('\0') || guest.contains('\\') {
        return Err(FsError::UnsafePath(guest.to_owned()));
    }

    let mut out = root.to_path_buf();
    for component in Path::new(guest.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FsError::UnsafePath(guest.to_owned()));
            }
        }
    }
    Ok(out)
}

/// Lower-case hex name of the host directory holding the archive with the given binary id.
pub fn archive_dir_name(id: &[u8]) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_rooted_paths() {
        let root = Path::new("/data/arc");
        assert_eq!(resolve(root, "a/b.bin").unwrap(), root.join("a").join("b.bin"));
        assert_eq!(resolve(root, "/a/./b.bin").unwrap(), root.join("a").join("b.bin"));
        assert_eq!(resolve(root, "").unwrap(), root);
    }

    #[test]
    fn rejects_escapes() {
        let root = Path::new("/data/arc");
        for bad in ["../x", "a/../../x", "a/..", "a\\..\\x", "a\0b"] {
            assert!(
                matches!(resolve(root, bad), Err(FsError::UnsafePath(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn archive_dir_is_24_hex_digits() {
        let id = [0x00, 0x01, 0x02, 0x03, 0xAB, 0xCD, 0xEF, 0x10, 0x20, 0x30, 0x40, 0xFF];
        let name = archive_dir_name(&id);
        assert_eq!(name.len(), 24);
        assert_eq!(name, "00010203abcdef10203040ff");
    }
}

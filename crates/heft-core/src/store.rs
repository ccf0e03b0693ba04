use std::path::{Path, PathBuf};

use heft_types::Oid;

/// Content-addressed object store under the repository's git directory.
///
/// Objects live at `heft/objects/<aa>/<bb>/<full hex>`, fanned out on the
/// first two hex byte pairs to keep directory sizes bounded.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(git_dir: &Path) -> Self {
        Self {
            root: git_dir.join("heft").join("objects"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the object for `oid` lives, whether or not it exists.
    pub fn object_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.object_path(oid).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_on_leading_bytes() {
        let store = LocalStore::new(Path::new("/repo/.git"));
        let oid = Oid::compute(b"");
        let path = store.object_path(&oid);
        let hex = oid.to_hex();
        assert_eq!(
            path,
            Path::new("/repo/.git")
                .join("heft")
                .join("objects")
                .join(&hex[0..2])
                .join(&hex[2..4])
                .join(&hex)
        );
    }

    #[test]
    fn contains_reflects_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let oid = Oid::compute(b"present");
        assert!(!store.contains(&oid));

        let path = store.object_path(&oid);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"present").unwrap();
        assert!(store.contains(&oid));
    }
}

use std::fs;
use std::path::{Path, PathBuf};

/// Writes `text` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, text: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(&path, text).expect("write fixture file");
    path
}

/// Writes an artifact for `internal_name` under `build_root` the way a
/// compiler would lay it out (`p/q/Name.class`).
pub fn write_class(build_root: &Path, internal_name: &str, bytes: &[u8]) -> PathBuf {
    write_file(build_root, &format!("{internal_name}.class"), bytes)
}

/// A scratch workspace with `src/` and `build/` roots.
pub struct TempProject {
    pub dir: tempfile::TempDir,
    pub source_root: PathBuf,
    pub build_root: PathBuf,
}

impl TempProject {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_root = dir.path().join("src");
        let build_root = dir.path().join("build");
        fs::create_dir_all(&source_root).expect("create src");
        fs::create_dir_all(&build_root).expect("create build");
        Self {
            dir,
            source_root,
            build_root,
        }
    }

    pub fn write_source(&self, rel: &str, text: &str) -> PathBuf {
        write_file(&self.source_root, rel, text)
    }

    pub fn write_class(&self, internal_name: &str, bytes: &[u8]) -> PathBuf {
        write_class(&self.build_root, internal_name, bytes)
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

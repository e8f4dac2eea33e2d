//! Locating compiled artifacts on a classpath.
//!
//! A classpath is an ordered list of class directories and archives; the
//! first entry that contains a class wins.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClasspathError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive error in {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

pub type Result<T> = std::result::Result<T, ClasspathError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClasspathFingerprint(u64);

impl ClasspathFingerprint {
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClasspathEntry {
    ClassDir(PathBuf),
    Archive(PathBuf),
}

impl ClasspathEntry {
    /// `.jar`/`.zip` paths become archives; anything else is a class directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(OsStr::to_str) {
            Some(ext) if ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip") => {
                ClasspathEntry::Archive(path)
            }
            _ => ClasspathEntry::ClassDir(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ClasspathEntry::ClassDir(p) | ClasspathEntry::Archive(p) => p,
        }
    }

    pub fn fingerprint(&self) -> std::io::Result<ClasspathFingerprint> {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher)?;
        Ok(ClasspathFingerprint(hasher.finish()))
    }

    fn hash_into(&self, hasher: &mut DefaultHasher) -> std::io::Result<()> {
        match self {
            ClasspathEntry::Archive(path) => {
                path.to_string_lossy().hash(hasher);
                match std::fs::metadata(path) {
                    Ok(meta) => {
                        meta.len().hash(hasher);
                        hash_mtime(hasher, &meta.modified()?);
                    }
                    // A missing archive is a valid (empty) state.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => 0u8.hash(hasher),
                    Err(err) => return Err(err),
                }
            }
            ClasspathEntry::ClassDir(dir) => {
                dir.to_string_lossy().hash(hasher);
                let mut class_files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
                    .follow_links(false)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| entry.path().extension() == Some(OsStr::new("class")))
                    .map(|entry| entry.into_path())
                    .collect();
                class_files.sort();
                for file in class_files {
                    let meta = std::fs::metadata(&file)?;
                    file.strip_prefix(dir)
                        .unwrap_or(&file)
                        .to_string_lossy()
                        .hash(hasher);
                    meta.len().hash(hasher);
                    hash_mtime(hasher, &meta.modified()?);
                }
            }
        }
        Ok(())
    }
}

fn hash_mtime(hasher: &mut DefaultHasher, time: &SystemTime) {
    let duration = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    duration.as_secs().hash(hasher);
    duration.subsec_nanos().hash(hasher);
}

/// Something that can produce the bytes of a compiled class by internal name.
pub trait ClassFinder: Send + Sync {
    /// `Ok(None)` when no entry contains the class.
    fn find_class(&self, internal_name: &str) -> Result<Option<Vec<u8>>>;
}

/// An ordered classpath with lazily opened archives.
#[derive(Default)]
pub struct Classpath {
    entries: Vec<ClasspathEntry>,
    archives: Mutex<HashMap<PathBuf, Option<zip::ZipArchive<File>>>>,
}

impl std::fmt::Debug for Classpath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classpath")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl Classpath {
    pub fn new(entries: Vec<ClasspathEntry>) -> Self {
        Self {
            entries,
            archives: Mutex::new(HashMap::new()),
        }
    }

    pub fn entries(&self) -> &[ClasspathEntry] {
        &self.entries
    }

    pub fn fingerprint(&self) -> std::io::Result<ClasspathFingerprint> {
        let mut hasher = DefaultHasher::new();
        for entry in &self.entries {
            entry.hash_into(&mut hasher)?;
        }
        Ok(ClasspathFingerprint(hasher.finish()))
    }

    /// Drops cached archive handles so the next lookup re-reads them from disk.
    pub fn refresh(&self) {
        self.archives.lock().clear();
    }

    fn find_in_dir(dir: &Path, internal_name: &str) -> Result<Option<Vec<u8>>> {
        let path = dir.join(format!("{internal_name}.class"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ClasspathError::Io { path, source }),
        }
    }

    fn find_in_archive(&self, path: &Path, internal_name: &str) -> Result<Option<Vec<u8>>> {
        let mut archives = self.archives.lock();
        if !archives.contains_key(path) {
            let opened = match File::open(path) {
                Ok(file) => match zip::ZipArchive::new(file) {
                    Ok(archive) => Some(archive),
                    Err(err) => {
                        tracing::warn!(
                            target = "kiln.classpath",
                            path = %path.display(),
                            error = %err,
                            "ignoring unreadable archive"
                        );
                        None
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(source) => {
                    return Err(ClasspathError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            };
            archives.insert(path.to_path_buf(), opened);
        }
        let Some(archive) = archives.get_mut(path).and_then(Option::as_mut) else {
            return Ok(None);
        };

        let name = format!("{internal_name}.class");
        let mut file = match archive.by_name(&name) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(source) => {
                return Err(ClasspathError::Zip {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|source| ClasspathError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Some(bytes))
    }
}

impl ClassFinder for Classpath {
    fn find_class(&self, internal_name: &str) -> Result<Option<Vec<u8>>> {
        for entry in &self.entries {
            let found = match entry {
                ClasspathEntry::ClassDir(dir) => Self::find_in_dir(dir, internal_name),
                ClasspathEntry::Archive(path) => self.find_in_archive(path, internal_name),
            };
            match found {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => {}
                // One unreadable entry must not hide classes in later entries.
                Err(err) => {
                    tracing::debug!(
                        target = "kiln.classpath",
                        entry = %entry.path().display(),
                        class = internal_name,
                        error = %err,
                        "skipping unreadable classpath entry"
                    );
                }
            }
        }
        Ok(None)
    }
}

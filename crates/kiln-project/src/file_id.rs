use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kiln_core::FileId;

/// Allocates stable `FileId`s for paths and supports reverse lookup.
///
/// Ids are never reused, so a deleted file keeps its id and gets it back if
/// it reappears.
#[derive(Debug, Default)]
pub struct FileIdRegistry {
    path_to_id: HashMap<PathBuf, FileId>,
    id_to_path: Vec<PathBuf>,
}

impl FileIdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stable id for `path`, allocating a new one if necessary.
    pub fn file_id(&mut self, path: &Path) -> FileId {
        if let Some(&id) = self.path_to_id.get(path) {
            return id;
        }

        // Ids index arenas; u32 overflow would need four billion files.
        let id = FileId::from_raw(self.id_to_path.len() as u32);
        self.id_to_path.push(path.to_path_buf());
        self.path_to_id.insert(path.to_path_buf(), id);
        id
    }

    /// Returns the id for `path` if it has been interned.
    pub fn get_id(&self, path: &Path) -> Option<FileId> {
        self.path_to_id.get(path).copied()
    }

    /// Returns the path for `id`.
    pub fn get_path(&self, id: FileId) -> Option<&Path> {
        self.id_to_path.get(id.index()).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.id_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_path.is_empty()
    }
}

use indexmap::IndexMap;
use kiln_core::FileId;

/// Lifecycle of a queued file within a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum EntryState {
    Pending,
    Compiling,
    /// Failed with a retryable error; compiled again in a later pass.
    Retrying,
    /// Failed with a source error; stays queued until the next edit or build.
    Failed,
}

/// Files awaiting (re)compilation, in the order they were enqueued.
#[derive(Debug, Default, Clone)]
pub struct BuildQueue {
    entries: IndexMap<FileId, EntryState>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `file` as pending; returns `false` if it was already queued.
    ///
    /// Re-enqueueing a failed file resets it to pending, as does an edit that
    /// arrives while the file is compiling.
    pub fn enqueue(&mut self, file: FileId) -> bool {
        match self.entries.get_mut(&file) {
            Some(state) => {
                if matches!(state, EntryState::Failed | EntryState::Compiling) {
                    *state = EntryState::Pending;
                }
                false
            }
            None => {
                self.entries.insert(file, EntryState::Pending);
                true
            }
        }
    }

    pub fn remove(&mut self, file: FileId) -> bool {
        self.entries.shift_remove(&file).is_some()
    }

    pub fn contains(&self, file: FileId) -> bool {
        self.entries.contains_key(&file)
    }

    pub fn state(&self, file: FileId) -> Option<EntryState> {
        self.entries.get(&file).copied()
    }

    pub fn set_state(&mut self, file: FileId, state: EntryState) {
        if let Some(entry) = self.entries.get_mut(&file) {
            *entry = state;
        }
    }

    /// Files eligible for the next pass: everything not failed.
    pub fn runnable(&self) -> Vec<FileId> {
        self.entries
            .iter()
            .filter(|(_, state)| **state != EntryState::Failed)
            .map(|(file, _)| *file)
            .collect()
    }

    /// Returns failed entries to pending so the next build retries them.
    pub fn reset_failed(&mut self) {
        for state in self.entries.values_mut() {
            if matches!(state, EntryState::Failed | EntryState::Compiling) {
                *state = EntryState::Pending;
            }
        }
    }

    pub fn files(&self) -> Vec<FileId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use std::panic::Location;
use std::path::Path;

#[track_caller]
pub(crate) fn remove_file_best_effort(path: &Path, reason: &'static str) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
        Err(err) => {
            let loc = Location::caller();
            tracing::debug!(
              target = "kiln.build",
              path = %path.display(),
              reason,
              file = loc.file(),
              line = loc.line(),
              error = %err,
              "failed to remove file (best effort)"
            );
            false
        }
    }
}

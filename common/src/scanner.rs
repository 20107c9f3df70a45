// Latest-file selection for the monitored folder

use std::cmp::Ordering;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// A file that may be dispatched
#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    name: OsString,
    modified: SystemTime,
}

/// Pick the most recently modified regular file in `directory`.
///
/// Hidden files (leading `.`) and directories are skipped. Equal modification
/// times are broken by file name, the lexicographically smallest winning, so the
/// result is stable for a given snapshot of the directory.
///
/// Never fails: a missing or unreadable directory yields `None`.
pub fn select_latest(directory: &Path) -> Option<PathBuf> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(directory = %directory.display(), error = %e, "Monitor folder not readable");
            return None;
        }
    };

    entries
        .filter_map(|entry| match entry {
            Ok(entry) => eligible(entry.path()),
            Err(e) => {
                warn!(directory = %directory.display(), error = %e, "Skipping unreadable entry");
                None
            }
        })
        .max_by(newest_first)
        .map(|candidate| candidate.path)
}

fn eligible(path: PathBuf) -> Option<Candidate> {
    let name = path.file_name()?.to_os_string();
    if name.to_string_lossy().starts_with('.') {
        return None;
    }

    // Follows symlinks, so a link to a regular file counts as a file
    let metadata = fs::metadata(&path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    let modified = metadata.modified().ok()?;

    Some(Candidate {
        path,
        name,
        modified,
    })
}

fn newest_first(a: &Candidate, b: &Candidate) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| b.name.cmp(&a.name))
}

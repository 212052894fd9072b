use std::fs;
use std::path::{Path, PathBuf};

use crate::app::{EventLevel, ProgressEvent, ProgressSink};
use crate::domain::SUBJECT_PREFIX;
use crate::error::VolumeCounterError;

pub const SESSION_PREFIX: &str = "ses-";
pub const ANAT_DIR: &str = "anat";
pub const T1W_SUFFIXES: [&str; 2] = ["_T1w.nii.gz", "_T1w.nii"];

/// Finds `sub-*/[ses-*/]anat/*_T1w.nii[.gz]` below `root`.
///
/// Subjects with at least one `ses-*` directory are searched per session
/// only. The result is sorted by full path and free of duplicates.
pub fn find_t1w_images(
    root: &Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<PathBuf>, VolumeCounterError> {
    let mut found = Vec::new();

    for subject_dir in prefixed_dirs(root, SUBJECT_PREFIX)? {
        let sessions = match prefixed_dirs(&subject_dir, SESSION_PREFIX) {
            Ok(sessions) => sessions,
            Err(err) => {
                skip_unreadable(sink, &subject_dir, &err);
                continue;
            }
        };

        let anat_dirs = if sessions.is_empty() {
            vec![subject_dir.join(ANAT_DIR)]
        } else {
            sessions
                .into_iter()
                .map(|session| session.join(ANAT_DIR))
                .collect()
        };

        for anat_dir in anat_dirs {
            if !anat_dir.is_dir() {
                continue;
            }
            match t1w_files(&anat_dir) {
                Ok(files) => found.extend(files),
                Err(err) => skip_unreadable(sink, &anat_dir, &err),
            }
        }
    }

    found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    found.dedup();
    Ok(found)
}

pub fn is_t1w_filename(name: &str) -> bool {
    T1W_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

fn prefixed_dirs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, VolumeCounterError> {
    let mut dirs = Vec::new();
    for path in read_dir_paths(dir)? {
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(prefix))
            .unwrap_or(false);
        if matches && path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn t1w_files(anat_dir: &Path) -> Result<Vec<PathBuf>, VolumeCounterError> {
    let mut files = Vec::new();
    for path in read_dir_paths(anat_dir)? {
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(is_t1w_filename)
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn read_dir_paths(dir: &Path) -> Result<Vec<PathBuf>, VolumeCounterError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| VolumeCounterError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| VolumeCounterError::Filesystem(err.to_string()))?;
        paths.push(entry.path());
    }
    Ok(paths)
}

fn skip_unreadable(sink: &dyn ProgressSink, dir: &Path, err: &VolumeCounterError) {
    sink.event(ProgressEvent {
        level: EventLevel::Debug,
        message: format!("skipping {}: {err}", dir.display()),
    });
}

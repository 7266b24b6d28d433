//! Best-effort external mirror: copies the current shard and the resume
//! file to a secondary location (e.g. a mounted network volume) whenever
//! the source is newer. Never blocks progress — every failure is wrapped
//! as `CoordinatorError::Mirror`, logged, and swallowed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use xiebo_shared_errors::CoordinatorError;

pub struct MirrorSink {
    destination_dir: Option<PathBuf>,
}

impl MirrorSink {
    /// `destination_dir = None` disables the mirror entirely (the common
    /// case when no external volume is mounted).
    pub fn new(destination_dir: Option<PathBuf>) -> Self {
        Self { destination_dir }
    }

    pub fn is_enabled(&self) -> bool {
        self.destination_dir.is_some()
    }

    /// Mirrors one file if the destination is missing or older than the
    /// source. Logs and swallows any I/O failure.
    pub fn mirror_file(&self, source: &Path) {
        let Some(dest_dir) = &self.destination_dir else {
            return;
        };
        let Some(file_name) = source.file_name() else {
            return;
        };
        let dest = dest_dir.join(file_name);

        if let Err(source) = self.try_mirror(source, &dest) {
            let err = CoordinatorError::Mirror { path: dest, source };
            tracing::warn!(error = %err, "mirror sink failed, continuing without it");
        }
    }

    fn try_mirror(&self, source: &Path, dest: &Path) -> std::io::Result<()> {
        let source_mtime = fs::metadata(source)?.modified()?;
        if let Ok(dest_meta) = fs::metadata(dest) {
            let dest_mtime = dest_meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if dest_mtime >= source_mtime {
                return Ok(());
            }
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        let _ = filetime_set(dest, source_mtime);
        Ok(())
    }
}

/// Best-effort mtime preservation; if the platform can't set it, the file
/// is still copied, it just looks "newer" than the source next time.
fn filetime_set(path: &Path, mtime: SystemTime) -> std::io::Result<()> {
    let file = fs::File::options().write(true).open(path)?;
    file.set_modified(mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disabled_mirror_is_a_no_op() {
        let sink = MirrorSink::new(None);
        assert!(!sink.is_enabled());
        sink.mirror_file(Path::new("/nonexistent/should/not/panic.txt"));
    }

    #[test]
    fn copies_when_destination_missing() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src_path = src_dir.path().join("nextbatch.txt");
        fs::write(&src_path, "hello").unwrap();

        let sink = MirrorSink::new(Some(dst_dir.path().to_path_buf()));
        sink.mirror_file(&src_path);

        let mirrored = fs::read_to_string(dst_dir.path().join("nextbatch.txt")).unwrap();
        assert_eq!(mirrored, "hello");
    }

    #[test]
    fn skips_when_destination_is_newer() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src_path = src_dir.path().join("nextbatch.txt");
        let dst_path = dst_dir.path().join("nextbatch.txt");
        fs::write(&src_path, "old").unwrap();
        fs::write(&dst_path, "newer-content").unwrap();

        let sink = MirrorSink::new(Some(dst_dir.path().to_path_buf()));
        sink.mirror_file(&src_path);

        assert_eq!(fs::read_to_string(&dst_path).unwrap(), "newer-content");
    }
}

//! Raw-audio archival for one session.
//!
//! Every session leaves exactly one file on persistent storage containing the
//! pre-transcode byte stream in arrival order, named deterministically from
//! the session identifier and the session creation time.

use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only writer for a session's raw audio file.
#[derive(Debug)]
pub struct ArchiveWriter {
    file: File,
    path: PathBuf,
    filename: String,
    bytes_written: u64,
}

impl ArchiveWriter {
    /// Create the archival file for a session.
    ///
    /// The recordings directory is created if missing. Failure here fails the
    /// session, not the process.
    pub fn create(
        recordings_dir: &Path,
        session_id: &str,
        created_at: DateTime<Utc>,
    ) -> io::Result<Self> {
        fs::create_dir_all(recordings_dir)?;

        let filename = format!(
            "{}_{}.webm",
            sanitize_id(session_id),
            created_at.format("%Y%m%d_%H%M%S")
        );
        let path = recordings_dir.join(&filename);
        let file = File::create(&path)?;

        Ok(Self {
            file,
            path,
            filename,
            bytes_written: 0,
        })
    }

    /// Append one chunk in arrival order.
    pub fn append(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush buffered bytes to storage. Called once by the shutdown sequence.
    pub fn finish(&mut self) {
        if let Err(err) = self.file.flush() {
            warn!(path = %self.path.display(), error = %err, "failed to flush archival file");
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Keep the caller-supplied identifier filesystem-safe without losing
/// determinism: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn sanitize_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_filename_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArchiveWriter::create(dir.path(), "abc123", created_at()).unwrap();
        assert_eq!(writer.filename(), "abc123_20250314_092653.webm");
        assert!(writer.path().exists());
    }

    #[test]
    fn test_appends_accumulate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArchiveWriter::create(dir.path(), "abc123", created_at()).unwrap();

        writer.append(&[1, 2, 3]).unwrap();
        writer.append(&[4, 5]).unwrap();
        writer.finish();

        assert_eq!(writer.bytes_written(), 5);
        let contents = fs::read(writer.path()).unwrap();
        assert_eq!(contents, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_session_id_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArchiveWriter::create(dir.path(), "../evil/id", created_at()).unwrap();
        assert_eq!(writer.filename(), ".._evil_id_20250314_092653.webm");
        // The file stays inside the recordings directory.
        assert_eq!(writer.path().parent().unwrap(), dir.path());
    }

    #[test]
    fn test_create_fails_on_unwritable_dir() {
        let result = ArchiveWriter::create(
            Path::new("/proc/definitely/not/writable"),
            "abc",
            created_at(),
        );
        assert!(result.is_err());
    }
}

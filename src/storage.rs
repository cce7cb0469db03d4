//! Per-request scratch space for uploaded files.
//!
//! Every request that needs to stage uploads on disk gets its own directory
//! under the configured upload root. The directory is removed when the
//! [`Scratch`] handle drops, so nothing outlives the request unless the
//! process dies mid-request; [`sweep_stale`] catches those leftovers.

use crate::types::ConversionError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use unicode_normalization::UnicodeNormalization;

pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn create(root: &Path) -> Result<Self, ConversionError> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("req-").tempdir_in(root)?;
        log::debug!("Created scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Write `content` as `<unix-millis>_<sanitized name>` and return the path.
    pub fn persist(&self, original_name: &str, content: &[u8]) -> Result<PathBuf, ConversionError> {
        let stamp = chrono::Utc::now().timestamp_millis();
        let safe_name = secure_filename(original_name);

        let mut path = self.dir.path().join(format!("{}_{}", stamp, safe_name));
        let mut attempt = 1;
        while path.exists() {
            path = self
                .dir
                .path()
                .join(format!("{}_{}_{}", stamp, attempt, safe_name));
            attempt += 1;
        }

        fs::write(&path, content)?;
        Ok(path)
    }
}

/// Reduce an uploaded filename to a safe ASCII basename.
///
/// The name is NFKD-decomposed first so accented letters keep their base
/// letter. Path separators and whitespace become underscores, every character
/// outside `[A-Za-z0-9._-]` is dropped, and leading/trailing dots and
/// underscores are trimmed. An empty result becomes `"upload"`.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let joined = ascii
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Remove entries directly under `root` whose modification time is older than
/// `max_age`. Individual failures are ignored; returns the number removed.
pub fn sweep_stale(root: &Path, max_age: Duration) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if !matches!(age, Some(age) if age > max_age) {
            continue;
        }

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => removed += 1,
            Err(e) => log::debug!("Could not sweep {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        log::info!("🧹 Swept {} stale entries from {}", removed, root.display());
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My Report.pdf"), "My_Report.pdf");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("résumé 2024.pdf"), "resume_2024.pdf");
        assert_eq!(secure_filename("Ｆｕｌｌ ｗｉｄｔｈ.png"), "Full_width.png");
        assert_eq!(secure_filename("報告.pdf"), "pdf");
        assert_eq!(secure_filename("..."), "upload");
        assert_eq!(secure_filename(""), "upload");
    }

    #[test]
    fn test_scratch_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch_path;
        {
            let scratch = Scratch::create(root.path()).unwrap();
            let first = scratch.persist("a.pdf", b"one").unwrap();
            let second = scratch.persist("a.pdf", b"two").unwrap();
            assert_ne!(first, second);
            assert!(first.file_name().unwrap().to_string_lossy().ends_with("_a.pdf"));
            assert_eq!(fs::read(&second).unwrap(), b"two");
            scratch_path = scratch.dir.path().to_path_buf();
            assert!(scratch_path.exists());
        }
        assert!(!scratch_path.exists());
    }

    #[test]
    fn test_sweep_removes_only_old_entries() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("old.pdf"), b"x").unwrap();
        fs::create_dir(root.path().join("req-old")).unwrap();

        assert_eq!(sweep_stale(root.path(), Duration::from_secs(600)), 0);
        assert!(root.path().join("old.pdf").exists());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sweep_stale(root.path(), Duration::from_millis(1)), 2);
        assert!(!root.path().join("old.pdf").exists());
        assert!(!root.path().join("req-old").exists());
    }

    #[test]
    fn test_sweep_missing_root_is_noop() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(sweep_stale(&root.path().join("missing"), Duration::ZERO), 0);
    }
}

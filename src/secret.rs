use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::Result;

/// Exclusively-owned temporary file carrying secret material: a key
/// passphrase or a generated toolkit configuration block.
///
/// The file is created with a collision-resistant unique name and, on unix,
/// `0600` permissions. Content is written straight to that file with no
/// intermediate copy. Deletion is tied to `Drop`, so a secret can neither
/// be released twice nor outlive the scope that created it; holding the
/// `SecretFile` for the duration of a toolkit invocation is the whole
/// release discipline.
#[derive(Debug)]
pub struct SecretFile {
    file: NamedTempFile,
}

impl SecretFile {
    /// Writes `content` to a fresh secret file in `dir`.
    ///
    /// Pinning the directory lets callers observe that nothing is left
    /// behind after an invocation, including a failed one.
    pub fn create_in(dir: impl AsRef<Path>, content: &[u8]) -> Result<Self> {
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content)?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Path usable as a filesystem argument to the toolkit.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::SecretFile;

    #[test]
    fn secret_file_is_removed_when_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let secret = SecretFile::create_in(dir.path(), b"hunter2").unwrap();
            assert_eq!(std::fs::read(secret.path()).unwrap(), b"hunter2");
            secret.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_not_group_or_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let secret = SecretFile::create_in(dir.path(), b"hunter2").unwrap();
        let mode = std::fs::metadata(secret.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}

//! Attachment Blob Store (C2): a content-addressed-ish filesystem hierarchy
//! keyed by date and email id, with a random prefix so concurrent uploads
//! for the same email never collide. Grounded on the teacher's store-crate
//! backend-open pattern (blocking filesystem work off the async runtime)
//! and on `internal/storage/storage.go` from the original implementation
//! for the path/sanitization scheme.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const MAX_SAFE_FILENAME_BYTES: usize = 100;
const RANDOM_PREFIX_CHARS: usize = 8;
const RANDOM_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Replaces any byte outside `[A-Za-z0-9._-]` with `_` and truncates to
/// 100 bytes (§4.2).
pub fn safe_filename(name: &str) -> String {
    let mut out: String = name
        .bytes()
        .map(|b| {
            let c = b as char;
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    out.truncate(MAX_SAFE_FILENAME_BYTES);
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn random_prefix() -> String {
    let mut rng = rand::rng();
    (0..RANDOM_PREFIX_CHARS)
        .map(|_| RANDOM_ALPHABET[rng.random_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

/// Content-addressed-ish attachment storage rooted at `base_path`. Cheap to
/// clone: the path is the only state.
#[derive(Clone)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    /// Creates `base_path` if missing. Fatal-at-startup if the directory
    /// cannot be created (§7).
    pub async fn open(base_path: impl Into<PathBuf>) -> trc::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| trc::Error::fatal(format!("failed to create storage directory: {e}")))?;
        Ok(BlobStore { base_path })
    }

    /// Writes up to `limit` bytes of `reader` to
    /// `basePath/YYYY/MM/DD/<email_id>/<random8>_<safe_filename>`, returning
    /// the path relative to `base_path` and the number of bytes written. On
    /// any I/O failure after the file was created, the partial file is
    /// removed before the error is returned.
    pub async fn store(
        &self,
        email_id: i64,
        filename: &str,
        reader: impl AsyncRead + Unpin,
        limit: u64,
    ) -> trc::Result<(String, u64)> {
        let now = Utc::now();
        let rel_dir = PathBuf::from(format!("{:04}", now.format("%Y")))
            .join(format!("{:02}", now.format("%m")))
            .join(format!("{:02}", now.format("%d")))
            .join(email_id.to_string());
        let dir = self.base_path.join(&rel_dir);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| trc::Error::transient(format!("failed to create attachment directory: {e}")))?;

        let unique_name = format!("{}_{}", random_prefix(), safe_filename(filename));
        let rel_path = rel_dir.join(&unique_name);
        let full_path = self.base_path.join(&rel_path);

        match self.write_limited(&full_path, reader, limit).await {
            Ok(written) => Ok((rel_path.to_string_lossy().replace('\\', "/"), written)),
            Err(e) => {
                let _ = fs::remove_file(&full_path).await;
                Err(e)
            }
        }
    }

    async fn write_limited(
        &self,
        full_path: &Path,
        reader: impl AsyncRead + Unpin,
        limit: u64,
    ) -> trc::Result<u64> {
        let mut file = fs::File::create(full_path)
            .await
            .map_err(|e| trc::Error::transient(format!("failed to create attachment file: {e}")))?;
        let mut limited = reader.take(limit);
        let written = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| trc::Error::transient(format!("failed to write attachment: {e}")))?;
        file.flush()
            .await
            .map_err(|e| trc::Error::transient(format!("failed to flush attachment: {e}")))?;
        Ok(written)
    }

    /// Opens `relative_path` (joined under `base_path`) for streaming read.
    pub async fn get(&self, relative_path: &str) -> trc::Result<fs::File> {
        fs::File::open(self.base_path.join(relative_path))
            .await
            .map_err(|e| trc::Error::transient(format!("failed to open attachment: {e}")))
    }

    /// Removes `relative_path`. Idempotent: a missing file is not an error.
    pub async fn delete(&self, relative_path: &str) -> trc::Result<()> {
        match fs::remove_file(self.base_path.join(relative_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(trc::Error::transient(format!("failed to delete attachment: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(safe_filename("inv oice/../etc.pdf"), "inv_oice_.._etc.pdf");
        assert_eq!(safe_filename("plain.txt"), "plain.txt");
    }

    #[test]
    fn truncates_long_filenames() {
        let long = "a".repeat(200);
        assert_eq!(safe_filename(&long).len(), MAX_SAFE_FILENAME_BYTES);
    }

    #[tokio::test]
    async fn stores_and_retrieves_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();

        let (rel_path, written) = store
            .store(42, "invoice.pdf", Cursor::new(b"hello world".to_vec()), 1024)
            .await
            .unwrap();
        assert_eq!(written, 11);
        assert!(rel_path.contains("/42/"));
        assert!(rel_path.ends_with("_invoice.pdf"));

        let mut file = store.get(&rel_path).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello world");

        store.delete(&rel_path).await.unwrap();
        assert!(store.get(&rel_path).await.is_err());
        // idempotent
        store.delete(&rel_path).await.unwrap();
    }

    #[tokio::test]
    async fn truncates_at_limit_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        let (rel_path, written) = store
            .store(1, "big.bin", Cursor::new(vec![7u8; 100]), 10)
            .await
            .unwrap();
        assert_eq!(written, 10);
        let mut file = store.get(&rel_path).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 10);
    }

    #[tokio::test]
    async fn distinct_uploads_for_same_email_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path()).await.unwrap();
        let (p1, _) = store.store(7, "a.txt", Cursor::new(b"one".to_vec()), 10).await.unwrap();
        let (p2, _) = store.store(7, "a.txt", Cursor::new(b"two".to_vec()), 10).await.unwrap();
        assert_ne!(p1, p2);
    }
}

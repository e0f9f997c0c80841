//! Offline blob store for downloaded media and artwork.
//!
//! A flat directory of files, one per key. Keys follow the fixed layout
//! `media-<trackId>` and `artwork-<trackId>`; writes are keyed so that
//! concurrent downloads of the same track are idempotent (last write
//! wins). Readers must not assume exclusive access.
//!
//! The store is an optimization, never a requirement: a read failure is
//! reported to the caller, which falls back to the remote source.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::{
    error::{Error, Result},
    track::{Track, TrackId},
};

/// Blob store key for a track's media payload.
#[must_use]
pub fn media_key(id: &TrackId) -> String {
    format!("media-{id}")
}

/// Blob store key for a track's artwork.
#[must_use]
pub fn artwork_key(id: &TrackId) -> String {
    format!("artwork-{id}")
}

/// Filesystem-backed key-value blob store.
#[derive(Clone, Debug)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Opens the store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Keys become file names as-is; anything outside a conservative
    /// character set is replaced so a key can never escape the root.
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|chr| {
                if chr.is_ascii_alphanumeric() || chr == '-' || chr == '_' || chr == '.' {
                    chr
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(file_name)
    }

    /// Retrieves the blob stored under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any read failure other than absence.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a blob exists under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        fs::try_exists(self.path_for(key)).await.unwrap_or(false)
    }

    /// Stores `bytes` under `key`, replacing any previous blob.
    ///
    /// The blob is written to a temporary sibling first and renamed into
    /// place, so readers never observe a half-written file.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any write failure; the previous blob, if any, is
    /// left intact.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        // Appended, not `with_extension`: keys may contain dots, and the
        // staging file of one key must never shadow another key's.
        let staging = self.path_for(&format!("{key}.part"));

        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &path).await?;
        Ok(())
    }

    /// Removes the blob stored under `key`. Absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any removal failure other than absence.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every blob in the store.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the directory cannot be traversed or a file
    /// cannot be removed.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Downloads a track's media payload into the store.
    ///
    /// A failed download leaves any previously stored blob unchanged; the
    /// caller surfaces the error as a non-fatal notification.
    ///
    /// # Errors
    ///
    /// Returns `Err` on transport failure, a non-success status, or a
    /// write failure.
    pub async fn download(&self, client: &reqwest::Client, track: &Track) -> Result<()> {
        let response = client.get(track.media_url().clone()).send().await?;
        if !response.status().is_success() {
            return Err(Error::unavailable(format!(
                "download of track {track} failed with status {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        self.put(&media_key(track.id()), &bytes).await?;
        info!("downloaded track {track} ({} bytes)", bytes.len());
        Ok(())
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Store::open(dir.path()).await.expect("store opens");
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let (_dir, store) = store().await;
        let key = media_key(&TrackId::new("jio-abc"));

        assert_eq!(store.get(&key).await.unwrap(), None);

        store.put(&key, b"blob").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(&b"blob"[..]));
        assert!(store.contains(&key).await);

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);

        // Deleting an absent key is not an error.
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn put_replaces_previous_blob() {
        let (_dir, store) = store().await;
        store.put("media-x", b"one").await.unwrap();
        store.put("media-x", b"two").await.unwrap();
        assert_eq!(store.get("media-x").await.unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let (_dir, store) = store().await;
        store.put("media-a", b"a").await.unwrap();
        store.put("artwork-a", b"b").await.unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.get("media-a").await.unwrap(), None);
        assert_eq!(store.get("artwork-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hostile_keys_stay_inside_the_root() {
        let (dir, store) = store().await;
        store.put("../escape", b"x").await.unwrap();

        let mut entries = std::fs::read_dir(dir.path()).expect("read dir");
        let entry = entries.next().expect("one entry").expect("entry");
        assert_eq!(entry.file_name(), ".._escape");
    }

    #[tokio::test]
    async fn staging_files_are_keyed_by_full_name() {
        let (dir, store) = store().await;
        // A neighbor blob whose name the truncate-at-dot scheme would
        // pick as the staging file for "media-a.b".
        std::fs::write(dir.path().join("media-a.part"), b"other").expect("write neighbor");

        store.put("media-a.b", b"blob").await.unwrap();

        assert_eq!(
            store.get("media-a.b").await.unwrap().as_deref(),
            Some(&b"blob"[..])
        );
        assert_eq!(
            std::fs::read(dir.path().join("media-a.part")).expect("neighbor survives"),
            b"other"
        );
    }

    #[test]
    fn key_layout_is_stable() {
        let id = TrackId::new("jio-abc");
        assert_eq!(media_key(&id), "media-jio-abc");
        assert_eq!(artwork_key(&id), "artwork-jio-abc");
    }
}

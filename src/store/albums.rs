//! Album Store (spec §4.C).
//!
//! Enumerates album directories under the image root, tracks the enabled
//! set (persisted as one comma-separated string via `RotationConfigStore`,
//! which owns the same `enabled_albums` field the rotation engine reads),
//! and creates/deletes album directories.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::store::rotation_config::RotationConfigStore;

pub const DEFAULT_ALBUM: &str = "Default";
const IMAGE_EXTENSIONS: [&str; 2] = ["bmp", "png"];

pub struct AlbumStore {
    image_root: PathBuf,
    rotation_config: std::sync::Arc<RotationConfigStore>,
}

impl AlbumStore {
    pub fn new(image_root: impl Into<PathBuf>, rotation_config: std::sync::Arc<RotationConfigStore>) -> Self {
        Self {
            image_root: image_root.into(),
            rotation_config,
        }
    }

    /// Pure path join (§4.C).
    pub fn path(&self, name: &str) -> PathBuf {
        self.image_root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_dir()
    }

    /// Directory order, skipping hidden entries (§4.C).
    pub fn list(&self) -> Result<Vec<String>, CoreError> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.image_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(CoreError::IoError(e)),
        };

        for entry in entries {
            let entry = entry.map_err(CoreError::IoError)?;
            if !entry.file_type().map_err(CoreError::IoError)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Parsed, whitespace-trimmed enabled set (§4.C).
    pub async fn enabled(&self) -> Vec<String> {
        let config = self.rotation_config.load().await;
        parse_enabled(&config.enabled_albums)
    }

    /// Enable or disable an album. Disabling never checks existence, so
    /// stale names can be cleaned up; enabling requires the directory to
    /// exist (§4.C).
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), CoreError> {
        if enabled && !self.exists(name) {
            return Err(CoreError::NotFound(format!("album '{name}' does not exist")));
        }

        let config = self.rotation_config.load().await;
        let mut set = parse_enabled(&config.enabled_albums);

        if enabled {
            if !set.iter().any(|n| n == name) {
                set.push(name.to_string());
            }
        } else {
            set.retain(|n| n != name);
        }

        self.rotation_config
            .set_enabled_albums(&set.join(","))
            .await
            .map_err(|e| CoreError::IoError(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    /// Create a new album directory (§4.C).
    pub fn create(&self, name: &str) -> Result<(), CoreError> {
        validate_name(name)?;
        let path = self.path(name);
        if path.exists() {
            return Err(CoreError::AlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&path).map_err(CoreError::IoError)
    }

    /// Delete an album: refuses "Default", removes all regular files then
    /// the directory, and removes the name from the enabled set (§4.C).
    pub async fn delete(&self, name: &str) -> Result<(), CoreError> {
        if name == DEFAULT_ALBUM {
            return Err(CoreError::InvalidArgument(
                "the Default album cannot be deleted".to_string(),
            ));
        }

        let path = self.path(name);
        if !path.is_dir() {
            return Err(CoreError::NotFound(name.to_string()));
        }

        for entry in std::fs::read_dir(&path).map_err(CoreError::IoError)? {
            let entry = entry.map_err(CoreError::IoError)?;
            if entry.file_type().map_err(CoreError::IoError)?.is_file() {
                std::fs::remove_file(entry.path()).map_err(CoreError::IoError)?;
            }
        }
        std::fs::remove_dir(&path).map_err(CoreError::IoError)?;

        self.set_enabled(name, false).await.or_else(|e| match e {
            CoreError::NotFound(_) => Ok(()),
            other => Err(other),
        })?;
        Ok(())
    }

    /// Ensure the "Default" album directory exists (matches §3's
    /// invariant "a default album named Default always exists while the
    /// SD card is mounted").
    pub fn ensure_default(&self) -> Result<(), CoreError> {
        let path = self.path(DEFAULT_ALBUM);
        if !path.is_dir() {
            std::fs::create_dir_all(&path).map_err(CoreError::IoError)?;
        }
        Ok(())
    }

    /// Recursively enumerate `.bmp`/`.png` files under an album in
    /// lexicographic filename order (SPEC_FULL.md's resolution of the
    /// sequential-enumeration open question, §9).
    pub fn list_images(&self, album: &str) -> Result<Vec<PathBuf>, CoreError> {
        let mut images = Vec::new();
        collect_images(&self.path(album), &mut images)?;
        images.sort();
        Ok(images)
    }
}

fn collect_images(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CoreError::IoError(e)),
    };

    for entry in entries {
        let entry = entry.map_err(CoreError::IoError)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(CoreError::IoError)?;
        if file_type.is_dir() {
            collect_images(&path, out)?;
        } else if file_type.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if IMAGE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
                    out.push(path);
                }
            }
        }
    }
    Ok(())
}

fn parse_enabled(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > 127 {
        return Err(CoreError::InvalidArgument(
            "album name must be 1-127 bytes".to_string(),
        ));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(CoreError::InvalidArgument(
            "album name must not contain a path separator".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NvsStore;
    use std::sync::Arc;

    async fn setup() -> (tempdir::TempDir, AlbumStore) {
        let dir = tempdir::TempDir::new();
        let nvs = Arc::new(NvsStore::open(dir.path.join("nvs.json")).await.unwrap());
        let rc = Arc::new(RotationConfigStore::new(nvs));
        let store = AlbumStore::new(dir.path.join("images"), rc);
        store.ensure_default().unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn create_is_idempotent_and_fails_second_time() {
        let (_dir, store) = setup().await;
        store.create("Vacation").unwrap();
        assert!(matches!(store.create("Vacation"), Err(CoreError::AlreadyExists(_))));
        let names = store.list().unwrap();
        assert_eq!(names.iter().filter(|n| *n == "Vacation").count(), 1);
    }

    #[tokio::test]
    async fn delete_refuses_default_and_removes_from_enabled() {
        let (_dir, store) = setup().await;
        assert!(matches!(
            store.delete(DEFAULT_ALBUM).await,
            Err(CoreError::InvalidArgument(_))
        ));

        store.create("Temp").unwrap();
        store.set_enabled("Temp", true).await.unwrap();
        assert!(store.enabled().await.contains(&"Temp".to_string()));

        store.delete("Temp").await.unwrap();
        assert!(!store.enabled().await.contains(&"Temp".to_string()));
        assert!(!store.exists("Temp"));
    }

    #[tokio::test]
    async fn disabling_stale_name_never_checks_existence() {
        let (_dir, store) = setup().await;
        store.set_enabled("GhostAlbum", false).await.unwrap();
        assert!(!store.enabled().await.contains(&"GhostAlbum".to_string()));
    }

    #[tokio::test]
    async fn enabling_missing_album_fails() {
        let (_dir, store) = setup().await;
        assert!(matches!(
            store.set_enabled("NoSuchAlbum", true).await,
            Err(CoreError::NotFound(_))
        ));
    }

    /// Minimal scratch-directory helper (no external crate available in
    /// this workspace) so tests don't collide across runs.
    mod tempdir {
        use std::path::PathBuf;

        pub struct TempDir {
            pub path: PathBuf,
        }

        impl TempDir {
            pub fn new() -> Self {
                let path = std::env::temp_dir().join(format!(
                    "photoframe-albums-test-{}-{:?}",
                    std::process::id(),
                    std::time::Instant::now()
                ));
                std::fs::create_dir_all(&path).unwrap();
                Self { path }
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.path);
            }
        }
    }
}

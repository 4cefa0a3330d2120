//! Providers of reference unit bytes.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::corelib::{core_library_bytes, CORE_LIBRARY_UNIT};
use crate::diagnostic::CompilerError;

/// File name of the manifest read by [`DirectorySource`].
pub const MANIFEST_FILE: &str = "boot.json";

/// Manifest listing the units a session should load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootManifest {
    pub assembly_references: Vec<String>,
}

/// An external provider of reference units.
///
/// The manifest may list entries that are not units; the catalog builder
/// only fetches names ending in the configured suffix.
pub trait UnitSource: Send + Sync {
    /// Lists unit identifiers in load order.
    fn manifest(&self) -> impl Future<Output = Result<Vec<String>, CompilerError>> + Send;

    /// Retrieves the raw bytes of one unit.
    fn fetch(&self, name: &str) -> impl Future<Output = Result<Vec<u8>, CompilerError>> + Send;
}

// =============================================================================
// In-memory source
// =============================================================================

/// Units held in memory, listed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    manifest: Vec<String>,
    units: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit and lists it in the manifest.
    pub fn with_unit(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        self.manifest.push(name.clone());
        self.units.insert(name, bytes);
        self
    }

    /// Adds the base runtime unit.
    pub fn with_core_library(self) -> Self {
        self.with_unit(CORE_LIBRARY_UNIT, core_library_bytes())
    }

    /// Lists a name in the manifest without providing its bytes.
    pub fn with_listing(mut self, name: impl Into<String>) -> Self {
        self.manifest.push(name.into());
        self
    }
}

impl UnitSource for MemorySource {
    async fn manifest(&self) -> Result<Vec<String>, CompilerError> {
        Ok(self.manifest.clone())
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>, CompilerError> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| CompilerError::UnitFetchFailed {
                name: name.to_string(),
                message: "no such unit".to_string(),
            })
    }
}

// =============================================================================
// Directory source
// =============================================================================

/// Units stored as files under a root directory.
///
/// If the root contains [`MANIFEST_FILE`], its `assemblyReferences` define
/// the manifest. Otherwise every file below the root is listed, sorted, by
/// its path relative to the root.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| pathdiff::diff_paths(e.path(), &self.root))
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|name| name != MANIFEST_FILE)
            .collect();
        names.sort();
        names
    }
}

impl UnitSource for DirectorySource {
    async fn manifest(&self) -> Result<Vec<String>, CompilerError> {
        let manifest_path = self.root.join(MANIFEST_FILE);
        match tokio::fs::read(&manifest_path).await {
            Ok(bytes) => {
                let manifest: BootManifest = serde_json::from_slice(&bytes).map_err(|e| {
                    CompilerError::ManifestFailed {
                        message: format!("{}: {}", manifest_path.display(), e),
                    }
                })?;
                Ok(manifest.assembly_references)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.root.is_dir() {
                    return Err(CompilerError::ManifestFailed {
                        message: format!("{} is not a directory", self.root.display()),
                    });
                }
                Ok(self.walk())
            }
            Err(e) => Err(CompilerError::ManifestFailed {
                message: format!("{}: {}", manifest_path.display(), e),
            }),
        }
    }

    async fn fetch(&self, name: &str) -> Result<Vec<u8>, CompilerError> {
        let path = self.root.join(name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| CompilerError::UnitFetchFailed {
                name: name.to_string(),
                message: format!("{}: {}", path.display(), e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_source_lists_in_insertion_order() {
        let source = MemorySource::new()
            .with_unit("B.dll", vec![1])
            .with_listing("readme.txt")
            .with_unit("A.dll", vec![2]);
        assert_eq!(
            source.manifest().await.unwrap(),
            vec!["B.dll", "readme.txt", "A.dll"]
        );
        assert_eq!(source.fetch("A.dll").await.unwrap(), vec![2]);
        assert!(source.fetch("readme.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_directory_source_reads_boot_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{ "assemblyReferences": ["Lib.dll", "app.pdb"] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("Lib.dll"), b"bytes").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.manifest().await.unwrap(), vec!["Lib.dll", "app.pdb"]);
        assert_eq!(source.fetch("Lib.dll").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn test_directory_source_walks_without_manifest() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.dll"), b"b").unwrap();
        fs::write(dir.path().join("nested").join("a.dll"), b"a").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.manifest().await.unwrap(), vec!["b.dll", "nested/a.dll"]);
        assert_eq!(source.fetch("nested/a.dll").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_directory_source_rejects_bad_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();
        let err = DirectorySource::new(dir.path()).manifest().await.unwrap_err();
        assert!(matches!(err, CompilerError::ManifestFailed { .. }));
    }
}

//! # Reference Catalog
//!
//! The ordered set of module images symbols are resolved against. A catalog
//! is built once per session by [`populate`] and is read-only afterwards.
//!
//! ```text
//! UnitSource::manifest()  ->  filter by suffix  ->  fetch all (concurrent,
//!                                                   each under a timeout)
//!                         ->  decode + dedupe   ->  ReferenceCatalog
//! ```
//!
//! Population is all-or-nothing: the first failure aborts it and no partial
//! catalog is returned.

pub mod corelib;
pub mod source;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;

use crate::config::CompilerConfig;
use crate::diagnostic::CompilerError;
use crate::image::{self, ModuleImage, TypeDef};

pub use corelib::{core_library, core_library_bytes, CORE_LIBRARY_NAME, CORE_LIBRARY_UNIT};
pub use source::{BootManifest, DirectorySource, MemorySource, UnitSource, MANIFEST_FILE};

// =============================================================================
// Reference Unit
// =============================================================================

/// An immutable module image that exports types for symbol resolution.
///
/// Two units are the same unit iff their bytes are identical.
#[derive(Debug, Clone)]
pub struct ReferenceUnit {
    name: String,
    bytes: Arc<[u8]>,
    content_hash: u64,
    image: Arc<ModuleImage>,
}

impl ReferenceUnit {
    /// Decodes `bytes` as a module image named `name`.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, CompilerError> {
        let name = name.into();
        let image = image::decode(&bytes).map_err(|e| CompilerError::InvalidUnit {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            content_hash: image::checksum(&bytes),
            bytes: bytes.into(),
            image: Arc::new(image),
            name,
        })
    }

    /// The built-in base runtime unit.
    pub fn core_library() -> Self {
        let bytes = core_library_bytes();
        Self {
            name: CORE_LIBRARY_UNIT.to_string(),
            content_hash: image::checksum(&bytes),
            bytes: bytes.into(),
            image: Arc::new(core_library()),
        }
    }

    /// Identifier from the manifest, e.g. `System.Runtime.dll`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assembly name recorded inside the image.
    pub fn assembly_name(&self) -> &str {
        &self.image.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    pub fn image(&self) -> &ModuleImage {
        &self.image
    }

    pub fn image_arc(&self) -> Arc<ModuleImage> {
        Arc::clone(&self.image)
    }
}

impl PartialEq for ReferenceUnit {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash && self.bytes == other.bytes
    }
}

impl Eq for ReferenceUnit {}

// =============================================================================
// Reference Catalog
// =============================================================================

/// Ordered, read-only collection of reference units.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    units: Vec<ReferenceUnit>,
}

impl ReferenceCatalog {
    /// Builds a catalog, rejecting repeated unit names.
    pub fn from_units(units: Vec<ReferenceUnit>) -> Result<Self, CompilerError> {
        let mut seen = HashSet::new();
        for unit in &units {
            if !seen.insert(unit.name()) {
                return Err(CompilerError::DuplicateUnit {
                    name: unit.name().to_string(),
                });
            }
        }
        Ok(Self { units })
    }

    /// A catalog holding only the base runtime.
    pub fn core_only() -> Self {
        Self {
            units: vec![ReferenceUnit::core_library()],
        }
    }

    pub fn units(&self) -> &[ReferenceUnit] {
        &self.units
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Looks up a unit by manifest name.
    pub fn get(&self, name: &str) -> Option<&ReferenceUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Position of a unit by manifest name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.units.iter().position(|u| u.name == name)
    }

    /// Finds a type by namespace-qualified name across all units.
    ///
    /// Returns the unit position, the type index and the definition of the
    /// first match in catalog order.
    pub fn find_type(&self, full_name: &str) -> Option<(usize, u32, &TypeDef)> {
        self.units.iter().enumerate().find_map(|(pos, unit)| {
            unit.image
                .find_type(full_name)
                .map(|(index, def)| (pos, index, def))
        })
    }

    /// Names of all units, in catalog order.
    pub fn names(&self) -> Vec<String> {
        self.units.iter().map(|u| u.name.clone()).collect()
    }
}

impl<'a> IntoIterator for &'a ReferenceCatalog {
    type Item = &'a ReferenceUnit;
    type IntoIter = std::slice::Iter<'a, ReferenceUnit>;

    fn into_iter(self) -> Self::IntoIter {
        self.units.iter()
    }
}

// =============================================================================
// Population
// =============================================================================

/// Builds a catalog from a unit source.
///
/// Manifest entries not ending in `config.reference_suffix` are ignored.
/// All fetches run concurrently, each bounded by `config.fetch_timeout`;
/// the catalog keeps manifest order regardless of completion order.
pub async fn populate<S: UnitSource>(
    source: &S,
    config: &CompilerConfig,
) -> Result<ReferenceCatalog, CompilerError> {
    let manifest = source.manifest().await?;
    let names: Vec<String> = manifest
        .into_iter()
        .filter(|name| name.ends_with(config.reference_suffix.as_str()))
        .collect();

    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(CompilerError::DuplicateUnit { name: name.clone() });
        }
    }

    log::debug!("fetching {} reference unit(s)", names.len());
    let fetched = try_join_all(
        names
            .iter()
            .map(|name| fetch_unit(source, name, config.fetch_timeout)),
    )
    .await?;

    let mut units = Vec::with_capacity(fetched.len() + 1);
    if config.implicit_core_library && !fetched.iter().any(|u| u.name() == CORE_LIBRARY_UNIT) {
        units.push(ReferenceUnit::core_library());
    }
    units.extend(fetched);

    let catalog = ReferenceCatalog::from_units(units)?;
    log::info!("reference catalog populated with {} unit(s)", catalog.len());
    Ok(catalog)
}

async fn fetch_unit<S: UnitSource>(
    source: &S,
    name: &str,
    timeout: Duration,
) -> Result<ReferenceUnit, CompilerError> {
    let bytes = tokio::time::timeout(timeout, source.fetch(name))
        .await
        .map_err(|_| CompilerError::UnitTimedOut {
            name: name.to_string(),
            timeout,
        })??;
    log::trace!("fetched '{}' ({} bytes)", name, bytes.len());
    ReferenceUnit::from_bytes(name, bytes)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;

    fn library(name: &str) -> Vec<u8> {
        let mut module = ModuleImage::new(name);
        module.types.push(TypeDef::new("Lib", "Helpers"));
        image::encode(&module).unwrap()
    }

    #[tokio::test]
    async fn test_populate_keeps_manifest_order_and_filters_suffix() {
        let source = MemorySource::new()
            .with_unit("B.dll", library("B"))
            .with_listing("app.pdb")
            .with_unit("A.dll", library("A"));

        let catalog = populate(&source, &CompilerConfig::default()).await.unwrap();
        assert_eq!(catalog.names(), vec![CORE_LIBRARY_UNIT, "B.dll", "A.dll"]);
        assert_eq!(catalog.get("A.dll").unwrap().assembly_name(), "A");
    }

    #[tokio::test]
    async fn test_populate_does_not_duplicate_provided_core_library() {
        let source = MemorySource::new()
            .with_unit("Lib.dll", library("Lib"))
            .with_core_library();
        let catalog = populate(&source, &CompilerConfig::default()).await.unwrap();
        assert_eq!(catalog.names(), vec!["Lib.dll", CORE_LIBRARY_UNIT]);
    }

    #[tokio::test]
    async fn test_populate_without_implicit_core_library() {
        let config = CompilerConfig::default().with_implicit_core_library(false);
        let catalog = populate(&MemorySource::new(), &config).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_populate_fails_on_missing_unit() {
        let source = MemorySource::new()
            .with_unit("A.dll", library("A"))
            .with_listing("Missing.dll");
        let err = populate(&source, &CompilerConfig::default()).await.unwrap_err();
        assert!(matches!(err, CompilerError::UnitFetchFailed { ref name, .. } if name == "Missing.dll"));
        assert!(err.is_initialization_failure());
    }

    #[tokio::test]
    async fn test_populate_rejects_invalid_image() {
        let source = MemorySource::new().with_unit("Bad.dll", b"MZ\x90\x00garbage".to_vec());
        let err = populate(&source, &CompilerConfig::default()).await.unwrap_err();
        assert!(matches!(err, CompilerError::InvalidUnit { .. }));
    }

    #[tokio::test]
    async fn test_populate_rejects_duplicate_names() {
        let source = MemorySource::new()
            .with_unit("A.dll", library("A"))
            .with_listing("A.dll");
        let err = populate(&source, &CompilerConfig::default()).await.unwrap_err();
        assert!(matches!(err, CompilerError::DuplicateUnit { .. }));
    }

    struct StalledSource;

    impl UnitSource for StalledSource {
        fn manifest(&self) -> impl Future<Output = Result<Vec<String>, CompilerError>> + Send {
            async { Ok(vec!["Slow.dll".to_string()]) }
        }

        fn fetch(&self, _name: &str) -> impl Future<Output = Result<Vec<u8>, CompilerError>> + Send {
            std::future::pending()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_populate_times_out_stalled_fetch() {
        let config = CompilerConfig::default().with_fetch_timeout(Duration::from_secs(5));
        let err = populate(&StalledSource, &config).await.unwrap_err();
        assert!(matches!(err, CompilerError::UnitTimedOut { ref name, .. } if name == "Slow.dll"));
    }

    #[test]
    fn test_unit_identity_is_content() {
        let a = ReferenceUnit::from_bytes("A.dll", library("Same")).unwrap();
        let b = ReferenceUnit::from_bytes("B.dll", library("Same")).unwrap();
        let c = ReferenceUnit::from_bytes("A.dll", library("Other")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_find_type_across_units() {
        let catalog = ReferenceCatalog::from_units(vec![
            ReferenceUnit::core_library(),
            ReferenceUnit::from_bytes("Lib.dll", library("Lib")).unwrap(),
        ])
        .unwrap();
        let (pos, _, def) = catalog.find_type("Lib.Helpers").unwrap();
        assert_eq!(pos, 1);
        assert_eq!(def.name, "Helpers");
        assert_eq!(catalog.find_type("System.Math").unwrap().0, 0);
        assert!(catalog.find_type("Nope.Missing").is_none());
    }
}

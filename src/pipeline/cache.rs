//! Stage results keyed by stage identity and input fingerprint.
//!
//! A fingerprint is a SHA-256 digest over everything a stage result depends on: the stage
//! name, its parameters and the fingerprints of its inputs. Two runs that agree on all of
//! them may share the stored raster.

use crate::error::Result;
use crate::raster::{GridSpec, Raster};
use crate::readers::{self, Compression, PixelType, SaveOptions};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

const HASH_BLOCK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Align,
    Scale,
    Fuse,
    Quantity,
    ReferenceQuantity,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Align => "align",
            Stage::Scale => "scale",
            Stage::Fuse => "fuse",
            Stage::Quantity => "quantity",
            Stage::ReferenceQuantity => "reference_quantity",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of a raster's grid, sentinel and samples.
    pub fn of_raster(raster: &Raster) -> Self {
        let mut hasher = Sha256::new();
        hash_grid(&mut hasher, raster.grid());
        hasher.update(raster.nodata().to_le_bytes());

        let mut bytes = Vec::with_capacity(HASH_BLOCK);
        for value in raster.data().iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
            if bytes.len() >= HASH_BLOCK {
                hasher.update(&bytes);
                bytes.clear();
            }
        }
        hasher.update(&bytes);

        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Digest of a file's identity: its path, NetCDF variable, size and modification time.
    pub fn of_file(path: &Path, variable: Option<&str>) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());

        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(variable.unwrap_or_default().as_bytes());
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(modified.to_le_bytes());

        Ok(Fingerprint(format!("{:x}", hasher.finalize())))
    }

    pub fn of_grid(grid: &GridSpec) -> Self {
        let mut hasher = Sha256::new();
        hash_grid(&mut hasher, grid);
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Fingerprint of a stage result computed with `params` from `inputs`.
    pub fn derive(stage: Stage, params: &[String], inputs: &[&Fingerprint]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(stage.name().as_bytes());
        for param in params {
            hasher.update([0u8]);
            hasher.update(param.as_bytes());
        }
        for input in inputs {
            hasher.update([1u8]);
            hasher.update(input.0.as_bytes());
        }
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..16.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short())
    }
}

fn hash_grid(hasher: &mut Sha256, grid: &GridSpec) {
    hasher.update((grid.rows as u64).to_le_bytes());
    hasher.update((grid.cols as u64).to_le_bytes());
    for coefficient in grid.geotransform {
        hasher.update(coefficient.to_le_bytes());
    }
    hasher.update(grid.crs.as_deref().unwrap_or_default().as_bytes());
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub stage: Stage,
    /// Name of the dataset the stage works on, used for readable file names.
    pub label: String,
    pub fingerprint: Fingerprint,
}

impl StageKey {
    /// Names that only differ in characters unsafe for file names still get distinct
    /// labels, since a short digest of the raw name is appended.
    pub fn new(stage: Stage, label: impl Into<String>, fingerprint: Fingerprint) -> Self {
        let label = label.into();
        let digest = format!("{:x}", Sha256::digest(label.as_bytes()));
        Self {
            stage,
            label: format!("{}-{}", sanitize(&label), &digest[..8]),
            fingerprint,
        }
    }

    fn prefix(&self) -> String {
        format!("{}_{}_", self.stage, self.label)
    }

    pub fn file_name(&self) -> String {
        format!("{}{}.tif", self.prefix(), self.fingerprint.short())
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.stage, self.label, self.fingerprint)
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

/// Storage for stage results that later runs, or later stages, can substitute.
pub trait StageStore: Send + Sync {
    fn get(&self, key: &StageKey) -> Result<Option<Raster>>;
    fn put(&self, key: &StageKey, raster: &Raster) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StageKey, Raster>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &StageKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Stores `raster` under `key` directly, as if a previous run had computed it.
    pub fn insert(&self, key: StageKey, raster: Raster) {
        self.lock().insert(key, raster);
    }

    pub fn keys(&self) -> Vec<StageKey> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StageKey, Raster>> {
        // A panic while holding the lock leaves the map itself intact
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StageStore for MemoryStore {
    fn get(&self, key: &StageKey) -> Result<Option<Raster>> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &StageKey, raster: &Raster) -> Result<()> {
        self.lock().insert(key.clone(), raster.clone());
        Ok(())
    }
}

/// Stage results kept as compressed GeoTIFFs named `<stage>_<label>_<fingerprint>.tif`.
///
/// Results are written under a temporary name and renamed once complete, and writing one
/// removes older results of the same stage and label. An entry that cannot be read back
/// is deleted and reported as missing.
#[derive(Debug, Clone)]
pub struct DiskStore {
    directory: PathBuf,
    compression: Compression,
}

impl DiskStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            compression: Compression::Deflate,
        })
    }

    pub fn path_for(&self, key: &StageKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    fn prune_superseded(&self, key: &StageKey) {
        let pattern = self
            .directory
            .join(format!("{}*.tif", glob::Pattern::escape(&key.prefix())));
        let current = self.path_for(key);

        let Ok(entries) = glob::glob(&pattern.to_string_lossy()) else {
            return;
        };

        for path in entries.filter_map(|e| e.ok()) {
            if path != current {
                debug!("Removing superseded stage result {}", path.display());
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

impl StageStore for DiskStore {
    fn get(&self, key: &StageKey) -> Result<Option<Raster>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        match readers::load(&path) {
            Ok(raster) => Ok(Some(raster)),
            Err(e) => {
                warn!("Discarding unreadable stage result {}: {}", path.display(), e);
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
                Ok(None)
            }
        }
    }

    fn put(&self, key: &StageKey, raster: &Raster) -> Result<()> {
        let options = SaveOptions {
            nodata: raster.nodata(),
            compression: self.compression,
            pixel_type: PixelType::Float32,
        };
        let partial = tempfile::Builder::new()
            .prefix(".partial_")
            .suffix(".tif")
            .tempfile_in(&self.directory)?;
        readers::save(raster, partial.path(), &options)?;
        partial
            .persist(self.path_for(key))
            .map_err(|e| e.error)?;

        self.prune_superseded(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::test_support::raster_from_rows;

    fn key(stage: Stage, label: &str, seed: &str) -> StageKey {
        StageKey::new(
            stage,
            label,
            Fingerprint::derive(stage, &[seed.to_string()], &[]),
        )
    }

    #[test]
    fn test_derived_fingerprints_depend_on_every_part() {
        let input = Fingerprint::derive(Stage::Align, &[], &[]);
        let a = Fingerprint::derive(Stage::Scale, &["0.4653".to_string()], &[&input]);
        let b = Fingerprint::derive(Stage::Scale, &["0.5".to_string()], &[&input]);
        let c = Fingerprint::derive(Stage::Fuse, &["0.4653".to_string()], &[&input]);
        let d = Fingerprint::derive(Stage::Scale, &["0.4653".to_string()], &[]);

        assert_eq!(
            a,
            Fingerprint::derive(Stage::Scale, &["0.4653".to_string()], &[&input])
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_raster_fingerprint_follows_content() {
        let a = raster_from_rows(&[&[1.0, 2.0]], -9999.0);
        let b = raster_from_rows(&[&[1.0, 2.5]], -9999.0);
        let c = raster_from_rows(&[&[1.0, 2.0]], -1.0);

        assert_eq!(Fingerprint::of_raster(&a), Fingerprint::of_raster(&a.clone()));
        assert_ne!(Fingerprint::of_raster(&a), Fingerprint::of_raster(&b));
        assert_ne!(Fingerprint::of_raster(&a), Fingerprint::of_raster(&c));
    }

    #[test]
    fn test_file_fingerprint_follows_contents_and_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agb.nc");
        fs::write(&path, b"abc").unwrap();

        let first = Fingerprint::of_file(&path, None).unwrap();
        assert_eq!(first, Fingerprint::of_file(&path, None).unwrap());
        assert_ne!(first, Fingerprint::of_file(&path, Some("agb")).unwrap());

        fs::write(&path, b"abcdef").unwrap();
        assert_ne!(first, Fingerprint::of_file(&path, None).unwrap());
    }

    #[test]
    fn test_stage_key_file_name_is_safe() {
        let key = key(Stage::Align, "GEOCARBON forest/agb", "x");
        let name = key.file_name();
        assert!(name.starts_with("align_GEOCARBON-forest-agb-"));
        assert!(name.ends_with(".tif"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_labels_differing_in_unsafe_characters_stay_distinct() {
        let underscore = key(Stage::Align, "agb_2010", "x");
        let dash = key(Stage::Align, "agb-2010", "x");

        assert_ne!(underscore.label, dash.label);
        assert!(!underscore.prefix().starts_with(&dash.prefix()));
        assert!(!dash.prefix().starts_with(&underscore.prefix()));
        assert_eq!(underscore, key(Stage::Align, "agb_2010", "x"));
    }

    #[test]
    fn test_unreadable_disk_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let k = key(Stage::Scale, "avitabile", "1");
        fs::write(store.path_for(&k), b"truncated").unwrap();

        assert!(store.get(&k).unwrap().is_none());
        assert!(!store.path_for(&k).exists());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let k = key(Stage::Fuse, "combined", "1");
        let raster = raster_from_rows(&[&[1.0, 2.0]], -9999.0);

        assert!(store.get(&k).unwrap().is_none());
        store.put(&k, &raster).unwrap();
        assert!(store.contains(&k));
        assert_eq!(store.get(&k).unwrap().unwrap().data(), raster.data());
        assert!(store.get(&key(Stage::Fuse, "combined", "2")).unwrap().is_none());
    }
}

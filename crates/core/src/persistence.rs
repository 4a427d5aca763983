//! Versioned field-map snapshot persistence
//!
//! Replaces reflective field-by-field streaming with an explicit snapshot
//! document: identity and grid geometry first, then the bulk sample buffer
//! only when the map's write-enable flag is set. Reduced snapshots keep
//! persisted state small when several owners share one logical field map
//! whose samples are stored elsewhere; reloading one restores a zero-filled
//! buffer of the invariant size, to be re-attached via
//! [`FieldMap::set_samples`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::grid::field_map::{FieldMap, GridGeometry};

/// Snapshot format version written by this crate
pub const SNAPSHOT_VERSION: u32 = 1;

/// Owned snapshot form, as read back from disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapSnapshot {
    /// Snapshot format version
    pub version: u32,
    /// Map identity
    pub name: String,
    /// Source file path the map was originally read from
    pub path: String,
    /// When the snapshot was written
    pub saved_at: DateTime<Utc>,
    /// Grid geometry
    pub geometry: GridGeometry,
    /// Bulk sample buffer; absent in reduced snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f32>>,
}

/// Borrowed write-side view of a snapshot. Serializing through a borrow
/// leaves the in-memory map untouched no matter which mode is written; a
/// reduced snapshot simply leaves the sample field out of the document.
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    name: &'a str,
    path: &'a str,
    saved_at: DateTime<Utc>,
    geometry: GridGeometry,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<&'a [f32]>,
}

/// Errors that can occur with snapshot persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    /// Failed to load file
    LoadFailed(String),
    /// Failed to parse file contents
    ParseFailed(String),
    /// Failed to serialize state
    SerializeFailed(String),
    /// Failed to save file
    SaveFailed(String),
    /// Snapshot was written by an unknown format version
    UnsupportedVersion(u32),
    /// Snapshot sample buffer contradicts its own geometry
    SampleMismatch {
        /// Buffer length required by the snapshot geometry
        expected: usize,
        /// Buffer length actually present
        actual: usize,
    },
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::LoadFailed(msg) => write!(f, "Failed to load: {msg}"),
            PersistenceError::ParseFailed(msg) => write!(f, "Failed to parse: {msg}"),
            PersistenceError::SerializeFailed(msg) => write!(f, "Failed to serialize: {msg}"),
            PersistenceError::SaveFailed(msg) => write!(f, "Failed to save: {msg}"),
            PersistenceError::UnsupportedVersion(version) => {
                write!(f, "Unsupported snapshot version: {version}")
            }
            PersistenceError::SampleMismatch { expected, actual } => write!(
                f,
                "Snapshot sample buffer has length {actual}, geometry requires {expected}"
            ),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl FieldMap {
    /// Write a versioned snapshot of this map.
    ///
    /// With write-enable set (the default) the snapshot carries the full
    /// sample buffer; with it cleared the buffer is omitted from the
    /// document while the in-memory map is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be serialized or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PersistenceError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            name: self.name(),
            path: self.path(),
            saved_at: Utc::now(),
            geometry: *self.geometry(),
            samples: self.write_enable().then(|| self.samples()),
        };

        let contents = serde_json::to_string(&snapshot)
            .map_err(|e| PersistenceError::SerializeFailed(e.to_string()))?;

        fs::write(path, contents).map_err(|e| PersistenceError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    /// Restore a map from a snapshot file written by [`FieldMap::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// snapshot is rejected by [`FieldMap::from_snapshot`].
    pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let contents =
            fs::read_to_string(path).map_err(|e| PersistenceError::LoadFailed(e.to_string()))?;

        let snapshot: FieldMapSnapshot = serde_json::from_str(&contents)
            .map_err(|e| PersistenceError::ParseFailed(e.to_string()))?;

        Self::from_snapshot(snapshot)
    }

    /// Rebuild a map from an owned snapshot.
    ///
    /// A full snapshot restores the sample buffer as written. A reduced
    /// snapshot restores a zero-filled buffer of the invariant size so the
    /// map stays queryable; owners sharing one logical map re-attach the
    /// real data with [`FieldMap::set_samples`].
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown snapshot version or a sample buffer
    /// whose length contradicts the snapshot geometry.
    pub fn from_snapshot(snapshot: FieldMapSnapshot) -> Result<Self, PersistenceError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(snapshot.version));
        }

        let geometry = snapshot.geometry;
        let expected = geometry.buffer_len();
        let samples = match snapshot.samples {
            Some(samples) if samples.len() == expected => samples,
            Some(samples) => {
                return Err(PersistenceError::SampleMismatch {
                    expected,
                    actual: samples.len(),
                })
            }
            None => vec![0.0; expected],
        };

        Ok(FieldMap::from_parts(
            snapshot.name,
            snapshot.path,
            geometry,
            samples,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::vec3::Vec3;
    use std::env;
    use std::path::PathBuf;

    fn snapshot_path(file_name: &str) -> PathBuf {
        env::temp_dir().join(file_name)
    }

    fn small_map() -> FieldMap {
        let geometry = GridGeometry {
            nx: 2,
            ny: 2,
            nz: 2,
            x_begin: 0.0,
            y_begin: 0.0,
            z_begin: 0.0,
            dx: 1.0,
            dy: 1.0,
            dz: 1.0,
        };
        let samples = (0..geometry.buffer_len()).map(|i| i as f32).collect();
        FieldMap::from_parts("small".to_string(), "memory".to_string(), geometry, samples)
    }

    #[test]
    fn test_full_snapshot_round_trip() {
        let map = small_map();
        let path = snapshot_path("magfield_snapshot_full.json");

        map.save(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"samples\""));

        let restored = FieldMap::load_snapshot(&path).unwrap();
        assert_eq!(restored.name(), map.name());
        assert_eq!(restored.geometry(), map.geometry());
        assert_eq!(restored.samples(), map.samples());
        assert_eq!(
            restored.field_at(Vec3::new(0.5, 0.5, 0.5)),
            map.field_at(Vec3::new(0.5, 0.5, 0.5))
        );

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_reduced_snapshot_omits_samples_and_keeps_map_intact() {
        let mut map = small_map();
        map.set_write_enable(false);
        let before = map.samples().to_vec();

        let path = snapshot_path("magfield_snapshot_reduced.json");
        map.save(&path).unwrap();

        // On-disk form omits the buffer; the in-memory buffer is unchanged
        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("\"samples\""));
        assert_eq!(map.samples(), before.as_slice());
        assert!(!map.write_enable());

        // Reloading the reduced form restores the invariant-sized buffer
        // and stays queryable
        let restored = FieldMap::load_snapshot(&path).unwrap();
        assert_eq!(restored.samples().len(), map.geometry().buffer_len());
        assert!(restored.samples().iter().all(|&v| v == 0.0));
        assert_eq!(
            restored.field_at(Vec3::new(0.5, 0.5, 0.5)),
            Vec3::zeros()
        );

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_reduced_snapshot_reattaches_shared_samples() {
        let donor = small_map();
        let mut map = small_map();
        map.set_write_enable(false);

        let path = snapshot_path("magfield_snapshot_shared.json");
        map.save(&path).unwrap();

        let mut restored = FieldMap::load_snapshot(&path).unwrap();
        restored.set_samples(donor.samples().to_vec()).unwrap();

        let p = Vec3::new(0.5, 0.25, 0.75);
        assert_eq!(restored.field_at(p), donor.field_at(p));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let map = small_map();
        let path = snapshot_path("magfield_snapshot_version.json");
        map.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut snapshot: FieldMapSnapshot = serde_json::from_str(&contents).unwrap();
        snapshot.version = 99;

        let err = FieldMap::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, PersistenceError::UnsupportedVersion(99)));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_sample_length_contradicting_geometry_is_rejected() {
        let map = small_map();
        let path = snapshot_path("magfield_snapshot_mismatch.json");
        map.save(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let mut snapshot: FieldMapSnapshot = serde_json::from_str(&contents).unwrap();
        snapshot.samples = Some(vec![0.0; 7]);

        let err = FieldMap::from_snapshot(snapshot).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::SampleMismatch { expected: 24, actual: 7 }
        ));

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_snapshot_missing_file() {
        let err = FieldMap::load_snapshot("/nonexistent/snapshot.json").unwrap_err();
        assert!(matches!(err, PersistenceError::LoadFailed(_)));
    }
}

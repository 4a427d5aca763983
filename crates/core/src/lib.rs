//! Magnetic Field Map Library
//!
//! Loads a precomputed regular 3D grid of magnetic field vectors from a
//! flat-text map file and answers point queries by trilinear interpolation.
//! A map is loaded once at startup and then queried millions of times along
//! particle trajectories, so the lookup path is pure, allocation-free, and
//! safe for concurrent readers.
//!
//! The source grid covers the positive X/Y quadrant and is mirrored onto
//! the other quadrants by absolute-value indexing, exploiting the symmetry
//! of the solenoid field it samples. Snapshot persistence is explicit and
//! versioned, with a per-map write-enable flag so owners sharing one
//! logical map can omit the bulk sample buffer from their own snapshots.

// Core types and utilities
pub mod core_types;

// Field-map grid and loader
pub mod grid;

// Versioned snapshot persistence
pub mod persistence;

// Re-export core types
pub use core_types::Vec3;

// Re-export field-map types
pub use grid::{expand_path, FieldMap, FieldMapError, GridGeometry};
pub use persistence::{FieldMapSnapshot, PersistenceError, SNAPSHOT_VERSION};

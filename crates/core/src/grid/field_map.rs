//! Regular-grid magnetic field map with trilinear point lookup
//!
//! A field map is a flat array of 3-component field samples on a regular
//! `nx × ny × nz` grid, loaded once at startup and then queried millions of
//! times along particle trajectories. Lookup is the standard trilinear
//! composition (Press et al., "Numerical Recipes", §3.6): interpolate along
//! X for each of the four (y, z) corner pairs, then combine along Y, then
//! along Z. Intermediate arithmetic runs in `f64`.
//!
//! The grid covers the positive X/Y quadrant only. Queries index with the
//! absolute value of the X and Y coordinates, mirroring the quadrant onto
//! the rest of the detector volume; this exploits the symmetry of the
//! solenoid field the map samples and must not be "fixed" to signed lookup.
//! Z is signed and spans the full length of the mapped volume.

use crate::core_types::vec3::Vec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Grid geometry from a field-map header: per-axis sample counts, origin,
/// and node spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Number of samples along X
    pub nx: usize,
    /// Number of samples along Y
    pub ny: usize,
    /// Number of samples along Z
    pub nz: usize,
    /// Grid origin (first node) per axis
    pub x_begin: f32,
    pub y_begin: f32,
    pub z_begin: f32,
    /// Node spacing per axis
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

impl GridGeometry {
    /// Number of grid nodes
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Length of the flat sample buffer (three components per node)
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        3 * self.sample_count()
    }
}

/// Errors from loading or reconfiguring a field map
#[derive(Debug)]
pub enum FieldMapError {
    /// Field-map file could not be read
    Io(String),
    /// Header line is incomplete or contains an invalid value
    MalformedHeader(String),
    /// A sample token could not be parsed as a floating-point value
    BadSample {
        /// Node index (in file order) of the offending sample
        cell: usize,
        /// Which component failed to parse
        component: &'static str,
        /// The offending token
        token: String,
    },
    /// Sample block ended before `nx*ny*nz` triplets were read
    Truncated {
        /// Node count promised by the header
        expected: usize,
        /// Complete triplets actually read
        read: usize,
    },
    /// Attached buffer length contradicts the grid geometry
    SampleCount {
        /// Required buffer length (`3 * nx * ny * nz`)
        expected: usize,
        /// Length of the rejected buffer
        actual: usize,
    },
    /// Operation intentionally left unimplemented
    Unsupported(&'static str),
}

impl std::fmt::Display for FieldMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldMapError::Io(msg) => write!(f, "cannot read field map file: {msg}"),
            FieldMapError::MalformedHeader(msg) => {
                write!(f, "malformed field map header: {msg}")
            }
            FieldMapError::BadSample {
                cell,
                component,
                token,
            } => write!(f, "sample {cell}: {component} value {token:?} is not a number"),
            FieldMapError::Truncated { expected, read } => {
                write!(f, "field map ends after {read} of {expected} samples")
            }
            FieldMapError::SampleCount { expected, actual } => write!(
                f,
                "sample buffer length {actual} does not match grid size {expected}"
            ),
            FieldMapError::Unsupported(what) => write!(f, "{what} is not implemented"),
        }
    }
}

impl std::error::Error for FieldMapError {}

/// Precomputed magnetic field map over a regular 3D grid
///
/// Field values are stored as a flat `Vec<f32>` of length
/// `3 * nx * ny * nz`, x-major (`((ix*ny + iy)*nz + iz)` nodes, three
/// components each), in the kG/10 convention (`10 ×` the raw file value).
/// Geometry and spacing are fixed after load; the lookup path is pure and
/// safe for concurrent readers.
#[derive(Debug)]
pub struct FieldMap {
    /// Map identity, for diagnostics and snapshots
    name: String,
    /// Resolved path the map was read from
    path: String,
    /// Grid geometry from the file header
    geometry: GridGeometry,
    /// Cached reciprocal spacing per axis
    dxi: f32,
    dyi: f32,
    dzi: f32,
    /// Upper grid extent per axis (`begin + (n-1) * spacing`)
    x_end: f32,
    y_end: f32,
    z_end: f32,
    /// Flat field sample buffer
    samples: Vec<f32>,
    /// Whether snapshots include the sample buffer
    write_enable: bool,
}

impl FieldMap {
    /// Assemble a map from parsed parts. Callers guarantee the buffer
    /// length invariant.
    pub(crate) fn from_parts(
        name: String,
        path: String,
        geometry: GridGeometry,
        samples: Vec<f32>,
    ) -> Self {
        debug_assert_eq!(samples.len(), geometry.buffer_len());

        FieldMap {
            name,
            path,
            geometry,
            dxi: 1.0 / geometry.dx,
            dyi: 1.0 / geometry.dy,
            dzi: 1.0 / geometry.dz,
            x_end: geometry.x_begin + (geometry.nx - 1) as f32 * geometry.dx,
            y_end: geometry.y_begin + (geometry.ny - 1) as f32 * geometry.dy,
            z_end: geometry.z_begin + (geometry.nz - 1) as f32 * geometry.dz,
            samples,
            write_enable: true,
        }
    }

    /// Flat buffer index of the first component at a grid node
    #[inline]
    fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        3 * ((ix * self.geometry.ny + iy) * self.geometry.nz + iz)
    }

    /// Map identity
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the map was read from
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Grid geometry
    #[must_use]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Upper grid extent along X
    #[must_use]
    pub fn x_end(&self) -> f32 {
        self.x_end
    }

    /// Upper grid extent along Y
    #[must_use]
    pub fn y_end(&self) -> f32 {
        self.y_end
    }

    /// Upper grid extent along Z
    #[must_use]
    pub fn z_end(&self) -> f32 {
        self.z_end
    }

    /// Raw sample buffer (kG/10 values, x-major layout)
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// X field component at a grid node
    #[must_use]
    pub fn bx(&self, ix: usize, iy: usize, iz: usize) -> f32 {
        self.samples[self.index(ix, iy, iz)]
    }

    /// Y field component at a grid node
    #[must_use]
    pub fn by(&self, ix: usize, iy: usize, iz: usize) -> f32 {
        self.samples[self.index(ix, iy, iz) + 1]
    }

    /// Z field component at a grid node
    #[must_use]
    pub fn bz(&self, ix: usize, iy: usize, iz: usize) -> f32 {
        self.samples[self.index(ix, iy, iz) + 2]
    }

    /// Field vector stored at a grid node
    #[must_use]
    pub fn field_at_node(&self, ix: usize, iy: usize, iz: usize) -> Vec3 {
        let base = self.index(ix, iy, iz);
        Vec3::new(self.samples[base], self.samples[base + 1], self.samples[base + 2])
    }

    /// Whether the mirrored query point lies inside the interpolation
    /// domain.
    ///
    /// Callers must ensure this holds before calling
    /// [`FieldMap::field_at`]; the lookup itself performs no bounds
    /// checking. The upper extents are excluded because interpolation
    /// always reads the node above the selected cell.
    #[must_use]
    pub fn contains(&self, p: Vec3) -> bool {
        let x = p.x.abs();
        let y = p.y.abs();
        x >= self.geometry.x_begin
            && x < self.x_end
            && y >= self.geometry.y_begin
            && y < self.y_end
            && p.z >= self.geometry.z_begin
            && p.z < self.z_end
    }

    /// Interpolated field vector at point `p` (kG/10)
    ///
    /// X and Y offsets use the absolute value of the coordinate (mirrored
    /// grid); Z is signed. For each axis the fractional cell index selects
    /// the lower grid node and weights the two nodes of the cell; the eight
    /// corner samples combine along X, then Y, then Z.
    ///
    /// # Panics
    ///
    /// Querying a point outside the grid domain is a precondition
    /// violation (see [`FieldMap::contains`]): no clamping is applied, and
    /// the out-of-range node access panics rather than returning a value.
    #[must_use]
    pub fn field_at(&self, p: Vec3) -> Vec3 {
        let xl = f64::from(p.x.abs() - self.geometry.x_begin);
        let yl = f64::from(p.y.abs() - self.geometry.y_begin);
        let zl = f64::from(p.z - self.geometry.z_begin);

        let hix = xl * f64::from(self.dxi);
        let hiy = yl * f64::from(self.dyi);
        let hiz = zl * f64::from(self.dzi);

        // Truncation selects the lower node of the enclosing cell
        let ix = hix as usize;
        let iy = hiy as usize;
        let iz = hiz as usize;

        let ratx = hix - ix as f64;
        let raty = hiy - iy as f64;
        let ratz = hiz - iz as f64;

        let ratx1 = 1.0 - ratx;
        let raty1 = 1.0 - raty;
        let ratz1 = 1.0 - ratz;

        let mut b = Vec3::zeros();
        for c in 0..3 {
            let corner =
                |jx: usize, jy: usize, jz: usize| f64::from(self.samples[self.index(jx, jy, jz) + c]);

            let bhyhz = corner(ix, iy + 1, iz + 1) * ratx1 + corner(ix + 1, iy + 1, iz + 1) * ratx;
            let bhylz = corner(ix, iy + 1, iz) * ratx1 + corner(ix + 1, iy + 1, iz) * ratx;
            let blyhz = corner(ix, iy, iz + 1) * ratx1 + corner(ix + 1, iy, iz + 1) * ratx;
            let blylz = corner(ix, iy, iz) * ratx1 + corner(ix + 1, iy, iz) * ratx;

            let bhz = blyhz * raty1 + bhyhz * raty;
            let blz = blylz * raty1 + bhylz * raty;

            b[c] = (blz * ratz1 + bhz * ratz) as f32;
        }
        b
    }

    /// Interpolated field vectors for a batch of points
    ///
    /// The grid is immutable during lookup, so points are evaluated in
    /// parallel. The in-domain precondition of [`FieldMap::field_at`]
    /// applies to every point.
    #[must_use]
    pub fn field_at_many(&self, points: &[Vec3]) -> Vec<Vec3> {
        points.par_iter().map(|p| self.field_at(*p)).collect()
    }

    /// Whether snapshots written by [`FieldMap::save`](crate::persistence)
    /// include the sample buffer
    #[must_use]
    pub fn write_enable(&self) -> bool {
        self.write_enable
    }

    /// Enable or disable sample-buffer inclusion in snapshots
    ///
    /// Owners that know the bulk grid is persisted elsewhere disable this
    /// to avoid replicating it in every snapshot that references the map.
    pub fn set_write_enable(&mut self, enable: bool) {
        self.write_enable = enable;
    }

    /// Replace the sample buffer, e.g. to re-attach shared grid data after
    /// loading a reduced snapshot
    ///
    /// # Errors
    ///
    /// Returns [`FieldMapError::SampleCount`] if the buffer length does not
    /// equal `3 * nx * ny * nz`.
    pub fn set_samples(&mut self, samples: Vec<f32>) -> Result<(), FieldMapError> {
        let expected = self.geometry.buffer_len();
        if samples.len() != expected {
            return Err(FieldMapError::SampleCount {
                expected,
                actual: samples.len(),
            });
        }
        self.samples = samples;
        Ok(())
    }

    /// Duplicating a field map is not supported
    ///
    /// A loaded map is meant to be shared by reference between owners;
    /// copying the bulk sample buffer is never intended and reports an
    /// explicit error instead of silently doing nothing.
    ///
    /// # Errors
    ///
    /// Always returns [`FieldMapError::Unsupported`].
    pub fn duplicate(&self) -> Result<Self, FieldMapError> {
        Err(FieldMapError::Unsupported("field map duplication"))
    }
}

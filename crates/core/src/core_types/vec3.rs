//! Vector type alias for query points and field values.

use nalgebra::Vector3;

/// 3D vector type for query points and magnetic field vectors.
///
/// This is a simple alias for `nalgebra::Vector3<f32>`, used throughout
/// the crate for world positions and field values in the kG/10 storage
/// convention.
pub type Vec3 = Vector3<f32>;

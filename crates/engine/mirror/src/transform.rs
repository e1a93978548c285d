//! Placement matrix decomposition.
//!
//! The catalog stores placements as 4x4 matrices in row-major order
//! (`transform[row][col]`, translation in the last column). glam stores
//! matrices column-major, so every conversion between the two goes through
//! an explicit transpose. Getting it backwards produces a mirrored scene and
//! no error, which is why both directions live in this one module.

use glam::{Mat3, Mat4, Quat, Vec3};
use thiserror::Error;
use tracing::warn;

/// Row-major matrix as it arrives on the wire. Rows may be `null`.
pub type RawMatrix = Vec<Option<Vec<f32>>>;

/// Row-major matrix as it is sent back to the catalog.
pub type RowMajor = [[f32; 4]; 4];

/// Reasons a server-supplied matrix could not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedTransform {
    #[error("transform is missing")]
    Missing,
    #[error("transform is not an array of rows")]
    NotAnArray,
    #[error("expected 4 rows, found {0}")]
    RowCount(usize),
    #[error("row {row} is null")]
    NullRow { row: usize },
    #[error("row {row} has {len} columns, expected 4")]
    ColumnCount { row: usize, len: usize },
    #[error("element [{row}][{col}] is not finite")]
    NonFinite { row: usize, col: usize },
}

/// Position, rotation and scale extracted from a placement matrix.
///
/// `rotation` is a unit quaternion in glam's `(x, y, z, w)` layout. `scale`
/// holds basis vector magnitudes and is therefore never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecomposedTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl DecomposedTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Recomposes the placement and lays it out row-major, matching the
    /// convention `parse_row_major` reads.
    pub fn to_row_major(&self) -> RowMajor {
        // Columns of the transpose are the rows of the placement.
        self.to_mat4().transpose().to_cols_array_2d()
    }
}

impl Default for DecomposedTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Validates a wire matrix and converts it to glam's column-major `Mat4`.
pub fn parse_row_major(rows: Option<&[Option<Vec<f32>>]>) -> Result<Mat4, MalformedTransform> {
    let rows = rows.ok_or(MalformedTransform::Missing)?;
    if rows.len() != 4 {
        return Err(MalformedTransform::RowCount(rows.len()));
    }

    let mut data = [[0.0f32; 4]; 4];
    for (row_index, row) in rows.iter().enumerate() {
        let row = row
            .as_deref()
            .ok_or(MalformedTransform::NullRow { row: row_index })?;
        if row.len() != 4 {
            return Err(MalformedTransform::ColumnCount {
                row: row_index,
                len: row.len(),
            });
        }
        for (col_index, value) in row.iter().enumerate() {
            if !value.is_finite() {
                return Err(MalformedTransform::NonFinite {
                    row: row_index,
                    col: col_index,
                });
            }
            data[row_index][col_index] = *value;
        }
    }

    // Loading rows as columns yields the transpose; transposing again gives
    // the matrix the server meant.
    Ok(Mat4::from_cols_array_2d(&data).transpose())
}

/// Decomposes a wire matrix, reporting why it was rejected.
pub fn try_decompose(
    rows: Option<&[Option<Vec<f32>>]>,
) -> Result<DecomposedTransform, MalformedTransform> {
    parse_row_major(rows).map(decompose_matrix)
}

/// Decomposes a wire matrix, falling back to identity on malformed input.
pub fn decompose(rows: Option<&[Option<Vec<f32>>]>) -> DecomposedTransform {
    try_decompose(rows).unwrap_or_else(|err| {
        warn!(error = %err, "malformed transform, using identity");
        DecomposedTransform::IDENTITY
    })
}

/// Splits a column-major matrix into translation, orthonormal rotation and
/// per-axis scale. Shear in the basis is discarded.
pub fn decompose_matrix(matrix: Mat4) -> DecomposedTransform {
    let x_axis = matrix.x_axis.truncate();
    let y_axis = matrix.y_axis.truncate();
    let z_axis = matrix.z_axis.truncate();

    let scale = Vec3::new(x_axis.length(), y_axis.length(), z_axis.length());
    let rotation = look_rotation(z_axis.normalize_or_zero(), y_axis.normalize_or_zero());

    DecomposedTransform {
        position: matrix.w_axis.truncate(),
        rotation,
        scale,
    }
}

/// Orientation whose local +Z points along `forward`, with local +Y as close
/// to `up` as orthogonality allows. Both inputs must be unit length or zero.
fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }

    let mut right = up.cross(forward);
    if right.length_squared() <= f32::EPSILON {
        // up is zero or parallel to forward
        right = forward.any_orthonormal_vector();
    }
    let right = right.normalize();
    let up = forward.cross(right);

    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

//! Wire types for the catalog API.

use crate::transform::{self, DecomposedTransform, MalformedTransform, RawMatrix};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One model as listed by `GET /api/models/search`.
///
/// Snapshots are immutable; every refresh fetches the whole list again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model_path: String,
    /// Row-major 4x4 placement. Kept as raw JSON because the catalog may send
    /// `null`, ragged rows or non-numbers, none of which may fail the list.
    #[serde(default)]
    pub transform: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hidden: bool,
}

/// Treats an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ModelDescriptor {
    /// Display name, falling back to the id for unnamed models.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Interprets `transform` as rows of numbers.
    pub fn matrix_rows(&self) -> Result<RawMatrix, MalformedTransform> {
        let value = match &self.transform {
            None | Some(Value::Null) => return Err(MalformedTransform::Missing),
            Some(value) => value,
        };
        let rows = value.as_array().ok_or(MalformedTransform::NotAnArray)?;

        rows.iter()
            .map(|row| match row {
                Value::Null => Ok(None),
                Value::Array(items) => Ok(Some(
                    items
                        .iter()
                        // Non-numbers become NaN so validation reports the cell.
                        .map(|item| item.as_f64().map(|v| v as f32).unwrap_or(f32::NAN))
                        .collect(),
                )),
                _ => Err(MalformedTransform::NotAnArray),
            })
            .collect()
    }

    /// Decomposed placement, or the reason the matrix was unusable.
    pub fn placement(&self) -> Result<DecomposedTransform, MalformedTransform> {
        let rows = self.matrix_rows()?;
        transform::try_decompose(Some(&rows))
    }
}

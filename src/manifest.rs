//! Low-quality cluster manifests
//!
//! A manifest is a JSON array of subtile objects:
//!
//! ```json
//! [{"level": "subtile", "flowCell": "H7KJ2BBXX", "lane": 1, "tile": 1101, "x": 3, "y": 7}]
//! ```
//!
//! It is written after every clearing run and can be fed back in with
//! FILE selection to reproduce the run.

use crate::coordinates::{
    CoordinateJsonError, CoordinateLevel, Coordinates, FlowCellRegistry, SubtileCoordinates,
};
use crate::error::{Error, ManifestFormatError, Result};
use serde_json::Value;
use std::path::Path;

/// Serialize a selection as a manifest value
pub fn manifest_to_json<'a, I>(selection: I, registry: &FlowCellRegistry) -> Value
where
    I: IntoIterator<Item = &'a SubtileCoordinates>,
{
    Value::Array(
        selection
            .into_iter()
            .map(|subtile| Coordinates::from(*subtile).to_json(registry))
            .collect(),
    )
}

/// Interpret a manifest value; `path` is only used in error messages
pub fn parse_manifest(
    value: &Value,
    path: &Path,
    registry: &FlowCellRegistry,
) -> std::result::Result<Vec<SubtileCoordinates>, ManifestFormatError> {
    let entries = value.as_array().ok_or_else(|| ManifestFormatError::NotAnArray {
        path: path.to_path_buf(),
    })?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let coordinates = Coordinates::from_json(entry, registry).map_err(|e| {
                let path = path.to_path_buf();
                match e {
                    CoordinateJsonError::NotAnObject => {
                        ManifestFormatError::NotAnObject { path, index }
                    }
                    CoordinateJsonError::MissingKey(key) => {
                        ManifestFormatError::MissingKey { path, index, key }
                    }
                    CoordinateJsonError::InvalidValue(key) => {
                        ManifestFormatError::InvalidValue { path, index, key }
                    }
                }
            })?;
            match coordinates {
                Coordinates::Subtile(subtile) => Ok(subtile),
                other => Err(ManifestFormatError::WrongLevel {
                    path: path.to_path_buf(),
                    index,
                    expected: CoordinateLevel::Subtile.as_str(),
                    found: other.level().as_str(),
                }),
            }
        })
        .collect()
}

/// Load a manifest file
pub fn read_manifest<P: AsRef<Path>>(
    path: P,
    registry: &FlowCellRegistry,
) -> Result<Vec<SubtileCoordinates>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let value: Value =
        serde_json::from_str(&content).map_err(|source| ManifestFormatError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parse_manifest(&value, path, registry)?)
}

/// Write a manifest file
pub fn write_manifest<'a, P, I>(path: P, selection: I, registry: &FlowCellRegistry) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a SubtileCoordinates>,
{
    let path = path.as_ref();
    let json_content = serde_json::to_string_pretty(&manifest_to_json(selection, registry))
        .map_err(|e| Error::io(path, e.into()))?;
    std::fs::write(path, json_content).map_err(|e| Error::io(path, e))
}

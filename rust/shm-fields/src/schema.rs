//! Loading a [`LayoutTable`] from the generator's JSON schema.
//!
//! ```json
//! {
//!   "shm_name": "my_shm_name",
//!   "variables": [{ "name": "myint", "type": "int32" }],
//!   "arrays": [{ "name": "myarr", "type": "float32", "shape": [10, 10] }]
//! }
//! ```
//!
//! Variables (scalars) are placed first, then arrays, each in document
//! order. Any entry may pin its position with an explicit `"offset"`, and the
//! document may declare a `"total_size"` larger than the fields need.

use std::ffi::OsString;
use std::path::Path;

use serde::Deserialize;

use crate::error::SchemaError;
use crate::layout::{FieldTag, LayoutTable};
use crate::scalar::ScalarType;
use crate::shape::Shape;

/// Environment variable holding the path of the layout schema.
pub const LAYOUT_ENV: &str = "SHM_FIELDS_LAYOUT";

/// Environment variable overriding the schema's `shm_name`.
pub const SEGMENT_ENV: &str = "SHM_FIELDS_SEGMENT";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDoc {
    shm_name: String,
    #[serde(default)]
    total_size: Option<usize>,
    #[serde(default)]
    variables: Vec<VariableDoc>,
    #[serde(default)]
    arrays: Vec<ArrayDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariableDoc {
    name: String,
    #[serde(rename = "type")]
    scalar_type: String,
    #[serde(default)]
    offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArrayDoc {
    name: String,
    #[serde(rename = "type")]
    scalar_type: String,
    shape: Vec<usize>,
    #[serde(default)]
    offset: Option<usize>,
}

fn parse_type(tag: &FieldTag, name: &str) -> Result<ScalarType, SchemaError> {
    ScalarType::from_name(name).ok_or_else(|| SchemaError::UnknownScalarType {
        tag: tag.clone(),
        name: name.to_owned(),
    })
}

impl LayoutTable {
    /// Parse a schema document.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDoc = serde_json::from_str(json)?;

        let mut builder = LayoutTable::builder(doc.shm_name);
        if let Some(total_size) = doc.total_size {
            builder = builder.total_size(total_size);
        }

        let variables = doc
            .variables
            .into_iter()
            .map(|v| (v.name, v.scalar_type, Shape::scalar(), v.offset));
        let arrays = doc
            .arrays
            .into_iter()
            .map(|a| (a.name, a.scalar_type, Shape::new(a.shape), a.offset));

        for (name, type_name, shape, offset) in variables.chain(arrays) {
            let tag = FieldTag::from(name);
            let scalar_type = parse_type(&tag, &type_name)?;
            builder = match offset {
                Some(offset) => builder.field_at(tag, scalar_type, shape, offset),
                None => builder.field(tag, scalar_type, shape),
            };
        }

        builder.build()
    }

    /// Read and parse a schema file.
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let table = Self::from_json_str(&json)?;
        tracing::debug!(
            path = %path.display(),
            segment = %table.segment_name(),
            "loaded layout schema"
        );
        Ok(table)
    }

    /// Load the schema named by `SHM_FIELDS_LAYOUT`, applying the
    /// `SHM_FIELDS_SEGMENT` name override if set.
    pub fn from_env() -> Result<Self, SchemaError> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self, SchemaError> {
        let path = lookup(LAYOUT_ENV).ok_or(SchemaError::MissingConfig(LAYOUT_ENV))?;
        let table = Self::from_json_path(path)?;
        let segment = lookup(SEGMENT_ENV)
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty());
        match segment {
            Some(name) => {
                tracing::debug!(segment = %name, "segment name overridden by {SEGMENT_ENV}");
                Ok(table.with_segment_name(name))
            }
            None => Ok(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "shm_name": "my_shm_name",
        "variables": [
            { "name": "myint", "type": "int32" },
            { "name": "myfloat", "type": "float32" }
        ],
        "arrays": [
            { "name": "myarr", "type": "float32", "shape": [10, 10] },
            { "name": "myarr2", "type": "float32", "shape": [10, 10] }
        ]
    }"#;

    #[test]
    fn variables_then_arrays() {
        let table = LayoutTable::from_json_str(EXAMPLE).unwrap();
        assert_eq!(table.segment_name(), "my_shm_name");

        let offsets: Vec<_> = table.iter().map(|d| (d.tag.as_str(), d.offset)).collect();
        assert_eq!(
            offsets,
            [("myint", 0), ("myfloat", 4), ("myarr", 8), ("myarr2", 408)]
        );
        assert!(table.get("myint").unwrap().shape.is_scalar());
        assert_eq!(table.total_size(), 808);
    }

    #[test]
    fn explicit_offset_and_total_size() {
        let table = LayoutTable::from_json_str(
            r#"{
                "shm_name": "s",
                "total_size": 4096,
                "arrays": [{ "name": "c", "type": "float64", "shape": [4], "offset": 1024 }]
            }"#,
        )
        .unwrap();
        assert_eq!(table.get("c").unwrap().offset, 1024);
        assert_eq!(table.total_size(), 4096);
    }

    #[test]
    fn unknown_type_rejected() {
        let err = LayoutTable::from_json_str(
            r#"{ "shm_name": "s", "variables": [{ "name": "b", "type": "bool" }] }"#,
        )
        .unwrap_err();
        match err {
            SchemaError::UnknownScalarType { tag, name } => {
                assert_eq!(tag.as_str(), "b");
                assert_eq!(name, "bool");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            LayoutTable::from_json_str(r#"{ "variables": [] }"#),
            Err(SchemaError::Parse(_))
        ));
        assert!(matches!(
            LayoutTable::from_json_str("not json"),
            Err(SchemaError::Parse(_))
        ));
    }

    fn env_with(vars: &[(&'static str, OsString)]) -> impl Fn(&str) -> Option<OsString> {
        let vars = vars.to_vec();
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn env_requires_layout_path() {
        let err = LayoutTable::from_lookup(env_with(&[])).unwrap_err();
        assert!(matches!(err, SchemaError::MissingConfig(LAYOUT_ENV)), "{err}");
        assert_eq!(err.to_string(), "SHM_FIELDS_LAYOUT is not set");
    }

    #[test]
    fn env_loads_layout_and_overrides_segment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, EXAMPLE).unwrap();

        let table =
            LayoutTable::from_lookup(env_with(&[(LAYOUT_ENV, path.clone().into())])).unwrap();
        assert_eq!(table.segment_name(), "my_shm_name");
        assert_eq!(table.len(), 4);

        let table = LayoutTable::from_lookup(env_with(&[
            (LAYOUT_ENV, path.clone().into()),
            (SEGMENT_ENV, "/other_segment".into()),
        ]))
        .unwrap();
        assert_eq!(table.segment_name(), "/other_segment");
        assert_eq!(table.get("myarr2").unwrap().offset, 408);

        // an empty override keeps the schema's own name
        let table = LayoutTable::from_lookup(env_with(&[
            (LAYOUT_ENV, path.into()),
            (SEGMENT_ENV, OsString::new()),
        ]))
        .unwrap();
        assert_eq!(table.segment_name(), "my_shm_name");
    }

    #[test]
    fn env_layout_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = LayoutTable::from_lookup(env_with(&[(LAYOUT_ENV, missing.into())])).unwrap_err();
        assert!(matches!(err, SchemaError::Io(_)), "{err}");
    }

    #[test]
    fn from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, EXAMPLE).unwrap();
        assert_eq!(LayoutTable::from_json_path(&path).unwrap().len(), 4);

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            LayoutTable::from_json_path(&missing),
            Err(SchemaError::Io(_))
        ));
    }
}

//! RediSearch index schema

use std::fmt;

use indexmap::IndexMap;
use tether_config::{MetadataFieldKind, VectorStoreConfig};

use crate::error::VectorStoreError;

pub const ID_FIELD: &str = "id";
pub const DOC_ID_FIELD: &str = "doc_id";
pub const TEXT_FIELD: &str = "text";
pub const VECTOR_FIELD: &str = "vector";
pub const NODE_CONTENT_FIELD: &str = "_node_content";
pub const NODE_TYPE_FIELD: &str = "_node_type";
/// Alias the KNN clause assigns to the distance score
pub const DISTANCE_FIELD: &str = "vector_distance";

pub const DEFAULT_INDEX_NAME: &str = "llama_index";
pub const DEFAULT_PREFIX: &str = "llama_index/vector";
pub const DEFAULT_KEY_SEPARATOR: &str = "_";
pub const DEFAULT_DIMS: usize = 1536;

/// Vector index algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorAlgorithm {
    Flat,
    Hnsw,
}

/// Vector distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    L2,
    Ip,
}

/// Stored vector element type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDataType {
    Float32,
}

/// Attributes of a vector field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorAttrs {
    pub dims: usize,
    pub algorithm: VectorAlgorithm,
    pub distance_metric: DistanceMetric,
    pub datatype: VectorDataType,
}

impl VectorAttrs {
    /// Flat cosine float32 vector of the given size
    pub const fn flat(dims: usize) -> Self {
        Self {
            dims,
            algorithm: VectorAlgorithm::Flat,
            distance_metric: DistanceMetric::Cosine,
            datatype: VectorDataType::Float32,
        }
    }
}

/// Kind of an index field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Tag,
    Text,
    Numeric,
    Vector(VectorAttrs),
}

impl Field {
    /// Kind name without attributes
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Vector(_) => "vector",
        }
    }

    fn push_args(&self, name: &str, args: &mut Vec<String>) {
        args.push(name.to_owned());
        match self {
            Self::Tag => args.push("TAG".to_owned()),
            Self::Text => args.push("TEXT".to_owned()),
            Self::Numeric => args.push("NUMERIC".to_owned()),
            Self::Vector(attrs) => {
                let algorithm = match attrs.algorithm {
                    VectorAlgorithm::Flat => "FLAT",
                    VectorAlgorithm::Hnsw => "HNSW",
                };
                let metric = match attrs.distance_metric {
                    DistanceMetric::Cosine => "COSINE",
                    DistanceMetric::L2 => "L2",
                    DistanceMetric::Ip => "IP",
                };
                let datatype = match attrs.datatype {
                    VectorDataType::Float32 => "FLOAT32",
                };
                args.extend(
                    [
                        "VECTOR",
                        algorithm,
                        "6",
                        "TYPE",
                        datatype,
                        "DIM",
                        &attrs.dims.to_string(),
                        "DISTANCE_METRIC",
                        metric,
                    ]
                    .map(str::to_owned),
                );
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl From<MetadataFieldKind> for Field {
    fn from(kind: MetadataFieldKind) -> Self {
        match kind {
            MetadataFieldKind::Tag => Self::Tag,
            MetadataFieldKind::Text => Self::Text,
            MetadataFieldKind::Numeric => Self::Numeric,
        }
    }
}

/// Index name, key layout and fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub prefix: String,
    pub key_separator: String,
    pub fields: IndexMap<String, Field>,
}

impl Default for IndexSchema {
    fn default() -> Self {
        let mut fields = IndexMap::new();
        fields.insert(ID_FIELD.to_owned(), Field::Tag);
        fields.insert(DOC_ID_FIELD.to_owned(), Field::Tag);
        fields.insert(TEXT_FIELD.to_owned(), Field::Text);
        fields.insert(VECTOR_FIELD.to_owned(), Field::Vector(VectorAttrs::flat(DEFAULT_DIMS)));

        Self {
            name: DEFAULT_INDEX_NAME.to_owned(),
            prefix: DEFAULT_PREFIX.to_owned(),
            key_separator: DEFAULT_KEY_SEPARATOR.to_owned(),
            fields,
        }
    }
}

impl IndexSchema {
    /// Schema described by configuration
    pub fn from_config(config: &VectorStoreConfig) -> Self {
        let schema = Self {
            name: config.index_name.clone(),
            prefix: config.prefix.clone(),
            key_separator: config.key_separator.clone(),
            ..Self::default()
        }
        .with_dims(config.dims);

        config
            .metadata_fields
            .iter()
            .fold(schema, |schema, field| schema.with_metadata_field(&field.name, field.kind.into()))
    }

    /// Add a filterable metadata field
    #[must_use]
    pub fn with_metadata_field(mut self, name: &str, field: Field) -> Self {
        self.fields.insert(name.to_owned(), field);
        self
    }

    /// Change the vector field's dimensionality
    #[must_use]
    pub fn with_dims(mut self, dims: usize) -> Self {
        if let Some(Field::Vector(attrs)) = self.fields.get_mut(VECTOR_FIELD) {
            attrs.dims = dims;
        }
        self
    }

    /// Vector dimensionality, if the schema has a vector field
    pub fn dims(&self) -> Option<usize> {
        match self.fields.get(VECTOR_FIELD) {
            Some(Field::Vector(attrs)) => Some(attrs.dims),
            _ => None,
        }
    }

    /// Check that the required fields exist with their expected kinds
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::InvalidSchema`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), VectorStoreError> {
        for (name, expected) in &Self::default().fields {
            match self.fields.get(name) {
                Some(field) if field.kind() == expected.kind() => {}
                Some(field) => {
                    return Err(VectorStoreError::InvalidSchema(format!(
                        "required field `{name}` must be of type {expected}, found {field}"
                    )));
                }
                None => {
                    return Err(VectorStoreError::InvalidSchema(format!(
                        "required field `{name}` of type {expected} is missing"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Redis key for a node id
    pub fn key(&self, id: &str) -> String {
        format!("{}{}{id}", self.prefix, self.key_separator)
    }

    /// Node id for a Redis key
    pub fn id_from_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(self.key_separator.as_str()))
            .unwrap_or(key)
    }

    /// Arguments of `FT.CREATE` for this schema
    pub fn create_args(&self) -> Vec<String> {
        let mut args = vec![self.name.clone()];
        args.extend(["ON", "HASH", "PREFIX", "1"].map(str::to_owned));
        args.push(self.prefix.clone());
        args.push("SCHEMA".to_owned());

        for (name, field) in &self.fields {
            field.push_args(name, &mut args);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use tether_config::MetadataFieldConfig;

    use super::*;

    #[test]
    fn default_schema_is_valid() {
        let schema = IndexSchema::default();
        schema.validate().unwrap();
        assert_eq!(schema.dims(), Some(1536));
        assert_eq!(schema.key("abc"), "llama_index/vector_abc");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut schema = IndexSchema::default();
        schema.fields.shift_remove(DOC_ID_FIELD);

        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("doc_id"));
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let schema = IndexSchema::default().with_metadata_field(TEXT_FIELD, Field::Tag);
        assert!(matches!(schema.validate(), Err(VectorStoreError::InvalidSchema(_))));
    }

    #[test]
    fn id_from_key_strips_prefix_and_separator() {
        let schema = IndexSchema::default();
        assert_eq!(schema.id_from_key("llama_index/vector_node-1"), "node-1");
        assert_eq!(schema.id_from_key("other:node-1"), "other:node-1");
    }

    #[test]
    fn create_args_layout() {
        let schema = IndexSchema::default().with_dims(3).with_metadata_field("year", Field::Numeric);
        let args = schema.create_args();

        assert_eq!(
            args,
            [
                "llama_index",
                "ON",
                "HASH",
                "PREFIX",
                "1",
                "llama_index/vector",
                "SCHEMA",
                "id",
                "TAG",
                "doc_id",
                "TAG",
                "text",
                "TEXT",
                "vector",
                "VECTOR",
                "FLAT",
                "6",
                "TYPE",
                "FLOAT32",
                "DIM",
                "3",
                "DISTANCE_METRIC",
                "COSINE",
                "year",
                "NUMERIC",
            ]
        );
    }

    #[test]
    fn from_config_applies_fields() {
        let config = VectorStoreConfig {
            index_name: "docs".to_owned(),
            prefix: "docs".to_owned(),
            key_separator: ":".to_owned(),
            dims: 384,
            metadata_fields: vec![MetadataFieldConfig {
                name: "author".to_owned(),
                kind: MetadataFieldKind::Tag,
            }],
            ..VectorStoreConfig::default()
        };

        let schema = IndexSchema::from_config(&config);
        schema.validate().unwrap();
        assert_eq!(schema.name, "docs");
        assert_eq!(schema.dims(), Some(384));
        assert_eq!(schema.fields.get("author"), Some(&Field::Tag));
        assert_eq!(schema.key("n1"), "docs:n1");
    }
}

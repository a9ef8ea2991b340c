use serde::Deserialize;

/// Redis vector store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VectorStoreConfig {
    /// Redis connection URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Search index name
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Key prefix for stored documents
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Separator between the prefix and the node id
    #[serde(default = "default_key_separator")]
    pub key_separator: String,
    /// Embedding dimensionality of the vector field
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Drop and recreate the index on startup
    #[serde(default)]
    pub overwrite: bool,
    /// Use the legacy string-based filter rendering
    #[serde(default)]
    pub legacy_filters: bool,
    /// Fields returned by queries (defaults to id, doc_id, text, node content)
    #[serde(default)]
    pub return_fields: Option<Vec<String>>,
    /// Additional filterable metadata fields
    #[serde(default)]
    pub metadata_fields: Vec<MetadataFieldConfig>,
}

/// A filterable metadata field declared in the index schema
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataFieldConfig {
    /// Field name (matches the metadata key)
    pub name: String,
    /// Field kind
    #[serde(rename = "type")]
    pub kind: MetadataFieldKind,
}

/// Index field kinds usable for metadata filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataFieldKind {
    /// Exact-match tag field
    Tag,
    /// Full-text field
    Text,
    /// Numeric range field
    Numeric,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index_name: default_index_name(),
            prefix: default_prefix(),
            key_separator: default_key_separator(),
            dims: default_dims(),
            overwrite: false,
            legacy_filters: false,
            return_fields: None,
            metadata_fields: Vec::new(),
        }
    }
}

fn default_url() -> String {
    "redis://localhost:6379".to_owned()
}

fn default_index_name() -> String {
    "llama_index".to_owned()
}

fn default_prefix() -> String {
    "llama_index/vector".to_owned()
}

fn default_key_separator() -> String {
    "_".to_owned()
}

const fn default_dims() -> usize {
    1536
}

use thiserror::Error;

/// Vector store errors
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Redis connection or command error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Schema lacks a required field or has it with the wrong kind
    #[error("invalid index schema: {0}")]
    InvalidSchema(String),

    /// Operator cannot be applied to the field's kind
    #[error("filter operator `{operator}` is not supported for field `{field}`")]
    UnsupportedFilter {
        /// Field the filter targets
        field: String,
        /// Rejected operator
        operator: String,
    },

    /// Field kind cannot be used as a filter at all
    #[error("field `{field}` of type {kind} cannot be used as a filter")]
    UnsupportedField {
        /// Field the filter targets
        field: String,
        /// Kind of the field in the schema
        kind: String,
    },

    /// Filter value does not fit the operator (e.g. a string for `>`)
    #[error("invalid value for filter on `{field}`: {reason}")]
    InvalidFilterValue {
        /// Field the filter targets
        field: String,
        /// What was wrong with the value
        reason: String,
    },

    /// Embedding length differs from the schema's vector dims
    #[error("embedding has {actual} dimensions but the index expects {expected}")]
    DimensionMismatch {
        /// Dims declared by the schema
        expected: usize,
        /// Length of the offending embedding
        actual: usize,
    },

    /// A node was added without an embedding
    #[error("node `{0}` has no embedding")]
    MissingEmbedding(String),

    /// A query was issued without an embedding
    #[error("query embedding is required for querying")]
    MissingQueryEmbedding,

    /// Node content could not be serialized for storage
    #[error("failed to encode node content: {0}")]
    Encode(#[source] serde_json::Error),

    /// A search reply or stored node could not be decoded
    #[error("failed to decode search result: {0}")]
    Deserialize(String),
}

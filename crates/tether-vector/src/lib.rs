//! Vector store on a RediSearch index
//!
//! Nodes are stored as Redis hashes under a common key prefix and queried
//! with KNN searches, optionally pre-filtered by metadata.

#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod escape;
pub mod filter;
pub mod node;
pub mod query;
pub mod schema;
pub mod sparse;
pub mod store;

pub use error::VectorStoreError;
pub use escape::TokenEscaper;
pub use filter::{
    FilterCondition, FilterExpression, FilterNode, FilterOperator, FilterValue, MetadataFilter, MetadataFilters,
};
pub use node::{TextNode, VectorStoreQueryResult};
pub use query::VectorStoreQuery;
pub use schema::{DistanceMetric, Field, IndexSchema, VectorAlgorithm, VectorAttrs, VectorDataType};
pub use sparse::{SparseEmbedding, SparseEncoder, Tokenizer, build_sparse_embeddings};
pub use store::{RedisVectorStore, StoreOptions};

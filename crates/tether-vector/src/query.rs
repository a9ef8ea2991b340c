//! `FT.SEARCH` command builders and reply parsing

use std::collections::HashMap;

use redis::Value;

use crate::error::VectorStoreError;
use crate::filter::{FilterExpression, MetadataFilters};
use crate::schema::{DISTANCE_FIELD, DOC_ID_FIELD, ID_FIELD, NODE_CONTENT_FIELD, TEXT_FIELD, VECTOR_FIELD};

const DIALECT: &str = "2";

/// Fields returned by a query when none are configured
pub fn default_return_fields() -> Vec<String> {
    [ID_FIELD, DOC_ID_FIELD, TEXT_FIELD, NODE_CONTENT_FIELD]
        .map(str::to_owned)
        .to_vec()
}

/// A nearest-neighbour query against the store
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreQuery {
    pub query_embedding: Option<Vec<f32>>,
    pub similarity_top_k: usize,
    pub filters: Option<MetadataFilters>,
}

impl Default for VectorStoreQuery {
    fn default() -> Self {
        Self {
            query_embedding: None,
            similarity_top_k: 1,
            filters: None,
        }
    }
}

impl VectorStoreQuery {
    /// Query for the `top_k` nearest neighbours of `embedding`
    pub fn new(embedding: Vec<f32>, top_k: usize) -> Self {
        Self {
            query_embedding: Some(embedding),
            similarity_top_k: top_k,
            filters: None,
        }
    }

    #[must_use]
    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// Little-endian float32 buffer as stored in hash vector fields
pub fn vector_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// KNN search over the vector field, pre-filtered by `filter`
#[derive(Debug, Clone)]
pub struct KnnQuery {
    pub index: String,
    pub filter: String,
    pub return_fields: Vec<String>,
    pub top_k: usize,
    pub vector: Vec<u8>,
}

impl KnnQuery {
    pub fn new(index: &str, filter: &FilterExpression, return_fields: &[String], top_k: usize, embedding: &[f32]) -> Self {
        Self {
            index: index.to_owned(),
            filter: filter.to_string(),
            return_fields: return_fields.to_vec(),
            top_k,
            vector: vector_bytes(embedding),
        }
    }

    /// Query string with the KNN clause appended to the filter
    pub fn query_string(&self) -> String {
        format!(
            "{}=>[KNN {} @{VECTOR_FIELD} ${VECTOR_FIELD} AS {DISTANCE_FIELD}]",
            self.filter, self.top_k
        )
    }

    pub fn to_cmd(&self) -> redis::Cmd {
        let mut cmd = redis::cmd("FT.SEARCH");
        cmd.arg(&self.index).arg(self.query_string());

        cmd.arg("RETURN").arg(self.return_fields.len() + 1);
        for field in &self.return_fields {
            cmd.arg(field);
        }
        cmd.arg(DISTANCE_FIELD);

        cmd.arg("SORTBY")
            .arg(DISTANCE_FIELD)
            .arg("ASC")
            .arg("DIALECT")
            .arg(DIALECT)
            .arg("LIMIT")
            .arg(0)
            .arg(self.top_k)
            .arg("PARAMS")
            .arg(2)
            .arg(VECTOR_FIELD)
            .arg(self.vector.as_slice());
        cmd
    }
}

/// Number of documents matching `filter`
pub fn count_cmd(index: &str, filter: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(index)
        .arg(filter)
        .arg("NOCONTENT")
        .arg("LIMIT")
        .arg(0)
        .arg(0)
        .arg("DIALECT")
        .arg(DIALECT);
    cmd
}

/// Keys of the first `limit` documents matching `filter`
pub fn keys_cmd(index: &str, filter: &str, limit: usize) -> redis::Cmd {
    let mut cmd = redis::cmd("FT.SEARCH");
    cmd.arg(index)
        .arg(filter)
        .arg("NOCONTENT")
        .arg("LIMIT")
        .arg(0)
        .arg(limit)
        .arg("DIALECT")
        .arg(DIALECT);
    cmd
}

/// One document of a search reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDocument {
    pub key: String,
    pub fields: HashMap<String, String>,
}

/// Decoded `FT.SEARCH` reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchReply {
    pub total: usize,
    pub documents: Vec<SearchDocument>,
}

fn malformed(what: &str) -> VectorStoreError {
    VectorStoreError::Deserialize(format!("malformed search reply: {what}"))
}

impl SearchReply {
    /// Decode a RESP2 search reply: `[total, key, [field, value, ...], ...]`
    ///
    /// Replies to `NOCONTENT` searches carry keys only.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Deserialize`] if the reply does not have
    /// that shape.
    pub fn parse(value: &Value) -> Result<Self, VectorStoreError> {
        let Value::Array(items) = value else {
            return Err(malformed("expected an array"));
        };
        let Some((total, rest)) = items.split_first() else {
            return Err(malformed("missing result count"));
        };

        let total: usize = redis::from_redis_value(total).map_err(|_| malformed("result count is not an integer"))?;
        let mut documents: Vec<SearchDocument> = Vec::new();

        for item in rest {
            match item {
                Value::Array(pairs) => {
                    let document = documents
                        .last_mut()
                        .ok_or_else(|| malformed("field list without a key"))?;
                    for pair in pairs.chunks(2) {
                        let [name, value] = pair else {
                            return Err(malformed("odd number of field entries"));
                        };
                        let name: String =
                            redis::from_redis_value(name).map_err(|_| malformed("field name is not a string"))?;
                        let value: String =
                            redis::from_redis_value(value).map_err(|_| malformed("field value is not a string"))?;
                        document.fields.insert(name, value);
                    }
                }
                other => {
                    let key: String = redis::from_redis_value(other).map_err(|_| malformed("key is not a string"))?;
                    documents.push(SearchDocument {
                        key,
                        fields: HashMap::new(),
                    });
                }
            }
        }

        Ok(Self { total, documents })
    }
}

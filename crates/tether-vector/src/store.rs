//! Redis-backed vector store

use std::time::Instant;

use redis::aio::MultiplexedConnection;
use tether_config::VectorStoreConfig;

use crate::error::VectorStoreError;
use crate::escape::TokenEscaper;
use crate::filter::{FilterExpression, to_filter_expression, to_legacy_filter};
use crate::node::{TextNode, VectorStoreQueryResult};
use crate::query::{KnnQuery, SearchReply, VectorStoreQuery, count_cmd, default_return_fields, keys_cmd};
use crate::schema::{DOC_ID_FIELD, IndexSchema};

/// Store behaviour that is not part of the index schema
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Drop and recreate an existing index in [`RedisVectorStore::ensure_index`]
    pub overwrite: bool,
    /// Render filters with the legacy tag-only syntax
    pub legacy_filters: bool,
    /// Fields returned by queries
    pub return_fields: Vec<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            legacy_filters: false,
            return_fields: default_return_fields(),
        }
    }
}

impl From<&VectorStoreConfig> for StoreOptions {
    fn from(config: &VectorStoreConfig) -> Self {
        Self {
            overwrite: config.overwrite,
            legacy_filters: config.legacy_filters,
            return_fields: config.return_fields.clone().unwrap_or_else(default_return_fields),
        }
    }
}

/// Vector store on a RediSearch index over Redis hashes
#[derive(Debug, Clone)]
pub struct RedisVectorStore {
    client: redis::Client,
    schema: IndexSchema,
    options: StoreOptions,
    escaper: TokenEscaper,
}

impl RedisVectorStore {
    /// Create a store for an already opened client
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::InvalidSchema`] if the schema lacks a
    /// required field.
    pub fn new(client: redis::Client, schema: IndexSchema, options: StoreOptions) -> Result<Self, VectorStoreError> {
        schema.validate()?;

        Ok(Self {
            client,
            schema,
            options,
            escaper: TokenEscaper::default(),
        })
    }

    /// Create a store from configuration
    ///
    /// # Errors
    ///
    /// Fails on an invalid Redis URL or schema.
    pub fn from_config(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let client = redis::Client::open(config.url.as_str())?;
        Self::new(client, IndexSchema::from_config(config), StoreOptions::from(config))
    }

    pub const fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub fn index_name(&self) -> &str {
        &self.schema.name
    }

    async fn connection(&self) -> Result<MultiplexedConnection, VectorStoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Whether the index exists on the server
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn index_exists(&self) -> Result<bool, VectorStoreError> {
        let mut conn = self.connection().await?;
        let indexes: Vec<String> = redis::cmd("FT._LIST").query_async(&mut conn).await?;
        Ok(indexes.iter().any(|name| name == &self.schema.name))
    }

    /// Create the index, honouring the configured overwrite flag
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn ensure_index(&self) -> Result<(), VectorStoreError> {
        self.create_index(self.options.overwrite).await
    }

    /// Create the index
    ///
    /// An existing index is dropped together with its documents when
    /// `overwrite` is set, and left untouched otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn create_index(&self, overwrite: bool) -> Result<(), VectorStoreError> {
        if self.index_exists().await? {
            if !overwrite {
                tracing::info!(index = %self.schema.name, "index already exists, not overwriting");
                return Ok(());
            }
            tracing::info!(index = %self.schema.name, "dropping existing index before recreating it");
            self.delete_index().await?;
        }

        let mut conn = self.connection().await?;
        let () = redis::cmd("FT.CREATE")
            .arg(self.schema.create_args())
            .query_async(&mut conn)
            .await?;

        tracing::info!(index = %self.schema.name, fields = self.schema.fields.len(), "created index");
        Ok(())
    }

    /// Write nodes as hashes and return their ids
    ///
    /// # Errors
    ///
    /// Fails if a node lacks an embedding, if the first embedding's length
    /// differs from the schema's dims, or on Redis errors.
    pub async fn add(&self, nodes: &[TextNode]) -> Result<Vec<String>, VectorStoreError> {
        let Some(first) = nodes.first() else {
            return Ok(Vec::new());
        };

        let actual = first
            .embedding
            .as_ref()
            .ok_or_else(|| VectorStoreError::MissingEmbedding(first.id.clone()))?
            .len();
        if let Some(expected) = self.schema.dims()
            && expected != actual
        {
            return Err(VectorStoreError::DimensionMismatch { expected, actual });
        }

        let mut pipe = redis::pipe();
        for node in nodes {
            pipe.hset_multiple(self.schema.key(&node.id), &node.to_hash()?).ignore();
        }

        let mut conn = self.connection().await?;
        let () = pipe.query_async(&mut conn).await?;

        tracing::info!(index = %self.schema.name, count = nodes.len(), "added documents");
        Ok(nodes.iter().map(|node| node.id.clone()).collect())
    }

    /// Delete every node whose source document is `ref_doc_id`
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError`] on Redis errors or a malformed reply.
    pub async fn delete(&self, ref_doc_id: &str) -> Result<(), VectorStoreError> {
        let filter = format!("@{DOC_ID_FIELD}:{{{}}}", self.escaper.escape(ref_doc_id));
        let mut conn = self.connection().await?;

        let count: redis::Value = count_cmd(&self.schema.name, &filter).query_async(&mut conn).await?;
        let total = SearchReply::parse(&count)?.total;
        if total == 0 {
            tracing::info!(index = %self.schema.name, ref_doc_id, "no documents to delete");
            return Ok(());
        }

        let reply: redis::Value = keys_cmd(&self.schema.name, &filter, total)
            .query_async(&mut conn)
            .await?;
        let documents = SearchReply::parse(&reply)?.documents;

        let mut pipe = redis::pipe();
        for document in &documents {
            pipe.del(&document.key).ignore();
        }
        let () = pipe.query_async(&mut conn).await?;

        tracing::info!(index = %self.schema.name, ref_doc_id, count = documents.len(), "deleted documents");
        Ok(())
    }

    /// Delete nodes by id
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn delete_nodes(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.del(self.schema.key(id)).ignore();
        }

        let mut conn = self.connection().await?;
        let () = pipe.query_async(&mut conn).await?;

        tracing::debug!(index = %self.schema.name, count = ids.len(), "deleted nodes");
        Ok(())
    }

    /// Drop the index and all of its documents
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn delete_index(&self) -> Result<(), VectorStoreError> {
        tracing::info!(index = %self.schema.name, "deleting index");

        let mut conn = self.connection().await?;
        let () = redis::cmd("FT.DROPINDEX")
            .arg(&self.schema.name)
            .arg("DD")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Filter expression for a query
    ///
    /// # Errors
    ///
    /// Propagates filter rendering errors.
    pub fn filter_expression(&self, query: &VectorStoreQuery) -> Result<FilterExpression, VectorStoreError> {
        let Some(filters) = &query.filters else {
            return Ok(FilterExpression::match_all());
        };

        if self.options.legacy_filters {
            Ok(FilterExpression::from_raw(to_legacy_filter(&self.schema, filters, &self.escaper)))
        } else {
            to_filter_expression(&self.schema, filters, &self.escaper)
        }
    }

    /// Nearest-neighbour search
    ///
    /// # Errors
    ///
    /// Fails without a query embedding, on filter rendering errors, on Redis
    /// errors, or when the reply cannot be decoded.
    pub async fn query(&self, query: &VectorStoreQuery) -> Result<VectorStoreQueryResult, VectorStoreError> {
        let embedding = query
            .query_embedding
            .as_deref()
            .filter(|embedding| !embedding.is_empty())
            .ok_or(VectorStoreError::MissingQueryEmbedding)?;

        let filter = self.filter_expression(query)?;
        let knn = KnnQuery::new(
            &self.schema.name,
            &filter,
            &self.options.return_fields,
            query.similarity_top_k,
            embedding,
        );
        tracing::debug!(index = %self.schema.name, query = %knn.query_string(), "querying index");

        let start = Instant::now();
        let mut conn = self.connection().await?;
        let reply: redis::Value = knn.to_cmd().query_async(&mut conn).await.inspect_err(|e| {
            tracing::error!(index = %self.schema.name, error = %e, "error querying index");
        })?;
        tether_telemetry::metrics::record_vector_query(&self.schema.name, start);

        let reply = SearchReply::parse(&reply)?;
        let result = VectorStoreQueryResult::from_documents(&self.schema, &reply.documents)?;

        tracing::debug!(index = %self.schema.name, ids = ?result.ids, "query results");
        Ok(result)
    }

    /// Ask the server to save its dataset to disk
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Redis`] on connection or command failure.
    pub async fn persist(&self, in_background: bool) -> Result<(), VectorStoreError> {
        let command = if in_background { "BGSAVE" } else { "SAVE" };
        tracing::info!(command, "saving dataset to disk");

        let mut conn = self.connection().await?;
        let _: redis::Value = redis::cmd(command).query_async(&mut conn).await?;
        Ok(())
    }
}

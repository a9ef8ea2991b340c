//! Stored nodes and query results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VectorStoreError;
use crate::query::{SearchDocument, vector_bytes};
use crate::schema::{
    DISTANCE_FIELD, DOC_ID_FIELD, ID_FIELD, IndexSchema, NODE_CONTENT_FIELD, NODE_TYPE_FIELD, TEXT_FIELD, VECTOR_FIELD,
};

const NODE_TYPE: &str = "TextNode";
/// Stored as `doc_id` when a node has no source document
const NO_DOC_ID: &str = "None";

/// A chunk of text with its embedding and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    #[serde(rename = "id_")]
    pub id: String,
    #[serde(default)]
    pub ref_doc_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl TextNode {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ref_doc_id(mut self, ref_doc_id: impl Into<String>) -> Self {
        self.ref_doc_id = Some(ref_doc_id.into());
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Hash fields written for this node
    ///
    /// Metadata is flattened so that it can be indexed; nested values are
    /// stored as JSON text.
    ///
    /// # Errors
    ///
    /// Fails when the node has no embedding or the node content cannot be
    /// serialized.
    pub fn to_hash(&self) -> Result<Vec<(String, Vec<u8>)>, VectorStoreError> {
        let embedding = self
            .embedding
            .as_deref()
            .ok_or_else(|| VectorStoreError::MissingEmbedding(self.id.clone()))?;
        let doc_id = self.ref_doc_id.as_deref().unwrap_or(NO_DOC_ID);

        let mut fields = vec![
            (ID_FIELD.to_owned(), self.id.clone().into_bytes()),
            (DOC_ID_FIELD.to_owned(), doc_id.as_bytes().to_vec()),
            (TEXT_FIELD.to_owned(), self.text.clone().into_bytes()),
            (VECTOR_FIELD.to_owned(), vector_bytes(embedding)),
        ];

        for (key, value) in &self.metadata {
            let flat = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.push((key.clone(), flat.into_bytes()));
        }

        let content = Self {
            text: String::new(),
            embedding: None,
            ..self.clone()
        };
        let content = serde_json::to_string(&content).map_err(VectorStoreError::Encode)?;

        fields.push((NODE_CONTENT_FIELD.to_owned(), content.into_bytes()));
        fields.push((NODE_TYPE_FIELD.to_owned(), NODE_TYPE.as_bytes().to_vec()));
        fields.push(("document_id".to_owned(), doc_id.as_bytes().to_vec()));
        fields.push(("ref_doc_id".to_owned(), doc_id.as_bytes().to_vec()));

        Ok(fields)
    }

    /// Rebuild a node from a search result
    ///
    /// Uses the stored node content when it decodes, with the text restored
    /// from the `text` field. Older records without node content yield a node
    /// built from `id`, `doc_id` and `text`.
    pub fn from_document(schema: &IndexSchema, document: &SearchDocument) -> Self {
        let text = document.fields.get(TEXT_FIELD).cloned().unwrap_or_default();

        let stored = document
            .fields
            .get(NODE_CONTENT_FIELD)
            .and_then(|content| serde_json::from_str::<Self>(content).ok());

        if let Some(node) = stored {
            return Self { text, ..node };
        }

        let id = document
            .fields
            .get(ID_FIELD)
            .cloned()
            .unwrap_or_else(|| schema.id_from_key(&document.key).to_owned());

        Self {
            id,
            ref_doc_id: document.fields.get(DOC_ID_FIELD).cloned(),
            text,
            ..Self::default()
        }
    }
}

/// Nodes returned by a query with their ids and similarity scores
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStoreQueryResult {
    pub nodes: Vec<TextNode>,
    pub ids: Vec<String>,
    pub similarities: Vec<f32>,
}

impl VectorStoreQueryResult {
    /// Build a result from KNN search documents, in reply order
    ///
    /// # Errors
    ///
    /// Returns [`VectorStoreError::Deserialize`] if a document lacks a valid
    /// distance.
    pub fn from_documents(schema: &IndexSchema, documents: &[SearchDocument]) -> Result<Self, VectorStoreError> {
        let mut result = Self::default();

        for document in documents {
            let distance: f32 = document
                .fields
                .get(DISTANCE_FIELD)
                .ok_or_else(|| VectorStoreError::Deserialize(format!("`{}` has no {DISTANCE_FIELD}", document.key)))?
                .parse()
                .map_err(|e| VectorStoreError::Deserialize(format!("invalid {DISTANCE_FIELD}: {e}")))?;

            let node = TextNode::from_document(schema, document);
            let id = document
                .fields
                .get(ID_FIELD)
                .cloned()
                .unwrap_or_else(|| schema.id_from_key(&document.key).to_owned());

            result.ids.push(id);
            result.nodes.push(node);
            result.similarities.push(1.0 - distance);
        }

        Ok(result)
    }
}

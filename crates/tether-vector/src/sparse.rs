//! Term-frequency sparse embeddings

use std::collections::BTreeMap;

/// Token id to weight
pub type SparseEmbedding = BTreeMap<u32, f32>;

/// Turns text into token ids
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
}

impl<F> Tokenizer for F
where
    F: Fn(&str) -> Vec<u32> + Send + Sync,
{
    fn encode(&self, text: &str) -> Vec<u32> {
        self(text)
    }
}

/// One embedding per batch entry, weighting each token by its frequency
pub fn build_sparse_embeddings<I, T>(batches: I) -> Vec<SparseEmbedding>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u32]>,
{
    batches
        .into_iter()
        .map(|ids| {
            ids.as_ref().iter().fold(SparseEmbedding::new(), |mut embedding, id| {
                *embedding.entry(*id).or_insert(0.0) += 1.0;
                embedding
            })
        })
        .collect()
}

/// Sparse encoder backed by a [`Tokenizer`]
pub struct SparseEncoder<T> {
    tokenizer: T,
}

impl<T: Tokenizer> SparseEncoder<T> {
    pub const fn new(tokenizer: T) -> Self {
        Self { tokenizer }
    }

    pub fn query_embedding(&self, query: &str) -> SparseEmbedding {
        self.text_embeddings([query]).pop().unwrap_or_default()
    }

    pub fn text_embedding(&self, text: &str) -> SparseEmbedding {
        self.text_embeddings([text]).pop().unwrap_or_default()
    }

    pub fn text_embeddings<'a>(&self, texts: impl IntoIterator<Item = &'a str>) -> Vec<SparseEmbedding> {
        build_sparse_embeddings(texts.into_iter().map(|text| self.tokenizer.encode(text)))
    }
}

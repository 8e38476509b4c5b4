use crate::linking::{alphanumeric_tokens, Candidate, LinkError, Scorer};
use ahash::RandomState;
use ndarray::ArrayView1;
use std::{
    error::Error,
    fmt::{Debug, Display},
    sync::Arc,
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Failure of a sentence encoder.
pub struct EncoderError(pub String);

impl Display for EncoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encoding failed: {}", self.0)
    }
}
impl Error for EncoderError {}

/// Contract of a sentence encoder: one vector per text, in the order of `texts`, all of the same
/// dimension.
pub trait Encoder: Send + Sync {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Long-lived handle on an encoder. It is created once, cloned cheaply wherever vectors are needed
/// and released with `shutdown`.
#[derive(Clone)]
pub struct EncoderHandle {
    inner: Arc<dyn Encoder>,
}

impl EncoderHandle {
    pub fn new<E: Encoder + 'static>(encoder: E) -> Self {
        EncoderHandle {
            inner: Arc::new(encoder),
        }
    }

    pub fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.inner.encode(texts)
    }

    /// Releases this handle. Returns `true` if it was the last one and the encoder was dropped.
    pub fn shutdown(self) -> bool {
        let last = Arc::strong_count(&self.inner) == 1;
        debug!(last, "shutting down an encoder handle");
        last
    }
}

impl Debug for EncoderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderHandle")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

/// Cosine similarity of two vectors, in `[-1, 1]`. A zero vector is similar to nothing.
pub fn cosine_similarity(first: &[f32], second: &[f32]) -> Result<f64, LinkError> {
    if first.len() != second.len() {
        return Err(LinkError::DimensionMismatch(first.len(), second.len()));
    }
    let first = ArrayView1::from(first).mapv(f64::from);
    let second = ArrayView1::from(second).mapv(f64::from);
    let norms = first.dot(&first).sqrt() * second.dot(&second).sqrt();
    if norms == 0.0 {
        return Ok(0.0);
    }
    Ok((first.dot(&second) / norms).clamp(-1.0, 1.0))
}

/// Scores candidates with the cosine similarity of the mention and vocabulary text vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingScorer {
    encoder: EncoderHandle,
}

impl EmbeddingScorer {
    pub fn new(encoder: EncoderHandle) -> Self {
        EmbeddingScorer { encoder }
    }

    fn encode_exactly(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, LinkError> {
        let vectors = self.encoder.encode(texts)?;
        if vectors.len() != texts.len() {
            return Err(LinkError::WrongVectorCount {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

impl Scorer for EmbeddingScorer {
    fn name(&self) -> &str {
        "embedding"
    }

    fn score(&self, mention: &str, candidate: &Candidate) -> Result<f64, LinkError> {
        let vectors = self.encode_exactly(&[mention, &candidate.vocabulary_text])?;
        cosine_similarity(&vectors[0], &vectors[1])
    }

    /// Encodes the mention and every candidate in a single call.
    fn score_all(&self, mention: &str, candidates: &[&Candidate]) -> Result<Vec<f64>, LinkError> {
        let texts: Vec<&str> = std::iter::once(mention)
            .chain(candidates.iter().map(|c| c.vocabulary_text.as_str()))
            .collect();
        let vectors = self.encode_exactly(&texts)?;
        let (mention_vector, candidate_vectors) = vectors.split_at(1);
        candidate_vectors
            .iter()
            .map(|v| cosine_similarity(&mention_vector[0], v))
            .collect()
    }
}

/// Deterministic encoder for offline use: every lowercased alphanumeric token is hashed into one of
/// `dimensions` signed buckets and the resulting bag of tokens is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimensions: usize,
    state: RandomState,
}

impl HashingEncoder {
    pub fn new(dimensions: usize) -> Self {
        HashingEncoder {
            dimensions,
            state: RandomState::with_seeds(
                0x243f_6a88_85a3_08d3,
                0x1319_8a2e_0370_7344,
                0xa409_3822_299f_31d0,
                0x082e_fa98_ec4e_6c89,
            ),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in alphanumeric_tokens(text) {
            let hash = self.state.hash_one(&token);
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Encoder for HashingEncoder {
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if self.dimensions == 0 {
            return Err(EncoderError(String::from(
                "the hashing encoder needs at least one dimension",
            )));
        }
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

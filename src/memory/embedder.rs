//! Embedder capability.
//!
//! A deterministic, fixed-length vector per input, independent of any
//! external model. [`LexicalEmbedder`] is the fallback implementation: a
//! length-128 bag of normalized term frequencies over tokens of length >= 3.
//! A neural embedder can be swapped in by implementing [`Embedder`]; the
//! similarity math in [`super::store::SemanticMemory`] is oblivious to which
//! implementation produced the vector.

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dim(&self) -> usize;
}

const LEXICAL_DIM: usize = 128;

/// Deterministic bag-of-terms embedder requiring no external model.
pub struct LexicalEmbedder;

impl LexicalEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn hash_bucket(token: &str) -> usize {
        let mut hash: u64 = 14695981039346656037; // FNV-1a offset basis
        for b in token.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        (hash as usize) % LEXICAL_DIM
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for LexicalEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0f32; LEXICAL_DIM];
        let mut total = 0f32;
        for token in text.split(|c: char| !c.is_alphanumeric()) {
            let token = token.to_lowercase();
            if token.len() < 3 {
                continue;
            }
            buckets[Self::hash_bucket(&token)] += 1.0;
            total += 1.0;
        }
        if total > 0.0 {
            for b in &mut buckets {
                *b /= total;
            }
        }
        buckets
    }

    fn dim(&self) -> usize {
        LEXICAL_DIM
    }
}

/// Cosine similarity; undefined (zero norm on either side) yields 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

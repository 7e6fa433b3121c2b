//! Embedding functions for the structured memory back-end.

/// Dimension of the placeholder vectors.
pub const PLACEHOLDER_DIMENSION: usize = 128;

/// Maps text to a fixed-length vector used for similarity ranking.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Returns the same zero vector for every input. Similarity ranking then
/// degenerates to insertion order; swap in a real embedder to make it
/// semantic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderEmbedder;

impl Embedder for PlaceholderEmbedder {
    fn dimension(&self) -> usize {
        PLACEHOLDER_DIMENSION
    }

    fn embed(&self, _text: &str) -> Vec<f32> {
        vec![0.0; PLACEHOLDER_DIMENSION]
    }
}

/// Cosine similarity; zero when either vector has no magnitude or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub(crate) fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

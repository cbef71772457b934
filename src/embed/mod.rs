//! Deterministic text embedding.
//!
//! Production deployments would swap [`DeterministicEmbedder`] for a
//! domain-tuned encoder; this reference implementation instead hashes
//! character trigrams and whitespace-delimited words into pseudo-random
//! unit vectors and sums them, so the same text always yields the same
//! vector and overlapping vocabulary pulls two texts' vectors closer
//! together.

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Produces fixed-dimensionality embeddings for a piece of text.
pub trait Embedder: Send + Sync {
    /// Lightweight vector used for first-pass (L1) recall.
    fn embed_light(&self, text: &str) -> Vec<f32>;
    /// Dense vector reserved for a future second-pass semantic recall stage.
    fn embed_dense(&self, text: &str) -> Vec<f32>;
}

#[derive(Debug, Clone)]
pub struct DeterministicEmbedder {
    pub dim_light: usize,
    pub dim_dense: usize,
}

impl DeterministicEmbedder {
    pub fn new(dim_light: usize, dim_dense: usize) -> Self {
        Self { dim_light, dim_dense }
    }

    fn deterministic_embed(&self, text: &str, dim: usize) -> Vec<f32> {
        let mut acc = vec![0f32; dim];

        let chars: Vec<char> = text.chars().collect();
        if chars.len() >= 3 {
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                add_seeded_randn(&mut acc, fnv1a(&trigram), dim, 1.0);
            }
        }

        for word in text.split_whitespace() {
            add_seeded_randn(&mut acc, fnv1a(word), dim, 2.0);
        }

        l2_normalize(&mut acc);
        acc
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed_light(&self, text: &str) -> Vec<f32> {
        self.deterministic_embed(text, self.dim_light)
    }

    fn embed_dense(&self, text: &str) -> Vec<f32> {
        self.deterministic_embed(text, self.dim_dense)
    }
}

/// FNV-1a 64-bit hash. Stable across processes and platforms, unlike
/// language-level `hash()` builtins that are salted per run — exactly the
/// property a reproducible embedding needs.
fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Draw `dim` standard-normal samples from a seed (Box-Muller over a
/// seeded PRNG) and accumulate `weight * sample` into `acc`.
fn add_seeded_randn(acc: &mut [f32], seed: u64, dim: usize, weight: f32) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut i = 0;
    while i < dim {
        let u1: f64 = rng.random_range(f64::EPSILON..1.0);
        let u2: f64 = rng.random_range(0.0..1.0);
        let r = (-2.0 * u1.ln()).sqrt();
        let z0 = r * (std::f64::consts::TAU * u2).cos();
        acc[i] += (z0 as f32) * weight;
        i += 1;
        if i < dim {
            let z1 = r * (std::f64::consts::TAU * u2).sin();
            acc[i] += (z1 as f32) * weight;
            i += 1;
        }
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity, 0.0 for mismatched lengths, empty vectors, or either
/// operand having zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

//! Shared mathematical utilities for embedding vectors.
//!
//! All routines operate on `f32` slices and accumulate in `f64` where a sum
//! runs over many elements, so results do not depend on thread scheduling.

/// Dot product of two equal-length vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum::<f64>() as f32
}

/// Euclidean (L2) norm.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter()
        .map(|x| (*x as f64) * (*x as f64))
        .sum::<f64>()
        .sqrt() as f32
}

/// Compute cosine similarity between two vectors.
/// Returns dot(a,b) / (norm(a) * norm(b)), or 0.0 if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Element-wise vector subtraction: a - b.
pub fn vector_subtract(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// Normalize a vector to unit length. Returns zero vector if input has zero norm.
pub fn vector_normalize(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        vec![0.0; v.len()]
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

/// Compute the midpoint of two vectors: (a + b) / 2.
pub fn vector_midpoint(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b.iter()).map(|(x, y)| (x + y) * 0.5).collect()
}

/// Arithmetic mean of a set of vectors. `None` for an empty set.
pub fn mean_vector<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut acc: Vec<f64> = first.iter().map(|x| *x as f64).collect();
    let mut count = 1usize;
    for v in iter {
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += *x as f64;
        }
        count += 1;
    }
    Some(acc.into_iter().map(|a| (a / count as f64) as f32).collect())
}

/// Weighted mean of vectors. `None` when the weights sum to zero.
pub fn weighted_mean<'a, I>(pairs: I, dims: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = (&'a [f32], f32)>,
{
    let mut acc = vec![0.0f64; dims];
    let mut total = 0.0f64;
    for (v, w) in pairs {
        let w = w as f64;
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += (*x as f64) * w;
        }
        total += w;
    }
    if total <= 0.0 {
        return None;
    }
    Some(acc.into_iter().map(|a| (a / total) as f32).collect())
}

/// Numerically stable softmax of `logits / temperature`.
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let scaled: Vec<f64> = logits
        .iter()
        .map(|l| (*l as f64) / temperature as f64)
        .collect();
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scaled.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| (e / sum) as f32).collect()
}

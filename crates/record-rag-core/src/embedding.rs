//! Vector utilities for unit-norm embeddings.
//!
//! Similarity throughout the pipeline is the inner product of two unit
//! vectors, which equals their cosine similarity. [`l2_normalize`] is what
//! makes that substitution valid, so every vector entering an index passes
//! through it first.

/// Tolerance used when checking that a vector is unit length.
pub const NORM_TOLERANCE: f32 = 1e-5;

/// Encode a float vector as little-endian f32 bytes.
///
/// # Example
///
/// ```rust
/// use record_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Dot product of two vectors. Returns `0.0` for different lengths.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place.
///
/// A zero vector has no direction and is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Whether `v` has unit length within [`NORM_TOLERANCE`].
pub fn is_unit(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= NORM_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_inner_product_of_unit_vectors_is_cosine() {
        let mut a = vec![3.0, 4.0];
        let mut b = vec![4.0, 3.0];
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        assert!((inner_product(&a, &b) - 0.96).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_different_lengths() {
        assert_eq!(inner_product(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_zero_vector_untouched() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0; 4]);
        assert!(!is_unit(&v));
    }

    proptest! {
        #[test]
        fn normalized_vectors_have_unit_norm(
            v in prop::collection::vec(-1000.0f32..1000.0, 1..64)
        ) {
            prop_assume!(l2_norm(&v) > 1e-3);
            let mut v = v;
            l2_normalize(&mut v);
            prop_assert!(is_unit(&v));
        }
    }
}

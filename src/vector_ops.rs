use crate::config::Number;
use wide::f32x8;

/// Squared Euclidean distance between two vectors of equal length, eight
/// lanes at a time. Accumulates in `f32` and widens the result.
pub fn squared_euclidean_simd(a: &[Number], b: &[Number]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let len = a.len().min(b.len());
    let simd_len = len - (len % 8);
    let mut acc = f32x8::splat(0.0);

    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.reduce_add();

    // Handle remaining elements
    for i in simd_len..len {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }

    sum as f64
}

/// Full symmetric matrix of squared pairwise distances, row-major `n * n`.
pub fn pairwise_squared_distances(vectors: &[&[Number]]) -> Vec<f64> {
    use rayon::prelude::*;

    let n = vectors.len();
    let mut distances = vec![0.0; n * n];
    distances
        .par_chunks_mut(n.max(1))
        .enumerate()
        .for_each(|(i, row)| {
            for (j, slot) in row.iter_mut().enumerate() {
                if i != j {
                    *slot = squared_euclidean_simd(vectors[i], vectors[j]);
                }
            }
        });
    distances
}

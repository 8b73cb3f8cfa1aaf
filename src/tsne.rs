//! Exact t-SNE down to two dimensions.
//!
//! Affinities are computed over squared Euclidean distances with a per-point
//! binary search on the Gaussian precision, then the embedding is optimized
//! with the usual two phases: early exaggeration with low momentum, then
//! plain gradient descent with higher momentum. Every source of randomness
//! goes through one seeded `StdRng`, and all cross-row sums are taken in a
//! fixed order, so a given input and seed always yield the same embedding.

use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{Number, ReducerSettings, OUTPUT_DIMENSIONS};
use crate::error::{PipelineError, Result};
use crate::record::{Dataset, ProjectedPoint};
use crate::vector_ops::pairwise_squared_distances;

const PERPLEXITY_TOLERANCE: f64 = 1e-5;
const PERPLEXITY_STEPS: usize = 100;
const EXAGGERATION_ITERATIONS: usize = 250;
const INITIAL_MOMENTUM: f64 = 0.5;
const FINAL_MOMENTUM: f64 = 0.8;
const MIN_GAIN: f64 = 0.01;
const MIN_GRAD_NORM: f64 = 1e-7;
const MIN_LEARNING_RATE: f64 = 50.0;
const INIT_STD: f64 = 1e-4;
const PROGRESS_EVERY: usize = 50;
const EPSILON: f64 = f64::EPSILON;

pub struct TsneReducer {
    perplexity: f64,
    seed: u64,
    max_iterations: usize,
    early_exaggeration: f64,
    learning_rate: Option<f64>,
}

impl TsneReducer {
    pub fn new(settings: &ReducerSettings) -> Self {
        Self {
            perplexity: settings.neighborhood_size,
            seed: settings.random_seed,
            max_iterations: settings.max_iterations,
            early_exaggeration: settings.early_exaggeration,
            learning_rate: settings.learning_rate,
        }
    }

    /// Smallest sample count the configured perplexity can work with.
    pub fn required_samples(&self) -> usize {
        self.perplexity.floor() as usize + 1
    }

    /// Fails with [`PipelineError::InsufficientData`] unless there are more
    /// samples than the perplexity.
    pub fn check_sample_count(&self, found: usize) -> Result<()> {
        let required = self.required_samples().max(2);
        if found < required {
            return Err(PipelineError::InsufficientData { found, required });
        }
        Ok(())
    }

    pub fn project(&self, dataset: &Dataset) -> Result<Vec<ProjectedPoint>> {
        let coordinates = self.reduce(&dataset.vectors())?;
        Ok(coordinates
            .into_iter()
            .zip(dataset.records())
            .map(|([x, y], record)| ProjectedPoint {
                x,
                y,
                scalar_attribute: record.scalar_attribute,
            })
            .collect())
    }

    /// One 2D coordinate per input vector, in input order.
    pub fn reduce(&self, vectors: &[&[Number]]) -> Result<Vec<[f64; 2]>> {
        let n = vectors.len();
        self.check_sample_count(n)?;

        debug!("Computing pairwise distances for {} samples", n);
        let distances = pairwise_squared_distances(vectors);
        if distances.iter().all(|&d| d == 0.0) {
            return Err(PipelineError::DegenerateVectors);
        }

        let p = joint_probabilities(&distances, n, self.perplexity);
        let learning_rate = self
            .learning_rate
            .unwrap_or_else(|| (n as f64 / self.early_exaggeration / 4.0).max(MIN_LEARNING_RATE));
        info!(
            "Running t-SNE on {} samples (perplexity {}, learning rate {:.1}, {} iterations)",
            n, self.perplexity, learning_rate, self.max_iterations
        );

        let mut embedding = self.initial_embedding(n);
        let mut optimizer = Optimizer::new(n, learning_rate);

        let exaggerated = self.max_iterations.min(EXAGGERATION_ITERATIONS);
        optimizer.run(
            &p,
            &mut embedding,
            0..exaggerated,
            self.early_exaggeration,
            INITIAL_MOMENTUM,
        );
        optimizer.reset();
        optimizer.run(
            &p,
            &mut embedding,
            exaggerated..self.max_iterations,
            1.0,
            FINAL_MOMENTUM,
        );

        Ok(embedding
            .chunks_exact(OUTPUT_DIMENSIONS)
            .map(|c| [c[0], c[1]])
            .collect())
    }

    fn initial_embedding(&self, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        // INIT_STD is a positive constant, so the distribution is always valid.
        let normal = Normal::new(0.0, INIT_STD).unwrap();
        normal
            .sample_iter(&mut rng)
            .take(n * OUTPUT_DIMENSIONS)
            .collect()
    }
}

/// Conditional probabilities `p(j|i)`, each row calibrated so that its
/// entropy matches `ln(perplexity)`. Row-major `n * n`, zero diagonal.
fn conditional_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let desired_entropy = perplexity.ln();
    let mut conditional = vec![0.0; n * n];

    conditional
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            let dist = &distances[i * n..(i + 1) * n];
            let mut beta = 1.0;
            let mut beta_min = f64::NEG_INFINITY;
            let mut beta_max = f64::INFINITY;

            for _ in 0..PERPLEXITY_STEPS {
                let mut sum_p = 0.0;
                for (j, p) in row.iter_mut().enumerate() {
                    *p = if j == i { 0.0 } else { (-dist[j] * beta).exp() };
                    sum_p += *p;
                }
                if sum_p == 0.0 {
                    sum_p = EPSILON;
                }

                let mut weighted = 0.0;
                for (j, p) in row.iter_mut().enumerate() {
                    *p /= sum_p;
                    weighted += dist[j] * *p;
                }

                let entropy = sum_p.ln() + beta * weighted;
                let diff = entropy - desired_entropy;
                if diff.abs() <= PERPLEXITY_TOLERANCE {
                    break;
                }

                if diff > 0.0 {
                    beta_min = beta;
                    beta = if beta_max == f64::INFINITY {
                        beta * 2.0
                    } else {
                        (beta + beta_max) / 2.0
                    };
                } else {
                    beta_max = beta;
                    beta = if beta_min == f64::NEG_INFINITY {
                        beta / 2.0
                    } else {
                        (beta + beta_min) / 2.0
                    };
                }
            }
        });

    conditional
}

/// Symmetric joint probabilities, normalized to sum to one.
fn joint_probabilities(distances: &[f64], n: usize, perplexity: f64) -> Vec<f64> {
    let conditional = conditional_probabilities(distances, n, perplexity);

    let mut joint = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            joint[i * n + j] = conditional[i * n + j] + conditional[j * n + i];
        }
    }

    let total = joint.iter().sum::<f64>().max(EPSILON);
    for (k, p) in joint.iter_mut().enumerate() {
        *p = if k % (n + 1) == 0 {
            0.0
        } else {
            (*p / total).max(1e-12)
        };
    }
    joint
}

/// Gradient descent state: step sizes and per-parameter gains.
struct Optimizer {
    n: usize,
    learning_rate: f64,
    update: Vec<f64>,
    gains: Vec<f64>,
    gradient: Vec<f64>,
    kernel: Vec<f64>,
}

impl Optimizer {
    fn new(n: usize, learning_rate: f64) -> Self {
        let params = n * OUTPUT_DIMENSIONS;
        Self {
            n,
            learning_rate,
            update: vec![0.0; params],
            gains: vec![1.0; params],
            gradient: vec![0.0; params],
            kernel: vec![0.0; n * n],
        }
    }

    fn reset(&mut self) {
        self.update.iter_mut().for_each(|u| *u = 0.0);
        self.gains.iter_mut().for_each(|g| *g = 1.0);
    }

    fn run(
        &mut self,
        p: &[f64],
        embedding: &mut [f64],
        iterations: std::ops::Range<usize>,
        exaggeration: f64,
        momentum: f64,
    ) {
        for iteration in iterations {
            let report = (iteration + 1) % PROGRESS_EVERY == 0;
            let kl = self.compute_gradient(p, embedding, exaggeration, report);

            for k in 0..embedding.len() {
                let grad = self.gradient[k];
                if self.update[k] * grad < 0.0 {
                    self.gains[k] += 0.2;
                } else {
                    self.gains[k] *= 0.8;
                }
                self.gains[k] = self.gains[k].max(MIN_GAIN);
                self.update[k] = momentum * self.update[k] - self.learning_rate * self.gains[k] * grad;
                embedding[k] += self.update[k];
            }

            let grad_norm = self.gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            if let Some(kl) = kl {
                debug!(
                    "Iteration {}: KL divergence {:.4}, gradient norm {:.7}",
                    iteration + 1,
                    kl,
                    grad_norm
                );
            }
            if grad_norm < MIN_GRAD_NORM {
                debug!("Iteration {}: gradient norm below threshold, stopping", iteration + 1);
                break;
            }
        }
    }

    /// Fills `self.gradient` for the current embedding; returns the KL
    /// divergence when `with_error` is set.
    fn compute_gradient(&mut self, p: &[f64], y: &[f64], exaggeration: f64, with_error: bool) -> Option<f64> {
        let n = self.n;

        self.kernel
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, row)| {
                for (j, k) in row.iter_mut().enumerate() {
                    *k = if i == j {
                        0.0
                    } else {
                        let dx = y[2 * i] - y[2 * j];
                        let dy = y[2 * i + 1] - y[2 * j + 1];
                        1.0 / (1.0 + dx * dx + dy * dy)
                    };
                }
            });

        let row_sums: Vec<f64> = self
            .kernel
            .par_chunks(n)
            .map(|row| row.iter().sum::<f64>())
            .collect();
        let z = row_sums.iter().sum::<f64>().max(EPSILON);

        let kernel = &self.kernel;
        self.gradient
            .par_chunks_mut(OUTPUT_DIMENSIONS)
            .enumerate()
            .for_each(|(i, g)| {
                let mut gx = 0.0;
                let mut gy = 0.0;
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let w = kernel[i * n + j];
                    let q = (w / z).max(EPSILON);
                    let mult = (exaggeration * p[i * n + j] - q) * w;
                    gx += mult * (y[2 * i] - y[2 * j]);
                    gy += mult * (y[2 * i + 1] - y[2 * j + 1]);
                }
                g[0] = 4.0 * gx;
                g[1] = 4.0 * gy;
            });

        if !with_error {
            return None;
        }
        let row_kl: Vec<f64> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| {
                        let pij = exaggeration * p[i * n + j];
                        let q = (kernel[i * n + j] / z).max(EPSILON);
                        pij * (pij.max(EPSILON) / q).ln()
                    })
                    .sum::<f64>()
            })
            .collect();
        Some(row_kl.iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(perplexity: f64, iterations: usize, seed: u64) -> ReducerSettings {
        ReducerSettings {
            neighborhood_size: perplexity,
            random_seed: seed,
            max_iterations: iterations,
            early_exaggeration: 12.0,
            learning_rate: None,
        }
    }

    fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
            .collect()
    }

    fn as_rows(vectors: &[Vec<f32>]) -> Vec<&[f32]> {
        vectors.iter().map(|v| v.as_slice()).collect()
    }

    #[test]
    fn output_has_one_finite_point_per_input() {
        let data = random_vectors(40, 16, 1);
        let reducer = TsneReducer::new(&settings(10.0, 200, 42));
        let out = reducer.reduce(&as_rows(&data)).unwrap();
        assert_eq!(out.len(), 40);
        assert!(out.iter().all(|[x, y]| x.is_finite() && y.is_finite()));
    }

    #[test]
    fn same_seed_same_embedding() {
        let data = random_vectors(35, 8, 3);
        let reducer = TsneReducer::new(&settings(5.0, 150, 42));
        let first = reducer.reduce(&as_rows(&data)).unwrap();
        let second = reducer.reduce(&as_rows(&data)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_seed_changes_embedding() {
        let data = random_vectors(35, 8, 3);
        let a = TsneReducer::new(&settings(5.0, 100, 1)).reduce(&as_rows(&data)).unwrap();
        let b = TsneReducer::new(&settings(5.0, 100, 2)).reduce(&as_rows(&data)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn separated_clusters_stay_separated() {
        let mut rng = StdRng::seed_from_u64(9);
        let noise = Normal::new(0.0f32, 0.05).unwrap();
        let mut data = Vec::new();
        for center in [-5.0f32, 5.0] {
            for _ in 0..20 {
                data.push((0..10).map(|_| center + noise.sample(&mut rng)).collect::<Vec<_>>());
            }
        }

        let out = TsneReducer::new(&settings(5.0, 500, 42)).reduce(&as_rows(&data)).unwrap();
        let dist = |a: [f64; 2], b: [f64; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        let centroid = |pts: &[[f64; 2]]| {
            let n = pts.len() as f64;
            [
                pts.iter().map(|p| p[0]).sum::<f64>() / n,
                pts.iter().map(|p| p[1]).sum::<f64>() / n,
            ]
        };
        let (left, right) = out.split_at(20);
        let (cl, cr) = (centroid(left), centroid(right));
        let spread = left
            .iter()
            .map(|&p| dist(p, cl))
            .chain(right.iter().map(|&p| dist(p, cr)))
            .fold(0.0, f64::max);
        assert!(dist(cl, cr) > spread, "centroids {:?} {:?}, spread {}", cl, cr, spread);
    }

    #[test]
    fn too_few_samples_is_insufficient_data() {
        let data = random_vectors(30, 4, 5);
        let reducer = TsneReducer::new(&settings(30.0, 10, 42));
        match reducer.reduce(&as_rows(&data)) {
            Err(PipelineError::InsufficientData { found, required }) => {
                assert_eq!(found, 30);
                assert_eq!(required, 31);
            }
            other => panic!("expected insufficient data, got {:?}", other),
        }
        assert!(matches!(
            reducer.reduce(&[]),
            Err(PipelineError::InsufficientData { found: 0, .. })
        ));
    }

    #[test]
    fn identical_vectors_are_degenerate() {
        let data = vec![vec![0.5f32; 6]; 12];
        let reducer = TsneReducer::new(&settings(3.0, 10, 42));
        assert!(matches!(
            reducer.reduce(&as_rows(&data)),
            Err(PipelineError::DegenerateVectors)
        ));
    }

    #[test]
    fn conditional_rows_hit_target_perplexity() {
        let data = random_vectors(25, 5, 11);
        let rows = as_rows(&data);
        let distances = pairwise_squared_distances(&rows);
        let perplexity = 6.0;
        let conditional = conditional_probabilities(&distances, 25, perplexity);
        for row in conditional.chunks(25) {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            let entropy: f64 = row.iter().filter(|&&p| p > 0.0).map(|&p| -p * p.ln()).sum();
            assert!((entropy.exp() - perplexity).abs() < 1e-2, "perplexity {}", entropy.exp());
        }
    }

    #[test]
    fn joint_probabilities_are_symmetric_and_normalized() {
        let data = random_vectors(15, 3, 2);
        let distances = pairwise_squared_distances(&as_rows(&data));
        let p = joint_probabilities(&distances, 15, 4.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        for i in 0..15 {
            assert_eq!(p[i * 15 + i], 0.0);
            for j in 0..15 {
                assert!((p[i * 15 + j] - p[j * 15 + i]).abs() < 1e-15);
            }
        }
    }
}

//! RANSAC with an adaptive iteration bound and local optimization.
//!
//! Every iteration draws a minimal sample of `E::MIN_SAMPLES` data points, asks the estimator
//! for candidate models, and counts how many data points each candidate explains within the
//! inlier threshold. Whenever a candidate beats the best model so far, the number of iterations
//! needed to have drawn at least one all-inlier sample with the configured confidence is
//! recomputed:
//!
//! ```text
//! k = log(1 - confidence) / log(1 - w^s)
//! ```
//!
//! where `w` is the inlier ratio of the best model and `s` is the sample size. The search stops
//! after `min(k, max_iterations)` iterations.
//!
//! With local optimization enabled, each new best model is refit on all of its inliers and the
//! refit replaces it while it keeps growing the inlier set. The estimator must therefore accept
//! more than `MIN_SAMPLES` data points, which least squares estimators usually do.

use log::*;
use rand::{seq::index, RngCore};
use sample_consensus::{Consensus, Estimator, Model};

/// Refits stop after this many rounds even if the inlier set keeps changing.
const MAX_LOCAL_OPTIMIZATION_ROUNDS: usize = 8;

#[derive(Debug, Clone)]
pub struct Ransac<R> {
    inlier_threshold: f64,
    confidence: f64,
    max_iterations: usize,
    minimum_inliers: usize,
    local_optimization: bool,
    rng: R,
    iterations: usize,
}

impl<R> Ransac<R>
where
    R: RngCore,
{
    /// `inlier_threshold` is the largest residual a data point may have to count as an inlier.
    ///
    /// Defaults to a confidence of `0.99`, at most `10_000` iterations, and local optimization.
    pub fn new(inlier_threshold: f64, rng: R) -> Self {
        Self {
            inlier_threshold,
            confidence: 0.99,
            max_iterations: 10_000,
            minimum_inliers: 0,
            local_optimization: true,
            rng,
            iterations: 0,
        }
    }

    /// The probability that at least one all-inlier sample was drawn when the search stops.
    pub fn confidence(self, confidence: f64) -> Self {
        Self { confidence, ..self }
    }

    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Models with fewer inliers than this are never returned.
    pub fn minimum_inliers(self, minimum_inliers: usize) -> Self {
        Self {
            minimum_inliers,
            ..self
        }
    }

    pub fn local_optimization(self, local_optimization: bool) -> Self {
        Self {
            local_optimization,
            ..self
        }
    }

    /// The number of iterations the last search ran for.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// The number of samples needed so that, with `inlier_ratio` inliers, one of them is
    /// all inliers with the configured confidence. Capped at the maximum iteration count.
    pub fn required_iterations(&self, inlier_ratio: f64, sample_size: usize) -> usize {
        let all_inliers = inlier_ratio.powi(sample_size as i32);
        if all_inliers >= 1.0 {
            return 1.min(self.max_iterations);
        }
        if all_inliers <= 0.0 {
            return self.max_iterations;
        }
        let required = (1.0 - self.confidence).ln() / (1.0 - all_inliers).ln();
        if required.is_finite() && required >= 0.0 {
            (required.ceil() as usize).min(self.max_iterations)
        } else {
            self.max_iterations
        }
    }

    fn inliers<M, Data>(&self, model: &M, data: &[Data]) -> Vec<usize>
    where
        M: Model<Data>,
    {
        data.iter()
            .enumerate()
            .filter(|(_, datum)| model.residual(datum) <= self.inlier_threshold)
            .map(|(ix, _)| ix)
            .collect()
    }

    /// Repeatedly refits the model on its own inliers while that grows the inlier set.
    fn optimize<E, Data>(
        &self,
        estimator: &E,
        data: &[Data],
        mut model: E::Model,
        mut inliers: Vec<usize>,
    ) -> (E::Model, Vec<usize>)
    where
        E: Estimator<Data>,
        Data: Clone,
    {
        for round in 0..MAX_LOCAL_OPTIMIZATION_ROUNDS {
            let refits = estimator.estimate(inliers.iter().map(|&ix| data[ix].clone()));
            let best_refit = refits
                .into_iter()
                .map(|refit| {
                    let refit_inliers = self.inliers(&refit, data);
                    (refit, refit_inliers)
                })
                .max_by_key(|(_, refit_inliers)| refit_inliers.len());
            match best_refit {
                Some((refit, refit_inliers)) if refit_inliers.len() > inliers.len() => {
                    trace!(
                        "local optimization round {} grew inliers from {} to {}",
                        round,
                        inliers.len(),
                        refit_inliers.len()
                    );
                    model = refit;
                    inliers = refit_inliers;
                }
                Some((refit, refit_inliers)) if refit_inliers.len() == inliers.len() => {
                    // Same support, but the least squares fit is the better model.
                    return (refit, refit_inliers);
                }
                _ => break,
            }
        }
        (model, inliers)
    }
}

impl<E, R, Data> Consensus<E, Data> for Ransac<R>
where
    E: Estimator<Data>,
    R: RngCore,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        self.iterations = 0;
        if data.len() < E::MIN_SAMPLES {
            debug!(
                "only {} data points, but the estimator needs {}",
                data.len(),
                E::MIN_SAMPLES
            );
            return None;
        }

        let mut best: Option<(E::Model, Vec<usize>)> = None;
        let mut bound = self.max_iterations;
        while self.iterations < bound {
            self.iterations += 1;
            let sample = index::sample(&mut self.rng, data.len(), E::MIN_SAMPLES).into_vec();
            let candidates = estimator.estimate(sample.iter().map(|&ix| data[ix].clone()));
            for candidate in candidates {
                let inliers = self.inliers(&candidate, &data);
                let best_len = best.as_ref().map(|(_, inliers)| inliers.len()).unwrap_or(0);
                if inliers.len() <= best_len || inliers.len() < E::MIN_SAMPLES {
                    continue;
                }
                let (model, inliers) = if self.local_optimization {
                    self.optimize(estimator, &data, candidate, inliers)
                } else {
                    (candidate, inliers)
                };
                let ratio = inliers.len() as f64 / data.len() as f64;
                bound = self.required_iterations(ratio, E::MIN_SAMPLES);
                debug!(
                    "iteration {}: new best model with {} inliers ({:.2}%), iteration bound {}",
                    self.iterations,
                    inliers.len(),
                    ratio * 100.0,
                    bound
                );
                best = Some((model, inliers));
            }
        }

        best.filter(|(_, inliers)| inliers.len() >= self.minimum_inliers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn ransac() -> Ransac<StepRng> {
        Ransac::new(1.0, StepRng::new(0, 1))
            .confidence(0.99)
            .max_iterations(500)
    }

    #[test]
    fn clean_data_needs_one_sample() {
        assert_eq!(ransac().required_iterations(1.0, 8), 1);
    }

    #[test]
    fn textbook_iteration_counts() {
        // 50% inliers, 8 point samples: log(0.01) / log(1 - 0.5^8) = 1177.
        assert_eq!(ransac().max_iterations(100_000).required_iterations(0.5, 8), 1177);
        // 90% inliers: log(0.01) / log(1 - 0.9^8) = 8.18.
        assert_eq!(ransac().required_iterations(0.9, 8), 9);
    }

    #[test]
    fn bound_is_capped() {
        assert_eq!(ransac().required_iterations(0.1, 8), 500);
        assert_eq!(ransac().required_iterations(0.0, 8), 500);
    }
}

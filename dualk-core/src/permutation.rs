/// Permutation robustness of a rating hierarchy.
///
/// Each trial re-rates a uniformly shuffled ordering of the same interactions
/// (nothing duplicated or dropped). Trials are independent: they run in
/// parallel, each with its own RNG, and are reduced in trial order so the
/// summary only depends on the base seed.
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::constants::PERMUTATION_BATCH_SIZE;
use crate::elo::DualKElo;
use crate::error::{EloError, Result};
use crate::types::{Dataset, RatingState};

/// Per-individual variability across successful trials.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualStability {
    pub index: usize,
    pub mean_rating: f64,
    /// Sample standard deviation; 0 with a single trial.
    pub rating_sd: f64,
    pub mean_rank: f64,
    pub rank_sd: f64,
    pub min_rank: usize,
    pub max_rank: usize,
    /// Rank in the unpermuted pass.
    pub baseline_rank: usize,
    /// Fraction of trials whose rank equals `baseline_rank`.
    pub rank_stability: f64,
}

/// Compact record of one trial, kept for detailed reports.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrialRecord {
    pub trial: usize,
    pub seed: u64,
    /// Highest-rated individual in this trial.
    pub leader: usize,
    /// Spearman correlation between this trial's ranks and the baseline
    /// ranks. `None` when either ranking is constant.
    pub rank_correlation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermutationSummary {
    pub k2: f64,
    pub base_seed: u64,
    pub requested_trials: usize,
    pub successful_trials: usize,
    pub failed_trials: Vec<usize>,
    /// Indexed like the dataset's individuals.
    pub individuals: Vec<IndividualStability>,
    pub trials: Vec<TrialRecord>,
    pub mean_rank_correlation: Option<f64>,
}

/// Seed for trial `trial`, derived from the run's base seed.
pub fn trial_seed(base_seed: u64, trial: usize) -> u64 {
    base_seed.wrapping_add((trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

pub struct PermutationValidator<'a> {
    elo: &'a DualKElo,
    dataset: &'a Dataset,
}

impl<'a> PermutationValidator<'a> {
    pub fn new(elo: &'a DualKElo, dataset: &'a Dataset) -> Self {
        PermutationValidator { elo, dataset }
    }

    /// Run one shuffled pass.
    pub fn run_trial(&self, k2: f64, seed: u64) -> Result<RatingState> {
        let mut order: Vec<usize> = (0..self.dataset.num_interactions()).collect();
        let mut rng = SmallRng::seed_from_u64(seed);
        order.shuffle(&mut rng);

        let pass = self.elo.run_ordered(
            self.dataset.num_individuals(),
            self.dataset.interactions(),
            &order,
            k2,
        )?;
        Ok(pass.state)
    }

    /// Run `n_random` trials at scale `k2` and reduce them against the
    /// unpermuted `baseline`.
    pub fn validate(
        &self,
        k2: f64,
        n_random: usize,
        base_seed: u64,
        baseline: &RatingState,
    ) -> Result<PermutationSummary> {
        if n_random == 0 {
            return Err(EloError::invalid("n-random", "must be at least 1"));
        }
        let n = self.dataset.num_individuals();
        if baseline.len() != n {
            return Err(EloError::invalid(
                "baseline",
                format!("has {} individuals, dataset has {n}", baseline.len()),
            ));
        }

        info!(n_random, k2, base_seed, "running permutation trials");
        self.validate_in_batches(k2, n_random, base_seed, baseline, PERMUTATION_BATCH_SIZE)
    }

    /// Trials run in parallel one batch at a time; each batch is reduced in
    /// trial order and dropped before the next one starts.
    fn validate_in_batches(
        &self,
        k2: f64,
        n_random: usize,
        base_seed: u64,
        baseline: &RatingState,
        batch_size: usize,
    ) -> Result<PermutationSummary> {
        let mut reducer = TrialReducer::new(baseline, n_random);
        let batch_size = batch_size.max(1);

        for batch_start in (0..n_random).step_by(batch_size) {
            let batch_end = (batch_start + batch_size).min(n_random);
            let outcomes: Vec<Result<RatingState>> = (batch_start..batch_end)
                .into_par_iter()
                .map(|trial| self.run_trial(k2, trial_seed(base_seed, trial)))
                .collect();
            for (offset, outcome) in outcomes.into_iter().enumerate() {
                let trial = batch_start + offset;
                reducer.absorb(trial, trial_seed(base_seed, trial), outcome);
            }
        }

        reducer.finish(k2, base_seed)
    }
}

/// Running reduction of trial outcomes against the baseline ranking.
struct TrialReducer {
    baseline_ranks: Vec<usize>,
    requested: usize,
    rating_stats: Vec<RunningStats>,
    rank_stats: Vec<RunningStats>,
    rank_range: Vec<(usize, usize)>,
    rank_matches: Vec<usize>,
    trials: Vec<TrialRecord>,
    failed_trials: Vec<usize>,
    correlation: RunningStats,
}

impl TrialReducer {
    fn new(baseline: &RatingState, requested: usize) -> Self {
        let n = baseline.len();
        TrialReducer {
            baseline_ranks: baseline.ranks(),
            requested,
            rating_stats: vec![RunningStats::default(); n],
            rank_stats: vec![RunningStats::default(); n],
            rank_range: vec![(usize::MAX, 0); n],
            rank_matches: vec![0; n],
            trials: Vec::with_capacity(requested),
            failed_trials: Vec::new(),
            correlation: RunningStats::default(),
        }
    }

    fn absorb(&mut self, trial: usize, seed: u64, outcome: Result<RatingState>) {
        let state = match outcome {
            Ok(state) => state,
            Err(e) => {
                warn!(trial, error = %e, "permutation trial failed; excluded from summary");
                self.failed_trials.push(trial);
                return;
            }
        };

        let ranks = state.ranks();
        for (i, &rank) in ranks.iter().enumerate() {
            self.rating_stats[i].push(state.ratings[i]);
            self.rank_stats[i].push(rank as f64);
            self.rank_range[i].0 = self.rank_range[i].0.min(rank);
            self.rank_range[i].1 = self.rank_range[i].1.max(rank);
            if rank == self.baseline_ranks[i] {
                self.rank_matches[i] += 1;
            }
        }

        let rank_correlation = spearman(&ranks, &self.baseline_ranks);
        if let Some(rho) = rank_correlation {
            self.correlation.push(rho);
        }
        let leader = state.order_by_rating().first().copied().unwrap_or(0);
        debug!(trial, leader, ?rank_correlation, "trial complete");

        self.trials.push(TrialRecord {
            trial,
            seed,
            leader,
            rank_correlation,
        });
    }

    fn finish(self, k2: f64, base_seed: u64) -> Result<PermutationSummary> {
        let successful_trials = self.trials.len();
        if successful_trials == 0 {
            return Err(EloError::AllUnitsFailed {
                stage: "permutation",
                failed: self.failed_trials.len(),
            });
        }

        let individuals = (0..self.baseline_ranks.len())
            .map(|i| IndividualStability {
                index: i,
                mean_rating: self.rating_stats[i].mean(),
                rating_sd: self.rating_stats[i].sample_sd(),
                mean_rank: self.rank_stats[i].mean(),
                rank_sd: self.rank_stats[i].sample_sd(),
                min_rank: self.rank_range[i].0,
                max_rank: self.rank_range[i].1,
                baseline_rank: self.baseline_ranks[i],
                rank_stability: self.rank_matches[i] as f64 / successful_trials as f64,
            })
            .collect();

        info!(
            successful = successful_trials,
            failed = self.failed_trials.len(),
            "permutation trials reduced"
        );

        Ok(PermutationSummary {
            k2,
            base_seed,
            requested_trials: self.requested,
            successful_trials,
            failed_trials: self.failed_trials,
            individuals,
            trials: self.trials,
            mean_rank_correlation: (self.correlation.count > 0).then(|| self.correlation.mean()),
        })
    }
}

/// Welford's online mean and variance.
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    fn sample_sd(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// Spearman correlation of two rank vectors (Pearson on the ranks, so tied
/// ranks are handled).
fn spearman(a: &[usize], b: &[usize]) -> Option<f64> {
    let n = a.len();
    if n < 2 {
        return None;
    }
    let mean = |v: &[usize]| v.iter().sum::<usize>() as f64 / n as f64;
    let (ma, mb) = (mean(a), mean(b));

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x as f64 - ma;
        let dy = y as f64 - mb;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a == 0.0 || var_b == 0.0 {
        None
    } else {
        Some(cov / (var_a * var_b).sqrt())
    }
}

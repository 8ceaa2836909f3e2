/// Rating engine orchestrator.
///
/// One immutable configuration, one dataset, one report. Stages run in a
/// fixed order: baseline pass, k2 search, final pass at the chosen k2,
/// permutation trials, hierarchy analysis.
use rand::Rng;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_INITIAL_LOG_K2, DEFAULT_K1_FLOOR, DEFAULT_K_BASE, DEFAULT_N_RANDOM, DEFAULT_TOP_N,
    INITIAL_ELO_RATING, TOP_N_MAX, TOP_N_MIN,
};
use crate::elo::DualKElo;
use crate::error::{EloError, Result};
use crate::hierarchy::{DominanceMatrix, HierarchyAnalyzer, HierarchyMetrics};
use crate::optimizer::{checked_loss, KOptimizer, OptimizationResult};
use crate::permutation::{PermutationSummary, PermutationValidator};
use crate::types::{Dataset, OptimizationLevel, RatingState};

/// Configuration for one engine run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub optimization_level: OptimizationLevel,
    /// Seed for the global scale, in natural-log space.
    pub initial_log_k2: f64,
    /// Number of permutation trials.
    pub n_random: usize,
    /// Size of the subset used for triad analysis.
    pub top_n: usize,
    /// Base seed for permutation trials. `None` draws one at random.
    pub seed: Option<u64>,
    pub k_base: f64,
    pub k1_floor: f64,
    pub initial_rating: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            optimization_level: OptimizationLevel::None,
            initial_log_k2: DEFAULT_INITIAL_LOG_K2,
            n_random: DEFAULT_N_RANDOM,
            top_n: DEFAULT_TOP_N,
            seed: None,
            k_base: DEFAULT_K_BASE,
            k1_floor: DEFAULT_K1_FLOOR,
            initial_rating: INITIAL_ELO_RATING,
        }
    }
}

impl EngineConfig {
    /// Reject parameters that make the run meaningless. Called before any
    /// computation starts.
    pub fn validate(&self) -> Result<()> {
        if !self.initial_log_k2.is_finite() {
            return Err(EloError::invalid("initial-k2", "must be a finite number"));
        }
        if self.n_random < 1 {
            return Err(EloError::invalid("n-random", "must be at least 1"));
        }
        if !(TOP_N_MIN..=TOP_N_MAX).contains(&self.top_n) {
            return Err(EloError::invalid(
                "top-n",
                format!("must be between {TOP_N_MIN} and {TOP_N_MAX}, got {}", self.top_n),
            ));
        }
        if !self.k_base.is_finite() || self.k_base <= 0.0 {
            return Err(EloError::invalid("k-base", "must be a positive finite number"));
        }
        if !self.k1_floor.is_finite() || self.k1_floor < 0.0 {
            return Err(EloError::invalid("k1-floor", "must be a non-negative finite number"));
        }
        if !self.initial_rating.is_finite() {
            return Err(EloError::invalid("initial-rating", "must be a finite number"));
        }
        Ok(())
    }
}

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RankedIndividual {
    pub rank: usize,
    pub id: String,
    pub rating: f64,
    pub wins: usize,
    pub losses: usize,
}

/// Everything a run produced. Read-only once returned.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineReport {
    pub config: EngineConfig,
    /// Sorted individual IDs; every index in the report refers to this list.
    pub individuals: Vec<String>,
    pub num_interactions: usize,
    pub dominance: DominanceMatrix,
    /// Ratings at the seed k2, before optimization. `None` when the seed
    /// pass failed and the search recovered from it.
    pub seed_state: Option<RatingState>,
    /// Ratings at the optimized k2.
    pub final_state: RatingState,
    /// Final ranking, best first.
    pub rankings: Vec<RankedIndividual>,
    pub optimization: OptimizationResult,
    pub permutation: PermutationSummary,
    pub hierarchy: HierarchyMetrics,
}

pub struct DualKEngine {
    config: EngineConfig,
    elo: DualKElo,
}

impl DualKEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let elo = DualKElo::new(config.k_base, config.k1_floor, config.initial_rating);
        Ok(DualKEngine { config, elo })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> Result<EngineReport> {
        let n = dataset.num_individuals();
        info!(
            individuals = n,
            interactions = dataset.num_interactions(),
            "starting dual-k elo run"
        );

        let (seed_state, seed_loss) = match self.elo.run(
            n,
            dataset.interactions(),
            self.config.initial_log_k2.exp(),
            None,
        ) {
            Ok(pass) => {
                let loss = checked_loss(&pass, self.config.initial_log_k2);
                (loss.is_ok().then_some(pass.state), loss)
            }
            Err(e) => (None, Err(e)),
        };
        match &seed_loss {
            Ok(loss) => debug!(loss, "baseline pass complete"),
            Err(e) => warn!(error = %e, "baseline pass failed at the seed k2"),
        }

        let optimization = KOptimizer::new(&self.elo, dataset).optimize_from(
            self.config.initial_log_k2,
            self.config.optimization_level,
            seed_loss,
        )?;

        let final_state = match &seed_state {
            Some(state) if optimization.log_k2 == self.config.initial_log_k2 => state.clone(),
            _ => {
                self.elo
                    .run(n, dataset.interactions(), optimization.k2, None)?
                    .state
            }
        };

        let base_seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
        let permutation = PermutationValidator::new(&self.elo, dataset).validate(
            optimization.k2,
            self.config.n_random,
            base_seed,
            &final_state,
        )?;

        let dominance = DominanceMatrix::from_dataset(dataset);
        let hierarchy = HierarchyAnalyzer::new(&dominance).analyze(&final_state, self.config.top_n)?;

        debug_assert_eq!(final_state.len(), n);
        debug_assert_eq!(permutation.individuals.len(), n);

        let rankings = rankings(dataset, &final_state);
        info!(
            k2 = optimization.k2,
            leader = rankings.first().map(|r| r.id.as_str()).unwrap_or(""),
            linearity = ?hierarchy.linearity_index,
            "run complete"
        );

        Ok(EngineReport {
            config: self.config.clone(),
            individuals: dataset.individuals().to_vec(),
            num_interactions: dataset.num_interactions(),
            dominance,
            seed_state,
            final_state,
            rankings,
            optimization,
            permutation,
            hierarchy,
        })
    }
}

fn rankings(dataset: &Dataset, state: &RatingState) -> Vec<RankedIndividual> {
    let ranks = state.ranks();
    let counts = dataset.win_loss_counts();
    state
        .order_by_rating()
        .into_iter()
        .map(|i| RankedIndividual {
            rank: ranks[i],
            id: dataset.id(i).to_string(),
            rating: state.ratings[i],
            wins: counts[i].0,
            losses: counts[i].1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            n_random: 20,
            top_n: 5,
            seed: Some(1),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let cases = [
            EngineConfig { top_n: 4, ..config() },
            EngineConfig { top_n: 21, ..config() },
            EngineConfig { n_random: 0, ..config() },
            EngineConfig { initial_log_k2: f64::NAN, ..config() },
            EngineConfig { k_base: 0.0, ..config() },
            EngineConfig { k1_floor: -1.0, ..config() },
        ];
        for case in cases {
            assert!(matches!(DualKEngine::new(case), Err(EloError::InvalidParameter { .. })));
        }
    }

    #[test]
    fn test_run_report_is_consistent() {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        let report = DualKEngine::new(config()).unwrap().run(&ds).unwrap();

        assert_eq!(report.individuals, vec!["A", "B", "C"]);
        assert_eq!(report.num_interactions, 4);
        assert_eq!(report.rankings.len(), 3);
        assert_eq!(report.final_state.len(), 3);
        assert_eq!(report.permutation.individuals.len(), 3);
        assert_eq!(report.hierarchy.top.len(), 3);
        assert_eq!(report.dominance.size(), 3);
        assert_eq!(report.optimization.k2, config().initial_log_k2.exp());
        // Level 0: final pass runs at the seed scale.
        assert_eq!(report.seed_state.as_ref(), Some(&report.final_state));
        assert_eq!(report.permutation.base_seed, 1);
    }

    #[test]
    fn test_global_search_recovers_from_failed_seed_pass() {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        let engine = DualKEngine::new(EngineConfig {
            optimization_level: OptimizationLevel::Global,
            initial_log_k2: 800.0,
            n_random: 4,
            ..config()
        })
        .unwrap();
        let report = engine.run(&ds).unwrap();

        assert_eq!(report.seed_state, None);
        assert_eq!(report.optimization.initial_loss, None);
        assert!(report.optimization.failed_evaluations > 0);
        assert!(report.optimization.k2.is_finite());
        assert!(report.final_state.ratings.iter().all(|r| r.is_finite()));
        assert_eq!(report.permutation.successful_trials, 4);
    }

    #[test]
    fn test_failed_seed_pass_is_fatal_at_level_zero() {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        let engine = DualKEngine::new(EngineConfig { initial_log_k2: 800.0, ..config() }).unwrap();
        assert!(matches!(engine.run(&ds), Err(EloError::NumericOverflow(_))));
    }

    #[test]
    fn test_rankings_best_first() {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        let report = DualKEngine::new(config()).unwrap().run(&ds).unwrap();
        let ratings: Vec<f64> = report.rankings.iter().map(|r| r.rating).collect();
        for pair in ratings.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        let a = report.rankings.iter().find(|r| r.id == "A").unwrap();
        assert_eq!((a.wins, a.losses), (2, 1));
    }
}

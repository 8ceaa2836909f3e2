/// dualk-core: Dual-K Elo dominance-rating engine.
///
/// Ordered win/loss interactions → sequential Elo ratings with two
/// interacting learning rates → tuned global scale, permutation robustness
/// and triad linearity. No terminal IO; the CLI formats the report.
///
/// Individuals are identified by caller-provided string IDs. The crate sorts
/// them and uses their position as the index in every rating vector.
///
/// # Quick start
///
/// ```rust
/// use dualk_core::{Dataset, DualKEngine, EngineConfig, OptimizationLevel};
///
/// let dataset = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
///
/// let engine = DualKEngine::new(EngineConfig {
///     optimization_level: OptimizationLevel::Local,
///     n_random: 50,
///     top_n: 5,
///     seed: Some(7),
///     ..EngineConfig::default()
/// })
/// .unwrap();
///
/// let report = engine.run(&dataset).unwrap();
/// for r in &report.rankings {
///     println!("{} {}: {:.1}", r.rank, r.id, r.rating);
/// }
/// ```

pub mod constants;
pub mod elo;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod loader;
pub mod optimizer;
pub mod permutation;
pub mod types;

// Re-export primary public API at crate root.
pub use elo::{expected_score, DualKElo, EloPass};
pub use engine::{DualKEngine, EngineConfig, EngineReport, RankedIndividual};
pub use error::{EloError, Result};
pub use hierarchy::{DominanceMatrix, HierarchyAnalyzer, HierarchyMetrics, TriadClass, TriadResult};
pub use loader::{load_interactions, parse_interactions};
pub use optimizer::{KOptimizer, OptimizationResult, SearchPhase, SearchStatus, TrajectoryPoint};
pub use permutation::{IndividualStability, PermutationSummary, PermutationValidator, TrialRecord};
pub use types::{Dataset, Interaction, OptimizationLevel, RatingState};

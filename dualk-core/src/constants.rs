/// Rating every individual starts from before its first interaction.
pub const INITIAL_ELO_RATING: f64 = 1000.0;

/// Logistic scale of the expected-outcome model: a 400-point gap means 10:1 odds.
pub const ELO_SCALE: f64 = 400.0;

/// Numerator of the adaptive term: k1(i) = K_BASE / (1 + matches_played(i)).
pub const DEFAULT_K_BASE: f64 = 1.0;

/// Lower bound the adaptive term decays towards. Zero keeps the plain
/// reciprocal decay.
pub const DEFAULT_K1_FLOOR: f64 = 0.0;

/// Default seed for the global scale, in natural-log space (ln 200).
pub const DEFAULT_INITIAL_LOG_K2: f64 = 5.298317366548036;

pub const DEFAULT_N_RANDOM: usize = 100;
pub const DEFAULT_TOP_N: usize = 10;

/// Bounds on the top-n subset. Triad enumeration is C(n, 3), so the upper
/// bound caps worst-case work at 1140 triads.
pub const TOP_N_MIN: usize = 5;
pub const TOP_N_MAX: usize = 20;

/// Search domain for log(k2). Seeds outside it widen the domain to include them.
pub const LOG_K2_MIN: f64 = 0.0;
pub const LOG_K2_MAX: f64 = 10.0;

/// Pattern search (level 1): initial step in log space, number of stencil
/// points on each side of the center, iteration budget, and the step size at
/// which the search is considered converged.
pub const LOCAL_INITIAL_STEP: f64 = 0.5;
pub const LOCAL_STENCIL_HALF_WIDTH: usize = 4;
pub const LOCAL_MAX_ITERATIONS: usize = 40;
pub const LOCAL_STEP_TOLERANCE: f64 = 1e-4;

/// Global search (level 2): coarse grid resolution and how many grid local
/// minima are refined in addition to the seed.
pub const GLOBAL_GRID_POINTS: usize = 41;
pub const GLOBAL_MAX_STARTS: usize = 4;

/// Two losses closer than this are a tie, resolved in favor of the candidate
/// nearest the seed.
pub const LOSS_TIE_EPSILON: f64 = 1e-12;

/// Floor applied to expected probabilities inside the log-likelihood so a
/// confident wrong prediction costs a large but finite penalty.
pub const MIN_EXPECTED_PROBABILITY: f64 = 1e-300;

/// Permutation trials held in memory at once before being reduced.
pub const PERMUTATION_BATCH_SIZE: usize = 64;

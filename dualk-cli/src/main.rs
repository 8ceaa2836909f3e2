mod config;
mod logger;
mod output;

use clap::Parser;
use dualk_core::{load_interactions, DualKEngine, EngineConfig, OptimizationLevel};
use std::path::PathBuf;
use tracing::info;

pub fn bail(msg: impl std::fmt::Display) -> ! {
    eprintln!("Error: {msg}");
    std::process::exit(1);
}

#[derive(Parser, Debug)]
#[command(
    name = "dualk-elo",
    version,
    about = "Dual-K Elo dominance ratings from a winner/loser CSV"
)]
struct Cli {
    /// Two-column CSV: winner, loser. Header row optional.
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// k2 search effort: 0 = keep the seed, 1 = local, 2 = global
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    optimization_level: Option<u8>,

    /// Seed for the global scale k2, in natural-log space (default ln 200)
    #[arg(long, allow_negative_numbers = true)]
    initial_k2: Option<f64>,

    /// Number of random permutations of the interaction order (>= 1)
    #[arg(long)]
    n_random: Option<usize>,

    /// Individuals included in the triad analysis (5..=20)
    #[arg(long)]
    top_n: Option<usize>,

    /// Report detail: 0, 1 or 2
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    verbose: Option<u8>,

    /// Base seed for permutation trials (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Numerator of the adaptive term k1 = k_base / (1 + matches played)
    #[arg(long)]
    k_base: Option<f64>,

    /// Lower bound for the adaptive term
    #[arg(long)]
    k1_floor: Option<f64>,

    /// Rating every individual starts from
    #[arg(long, allow_negative_numbers = true)]
    initial_rating: Option<f64>,

    /// Output the full report as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Path to config file (default: ~/.config/dualk-elo/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a commented default config file and exit
    #[arg(long)]
    init_config: bool,
}

fn main() {
    let cli = Cli::parse();
    logger::init_logger();

    if cli.init_config {
        let path = cli
            .config
            .clone()
            .or_else(config::config_path)
            .unwrap_or_else(|| bail("HOME is not set. Pass --config <path> to choose where to write the config."));
        config::create_default_config(&path);
        println!("Created config at {}", path.display());
        return;
    }

    // Load config file, merge with CLI args (CLI wins)
    let cfg = match cli.config.clone().or_else(config::config_path) {
        Some(path) => config::load_config(&path),
        None => config::DualkConfig::default(),
    };

    let (engine_config, verbose) = resolve(&cli, &cfg);

    // Parameter errors are rejected before the dataset is touched.
    let engine = DualKEngine::new(engine_config).unwrap_or_else(|e| bail(e));

    let file = cli
        .file
        .as_ref()
        .unwrap_or_else(|| bail("No input file. Pass -f <csv-path>."));
    let dataset = load_interactions(file).unwrap_or_else(|e| bail(e));

    info!(path = %file.display(), "running engine");
    let report = engine.run(&dataset).unwrap_or_else(|e| bail(e));

    if cli.json {
        output::print_json(&report);
    } else {
        print!("{}", output::render_report(&report, verbose));
    }
}

/// Merge CLI flags over config file values over built-in defaults.
fn resolve(cli: &Cli, cfg: &config::DualkConfig) -> (EngineConfig, u8) {
    let defaults = EngineConfig::default();

    let verbose = cli.verbose.or(cfg.verbose).unwrap_or(0);
    if verbose > 2 {
        bail(format!("verbose must be 0, 1 or 2, got {verbose}"));
    }

    let level = cli.optimization_level.or(cfg.optimization_level).unwrap_or(0);
    let optimization_level = OptimizationLevel::try_from(level).unwrap_or_else(|e| bail(e));

    let engine_config = EngineConfig {
        optimization_level,
        initial_log_k2: cli.initial_k2.or(cfg.initial_k2).unwrap_or(defaults.initial_log_k2),
        n_random: cli.n_random.or(cfg.n_random).unwrap_or(defaults.n_random),
        top_n: cli.top_n.or(cfg.top_n).unwrap_or(defaults.top_n),
        seed: cli.seed.or(cfg.seed),
        k_base: cli.k_base.or(cfg.k_base).unwrap_or(defaults.k_base),
        k1_floor: cli.k1_floor.or(cfg.k1_floor).unwrap_or(defaults.k1_floor),
        initial_rating: cli.initial_rating.or(cfg.initial_rating).unwrap_or(defaults.initial_rating),
    };

    (engine_config, verbose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_flags_parse() {
        let cli = Cli::try_parse_from([
            "dualk-elo",
            "-f",
            "data.csv",
            "--optimization-level",
            "2",
            "--initial-k2",
            "5.298317366548",
            "--n-random",
            "100",
            "--top-n",
            "10",
            "--verbose",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("data.csv")));
        assert_eq!(cli.optimization_level, Some(2));
        assert_eq!(cli.initial_k2, Some(5.298317366548));
        assert_eq!(cli.n_random, Some(100));
        assert_eq!(cli.top_n, Some(10));
        assert_eq!(cli.verbose, Some(1));
    }

    #[test]
    fn test_out_of_range_levels_rejected_by_parser() {
        assert!(Cli::try_parse_from(["dualk-elo", "-f", "x.csv", "--optimization-level", "3"]).is_err());
        assert!(Cli::try_parse_from(["dualk-elo", "-f", "x.csv", "--verbose", "5"]).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from(["dualk-elo", "-f", "x.csv", "--top-n", "7"]).unwrap();
        let cfg = config::DualkConfig {
            top_n: Some(15),
            n_random: Some(40),
            optimization_level: Some(1),
            ..config::DualkConfig::default()
        };
        let (engine_config, verbose) = resolve(&cli, &cfg);
        assert_eq!(engine_config.top_n, 7);
        assert_eq!(engine_config.n_random, 40);
        assert_eq!(engine_config.optimization_level, OptimizationLevel::Local);
        assert_eq!(engine_config.initial_log_k2, EngineConfig::default().initial_log_k2);
        assert_eq!(verbose, 0);
    }
}

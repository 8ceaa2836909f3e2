/// Output formatting: text report and JSON.
///
/// Formatting only reads the engine report; nothing here feeds back into the
/// computation.
use dualk_core::{EngineReport, SearchPhase, SearchStatus, TriadClass};

use crate::bail;

/// Build the text report. `verbose` 0 = ratings and linearity, 1 = adds
/// optimizer and permutation summaries, 2 = adds per-trial, per-triad and
/// dominance matrix detail.
pub fn render_report(report: &EngineReport, verbose: u8) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Dual-K Elo ratings ({} individuals, {} interactions)",
        report.individuals.len(),
        report.num_interactions,
    ));
    lines.push(String::new());
    ratings_table(report, &mut lines);
    lines.push(String::new());
    lines.push(linearity_line(report));

    let warnings = warnings(report);
    if !warnings.is_empty() {
        lines.push(String::new());
        lines.extend(warnings.into_iter().map(|w| format!("Warning: {w}")));
    }

    if verbose >= 1 {
        lines.push(String::new());
        optimizer_section(report, &mut lines);
        lines.push(String::new());
        permutation_section(report, &mut lines);
        lines.push(String::new());
        hierarchy_section(report, &mut lines);
    }

    if verbose >= 2 {
        lines.push(String::new());
        trials_section(report, &mut lines);
        lines.push(String::new());
        triads_section(report, &mut lines);
        lines.push(String::new());
        dominance_section(report, &mut lines);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Print the full report as JSON.
pub fn print_json(report: &EngineReport) {
    let json = serde_json::to_string_pretty(report)
        .unwrap_or_else(|e| bail(format!("Failed to serialize report: {e}")));
    println!("{json}");
}

fn name_width(report: &EngineReport) -> usize {
    report.individuals.iter().map(|id| id.chars().count()).max().unwrap_or(0).max(10)
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn ratings_table(report: &EngineReport, lines: &mut Vec<String>) {
    let w = name_width(report);
    lines.push(format!(" # | {:<w$} |    Rating | Wins | Losses", "Individual"));
    lines.push(format!("---|-{}-|-----------|------|-------", "-".repeat(w)));
    for r in &report.rankings {
        lines.push(format!(
            "{:>2} | {:<w$} | {:>9.2} | {:>4} | {:>6}",
            r.rank, r.id, r.rating, r.wins, r.losses,
        ));
    }
}

fn linearity_line(report: &EngineReport) -> String {
    let h = &report.hierarchy;
    format!(
        "Linearity index: {} ({} transitive, {} circular of {} triads among top {})",
        fmt_opt(h.linearity_index),
        h.transitive,
        h.circular,
        h.triads.len() + h.failed,
        h.top.len(),
    )
}

fn warnings(report: &EngineReport) -> Vec<String> {
    let mut out = Vec::new();
    let opt = &report.optimization;
    match opt.status {
        SearchStatus::NoImprovement => out.push(format!(
            "k2 search did not improve on the seed; using log k2 = {:.4}",
            opt.log_k2
        )),
        SearchStatus::BudgetExhausted => out.push(format!(
            "k2 search stopped at its iteration budget before converging; using best value found (log k2 = {:.4})",
            opt.log_k2
        )),
        SearchStatus::Skipped | SearchStatus::Converged => {}
    }
    if opt.failed_evaluations > 0 {
        out.push(format!(
            "{} of {} k2 candidate evaluations failed and were skipped",
            opt.failed_evaluations, opt.evaluations
        ));
    }
    let perm = &report.permutation;
    if !perm.failed_trials.is_empty() {
        out.push(format!(
            "{} of {} permutation trials failed and were excluded (trials {:?})",
            perm.failed_trials.len(),
            perm.requested_trials,
            perm.failed_trials,
        ));
    }
    if report.hierarchy.failed > 0 {
        out.push(format!(
            "{} triad evaluations failed and were excluded",
            report.hierarchy.failed
        ));
    }
    out
}

fn optimizer_section(report: &EngineReport, lines: &mut Vec<String>) {
    let opt = &report.optimization;
    lines.push(format!("Optimization (level {})", u8::from(opt.level)));
    lines.push(format!("  status:       {:?}", opt.status));
    lines.push(format!("  k2:           {:.4} (log {:.6})", opt.k2, opt.log_k2));
    lines.push(format!("  loss:         {:.6}", opt.loss));
    lines.push(format!(
        "  initial loss: {} at log k2 = {:.6}",
        opt.initial_loss.map_or_else(|| "failed".to_string(), |l| format!("{l:.6}")),
        opt.initial_log_k2,
    ));
    lines.push(format!(
        "  evaluations:  {} ({} failed)",
        opt.evaluations, opt.failed_evaluations
    ));

    if !opt.trajectory.is_empty() {
        lines.push("  Trajectory:".to_string());
        lines.push("    phase  | start | iter |     log k2 |         loss |     step".to_string());
        for p in &opt.trajectory {
            let phase = match p.phase {
                SearchPhase::Seed => "seed",
                SearchPhase::Grid => "grid",
                SearchPhase::Refine => "refine",
            };
            lines.push(format!(
                "    {:<6} | {:>5} | {:>4} | {:>10.6} | {:>12.6} | {:>8.5}",
                phase, p.start, p.iteration, p.log_k2, p.loss, p.step,
            ));
        }
    }
}

fn permutation_section(report: &EngineReport, lines: &mut Vec<String>) {
    let perm = &report.permutation;
    let w = name_width(report);
    lines.push(format!(
        "Permutation test ({} of {} trials, seed {}, k2 = {:.4})",
        perm.successful_trials, perm.requested_trials, perm.base_seed, perm.k2,
    ));
    lines.push(format!(
        "  {:<w$} |      Mean |      SD | Mean rank | Rank SD | Range | Stability",
        "Individual"
    ));
    for r in &report.rankings {
        let Some(idx) = report.individuals.iter().position(|id| *id == r.id) else {
            continue;
        };
        let s = &perm.individuals[idx];
        lines.push(format!(
            "  {:<w$} | {:>9.2} | {:>7.2} | {:>9.2} | {:>7.2} | {:>2}-{:<2} | {:>9.3}",
            r.id,
            s.mean_rating,
            s.rating_sd,
            s.mean_rank,
            s.rank_sd,
            s.min_rank,
            s.max_rank,
            s.rank_stability,
        ));
    }
    lines.push(format!(
        "  Mean rank correlation with original order: {}",
        fmt_opt(perm.mean_rank_correlation)
    ));
}

fn hierarchy_section(report: &EngineReport, lines: &mut Vec<String>) {
    let h = &report.hierarchy;
    lines.push(format!("Hierarchy (top {})", h.top.len()));
    lines.push(format!(
        "  triads: {} transitive, {} circular, {} undetermined, {} failed",
        h.transitive, h.circular, h.undetermined, h.failed,
    ));
    lines.push(format!(
        "  pair relations inferred from ratings: {}",
        h.inferred_relations
    ));
    lines.push(format!("  steepness: {}", fmt_opt(h.steepness)));
    let scores: Vec<String> = h
        .top
        .iter()
        .zip(&h.davids_scores)
        .map(|(&i, ds)| format!("{}={:.3}", report.individuals[i], ds))
        .collect();
    lines.push(format!("  normalized David's scores: {}", scores.join(", ")));
}

fn trials_section(report: &EngineReport, lines: &mut Vec<String>) {
    lines.push("Trials".to_string());
    lines.push("  trial |                 seed | leader | rank correlation".to_string());
    for t in &report.permutation.trials {
        lines.push(format!(
            "  {:>5} | {:>20} | {:<6} | {}",
            t.trial,
            t.seed,
            report.individuals[t.leader],
            fmt_opt(t.rank_correlation),
        ));
    }
}

fn triads_section(report: &EngineReport, lines: &mut Vec<String>) {
    lines.push("Triads".to_string());
    for t in &report.hierarchy.triads {
        let class = match t.class {
            TriadClass::Transitive => "transitive",
            TriadClass::Circular => "circular",
            TriadClass::Undetermined => "undetermined",
        };
        let [a, b, c] = t.members.map(|i| report.individuals[i].as_str());
        lines.push(format!(
            "  {a}, {b}, {c}: {class} ({} inferred from ratings)",
            t.inferred_pairs
        ));
    }
}

fn dominance_section(report: &EngineReport, lines: &mut Vec<String>) {
    let ids = &report.individuals;
    let w = name_width(report);
    let col = ids.iter().map(|id| id.chars().count()).max().unwrap_or(1).max(3);

    lines.push("Dominance matrix (row beat column)".to_string());
    let header: Vec<String> = ids.iter().map(|id| format!("{id:>col$}")).collect();
    lines.push(format!("  {:<w$} | {}", "", header.join(" ")));
    for (i, id) in ids.iter().enumerate() {
        let row: Vec<String> = report
            .dominance
            .row(i)
            .iter()
            .map(|n| format!("{n:>col$}"))
            .collect();
        lines.push(format!("  {id:<w$} | {}", row.join(" ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dualk_core::{Dataset, DualKEngine, EngineConfig, OptimizationLevel};

    fn report() -> EngineReport {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        DualKEngine::new(EngineConfig {
            n_random: 5,
            top_n: 5,
            seed: Some(3),
            ..EngineConfig::default()
        })
        .unwrap()
        .run(&ds)
        .unwrap()
    }

    #[test]
    fn test_quiet_report_lists_everyone() {
        let text = render_report(&report(), 0);
        for id in ["A", "B", "C"] {
            assert!(text.lines().any(|l| l.contains(&format!(" {id} "))), "missing {id}");
        }
        assert!(text.contains("Linearity index: 1.0000"));
        assert!(!text.contains("Optimization"));
        assert!(!text.contains("Trials"));
    }

    #[test]
    fn test_verbose_levels_add_sections() {
        let r = report();
        let v1 = render_report(&r, 1);
        assert!(v1.contains("Optimization (level 0)"));
        assert!(v1.contains("Permutation test (5 of 5 trials, seed 3"));
        assert!(v1.contains("Hierarchy (top 3)"));
        assert!(!v1.contains("Dominance matrix"));

        let v2 = render_report(&r, 2);
        assert!(v2.contains("Trials"));
        assert!(v2.contains("Triads"));
        assert!(v2.contains("Dominance matrix"));
        assert!(v2.len() > v1.len());
    }

    #[test]
    fn test_partial_failures_are_reported_as_warnings() {
        let mut r = report();
        assert!(!render_report(&r, 0).contains("Warning:"));

        r.optimization.evaluations = 50;
        r.optimization.failed_evaluations = 3;
        r.permutation.failed_trials = vec![2];
        r.hierarchy.failed = 1;
        let text = render_report(&r, 0);
        assert!(text.contains("Warning: 3 of 50 k2 candidate evaluations failed and were skipped"));
        assert!(text.contains("Warning: 1 of 5 permutation trials failed and were excluded (trials [2])"));
        assert!(text.contains("Warning: 1 triad evaluations failed and were excluded"));
    }

    #[test]
    fn test_seed_recovery_run_reports_failed_candidates() {
        let ds = Dataset::from_pairs(&[("A", "B"), ("B", "C"), ("A", "C"), ("B", "A")]).unwrap();
        let r = DualKEngine::new(EngineConfig {
            optimization_level: OptimizationLevel::Global,
            initial_log_k2: 800.0,
            n_random: 3,
            top_n: 5,
            seed: Some(3),
            ..EngineConfig::default()
        })
        .unwrap()
        .run(&ds)
        .unwrap();
        let text = render_report(&r, 1);
        assert!(text.contains("k2 candidate evaluations failed and were skipped"));
        assert!(text.contains("initial loss: failed at log k2 = 800.000000"));
    }

    #[test]
    fn test_rendering_is_pure() {
        let r = report();
        assert_eq!(render_report(&r, 2), render_report(&r, 2));
    }

    #[test]
    fn test_json_round_trips_through_value() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(value["individuals"], serde_json::json!(["A", "B", "C"]));
        assert_eq!(value["permutation"]["requested_trials"], 5);
    }
}

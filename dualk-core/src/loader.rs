/// Two-column interaction CSV loading.
///
/// Column 0 is the winner, column 1 the loser. Row order is preserved: it is
/// the order ratings are updated in.
use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{EloError, Result};
use crate::types::Dataset;

/// Read and parse an interaction file.
pub fn load_interactions(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|source| EloError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dataset = parse_interactions(&content)?;
    debug!(
        path = %path.display(),
        individuals = dataset.num_individuals(),
        interactions = dataset.num_interactions(),
        "loaded interactions"
    );
    Ok(dataset)
}

/// Parse interaction CSV text.
///
/// The first row is a header iff neither of its values appears in any later
/// row. Blank lines are skipped.
pub fn parse_interactions(content: &str) -> Result<Dataset> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut rows = Vec::new();
    for (i, raw) in content.lines().enumerate() {
        let line = i + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let (winner, loser) = parse_row(raw, line)?;
        rows.push((line, winner, loser));
    }

    if rows.is_empty() {
        return Err(EloError::EmptyDataset);
    }

    if is_header(&rows) {
        let (line, _, _) = rows.remove(0);
        debug!(line, "treating first row as header");
    }

    Dataset::from_rows(rows)
}

fn parse_row(raw: &str, line: usize) -> Result<(String, String)> {
    let fields: Vec<String> = raw.split(',').map(clean_field).collect();

    let [winner, loser]: [String; 2] =
        fields.try_into().map_err(|fields: Vec<String>| EloError::MalformedRow {
            line,
            reason: format!("expected 2 columns, found {}", fields.len()),
        })?;

    if winner.is_empty() || loser.is_empty() {
        return Err(EloError::MalformedRow {
            line,
            reason: "empty winner or loser".to_string(),
        });
    }

    Ok((winner, loser))
}

fn clean_field(field: &str) -> String {
    let trimmed = field.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

fn is_header(rows: &[(usize, String, String)]) -> bool {
    let (_, first_a, first_b) = &rows[0];
    let later: HashSet<&str> = rows[1..]
        .iter()
        .flat_map(|(_, w, l)| [w.as_str(), l.as_str()])
        .collect();
    !later.contains(first_a.as_str()) && !later.contains(first_b.as_str())
}

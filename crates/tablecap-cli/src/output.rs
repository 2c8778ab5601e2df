//! Rendering captured records for the terminal.

use serde_json::{json, Value};

use tablecap::{CaptureOutcome, CaptureState, Record};

/// JSON envelope for `--json` output.
pub fn json_envelope(target: &str, outcome: &CaptureOutcome) -> Value {
    json!({
        "session_id": uuid::Uuid::new_v4().to_string(),
        "captured_at": chrono::Utc::now().to_rfc3339(),
        "target": target,
        "termination": outcome.termination,
        "cycles": outcome.cycles,
        "records": outcome.records,
    })
}

/// One-line summary of how the session ended.
pub fn summary(outcome: &CaptureOutcome) -> String {
    let records = outcome.records.len();
    let cycles = outcome.cycle_count();
    match outcome.termination {
        CaptureState::LimitReached => format!(
            "Cycle limit reached after {cycles} cycles: {records} records (table may be incomplete; raise --max-cycles)"
        ),
        _ => format!("Converged after {cycles} cycles: {records} records"),
    }
}

/// Render records as an aligned text table with a header row.
pub fn render_table(columns: &[String], records: &[Record]) -> String {
    let cells: Vec<Vec<String>> = records
        .iter()
        .map(|r| r.values().iter().map(|v| v.to_string()).collect())
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, columns, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for row in &cells {
        push_line(&mut out, row, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

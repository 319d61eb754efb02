//! Plain-text results summary

use std::fmt::Write;

use crate::experiment::ExperimentResults;

/// Table of final loss, final accuracy and best accuracy per configuration
pub fn summary_table(results: &ExperimentResults) -> String {
    let width = results
        .iter()
        .map(|(name, _)| name.len())
        .chain(results.failures().iter().map(|(name, _)| name.len()))
        .chain(std::iter::once("Configuration".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<width$} | {:>10} | {:>9} | {:>16}",
        "Configuration", "Final Loss", "Final Acc", "Best Acc (epoch)"
    );
    let _ = writeln!(out, "{}", "-".repeat(width + 45));

    for (name, history) in results.iter() {
        let loss = history
            .final_train_loss()
            .map_or_else(|| "-".to_string(), |l| format!("{:.4}", l));
        let acc = history
            .final_accuracy()
            .map_or_else(|| "-".to_string(), |a| format!("{:.2}%", a));
        let best = history
            .best_accuracy()
            .map_or_else(|| "-".to_string(), |(e, a)| format!("{:.2}% ({})", a, e));
        let _ = writeln!(out, "{:<width$} | {:>10} | {:>9} | {:>16}", name, loss, acc, best);
    }

    for (name, reason) in results.failures() {
        let _ = writeln!(out, "{:<width$} | FAILED: {}", name, reason);
    }

    out
}

/// Title line followed by the summary table, printed once a task finishes
pub fn task_report(title: &str, results: &ExperimentResults) -> String {
    format!("\n{}\n{}", title, summary_table(results))
}

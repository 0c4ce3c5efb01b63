use std::fmt::Write;

use anyhow::bail;
use postbridge_service::{MigrationController, VerificationReport, VerifyOptions};

use super::{banner, count_cell, spinner};

/// Findings listed per collection.
const MAX_LISTED_MISMATCHES: usize = 20;

pub async fn run(controller: &MigrationController, options: &VerifyOptions) -> anyhow::Result<()> {
    let pb = spinner("Verifying...");
    let report = controller.verify(options).await;
    pb.finish_and_clear();
    let report = report?;

    println!("{}", render(&report));

    if report.collections.iter().any(|c| c.error.is_some()) {
        bail!("verification could not complete for every collection");
    }
    Ok(())
}

pub(crate) fn render(report: &VerificationReport) -> String {
    let mut out = banner(&format!("VERIFICATION ({})", report.content));

    for collection in &report.collections {
        let _ = writeln!(
            out,
            "\n{}: MongoDB {}, Cassandra {}, checked {}",
            collection.collection,
            count_cell(collection.source_count),
            count_cell(collection.target_count),
            collection.checked
        );
        if let Some(error) = &collection.error {
            let _ = writeln!(out, "  ✗ {error}");
        }
        for mismatch in collection.mismatches.iter().take(MAX_LISTED_MISMATCHES) {
            let _ = writeln!(out, "  ✗ {mismatch}");
        }
        if collection.mismatches.len() > MAX_LISTED_MISMATCHES {
            let _ = writeln!(
                out,
                "  ... and {} more",
                collection.mismatches.len() - MAX_LISTED_MISMATCHES
            );
        }
        if collection.is_consistent() {
            let _ = writeln!(out, "  ✓ consistent");
        }
    }

    let verdict = if report.is_consistent() {
        "✓ All data verified successfully".to_string()
    } else {
        format!("✗ {} mismatches found", report.total_mismatches())
    };
    let _ = writeln!(out, "\n{verdict}");
    out
}

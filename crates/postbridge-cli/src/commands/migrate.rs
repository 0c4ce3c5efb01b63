use std::fmt::Write;

use anyhow::bail;
use postbridge_service::{MigrateOutcome, MigrationController, MigrationOptions};

use super::{banner, spinner, verify};

/// Error ids listed per collection before the rest is summarised.
const MAX_LISTED_ERRORS: usize = 10;

pub async fn run(
    controller: &MigrationController,
    options: &MigrationOptions,
    skip_verification: bool,
) -> anyhow::Result<()> {
    let pb = spinner(if options.dry_run {
        "Reading collections (dry run)..."
    } else {
        "Migrating collections..."
    });
    let outcome = controller.migrate(options, skip_verification).await;
    pb.finish_and_clear();
    let outcome = outcome?;

    println!("{}", render(&outcome));

    if outcome.report.has_fatal() {
        bail!("migration aborted for at least one collection");
    }
    Ok(())
}

pub(crate) fn render(outcome: &MigrateOutcome) -> String {
    let report = &outcome.report;
    let title = if report.dry_run {
        "MIGRATION [DRY RUN]"
    } else {
        "MIGRATION"
    };
    let mut out = banner(title);
    let verb = if report.dry_run { "would write" } else { "written" };

    for collection in &report.collections {
        let _ = writeln!(
            out,
            "\n{}: read {}, {} {}, errors {} ({:.2}s)",
            collection.collection,
            collection.read,
            verb,
            collection.written,
            collection.errors.len(),
            collection.elapsed.as_secs_f64()
        );
        for error in collection.errors.iter().take(MAX_LISTED_ERRORS) {
            let _ = writeln!(out, "  ✗ {}: {}", error.id, error.message);
        }
        if collection.errors.len() > MAX_LISTED_ERRORS {
            let _ = writeln!(out, "  ... and {} more", collection.errors.len() - MAX_LISTED_ERRORS);
        }
        if let Some(fatal) = &collection.fatal {
            let _ = writeln!(out, "  ✗ aborted: {fatal}");
        }
    }

    let _ = writeln!(
        out,
        "\nTotal: read {}, {} {}, errors {} in {:.2}s",
        report.total_read(),
        verb,
        report.total_written(),
        report.total_errors(),
        report.elapsed.as_secs_f64()
    );

    if let Some(verification) = &outcome.verification {
        let _ = writeln!(out, "\n{}", verify::render(verification));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use postbridge_service::{CollectionReport, DocumentError, MigrationReport};

    use super::*;

    #[test]
    fn test_render_dry_run_report() {
        let outcome = MigrateOutcome {
            report: MigrationReport {
                dry_run: true,
                collections: vec![CollectionReport {
                    collection: "posts".into(),
                    read: 3,
                    written: 2,
                    errors: vec![DocumentError {
                        id: "<unknown>".into(),
                        message: "missing _id".into(),
                    }],
                    fatal: None,
                    elapsed: Duration::from_millis(5),
                }],
                elapsed: Duration::from_millis(6),
            },
            verification: None,
        };

        let text = render(&outcome);
        assert!(text.contains("MIGRATION [DRY RUN]"));
        assert!(text.contains("posts: read 3, would write 2, errors 1"));
        assert!(text.contains("✗ <unknown>: missing _id"));
    }
}

use std::io::{self, BufRead, Write};

use postbridge_core::{CoreError, MigrationPhase};
use postbridge_service::{CleanupOptions, CleanupReport, MigrationController};

use super::banner;

pub async fn run(
    controller: &MigrationController,
    options: &CleanupOptions,
    yes: bool,
) -> anyhow::Result<()> {
    println!("{}", banner("CLEANUP: Removing MongoDB Data"));

    let phase = controller.current_phase();
    if phase != MigrationPhase::CassandraOnly {
        return Err(CoreError::UnsafeCleanup { phase }.into());
    }

    if !options.dry_run && !yes {
        let preview = controller
            .cleanup(&CleanupOptions {
                dry_run: true,
                ..options.clone()
            })
            .await?;
        println!("\nFound {} documents in MongoDB to delete.", preview.total_documents());
        if !confirm("Are you sure you want to delete all MongoDB data? (yes/no): ")? {
            println!("Cleanup cancelled.");
            return Ok(());
        }
    }

    let report = controller.cleanup(options).await?;
    println!("{}", render(&report));
    Ok(())
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("\n{prompt}");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

pub(crate) fn render(report: &CleanupReport) -> String {
    let mut lines = Vec::new();
    for collection in &report.collections {
        if report.dry_run {
            lines.push(format!(
                "[DRY RUN] Would delete {} documents from '{}'",
                collection.documents, collection.collection
            ));
        } else {
            lines.push(format!(
                "✓ Deleted {} documents from '{}'",
                collection.documents, collection.collection
            ));
            if collection.dropped {
                lines.push(format!("✓ Dropped '{}' collection", collection.collection));
            }
        }
    }
    format!("\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use postbridge_service::CollectionCleanup;

    use super::*;

    #[test]
    fn test_confirmation_requires_yes() {
        assert!(is_affirmative("yes\n"));
        assert!(is_affirmative("  YES "));
        assert!(!is_affirmative("y"));
        assert!(!is_affirmative(""));
    }

    #[test]
    fn test_render_dropped_collection() {
        let report = CleanupReport {
            dry_run: false,
            collections: vec![CollectionCleanup {
                collection: "posts".into(),
                documents: 6,
                dropped: true,
            }],
        };
        let text = render(&report);
        assert!(text.contains("✓ Deleted 6 documents from 'posts'"));
        assert!(text.contains("✓ Dropped 'posts' collection"));
    }
}

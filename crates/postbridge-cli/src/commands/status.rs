use std::fmt::Write;

use postbridge_service::{ControllerStatus, MigrationController};

use super::{banner, count_cell};

pub async fn run(controller: &MigrationController) -> anyhow::Result<()> {
    let status = controller.status().await?;
    println!("{}", render(&status));
    Ok(())
}

fn connectivity(connected: bool) -> &'static str {
    if connected {
        "connected"
    } else {
        "unreachable"
    }
}

pub(crate) fn render(status: &ControllerStatus) -> String {
    let mut out = banner("MIGRATION STATUS");
    let _ = writeln!(out, "\nPhase: {} ({})", status.phase, status.phase.description());
    let _ = writeln!(out, "\nMongoDB:   {}", connectivity(status.mongodb_connected));
    let _ = writeln!(out, "Cassandra: {}", connectivity(status.cassandra_connected));

    let _ = writeln!(out, "\n{:<24} {:>10} {:>10}", "Collection", "MongoDB", "Cassandra");
    for counts in &status.collections {
        let _ = writeln!(
            out,
            "{:<24} {:>10} {:>10}",
            counts.collection,
            count_cell(counts.mongodb),
            count_cell(counts.cassandra)
        );
    }

    match &status.last_verification {
        Some(summary) => {
            let verdict = if summary.consistent {
                "consistent".to_string()
            } else {
                format!(
                    "{} mismatches, {} errors",
                    summary.total_mismatches, summary.errors
                )
            };
            let _ = writeln!(
                out,
                "\nLast verification: {} ({}): {}",
                summary.verified_at.format("%Y-%m-%d %H:%M:%S UTC"),
                summary.content,
                verdict
            );
        }
        None => {
            let _ = writeln!(out, "\nLast verification: never");
        }
    }

    let _ = writeln!(out, "\nPhases:");
    for row in &status.phases {
        let marker = if row.current { "→" } else { " " };
        let _ = writeln!(out, "  {marker} {:<16} {}", row.phase.as_str(), row.description);
    }
    out
}

#[cfg(test)]
mod tests {
    use postbridge_core::MigrationPhase;
    use postbridge_service::{CollectionCounts, PhaseRow};

    use super::*;

    #[test]
    fn test_render_marks_current_phase() {
        let status = ControllerStatus {
            phase: MigrationPhase::DualWrite,
            mongodb_connected: true,
            cassandra_connected: false,
            collections: vec![CollectionCounts {
                collection: "posts".into(),
                mongodb: Some(6),
                cassandra: None,
            }],
            last_verification: None,
            phases: MigrationPhase::ALL
                .iter()
                .map(|p| PhaseRow {
                    phase: *p,
                    description: p.description(),
                    current: *p == MigrationPhase::DualWrite,
                })
                .collect(),
        };

        let text = render(&status);
        assert!(text.contains("Cassandra: unreachable"));
        assert!(text.contains("→ dual_write"));
        assert!(text.contains("Last verification: never"));
        let posts_line = text.lines().find(|l| l.starts_with("posts")).unwrap();
        assert!(posts_line.trim_end().ends_with('-'));
    }
}

use postbridge_service::{MigrationController, PHASE_ENV};

use super::banner;

pub fn run(controller: &MigrationController, raw: &str) -> anyhow::Result<()> {
    let change = controller.set_phase(raw).map_err(|e| {
        anyhow::anyhow!("{e}\nValid phases: {}", crate::phase_names())
    })?;

    println!("{}", banner(&format!("SETTING MIGRATION PHASE: {}", change.current)));
    println!("\nPersisted migration_phase = \"{}\" (was {})", change.current, change.previous);
    println!("\nPhase '{}': {}", change.current, change.current.description());
    if let Some(value) = &change.env_override {
        println!("\nNote: {PHASE_ENV}={value} is set and overrides the persisted phase.");
    }
    println!("\nRestart the application for the change to take effect.");
    Ok(())
}

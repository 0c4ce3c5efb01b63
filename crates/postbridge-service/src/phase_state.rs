//! Persisted migration phase.
//!
//! The phase lives in the `migration_phase` key of the TOML config file.
//! Changing it never affects running processes; they pick it up on restart.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use postbridge_core::{CoreError, CoreResult, MigrationPhase};

use crate::config::PHASE_ENV;

const PHASE_KEY: &str = "migration_phase";

/// Outcome of a successful [`PhaseState::set_phase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    pub previous: MigrationPhase,
    pub current: MigrationPhase,
    /// Value of `MIGRATION_PHASE` that will shadow the persisted phase, if set.
    pub env_override: Option<String>,
}

/// Reads and writes the persisted phase.
#[derive(Debug)]
pub struct PhaseState {
    path: PathBuf,
    phase: RwLock<MigrationPhase>,
    env_override: Option<String>,
}

impl PhaseState {
    /// Creates a state seeded with the effective phase of this process.
    pub fn new(path: impl Into<PathBuf>, phase: MigrationPhase) -> Self {
        Self {
            path: path.into(),
            phase: RwLock::new(phase),
            env_override: std::env::var(PHASE_ENV).ok(),
        }
    }

    /// Reads the phase persisted in `path`; a missing file or key means `mongo_only`.
    ///
    /// # Errors
    ///
    /// Fails on unreadable or malformed files and on an unknown persisted phase.
    pub fn load(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let table = read_table(&path)?;
        let phase = match table.get(PHASE_KEY) {
            Some(toml::Value::String(raw)) => raw.parse()?,
            Some(other) => return Err(CoreError::invalid_phase(other.to_string())),
            None => MigrationPhase::default(),
        };
        Ok(Self::new(path, phase))
    }

    /// Replaces the captured `MIGRATION_PHASE` value.
    #[must_use]
    pub fn with_env_override(mut self, value: Option<String>) -> Self {
        self.env_override = value;
        self
    }

    /// Config file the phase is written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn current_phase(&self) -> MigrationPhase {
        *self.phase.read()
    }

    /// Validates `raw`, persists it and updates the in-memory phase.
    ///
    /// All other keys of the file are preserved. Nothing changes when
    /// validation or the write fails.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` for unknown names; `Io`/`Serialization` when the file
    /// cannot be read, parsed or written.
    pub fn set_phase(&self, raw: &str) -> CoreResult<PhaseChange> {
        let phase: MigrationPhase = raw.parse()?;

        let mut table = read_table(&self.path)?;
        table.insert(PHASE_KEY.to_string(), toml::Value::String(phase.to_string()));
        write_table(&self.path, &table)?;

        let previous = std::mem::replace(&mut *self.phase.write(), phase);
        info!(from = %previous, to = %phase, path = %self.path.display(), "migration phase persisted");

        if let Some(value) = &self.env_override {
            warn!(
                env = PHASE_ENV,
                value = %value,
                "environment variable overrides the persisted phase"
            );
        }

        Ok(PhaseChange {
            previous,
            current: phase,
            env_override: self.env_override.clone(),
        })
    }
}

fn read_table(path: &Path) -> CoreResult<toml::Table> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents.parse::<toml::Table>().map_err(|e| {
            CoreError::Serialization(format!("{}: {e}", path.display()))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(toml::Table::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_table(path: &Path, table: &toml::Table) -> CoreResult<()> {
    let contents =
        toml::to_string(table).map_err(|e| CoreError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_phase_persists_and_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postbridge.toml");
        std::fs::write(
            &path,
            "migration_phase = \"mongo_only\"\n\n[mongo]\ndatabase = \"blog_test\"\n",
        )
        .unwrap();

        let state = PhaseState::load(&path).unwrap().with_env_override(None);
        assert_eq!(state.current_phase(), MigrationPhase::MongoOnly);

        let change = state.set_phase("dual_write").unwrap();
        assert_eq!(change.previous, MigrationPhase::MongoOnly);
        assert_eq!(change.current, MigrationPhase::DualWrite);
        assert_eq!(state.current_phase(), MigrationPhase::DualWrite);

        let reloaded = PhaseState::load(&path).unwrap();
        assert_eq!(reloaded.current_phase(), MigrationPhase::DualWrite);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("blog_test"));
    }

    #[test]
    fn test_invalid_phase_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postbridge.toml");
        std::fs::write(&path, "migration_phase = \"read_cassandra\"\n").unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let state = PhaseState::load(&path).unwrap();
        let err = state.set_phase("cleanup").unwrap_err();
        assert!(matches!(err, CoreError::InvalidPhase { .. }));
        assert_eq!(state.current_phase(), MigrationPhase::ReadCassandra);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_missing_file_defaults_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("postbridge.toml");

        let state = PhaseState::load(&path).unwrap();
        assert_eq!(state.current_phase(), MigrationPhase::MongoOnly);
        state.set_phase("CASSANDRA_ONLY").unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("migration_phase = \"cassandra_only\""));
    }

    #[test]
    fn test_env_override_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state = PhaseState::new(dir.path().join("p.toml"), MigrationPhase::MongoOnly)
            .with_env_override(Some("mongo_only".into()));
        let change = state.set_phase("dual_write").unwrap();
        assert_eq!(change.env_override.as_deref(), Some("mongo_only"));
    }

    #[test]
    fn test_load_rejects_unknown_persisted_phase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postbridge.toml");
        std::fs::write(&path, "migration_phase = \"sideways\"\n").unwrap();
        assert!(PhaseState::load(&path).is_err());
    }
}

//! Migration phases and the per-phase backend selectors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Storage backend participating in the migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// MongoDB document store (migration source).
    Mongo,
    /// Cassandra wide-column store (migration target).
    Cassandra,
}

impl Backend {
    /// Returns the display name used in logs, metrics and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mongo => "mongodb",
            Self::Cassandra => "cassandra",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a write goes in a given phase.
///
/// The primary write must succeed for the operation to succeed. A failed
/// secondary write is logged and counted, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    /// Backend that owns the write.
    pub primary: Backend,
    /// Best-effort mirror target, if any.
    pub secondary: Option<Backend>,
}

/// Migration phase the data layer operates in.
///
/// Read once at process start; a running data layer never changes phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum MigrationPhase {
    /// MongoDB serves all reads and writes.
    MongoOnly,
    /// Writes go to both stores, reads come from MongoDB.
    DualWrite,
    /// Writes go to both stores, reads come from Cassandra.
    ReadCassandra,
    /// Cassandra serves all reads and writes.
    CassandraOnly,
}

impl Default for MigrationPhase {
    fn default() -> Self {
        Self::MongoOnly
    }
}

impl MigrationPhase {
    /// All phases in migration order.
    pub const ALL: [Self; 4] = [
        Self::MongoOnly,
        Self::DualWrite,
        Self::ReadCassandra,
        Self::CassandraOnly,
    ];

    /// Returns the persisted snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MongoOnly => "mongo_only",
            Self::DualWrite => "dual_write",
            Self::ReadCassandra => "read_cassandra",
            Self::CassandraOnly => "cassandra_only",
        }
    }

    /// Returns the backend that serves reads.
    #[must_use]
    pub const fn read_backend(&self) -> Backend {
        match self {
            Self::MongoOnly | Self::DualWrite => Backend::Mongo,
            Self::ReadCassandra | Self::CassandraOnly => Backend::Cassandra,
        }
    }

    /// Returns the write plan for this phase.
    #[must_use]
    pub const fn write_plan(&self) -> WritePlan {
        match self {
            Self::MongoOnly => WritePlan {
                primary: Backend::Mongo,
                secondary: None,
            },
            Self::DualWrite | Self::ReadCassandra => WritePlan {
                primary: Backend::Mongo,
                secondary: Some(Backend::Cassandra),
            },
            Self::CassandraOnly => WritePlan {
                primary: Backend::Cassandra,
                secondary: None,
            },
        }
    }

    /// Returns true when the phase reads from or writes to `backend`.
    #[must_use]
    pub fn requires(&self, backend: Backend) -> bool {
        let plan = self.write_plan();
        self.read_backend() == backend
            || plan.primary == backend
            || plan.secondary == Some(backend)
    }

    /// Position in the migration order, starting at 0.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        match self {
            Self::MongoOnly => 0,
            Self::DualWrite => 1,
            Self::ReadCassandra => 2,
            Self::CassandraOnly => 3,
        }
    }

    /// Next phase in the migration order, `None` after `cassandra_only`.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// One-line operator description.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::MongoOnly => "Read from and write to MongoDB only",
            Self::DualWrite => "Write to both stores, read from MongoDB",
            Self::ReadCassandra => "Write to both stores, read from Cassandra",
            Self::CassandraOnly => "Read from and write to Cassandra only",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationPhase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| CoreError::invalid_phase(s))
    }
}

impl TryFrom<String> for MigrationPhase {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_trims() {
        assert_eq!(
            " Dual_Write\n".parse::<MigrationPhase>().unwrap(),
            MigrationPhase::DualWrite
        );
        for phase in MigrationPhase::ALL {
            assert_eq!(phase.as_str().parse::<MigrationPhase>().unwrap(), phase);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        for raw in ["", "cleanup", "dual-write", "mongo"] {
            let err = raw.parse::<MigrationPhase>().unwrap_err();
            assert!(matches!(err, CoreError::InvalidPhase { .. }), "{raw}");
        }
    }

    #[test]
    fn test_selectors() {
        use Backend::{Cassandra, Mongo};

        assert_eq!(MigrationPhase::MongoOnly.read_backend(), Mongo);
        assert_eq!(MigrationPhase::DualWrite.read_backend(), Mongo);
        assert_eq!(MigrationPhase::ReadCassandra.read_backend(), Cassandra);
        assert_eq!(MigrationPhase::CassandraOnly.read_backend(), Cassandra);

        assert_eq!(MigrationPhase::MongoOnly.write_plan().secondary, None);
        assert_eq!(
            MigrationPhase::ReadCassandra.write_plan(),
            WritePlan {
                primary: Mongo,
                secondary: Some(Cassandra)
            }
        );
        assert_eq!(MigrationPhase::CassandraOnly.write_plan().primary, Cassandra);

        assert!(!MigrationPhase::MongoOnly.requires(Cassandra));
        assert!(MigrationPhase::DualWrite.requires(Cassandra));
        assert!(!MigrationPhase::CassandraOnly.requires(Mongo));
    }

    #[test]
    fn test_order() {
        assert_eq!(MigrationPhase::MongoOnly.next(), Some(MigrationPhase::DualWrite));
        assert_eq!(MigrationPhase::CassandraOnly.next(), None);
        assert_eq!(MigrationPhase::default(), MigrationPhase::MongoOnly);
    }

    #[test]
    fn test_serde_round_trip_uses_snake_case() {
        let json = serde_json::to_string(&MigrationPhase::ReadCassandra).unwrap();
        assert_eq!(json, "\"read_cassandra\"");
        let parsed: MigrationPhase = serde_json::from_str("\"CASSANDRA_ONLY\"").unwrap();
        assert_eq!(parsed, MigrationPhase::CassandraOnly);
        assert!(serde_json::from_str::<MigrationPhase>("\"bogus\"").is_err());
    }
}

//! Service layer for postbridge.
//! Phase-aware post storage plus the migration tooling shared by the REST
//! server and the CLI.

pub mod bootstrap;
mod config;
mod controller;
pub mod metrics;
mod migrator;
mod phase_state;
mod post_service;
mod seed;
mod state;
mod verifier;

pub use config::{
    AppConfig, CassandraConfig, ConfigError, LoggingConfig, MigrationConfig, MongoConfig,
    ServerConfig, CONFIG_PATH_ENV, PHASE_ENV,
};
pub use controller::{
    CleanupOptions, CleanupReport, CollectionCleanup, CollectionCounts, ControllerStatus,
    MigrateOutcome, MigrationController, PhaseRow,
};
pub use migrator::{
    BulkMigrator, CollectionReport, DocumentError, MigrationOptions, MigrationReport, UNKNOWN_ID,
};
pub use phase_state::{PhaseChange, PhaseState};
pub use post_service::{PostService, ServiceStatus};
pub use seed::{seed_posts, SeedReport, SAMPLE_POST_COUNT};
pub use state::StateStore;
pub use verifier::{
    CollectionVerification, ContentCheck, Mismatch, VerificationReport, VerificationSummary,
    Verifier, VerifyOptions,
};

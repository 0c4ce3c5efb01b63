pub mod health;
pub mod migration;
pub mod posts;

pub use health::{health_handler, metrics};
pub use migration::migration_status;
pub use posts::{author_stats, create_post, list_posts, PostResponse, DATE_FORMAT};

//! Sample blog posts for local setups and demos.

use chrono::{Duration, Utc};
use serde::Serialize;

use postbridge_core::{CoreError, CoreResult, MigrationPhase, NewPost, Post};

use crate::post_service::PostService;

/// One sample post: author, title, content and age in days.
struct SamplePost {
    author: &'static str,
    title: &'static str,
    content: &'static str,
    days_ago: i64,
}

const SAMPLE_POSTS: [SamplePost; 6] = [
    SamplePost {
        author: "Ahmed",
        title: "Welcome to My Blog",
        content: "This is the first post on my blog. I'm excited to share my thoughts and ideas with you!",
        days_ago: 10,
    },
    SamplePost {
        author: "Sarah",
        title: "Introduction to Python",
        content: "Python is a powerful and versatile programming language. In this post, I'll cover the basics of Python programming.",
        days_ago: 8,
    },
    SamplePost {
        author: "Ahmed",
        title: "Web Development with Flask",
        content: "Flask is a lightweight web framework for Python. It's perfect for building small to medium-sized web applications.",
        days_ago: 6,
    },
    SamplePost {
        author: "John",
        title: "Database Migration Best Practices",
        content: "When migrating databases, it's important to plan carefully and test thoroughly. Here are some best practices to follow.",
        days_ago: 4,
    },
    SamplePost {
        author: "Sarah",
        title: "Understanding NoSQL Databases",
        content: "NoSQL databases like MongoDB and Cassandra offer flexible schemas and horizontal scalability. Let's explore when to use them.",
        days_ago: 2,
    },
    SamplePost {
        author: "Ahmed",
        title: "Building RESTful APIs",
        content: "REST APIs are the backbone of modern web applications. Learn how to design and implement clean, efficient APIs.",
        days_ago: 1,
    },
];

/// Number of posts inserted by [`seed_posts`].
pub const SAMPLE_POST_COUNT: usize = SAMPLE_POSTS.len();

/// Outcome of a seed run.
#[derive(Debug, Clone, Serialize)]
pub struct SeedReport {
    /// Documents removed by `reset` before inserting.
    pub removed: u64,
    pub inserted: Vec<Post>,
}

/// Inserts the sample posts through `service`, backdated so that date
/// ordering is meaningful.
///
/// With `reset`, the posts collection is emptied first. Reset only runs in
/// `mongo_only`, where MongoDB is the only store holding posts.
///
/// # Errors
///
/// `Validation` when `reset` is requested in another phase; any write error
/// from the primary backend.
pub async fn seed_posts(service: &PostService, reset: bool) -> CoreResult<SeedReport> {
    let mut removed = 0;
    if reset {
        if service.phase() != MigrationPhase::MongoOnly {
            return Err(CoreError::Validation(format!(
                "seed reset is only allowed in `mongo_only`, current phase is `{}`",
                service.phase()
            )));
        }
        removed = service
            .backends()
            .documents()?
            .delete_all(service.collection())
            .await?;
        tracing::info!(collection = %service.collection(), removed, "cleared posts before seeding");
    }

    let now = Utc::now();
    let mut inserted = Vec::with_capacity(SAMPLE_POSTS.len());
    for sample in &SAMPLE_POSTS {
        let post = service
            .create_post_at(
                NewPost::new(Some(sample.author), sample.title, sample.content),
                now - Duration::days(sample.days_ago),
            )
            .await?;
        inserted.push(post);
    }

    tracing::info!(
        phase = %service.phase(),
        inserted = inserted.len(),
        "sample posts inserted"
    );
    Ok(SeedReport { removed, inserted })
}

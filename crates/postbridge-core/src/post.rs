//! Blog post model and its document mapping.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{document_id, Document, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::ids::PostId;

/// Author recorded when a post is created without one.
pub const DEFAULT_AUTHOR: &str = "Anonymous";

/// Document field holding the creation timestamp.
pub const DATE_FIELD: &str = "Date";

/// Legacy timestamp format written by older clients.
pub const LEGACY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// An immutable blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a post.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub author: Option<String>,
    pub title: String,
    pub content: String,
}

impl NewPost {
    /// Convenience constructor.
    #[must_use]
    pub fn new(author: Option<&str>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: author.map(str::to_string),
            title: title.into(),
            content: content.into(),
        }
    }

    /// Author to record: the trimmed input, or [`DEFAULT_AUTHOR`] when blank.
    #[must_use]
    pub fn resolved_author(&self) -> String {
        self.author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_AUTHOR)
            .to_string()
    }
}

impl Post {
    /// Builds the stored representation `{"_id","author","title","content","Date"}`.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.into(), Value::String(self.id.to_string()));
        doc.insert("author".into(), Value::String(self.author.clone()));
        doc.insert("title".into(), Value::String(self.title.clone()));
        doc.insert("content".into(), Value::String(self.content.clone()));
        doc.insert(
            DATE_FIELD.into(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        doc
    }

    /// Decodes a stored document.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when a required field is missing or malformed.
    pub fn from_document(document: &Document) -> CoreResult<Self> {
        let id = document_id(document)
            .ok_or_else(|| CoreError::Serialization("post has no `_id`".into()))?;
        let author = match document.get("author") {
            Some(Value::String(a)) if !a.trim().is_empty() => a.clone(),
            _ => DEFAULT_AUTHOR.to_string(),
        };
        let created_at = document
            .get(DATE_FIELD)
            .ok_or_else(|| CoreError::Serialization(format!("post `{id}` has no `Date`")))
            .and_then(parse_date)?;

        Ok(Self {
            author,
            title: required_str(document, "title", &id)?,
            content: required_str(document, "content", &id)?,
            created_at,
            id: PostId::from(id),
        })
    }
}

fn required_str(document: &Document, field: &str, id: &str) -> CoreResult<String> {
    match document.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(CoreError::Serialization(format!(
            "post `{id}` has no string `{field}`"
        ))),
    }
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339 strings, the legacy `%Y-%m-%d %H:%M:%S` format (UTC),
/// and extended JSON `{"$date": ...}` wrapping either a string or epoch millis.
///
/// # Errors
///
/// Returns `Serialization` for anything else.
pub fn parse_date(value: &Value) -> CoreResult<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| CoreError::Serialization(format!("invalid epoch millis `{n}`"))),
        Value::Object(obj) => match obj.get("$date") {
            Some(Value::Object(inner)) => match inner.get("$numberLong") {
                Some(Value::String(ms)) => ms
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .ok_or_else(|| CoreError::Serialization(format!("invalid epoch millis `{ms}`"))),
                _ => Err(CoreError::Serialization("unsupported `$date` payload".into())),
            },
            Some(inner) => parse_date(inner),
            None => Err(CoreError::Serialization("date object without `$date`".into())),
        },
        other => Err(CoreError::Serialization(format!("unsupported date value `{other}`"))),
    }
}

fn parse_date_str(raw: &str) -> CoreResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| CoreError::Serialization(format!("unrecognized date `{raw}`")))
}

/// Ordering for post listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Date,
    /// Ascending, byte-lexicographic, case-sensitive.
    Title,
}

impl SortOrder {
    /// Maps a query parameter to an order; anything unrecognized means `Date`.
    #[must_use]
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("title") => Self::Title,
            _ => Self::Date,
        }
    }
}

/// Sorts posts in place.
pub fn sort_posts(posts: &mut [Post], order: SortOrder) {
    match order {
        SortOrder::Date => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortOrder::Title => posts.sort_by(|a, b| a.title.as_bytes().cmp(b.title.as_bytes())),
    }
}

/// Number of posts written by one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStat {
    pub author: String,
    pub count: u64,
}

/// Groups posts by author; sorted by count descending, then author.
#[must_use]
pub fn aggregate_author_stats<'a, I>(posts: I) -> Vec<AuthorStat>
where
    I: IntoIterator<Item = &'a Post>,
{
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for post in posts {
        *counts.entry(post.author.as_str()).or_default() += 1;
    }
    let mut stats: Vec<AuthorStat> = counts
        .into_iter()
        .map(|(author, count)| AuthorStat {
            author: author.to_string(),
            count,
        })
        .collect();
    stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.author.cmp(&b.author)));
    stats
}

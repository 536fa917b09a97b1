use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logged coding exercise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodingQuestion {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub solution: String,
}

/// An article, book chapter or video reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
}

/// A generic logged item for project/workflow/other categories.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
}

/// One vocabulary word/meaning pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyWord {
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub meaning: String,
}

/// The per-category payload inside an entry. Which field carries the data
/// depends on the category: `questions` for coding, `articles`/`books` for
/// reading, `items` for everything else. Every field defaults to empty so a
/// partially-populated record never fails to decode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<CodingQuestion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub articles: Vec<MediaItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub books: Vec<MediaItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<WorkItem>,
}

impl CategoryRecord {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
            && self.articles.is_empty()
            && self.books.is_empty()
            && self.items.is_empty()
    }
}

/// Canonical entry content: a map keyed by category name, the vocabulary
/// list and the free-text daily reflection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryContent {
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRecord>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyWord>,
    #[serde(default)]
    pub reflection: String,
}

impl EntryContent {
    /// Decode stored content, migrating the legacy flat shape where needed.
    ///
    /// This is the only place that branches on the historical schema: rows
    /// written by the earliest app version carried flat fields (`article`,
    /// `python_code`, `sql_code`, `wisdom`, `english_words`, `mini_project`)
    /// instead of the `categories` map. Anything unrecognizable decodes to an
    /// empty content value rather than an error.
    pub fn from_json_str(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };

        if value.get("categories").is_none() && is_legacy_shape(&value) {
            return Self::from_legacy(&value);
        }

        serde_json::from_value(value).unwrap_or_default()
    }

    /// Migrate a legacy flat record into the canonical shape.
    fn from_legacy(value: &Value) -> Self {
        let mut content = Self::default();

        let article: MediaItem = field(value, "article");
        if !article.title.is_empty() || !article.url.is_empty() {
            content
                .categories
                .entry("reading".to_string())
                .or_default()
                .articles
                .push(article);
        }

        for (key, language) in [("python_code", "python"), ("sql_code", "sql")] {
            let code = value.get(key).and_then(Value::as_str).unwrap_or_default();
            if !code.is_empty() {
                content
                    .categories
                    .entry("coding".to_string())
                    .or_default()
                    .questions
                    .push(CodingQuestion {
                        prompt: String::new(),
                        language: language.to_string(),
                        solution: code.to_string(),
                    });
            }
        }

        let project: LegacyProject = field(value, "mini_project");
        if !project.name.is_empty() {
            content
                .categories
                .entry("projects".to_string())
                .or_default()
                .items
                .push(WorkItem {
                    name: project.name,
                    status: project.status,
                    notes: project.progress,
                });
        }

        content.vocabulary = field(value, "english_words");

        let wisdom: LegacyWisdom = field(value, "wisdom");
        if !wisdom.text.is_empty() {
            content.reflection = if wisdom.source.is_empty() {
                wisdom.text
            } else {
                format!("{} ({})", wisdom.text, wisdom.source)
            };
        }

        content
    }
}

fn is_legacy_shape(value: &Value) -> bool {
    const LEGACY_KEYS: [&str; 6] = [
        "article",
        "python_code",
        "sql_code",
        "wisdom",
        "english_words",
        "mini_project",
    ];

    LEGACY_KEYS.iter().any(|key| value.get(key).is_some())
}

fn field<T: Default + for<'de> Deserialize<'de>>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .cloned()
        .map(|v| serde_json::from_value(v).unwrap_or_default())
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct LegacyWisdom {
    #[serde(default)]
    text: String,
    #[serde(default)]
    source: String,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyProject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    progress: String,
    #[serde(default)]
    status: String,
}

/// One user's logged learning activity for one calendar date.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub content: EntryContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbEntry {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub date: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbEntry> for Entry {
    fn from(entry: DbEntry) -> Self {
        Self {
            id: entry.id.unwrap_or_default(),
            user_id: entry.user_id.unwrap_or_default(),
            date: entry
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .unwrap_or_default(),
            content: EntryContent::from_json_str(entry.content.as_deref().unwrap_or_default()),
            created_at: to_utc(entry.created_at),
            updated_at: to_utc(entry.updated_at),
        }
    }
}

/// An admin-authored daily challenge.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbChallenge {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbChallenge> for Challenge {
    fn from(challenge: DbChallenge) -> Self {
        Self {
            id: challenge.id.unwrap_or_default(),
            title: challenge.title.unwrap_or_default(),
            description: challenge.description.unwrap_or_default(),
            category: challenge.category.unwrap_or_default(),
            created_by: challenge.created_by.unwrap_or_default(),
            created_at: to_utc(challenge.created_at),
        }
    }
}

/// A user finished a challenge. At most one per (user, challenge).
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCompletion {
    pub id: Option<i64>,
    pub challenge_id: Option<i64>,
    pub user_id: Option<i64>,
    pub completed_at: Option<NaiveDateTime>,
}

impl From<DbCompletion> for Completion {
    fn from(completion: DbCompletion) -> Self {
        Self {
            id: completion.id.unwrap_or_default(),
            challenge_id: completion.challenge_id.unwrap_or_default(),
            user_id: completion.user_id.unwrap_or_default(),
            completed_at: to_utc(completion.completed_at),
        }
    }
}

/// Work submitted against a challenge. There is no uniqueness constraint;
/// a user may submit any number of times.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: i64,
    pub notes: String,
    pub file_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbSubmission {
    pub id: Option<i64>,
    pub challenge_id: Option<i64>,
    pub user_id: Option<i64>,
    pub notes: Option<String>,
    pub file_url: Option<String>,
    pub submitted_at: Option<NaiveDateTime>,
}

impl From<DbSubmission> for Submission {
    fn from(submission: DbSubmission) -> Self {
        Self {
            id: submission.id.unwrap_or_default(),
            challenge_id: submission.challenge_id.unwrap_or_default(),
            user_id: submission.user_id.unwrap_or_default(),
            notes: submission.notes.unwrap_or_default(),
            file_url: submission.file_url,
            submitted_at: to_utc(submission.submitted_at),
        }
    }
}

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

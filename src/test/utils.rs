#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::{
        create_challenge, create_user, update_user_interests, upsert_entry,
    };
    use crate::error::AppError;
    use crate::models::{
        CategoryRecord, CodingQuestion, EntryContent, MediaItem, VocabularyWord, WorkItem,
    };
    use chrono::{Days, NaiveDate, Utc};
    use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        entries: Vec<TestEntry>,
        challenges: Vec<TestChallenge>,
    }

    pub struct TestUser {
        pub username: String,
        pub display_name: Option<String>,
        pub role: Role,
        pub password: String,
        pub interests: Vec<String>,
    }

    pub struct TestEntry {
        pub username: String,
        pub date: NaiveDate,
        pub content: EntryContent,
    }

    pub struct TestChallenge {
        pub title: String,
        pub description: String,
        pub category: String,
        pub creator_username: Option<String>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn learner(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Learner,
                password: STANDARD_PASSWORD.to_string(),
                interests: Vec::new(),
            });
            self
        }

        pub fn admin(mut self, username: &str, display_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: display_name.map(String::from),
                role: Role::Admin,
                password: STANDARD_PASSWORD.to_string(),
                interests: Vec::new(),
            });
            self
        }

        pub fn interests(mut self, username: &str, interests: &[&str]) -> Self {
            if let Some(user) = self.users.iter_mut().find(|u| u.username == username) {
                user.interests = interests.iter().map(|s| s.to_string()).collect();
            }
            self
        }

        /// Entry dated `days_ago` days before today (0 = today).
        pub fn entry(mut self, username: &str, days_ago: u64, content: EntryContent) -> Self {
            let date = Utc::now().date_naive() - Days::new(days_ago);
            self.entries.push(TestEntry {
                username: username.to_string(),
                date,
                content,
            });
            self
        }

        pub fn entry_on(mut self, username: &str, date: NaiveDate, content: EntryContent) -> Self {
            self.entries.push(TestEntry {
                username: username.to_string(),
                date,
                content,
            });
            self
        }

        pub fn challenge(
            mut self,
            title: &str,
            description: &str,
            category: &str,
            creator_username: Option<&str>,
        ) -> Self {
            self.challenges.push(TestChallenge {
                title: title.to_string(),
                description: description.to_string(),
                category: category.to_string(),
                creator_username: creator_username.map(String::from),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            // A single connection keeps every query on the same in-memory
            // database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            crate::database::migrate_database_declaratively(
                pool.clone(),
                crate::database::CURRENT_SCHEMA,
                false,
            )
            .await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut challenge_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let role_str = match user.role {
                    Role::Learner => "learner",
                    Role::Admin => "admin",
                };

                let user_id = create_user(
                    &pool,
                    &user.username,
                    &user.password,
                    role_str,
                    user.display_name.as_deref(),
                )
                .await?;

                if !user.interests.is_empty() {
                    update_user_interests(&pool, user_id, &user.interests).await?;
                }

                user_id_map.insert(user.username.clone(), user_id);
            }

            for entry in &self.entries {
                let user_id = user_id_map
                    .get(&entry.username)
                    .copied()
                    .ok_or_else(|| AppError::NotFound(entry.username.clone()))?;

                upsert_entry(&pool, user_id, entry.date, &entry.content).await?;
            }

            for challenge in &self.challenges {
                let creator_id = match &challenge.creator_username {
                    Some(name) => user_id_map.get(name).copied(),
                    None => self
                        .users
                        .iter()
                        .find(|u| matches!(u.role, Role::Admin))
                        .map(|u| user_id_map[&u.username]),
                };

                if let Some(creator_id) = creator_id {
                    let challenge_id = create_challenge(
                        &pool,
                        &challenge.title,
                        &challenge.description,
                        &challenge.category,
                        creator_id,
                    )
                    .await?;

                    challenge_id_map.insert(challenge.title.clone(), challenge_id);
                }
            }

            Ok(TestDb {
                pool,
                user_id_map,
                challenge_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub challenge_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn challenge_id(&self, title: &str) -> Option<i64> {
            self.challenge_id_map.get(title).copied()
        }
    }

    /// Content with the given number of coding questions, articles and
    /// vocabulary words.
    pub fn content_with(coding: usize, articles: usize, words: usize) -> EntryContent {
        let mut content = EntryContent::default();

        if coding > 0 {
            let record = CategoryRecord {
                questions: (0..coding)
                    .map(|i| CodingQuestion {
                        prompt: format!("Exercise {}", i + 1),
                        language: "python".to_string(),
                        solution: "print('ok')".to_string(),
                    })
                    .collect(),
                ..Default::default()
            };
            content.categories.insert("coding".to_string(), record);
        }

        if articles > 0 {
            let record = CategoryRecord {
                articles: (0..articles)
                    .map(|i| MediaItem {
                        title: format!("Article {}", i + 1),
                        url: String::new(),
                        notes: String::new(),
                    })
                    .collect(),
                ..Default::default()
            };
            content.categories.insert("reading".to_string(), record);
        }

        content.vocabulary = (0..words)
            .map(|i| VocabularyWord {
                word: format!("word{}", i + 1),
                meaning: format!("meaning{}", i + 1),
            })
            .collect();

        content
    }

    pub fn content_with_items(category: &str, items: usize) -> EntryContent {
        let mut content = EntryContent::default();
        let record = CategoryRecord {
            items: (0..items)
                .map(|i| WorkItem {
                    name: format!("Item {}", i + 1),
                    status: "in-progress".to_string(),
                    notes: String::new(),
                })
                .collect(),
            ..Default::default()
        };
        content.categories.insert(category.to_string(), record);
        content
    }
}

#[cfg(test)]
pub mod test_client {
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use super::test_db::{TestDb, TestDbBuilder, content_with};

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = crate::init_rocket(test_db.pool.clone()).await;
        // Untracked: every request carries its cookies explicitly.
        let client = Client::untracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub async fn login_test_user(
        client: &Client,
        username: &str,
        password: &str,
    ) -> Vec<Cookie<'static>> {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": username,
                    "password": password
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);

        response
            .cookies()
            .iter()
            .map(|c| c.clone().into_owned())
            .collect()
    }

    /// Admin, learner with interests, a few entries and one challenge.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin_user", Some("Admin User"))
            .learner("learner_user", Some("Learner User"))
            .interests("learner_user", &["python", "articles"])
            .entry("learner_user", 0, content_with(2, 0, 3))
            .entry("learner_user", 1, content_with(0, 1, 0))
            .challenge(
                "Build a CLI tool",
                "Write a small command line tool in any language",
                "coding",
                Some("admin_user"),
            )
            .build()
            .await
            .expect("Failed to build test DB")
    }
}

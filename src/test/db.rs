#[cfg(test)]
mod tests {
    use chrono::{Days, Utc};
    use rocket::tokio;

    use crate::auth::Role;
    use crate::db::{
        complete_challenge, create_submission, create_user, delete_challenge, ensure_admin_user,
        find_user_by_username, get_completions_for_challenge, get_entries_for_user, get_entry,
        get_submissions_for_challenge, update_user_interests, upsert_entry,
    };
    use crate::error::AppError;
    use crate::test::utils::test_db::{TestDbBuilder, content_with};

    #[tokio::test]
    async fn test_create_and_find_user() {
        let test_db = TestDbBuilder::new().build().await.expect("build test db");

        create_user(
            &test_db.pool,
            "test_user",
            "password123",
            "learner",
            Some("Test User"),
        )
        .await
        .expect("Failed to create test user");

        let user = find_user_by_username(&test_db.pool, "test_user")
            .await
            .expect("Failed to get user");

        match user {
            Some(user) => {
                assert_eq!(user.username, "test_user");
                assert_eq!(user.role, Role::Learner);
                assert_eq!(user.display_name, "Test User");
            }
            _ => panic!("User wasn't created"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let test_db = TestDbBuilder::new()
            .learner("taken", None)
            .build()
            .await
            .expect("build test db");

        let result = create_user(&test_db.pool, "taken", "password123", "learner", None).await;

        match result {
            Err(AppError::Validation(msg)) => assert!(msg.contains("taken")),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interests_round_trip() {
        let test_db = TestDbBuilder::new()
            .learner("learner_user", None)
            .build()
            .await
            .expect("build test db");

        let user_id = test_db.user_id("learner_user").expect("user id");

        let interests = vec!["python".to_string(), "n8n".to_string()];
        update_user_interests(&test_db.pool, user_id, &interests)
            .await
            .expect("update interests");

        let user = find_user_by_username(&test_db.pool, "learner_user")
            .await
            .expect("get user")
            .expect("user exists");

        assert_eq!(user.interests, interests);
    }

    #[tokio::test]
    async fn test_entry_upsert_overwrites_same_date() {
        let test_db = TestDbBuilder::new()
            .learner("learner_user", None)
            .build()
            .await
            .expect("build test db");

        let user_id = test_db.user_id("learner_user").expect("user id");
        let date = Utc::now().date_naive();

        let first_id = upsert_entry(&test_db.pool, user_id, date, &content_with(1, 0, 0))
            .await
            .expect("first save");

        let second_id = upsert_entry(&test_db.pool, user_id, date, &content_with(3, 1, 2))
            .await
            .expect("second save");

        assert_eq!(first_id, second_id, "Upsert must keep the same row");

        let entries = get_entries_for_user(&test_db.pool, user_id)
            .await
            .expect("list entries");
        assert_eq!(entries.len(), 1);

        let entry = get_entry(&test_db.pool, user_id, date)
            .await
            .expect("get entry");
        assert_eq!(entry.content, content_with(3, 1, 2));
    }

    #[tokio::test]
    async fn test_entries_ordered_by_date_descending() {
        let today = Utc::now().date_naive();

        let test_db = TestDbBuilder::new()
            .learner("learner_user", None)
            .entry_on("learner_user", today - Days::new(2), content_with(1, 0, 0))
            .entry_on("learner_user", today, content_with(1, 0, 0))
            .entry_on("learner_user", today - Days::new(1), content_with(1, 0, 0))
            .build()
            .await
            .expect("build test db");

        let user_id = test_db.user_id("learner_user").expect("user id");

        let entries = get_entries_for_user(&test_db.pool, user_id)
            .await
            .expect("list entries");

        let dates: Vec<_> = entries.iter().map(|e| e.date).collect();
        assert_eq!(
            dates,
            vec![today, today - Days::new(1), today - Days::new(2)]
        );
    }

    #[tokio::test]
    async fn test_complete_challenge_once_per_user() {
        let test_db = TestDbBuilder::new()
            .admin("admin_user", None)
            .learner("learner_user", None)
            .challenge("Daily quiz", "Answer today's quiz", "coding", None)
            .build()
            .await
            .expect("build test db");

        let challenge_id = test_db.challenge_id("Daily quiz").expect("challenge id");
        let user_id = test_db.user_id("learner_user").expect("user id");

        let first = complete_challenge(&test_db.pool, challenge_id, user_id)
            .await
            .expect("first completion");
        let second = complete_challenge(&test_db.pool, challenge_id, user_id)
            .await
            .expect("repeat completion");

        assert_eq!(first, second, "Repeat completion must reuse the record");

        let completions = get_completions_for_challenge(&test_db.pool, challenge_id)
            .await
            .expect("list completions");
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].user_id, user_id);
    }

    #[tokio::test]
    async fn test_complete_missing_challenge_fails() {
        let test_db = TestDbBuilder::new()
            .learner("learner_user", None)
            .build()
            .await
            .expect("build test db");

        let user_id = test_db.user_id("learner_user").expect("user id");

        let result = complete_challenge(&test_db.pool, 9999, user_id).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_multiple_submissions_allowed() {
        let test_db = TestDbBuilder::new()
            .admin("admin_user", None)
            .learner("learner_user", None)
            .challenge("Daily quiz", "Answer today's quiz", "coding", None)
            .build()
            .await
            .expect("build test db");

        let challenge_id = test_db.challenge_id("Daily quiz").expect("challenge id");
        let user_id = test_db.user_id("learner_user").expect("user id");

        create_submission(&test_db.pool, challenge_id, user_id, "first try", None)
            .await
            .expect("first submission");
        create_submission(
            &test_db.pool,
            challenge_id,
            user_id,
            "second try",
            Some("uploads/learner/quiz.py"),
        )
        .await
        .expect("second submission");

        let submissions = get_submissions_for_challenge(&test_db.pool, challenge_id)
            .await
            .expect("list submissions");

        assert_eq!(submissions.len(), 2);
        assert!(submissions.iter().any(|s| s.notes == "first try"));
        assert!(
            submissions
                .iter()
                .any(|s| s.file_url.as_deref() == Some("uploads/learner/quiz.py"))
        );
    }

    #[tokio::test]
    async fn test_delete_challenge_cascades() {
        let test_db = TestDbBuilder::new()
            .admin("admin_user", None)
            .learner("learner_user", None)
            .challenge("Daily quiz", "Answer today's quiz", "coding", None)
            .build()
            .await
            .expect("build test db");

        let challenge_id = test_db.challenge_id("Daily quiz").expect("challenge id");
        let user_id = test_db.user_id("learner_user").expect("user id");

        complete_challenge(&test_db.pool, challenge_id, user_id)
            .await
            .expect("complete");
        create_submission(&test_db.pool, challenge_id, user_id, "my work", None)
            .await
            .expect("submit");

        delete_challenge(&test_db.pool, challenge_id)
            .await
            .expect("delete challenge");

        let completions = get_completions_for_challenge(&test_db.pool, challenge_id)
            .await
            .expect("list completions");
        let submissions = get_submissions_for_challenge(&test_db.pool, challenge_id)
            .await
            .expect("list submissions");

        assert!(completions.is_empty(), "Completions must be cascade-deleted");
        assert!(submissions.is_empty(), "Submissions must be cascade-deleted");
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_admin_bootstrap_creates_user() {
        let test_db = TestDbBuilder::new().build().await.expect("build test db");

        temp_env::async_with_vars(
            [
                ("ADMIN_USERNAME", Some("boot_admin")),
                ("ADMIN_PASSWORD", Some("bootpassword")),
            ],
            async {
                ensure_admin_user(&test_db.pool).await.expect("bootstrap");

                let user = find_user_by_username(&test_db.pool, "boot_admin")
                    .await
                    .expect("get user")
                    .expect("admin created");
                assert_eq!(user.role, Role::Admin);
            },
        )
        .await;
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_admin_bootstrap_promotes_existing_user() {
        let test_db = TestDbBuilder::new()
            .learner("promoted", None)
            .build()
            .await
            .expect("build test db");

        temp_env::async_with_vars(
            [
                ("ADMIN_USERNAME", Some("promoted")),
                ("ADMIN_PASSWORD", Some("ignoredpassword")),
            ],
            async {
                ensure_admin_user(&test_db.pool).await.expect("bootstrap");

                let user = find_user_by_username(&test_db.pool, "promoted")
                    .await
                    .expect("get user")
                    .expect("user exists");
                assert_eq!(user.role, Role::Admin);
            },
        )
        .await;
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn test_admin_bootstrap_skips_without_credentials() {
        let test_db = TestDbBuilder::new().build().await.expect("build test db");

        temp_env::async_with_vars(
            [("ADMIN_USERNAME", None::<&str>), ("ADMIN_PASSWORD", None)],
            async {
                ensure_admin_user(&test_db.pool).await.expect("bootstrap");

                let users = crate::db::get_all_users(&test_db.pool)
                    .await
                    .expect("list users");
                assert!(users.is_empty());
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_legacy_entry_content_is_migrated_on_read() {
        let test_db = TestDbBuilder::new()
            .learner("learner_user", None)
            .build()
            .await
            .expect("build test db");

        let user_id = test_db.user_id("learner_user").expect("user id");
        let date = Utc::now().date_naive();

        // Simulate a row written by the earliest app version.
        sqlx::query("INSERT INTO entries (user_id, date, content) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(r#"{"python_code": "x = 1", "english_words": [{"word": "w", "meaning": "m"}]}"#)
            .execute(&test_db.pool)
            .await
            .expect("insert legacy row");

        let entry = get_entry(&test_db.pool, user_id, date)
            .await
            .expect("get entry");

        let coding = entry.content.categories.get("coding").expect("coding");
        assert_eq!(coding.questions.len(), 1);
        assert_eq!(entry.content.vocabulary.len(), 1);
    }
}

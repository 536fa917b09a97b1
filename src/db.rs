use crate::{
    auth::{DbUser, DbUserSession, User, UserSession},
    error::AppError,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::models::{
    Challenge, Completion, DbChallenge, DbCompletion, DbEntry, DbSubmission, Entry, EntryContent,
    Submission,
};

const USER_COLUMNS: &str = "id, username, role, display_name, interests, archived";

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument(skip_all, fields(username, role))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing_user = sqlx::query("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing_user.is_some() {
        return Err(AppError::Validation(format!(
            "Username '{}' already exists",
            username
        )));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users (username, password, role, display_name) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(hashed_password)
    .bind(role)
    .bind(display_name.unwrap_or(username))
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let stored: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    match stored {
        Some((id, hash)) => match bcrypt::verify(password, &hash) {
            Ok(true) => Ok(Some(get_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument]
pub async fn update_user_display_name(
    pool: &Pool<Sqlite>,
    user_id: i64,
    display_name: &str,
) -> Result<(), AppError> {
    info!("Updating user display name");
    sqlx::query("UPDATE users SET display_name = ? WHERE id = ?")
        .bind(display_name)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_interests(
    pool: &Pool<Sqlite>,
    user_id: i64,
    interests: &[String],
) -> Result<(), AppError> {
    info!("Updating user interests");
    let encoded = serde_json::to_string(interests)?;

    sqlx::query("UPDATE users SET interests = ? WHERE id = ?")
        .bind(encoded)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip_all, fields(user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = bcrypt::hash(new_password, bcrypt::DEFAULT_COST)?;

    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn update_username(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_username: &str,
) -> Result<(), AppError> {
    info!("Updating user username");
    let existing = sqlx::query("SELECT id FROM users WHERE username = ? AND id != ?")
        .bind(new_username)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Validation("Username already exists".to_string()));
    }

    sqlx::query("UPDATE users SET username = ? WHERE id = ?")
        .bind(new_username)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn update_user_role(
    pool: &Pool<Sqlite>,
    user_id: i64,
    role: &str,
) -> Result<(), AppError> {
    info!("Updating user role");
    sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn set_user_archived(
    pool: &Pool<Sqlite>,
    user_id: i64,
    archive: bool,
) -> Result<bool, AppError> {
    info!("Toggling user archived status");

    sqlx::query("UPDATE users SET archived = ? WHERE id = ?")
        .bind(archive)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(archive)
}

#[instrument]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    let rows = sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users", USER_COLUMNS))
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

/// Bootstrap the admin account from the environment. The admin is a role
/// flag on an ordinary user row, never a credential baked into source; this
/// is the only path that grants the role outside the admin API.
#[instrument(skip_all)]
pub async fn ensure_admin_user(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    let (username, password) = match (
        std::env::var("ADMIN_USERNAME"),
        std::env::var("ADMIN_PASSWORD"),
    ) {
        (Ok(username), Ok(password)) if !username.is_empty() => (username, password),
        _ => {
            info!("No admin bootstrap credentials configured, skipping");
            return Ok(());
        }
    };

    match find_user_by_username(pool, &username).await? {
        Some(user) => {
            if user.role.as_str() != "admin" {
                update_user_role(pool, user.id, "admin").await?;
                info!(username = %username, "Promoted existing user to admin");
            }
        }
        None => {
            create_user(pool, &username, &password, "admin", None).await?;
            info!(username = %username, "Created admin user");
        }
    }

    Ok(())
}

#[instrument(skip(pool, content))]
pub async fn upsert_entry(
    pool: &Pool<Sqlite>,
    user_id: i64,
    date: NaiveDate,
    content: &EntryContent,
) -> Result<i64, AppError> {
    info!("Upserting entry");
    let encoded = serde_json::to_string(content)?;
    let now = Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO entries (user_id, date, content, updated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (user_id, date)
         DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(encoded)
    .bind(now)
    .execute(pool)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM entries WHERE user_id = ? AND date = ?")
        .bind(user_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_one(pool)
        .await?;

    Ok(id)
}

#[instrument]
pub async fn get_entry(
    pool: &Pool<Sqlite>,
    user_id: i64,
    date: NaiveDate,
) -> Result<Entry, AppError> {
    info!("Getting entry");
    let row = sqlx::query_as::<_, DbEntry>("SELECT * FROM entries WHERE user_id = ? AND date = ?")
        .bind(user_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(entry) => Ok(Entry::from(entry)),
        _ => Err(AppError::NotFound(format!(
            "No entry for {} on {}",
            user_id, date
        ))),
    }
}

#[instrument]
pub async fn get_entries_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<Entry>, AppError> {
    info!("Getting entries for user");
    let rows = sqlx::query_as::<_, DbEntry>(
        "SELECT * FROM entries
         WHERE user_id = ?
         ORDER BY date DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Entry::from).collect())
}

#[instrument]
pub async fn create_challenge(
    pool: &Pool<Sqlite>,
    title: &str,
    description: &str,
    category: &str,
    created_by: i64,
) -> Result<i64, AppError> {
    info!("Creating challenge");
    let res = sqlx::query(
        "INSERT INTO challenges (title, description, category, created_by)
         VALUES (?, ?, ?, ?)",
    )
    .bind(title)
    .bind(description)
    .bind(category)
    .bind(created_by)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn update_challenge(
    pool: &Pool<Sqlite>,
    challenge_id: i64,
    title: &str,
    description: &str,
    category: &str,
) -> Result<(), AppError> {
    info!("Updating challenge");
    sqlx::query(
        "UPDATE challenges
         SET title = ?, description = ?, category = ?
         WHERE id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(category)
    .bind(challenge_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Deleting a challenge removes its completions and submissions with it.
/// The cascade is explicit so it holds regardless of per-connection
/// foreign-key pragmas.
#[instrument]
pub async fn delete_challenge(pool: &Pool<Sqlite>, challenge_id: i64) -> Result<(), AppError> {
    info!("Deleting challenge");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM challenge_completions WHERE challenge_id = ?")
        .bind(challenge_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM challenge_submissions WHERE challenge_id = ?")
        .bind(challenge_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM challenges WHERE id = ?")
        .bind(challenge_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn get_all_challenges(pool: &Pool<Sqlite>) -> Result<Vec<Challenge>, AppError> {
    info!("Getting all challenges");
    let rows = sqlx::query_as::<_, DbChallenge>(
        "SELECT * FROM challenges
         ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Challenge::from).collect())
}

#[instrument]
pub async fn get_challenge(pool: &Pool<Sqlite>, challenge_id: i64) -> Result<Challenge, AppError> {
    info!("Getting challenge");
    let row = sqlx::query_as::<_, DbChallenge>("SELECT * FROM challenges WHERE id = ?")
        .bind(challenge_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(challenge) => Ok(Challenge::from(challenge)),
        _ => Err(AppError::NotFound(format!(
            "Challenge with id {} not found in database",
            challenge_id
        ))),
    }
}

/// Marking a challenge complete is once-per-user: a repeat request hands
/// back the existing completion instead of inserting a duplicate.
#[instrument]
pub async fn complete_challenge(
    pool: &Pool<Sqlite>,
    challenge_id: i64,
    user_id: i64,
) -> Result<i64, AppError> {
    info!("Marking challenge complete");

    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM challenge_completions WHERE challenge_id = ? AND user_id = ?",
    )
    .bind(challenge_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if let Some(id) = exists {
        return Ok(id);
    }

    let res = sqlx::query(
        "INSERT INTO challenge_completions (challenge_id, user_id)
         SELECT c.id, ? FROM challenges c WHERE c.id = ?",
    )
    .bind(user_id)
    .bind(challenge_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Challenge with id {} not found in database",
            challenge_id
        )));
    }

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_completions_for_challenge(
    pool: &Pool<Sqlite>,
    challenge_id: i64,
) -> Result<Vec<Completion>, AppError> {
    info!("Getting completions for challenge");
    let rows = sqlx::query_as::<_, DbCompletion>(
        "SELECT * FROM challenge_completions
         WHERE challenge_id = ?
         ORDER BY completed_at DESC",
    )
    .bind(challenge_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Completion::from).collect())
}

#[instrument(skip(pool, notes, file_url))]
pub async fn create_submission(
    pool: &Pool<Sqlite>,
    challenge_id: i64,
    user_id: i64,
    notes: &str,
    file_url: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating submission");

    get_challenge(pool, challenge_id).await?;

    let res = sqlx::query(
        "INSERT INTO challenge_submissions (challenge_id, user_id, notes, file_url)
         VALUES (?, ?, ?, ?)",
    )
    .bind(challenge_id)
    .bind(user_id)
    .bind(notes)
    .bind(file_url)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_submissions_for_challenge(
    pool: &Pool<Sqlite>,
    challenge_id: i64,
) -> Result<Vec<Submission>, AppError> {
    info!("Getting submissions for challenge");
    let rows = sqlx::query_as::<_, DbSubmission>(
        "SELECT * FROM challenge_submissions
         WHERE challenge_id = ?
         ORDER BY submitted_at DESC",
    )
    .bind(challenge_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Submission::from).collect())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

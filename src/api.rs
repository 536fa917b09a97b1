use chrono::{Days, NaiveDate, Utc};
use rocket::State;
use rocket::http::{ContentType, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::UserSession;
use crate::auth::{Permission, User};
use crate::db::{
    authenticate_user, complete_challenge, create_challenge, create_submission, create_user,
    create_user_session, delete_challenge, find_user_by_username, get_all_challenges,
    get_all_users, get_challenge, get_completions_for_challenge, get_entries_for_user, get_entry,
    get_submissions_for_challenge, invalidate_session, set_user_archived, update_challenge,
    update_user_display_name, update_user_interests, update_user_password, update_user_role,
    update_username, upsert_entry,
};
use crate::models::{Challenge, Completion, Entry, EntryContent, Submission};
use crate::stats::{LearningStats, compute_stats};
use crate::validation::AppErrorExt;
use crate::validation::JsonValidateExt;
use crate::validation::PermissionCheckExt;
use crate::validation::ValidationResponse;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<UserData>,
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub interests: Vec<String>,
    pub archived: bool,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            role: user.role.to_string(),
            interests: user.interests.clone(),
            archived: user.archived,
        }
    }
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    use rocket::http::{Cookie, SameSite};

    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            // Create session token
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            cookies.add_private(
                Cookie::build(("user_id", user.id.to_string()))
                    .same_site(SameSite::Lax)
                    .http_only(true)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("logged_in", validated.username))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            cookies.add_private(
                Cookie::build(("user_role", user.role.to_string()))
                    .same_site(SameSite::Lax)
                    .max_age(rocket::time::Duration::hours(1)),
            );

            Ok(Json(LoginResponse {
                success: true,
                user: Some(UserData::from(user)),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid username or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    cookies.remove_private(rocket::http::Cookie::build("session_token"));
    cookies.remove_private(rocket::http::Cookie::build("user_id"));
    cookies.remove_private(rocket::http::Cookie::build("logged_in"));
    cookies.remove_private(rocket::http::Cookie::build("user_role"));

    Status::Ok
}

#[get("/me")]
pub async fn api_me(user: User) -> Json<UserData> {
    Json(UserData::from(user))
}

#[get("/me", rank = 2)]
pub async fn api_me_unauthorized() -> Status {
    Status::Unauthorized
}

#[derive(Deserialize, Validate, Clone)]
pub struct UserRegistrationRequest {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    username: String,
    display_name: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
}

// Signup is open; every new account starts as a learner. The admin role is
// only granted through the admin API or the startup bootstrap.
#[post("/register", data = "<registration>")]
pub async fn api_register_user(
    registration: Json<UserRegistrationRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    let existing_user = find_user_by_username(db, &validated.username)
        .await
        .validate_custom()?;

    if existing_user.is_some() {
        return Err(Custom(
            Status::Conflict,
            Json(ValidationResponse::with_error(
                "username",
                "Username already exists",
            )),
        ));
    }

    create_user(
        db,
        &validated.username,
        &validated.password,
        "learner",
        Some(&validated.display_name),
    )
    .await
    .validate_custom()?;

    Ok(Status::Created)
}

#[derive(Deserialize, Validate)]
pub struct PasswordChangeRequest {
    current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    new_password: String,
}

#[post("/change-password", data = "<password>")]
pub async fn api_change_password(
    password: Json<PasswordChangeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    let validated = password.validate_custom()?;

    let is_valid = authenticate_user(db, &user.username, &validated.current_password)
        .await
        .validate_custom()?;

    match is_valid {
        Some(_) => {
            update_user_password(db, user.id, &validated.new_password)
                .await
                .validate_custom()?;

            Ok(Status::Ok)
        }
        _ => Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "current_password",
                "Current password is incorrect",
            )),
        )),
    }
}

#[derive(Deserialize, Validate, Clone)]
pub struct ProfileUpdateRequest {
    display_name: String,
    interests: Option<Vec<String>>,
}

#[put("/profile", data = "<profile>")]
pub async fn api_update_profile(
    profile: Json<ProfileUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Custom<Json<ValidationResponse>>> {
    user.require_permission(Permission::EditOwnProfile)
        .validate_custom()?;

    let validated = profile.validate_custom()?;

    update_user_display_name(db, user.id, &validated.display_name)
        .await
        .validate_custom()?;

    if let Some(interests) = &validated.interests {
        update_user_interests(db, user.id, interests)
            .await
            .validate_custom()?;
    }

    Ok(Status::Ok)
}

#[derive(Serialize, Deserialize)]
pub struct EntryResponse {
    pub date: String,
    pub content: EntryContent,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Entry> for EntryResponse {
    fn from(entry: Entry) -> Self {
        Self {
            date: entry.date.format("%Y-%m-%d").to_string(),
            content: entry.content,
            created_at: entry.created_at.to_rfc3339(),
            updated_at: entry.updated_at.to_rfc3339(),
        }
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, Status> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| Status::BadRequest)
}

#[get("/entries")]
pub async fn api_get_entries(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<EntryResponse>>, Status> {
    let entries = get_entries_for_user(db, user.id).await?;

    Ok(Json(entries.into_iter().map(EntryResponse::from).collect()))
}

#[get("/entries/<date>")]
pub async fn api_get_entry(
    date: &str,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<EntryResponse>, Status> {
    let date = parse_date(date)?;

    let entry = get_entry(db, user.id, date).await?;

    Ok(Json(EntryResponse::from(entry)))
}

// Saving is an upsert on (user, date): the first save for a date inserts,
// every later save overwrites. There is no delete route.
#[put("/entries/<date>", data = "<content>")]
pub async fn api_save_entry(
    date: &str,
    content: Json<EntryContent>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::EditOwnEntries)?;

    let date = parse_date(date)?;

    upsert_entry(db, user.id, date, &content.into_inner()).await?;

    Ok(Status::Ok)
}

#[get("/stats")]
pub async fn api_get_stats(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LearningStats>, Status> {
    let entries = get_entries_for_user(db, user.id).await?;

    let stats = compute_stats(&entries, &user.interests, Utc::now().date_naive());

    Ok(Json(stats))
}

#[get("/export/json")]
pub async fn api_export_json(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<EntryResponse>>, Status> {
    let entries = get_entries_for_user(db, user.id).await?;

    Ok(Json(entries.into_iter().map(EntryResponse::from).collect()))
}

#[get("/export/weekly-report")]
pub async fn api_export_weekly_report(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<(ContentType, String), Status> {
    let entries = get_entries_for_user(db, user.id).await?;
    let today = Utc::now().date_naive();

    let report = build_weekly_report(&entries, &user.interests, today);

    Ok((ContentType::Text, report))
}

/// Plain-text report over the trailing seven days: one block per logged
/// day, then aggregate counts.
pub fn build_weekly_report(entries: &[Entry], interests: &[String], today: NaiveDate) -> String {
    let week_start = today - Days::new(6);
    let week_entries: Vec<&Entry> = entries
        .iter()
        .filter(|e| e.date >= week_start && e.date <= today)
        .collect();

    let mut report = String::new();
    report.push_str("WEEKLY LEARNING REPORT\n");
    report.push_str(&format!("{} - {}\n\n", week_start, today));

    for entry in &week_entries {
        report.push_str(&format!("{}\n", entry.date));
        for (category, record) in &entry.content.categories {
            if record.is_empty() {
                continue;
            }
            let count = record.questions.len()
                + record.articles.len()
                + record.books.len()
                + record.items.len();
            report.push_str(&format!("  {}: {}\n", category, count));
        }
        if !entry.content.vocabulary.is_empty() {
            report.push_str(&format!("  words: {}\n", entry.content.vocabulary.len()));
        }
        if !entry.content.reflection.is_empty() {
            report.push_str(&format!("  reflection: {}\n", entry.content.reflection));
        }
        report.push('\n');
    }

    let week_refs: Vec<Entry> = week_entries.iter().map(|e| (*e).clone()).collect();
    let stats = compute_stats(&week_refs, interests, today);

    report.push_str("STATISTICS\n");
    report.push_str(&format!("  days: {}/7\n", week_entries.len()));
    for (bucket, count) in &stats.buckets {
        report.push_str(&format!("  {}: {}\n", bucket, count));
    }
    report.push_str(&format!("  words: {}\n", stats.total_words));
    report.push_str(&format!("  streak: {}\n", stats.streak));

    report
}

#[derive(Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub created_by: i64,
    pub created_at: String,
}

impl From<Challenge> for ChallengeResponse {
    fn from(challenge: Challenge) -> Self {
        Self {
            id: challenge.id,
            title: challenge.title,
            description: challenge.description,
            category: challenge.category,
            created_by: challenge.created_by,
            created_at: challenge.created_at.to_rfc3339(),
        }
    }
}

#[get("/challenges")]
pub async fn api_get_challenges(
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<ChallengeResponse>>, Status> {
    let challenges = get_all_challenges(db).await?;

    Ok(Json(
        challenges.into_iter().map(ChallengeResponse::from).collect(),
    ))
}

#[get("/challenges/<id>")]
pub async fn api_get_challenge(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ChallengeResponse>, Status> {
    let challenge = get_challenge(db, id).await?;

    Ok(Json(ChallengeResponse::from(challenge)))
}

#[derive(Deserialize, Validate)]
pub struct CreateChallengeRequest {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    title: String,
    description: String,
    category: String,
}

#[post("/challenges", data = "<request>")]
pub async fn api_create_challenge(
    request: Json<CreateChallengeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ChallengeResponse>, Status> {
    user.require_permission(Permission::ManageChallenges)?;

    let validated = request.into_inner();
    if validated.validate().is_err() {
        return Err(Status::UnprocessableEntity);
    }

    let id = create_challenge(
        db,
        &validated.title,
        &validated.description,
        &validated.category,
        user.id,
    )
    .await?;

    let challenge = get_challenge(db, id).await?;

    Ok(Json(ChallengeResponse::from(challenge)))
}

#[derive(Deserialize)]
pub struct ChallengeUpdateRequest {
    title: Option<String>,
    description: Option<String>,
    category: Option<String>,
}

#[put("/challenges/<id>", data = "<request>")]
pub async fn api_update_challenge(
    id: i64,
    request: Json<ChallengeUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::ManageChallenges)?;

    let challenge = get_challenge(db, id).await?;

    let title = request.title.clone().unwrap_or(challenge.title);
    let description = request.description.clone().unwrap_or(challenge.description);
    let category = request.category.clone().unwrap_or(challenge.category);

    update_challenge(db, id, &title, &description, &category).await?;

    Ok(Status::Ok)
}

#[delete("/challenges/<id>")]
pub async fn api_delete_challenge(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::ManageChallenges)?;

    get_challenge(db, id).await?;
    delete_challenge(db, id).await?;

    Ok(Status::Ok)
}

#[derive(Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: i64,
    pub completed_at: String,
}

impl From<Completion> for CompletionResponse {
    fn from(completion: Completion) -> Self {
        Self {
            id: completion.id,
            challenge_id: completion.challenge_id,
            user_id: completion.user_id,
            completed_at: completion.completed_at.to_rfc3339(),
        }
    }
}

#[post("/challenges/<id>/complete")]
pub async fn api_complete_challenge(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::CompleteChallenges)?;

    complete_challenge(db, id, user.id).await?;

    Ok(Status::Ok)
}

#[get("/challenges/<id>/completions")]
pub async fn api_get_challenge_completions(
    id: i64,
    _user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CompletionResponse>>, Status> {
    get_challenge(db, id).await?;

    let completions = get_completions_for_challenge(db, id).await?;

    Ok(Json(
        completions
            .into_iter()
            .map(CompletionResponse::from)
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct SubmissionRequest {
    notes: String,
    file_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub id: i64,
    pub challenge_id: i64,
    pub user_id: i64,
    pub notes: String,
    pub file_url: Option<String>,
    pub submitted_at: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            challenge_id: submission.challenge_id,
            user_id: submission.user_id,
            notes: submission.notes,
            file_url: submission.file_url,
            submitted_at: submission.submitted_at.to_rfc3339(),
        }
    }
}

#[post("/challenges/<id>/submissions", data = "<request>")]
pub async fn api_create_submission(
    id: i64,
    request: Json<SubmissionRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::SubmitChallengeWork)?;

    create_submission(
        db,
        id,
        user.id,
        &request.notes,
        request.file_url.as_deref(),
    )
    .await?;

    Ok(Status::Created)
}

#[get("/challenges/<id>/submissions")]
pub async fn api_get_challenge_submissions(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SubmissionResponse>>, Status> {
    user.require_permission(Permission::ReviewSubmissions)?;

    get_challenge(db, id).await?;

    let submissions = get_submissions_for_challenge(db, id).await?;

    Ok(Json(
        submissions
            .into_iter()
            .map(SubmissionResponse::from)
            .collect(),
    ))
}

#[derive(Deserialize)]
pub struct UserUpdateRequest {
    username: Option<String>,
    display_name: Option<String>,
    password: Option<String>,
    archived: Option<bool>,
    role: Option<String>,
}

#[put("/admin/users/<id>", data = "<update>")]
pub async fn api_update_user(
    id: i64,
    update: Json<UserUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Status, Status> {
    user.require_permission(Permission::EditUserCredentials)?;

    // For role changes, require EditUserRoles permission
    if update.role.is_some() {
        user.require_permission(Permission::EditUserRoles)?;
    }

    if let Some(username) = &update.username {
        update_username(db, id, username).await?;
    }

    if let Some(display_name) = &update.display_name {
        update_user_display_name(db, id, display_name).await?;
    }

    if let Some(password) = &update.password {
        update_user_password(db, id, password).await?;
    }

    if let Some(archived) = update.archived {
        set_user_archived(db, id, archived).await?;
    }

    if let Some(role) = &update.role {
        update_user_role(db, id, role).await?;
    }

    Ok(Status::Ok)
}

#[get("/admin/users")]
pub async fn api_get_all_users(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, Status> {
    user.require_permission(Permission::ViewAllUsers)?;

    let users = get_all_users(db).await?;

    Ok(Json(users.into_iter().map(UserData::from).collect()))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

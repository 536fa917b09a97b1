#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod db;
mod env;
mod error;
mod models;
mod stats;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use std::sync::Mutex;

use api::{
    api_change_password, api_complete_challenge, api_create_challenge, api_create_submission,
    api_delete_challenge, api_export_json, api_export_weekly_report, api_get_all_users,
    api_get_challenge, api_get_challenge_completions, api_get_challenge_submissions,
    api_get_challenges, api_get_entries, api_get_entry, api_get_stats, api_login, api_logout,
    api_me, api_me_unauthorized, api_register_user, api_save_entry, api_update_challenge,
    api_update_profile, api_update_user, health,
};
use auth::unauthorized_api;
use database::{CURRENT_SCHEMA, migrate_database_declaratively};
use db::{clean_expired_sessions, ensure_admin_user};
use rocket::{Build, Rocket, tokio};
use telemetry::{OtelGuard, TelemetryFairing, init_tracing};

use sqlx::SqlitePool;
use tracing::{error, info};

pub static TELEMETRY_GUARD: Mutex<Option<OtelGuard>> = Mutex::new(None);

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:learning_tracker.db?mode=rwc".to_string());

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match migrate_database_declaratively(pool.clone(), CURRENT_SCHEMA, false).await {
        Ok(changed) => {
            if changed {
                info!("Migrations completed successfully");
            } else {
                info!("Database schema already up to date");
            }
        }
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    if let Err(e) = ensure_admin_user(&pool).await {
        error!("Failed to bootstrap admin user: {}", e);
    }

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting learning tracker");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_register_user,
                api_change_password,
                api_update_profile,
                api_get_entries,
                api_get_entry,
                api_save_entry,
                api_get_stats,
                api_export_json,
                api_export_weekly_report,
                api_get_challenges,
                api_get_challenge,
                api_create_challenge,
                api_update_challenge,
                api_delete_challenge,
                api_complete_challenge,
                api_get_challenge_completions,
                api_create_submission,
                api_get_challenge_submissions,
                api_update_user,
                api_get_all_users,
            ],
        )
        .register("/api", catchers![unauthorized_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}

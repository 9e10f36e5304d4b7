use crate::models::{SessionState, Theme};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::{Row, Sqlite, migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions}};
use thiserror::Error;

pub const AUTHENTICATED_KEY: &str = "isAuthenticated";
pub const PROFILE_FILLED_KEY: &str = "isProfileFilled";
pub const EMAIL_KEY: &str = "userEmail";
pub const THEME_KEY: &str = "themeMode";
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key-value storage for client state that must survive restarts.
#[derive(Clone)]
pub struct ClientStorage {
    pool: SqlitePool,
}

impl ClientStorage {
    pub async fn new(db_url: &str) -> Result<Self, StorageError> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating client storage at {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Private storage that disappears with the process.
    pub async fn in_memory() -> Result<Self, StorageError> {
        // Each connection to :memory: is its own database, so keep exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS client_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM client_storage WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    pub async fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO client_storage (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key)
            DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM client_storage WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// JSON value stored under `key`, or `default` if it is missing or unreadable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.get_raw(key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Stored value for '{}' is unreadable, using default: {}", key, e);
                default
            }),
            Ok(None) => default,
            Err(e) => {
                warn!("Failed to read '{}' from storage, using default: {}", key, e);
                default
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(value)?;
        self.set_raw(key, &encoded).await
    }

    pub async fn load_session(&self) -> SessionState {
        SessionState {
            is_authenticated: self.get(AUTHENTICATED_KEY, false).await,
            is_profile_filled: self.get(PROFILE_FILLED_KEY, false).await,
            email: self.get(EMAIL_KEY, None).await,
        }
    }

    pub async fn set_authenticated(&self, value: bool) -> Result<(), StorageError> {
        self.set(AUTHENTICATED_KEY, &value).await
    }

    pub async fn set_profile_filled(&self, value: bool) -> Result<(), StorageError> {
        self.set(PROFILE_FILLED_KEY, &value).await
    }

    pub async fn set_email(&self, email: Option<&str>) -> Result<(), StorageError> {
        self.set(EMAIL_KEY, &email).await
    }

    /// Back to the logged-out defaults. The theme is left alone.
    pub async fn reset_session(&self) -> Result<(), StorageError> {
        self.set_authenticated(false).await?;
        self.set_profile_filled(false).await?;
        self.set_email(None).await?;
        self.remove(ACCESS_TOKEN_KEY).await
    }

    // Theme is stored as the bare word, not JSON
    pub async fn theme(&self) -> Theme {
        match self.get_raw(THEME_KEY).await {
            Ok(Some(raw)) => Theme::parse(&raw),
            Ok(None) => Theme::default(),
            Err(e) => {
                warn!("Failed to read theme, using light: {}", e);
                Theme::default()
            }
        }
    }

    pub async fn toggle_theme(&self) -> Result<Theme, StorageError> {
        let next = self.theme().await.toggled();
        self.set_raw(THEME_KEY, next.as_str()).await?;
        Ok(next)
    }
}

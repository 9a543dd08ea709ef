//! Admin account and session persistence.

use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::Identity;

/// An account row including its password hash.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub identity: Identity,
    pub password_hash: String,
}

/// Database repository for accounts and login sessions.
#[derive(Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find an account by (normalized) email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>, AppError> {
        let row = sqlx::query(
            "SELECT id, email, name, role, password_hash, email_confirmed_at, created_at FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AccountRecord {
            identity: identity_from_row(&row),
            password_hash: row.get("password_hash"),
        }))
    }

    /// Insert a new account. A duplicate email is a validation failure.
    pub async fn create(&self, identity: &Identity, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO accounts (id, email, name, role, password_hash, email_confirmed_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&identity.id)
        .bind(&identity.email)
        .bind(&identity.name)
        .bind(&identity.role)
        .bind(password_hash)
        .bind(&identity.email_confirmed_at)
        .bind(&identity.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(
                AppError::Validation(
                    "A user with this email address has already been registered".to_string(),
                ),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Store a new session token.
    pub async fn create_session(
        &self,
        token: &str,
        account_id: &str,
        created_at: i64,
        expires_at: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (token, account_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token)
        .bind(account_id)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Resolve an unexpired session token to its account.
    pub async fn find_by_session(&self, token: &str, now: i64) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query(
            r#"SELECT a.id, a.email, a.name, a.role, a.email_confirmed_at, a.created_at
               FROM sessions s JOIN accounts a ON a.id = s.account_id
               WHERE s.token = ? AND s.expires_at > ?"#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(identity_from_row))
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop expired sessions; returns how many were removed.
    pub async fn purge_expired_sessions(&self, now: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn identity_from_row(row: &sqlx::sqlite::SqliteRow) -> Identity {
    Identity {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        role: row.get("role"),
        email_confirmed_at: row.get("email_confirmed_at"),
        created_at: row.get("created_at"),
    }
}

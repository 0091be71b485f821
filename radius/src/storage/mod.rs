//! Persistence contract consumed by the authentication and accounting handlers.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;

#[derive(Error, Debug, PartialEq)]
pub enum StorageError {
    #[error("no such session: user={0}, session={1}, nas={2}")]
    NoSuchSessionError(String, String, String),
    #[error("no such user: {0}")]
    NoSuchUserError(String),
    #[error("storage backend failure: {0}")]
    BackendError(String),
}

fn default_simultaneous_use() -> u32 {
    1
}

/// Credential and plan of an end user. Read-only from the handlers' point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub password: String,
    /// Remaining transfer quota in bytes; `None` means unlimited.
    #[serde(default)]
    pub block_remaining: Option<i64>,
    #[serde(default)]
    pub active_until: Option<NaiveDate>,
    #[serde(default = "default_simultaneous_use")]
    pub simultaneous_use: u32,
    #[serde(default)]
    pub dedicated_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub ratelimit: Option<String>,
    #[serde(default)]
    pub dns_one: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns_two: Option<Ipv4Addr>,
}

impl User {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        let in_period = self.active_until.map_or(true, |until| until >= today);
        let has_quota = self.block_remaining.map_or(true, |remain| remain > 0);
        in_period && has_quota
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user: String,
    pub session_id: String,
    pub nas_ip: String,
}

impl SessionKey {
    pub fn new(user: &str, session_id: &str, nas_ip: &str) -> Self {
        SessionKey {
            user: user.to_owned(),
            session_id: session_id.to_owned(),
            nas_ip: nas_ip.to_owned(),
        }
    }
}

/// Cumulative counters as last reported by the NAS.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionCounters {
    pub bytes_in: u32,
    pub bytes_out: u32,
    pub packets_in: u32,
    pub packets_out: u32,
    pub session_time: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub key: SessionKey,
    pub assigned_ip: Ipv4Addr,
    pub client_ip: String,
    pub created_at: DateTime<Utc>,
    pub counters: SessionCounters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountingRow {
    pub user: String,
    /// `YYYY-MM-DD HH:MM` in UTC
    pub date: String,
    pub bytes_in: u32,
    pub bytes_out: u32,
    pub packets_in: u32,
    pub packets_out: u32,
    pub hostname: String,
}

#[async_trait]
pub trait Storage: 'static + Sync + Send {
    async fn get_user(&self, name: &str) -> Result<Option<User>, StorageError>;

    async fn count_active_sessions(&self, name: &str) -> Result<u32, StorageError>;

    async fn session_exists(&self, key: &SessionKey) -> Result<bool, StorageError>;

    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, StorageError>;

    async fn create_session(
        &self,
        key: &SessionKey,
        assigned_ip: Ipv4Addr,
        client_ip: &str,
    ) -> Result<(), StorageError>;

    async fn update_session(
        &self,
        key: &SessionKey,
        counters: &SessionCounters,
    ) -> Result<(), StorageError>;

    /// Copies the live session into the archive.
    async fn archive_session(&self, key: &SessionKey) -> Result<(), StorageError>;

    /// Removes the live session.
    async fn finish_session(&self, key: &SessionKey) -> Result<(), StorageError>;

    async fn insert_accounting_row(&self, row: &AccountingRow) -> Result<(), StorageError>;

    /// Decrements the remaining quota by `used` bytes, never going below zero.
    async fn update_remaining_quota(&self, name: &str, used: u64) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use crate::storage::User;
    use chrono::NaiveDate;

    fn user() -> User {
        serde_json::from_str(r#"{"name": "alice", "password": "secret"}"#).unwrap()
    }

    #[test]
    fn it_should_fill_defaults() {
        let user = user();
        assert_eq!(user.simultaneous_use, 1);
        assert_eq!(user.block_remaining, None);
        assert_eq!(user.dedicated_ip, None);
    }

    #[test]
    fn test_is_active() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();

        let mut user = user();
        assert!(user.is_active(today));

        user.active_until = NaiveDate::from_ymd_opt(2024, 5, 10);
        assert!(user.is_active(today));
        user.active_until = NaiveDate::from_ymd_opt(2024, 5, 9);
        assert!(!user.is_active(today));

        user.active_until = None;
        user.block_remaining = Some(0);
        assert!(!user.is_active(today));
        user.block_remaining = Some(1);
        assert!(user.is_active(today));
    }
}

use std::collections::HashMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::storage::{
    AccountingRow, Session, SessionCounters, SessionKey, Storage, StorageError, User,
};

/// A `Storage` that keeps everything in process memory.
#[derive(Default)]
pub struct MemoryStorage {
    users: RwLock<HashMap<String, User>>,
    sessions: RwLock<HashMap<SessionKey, Session>>,
    archive: RwLock<Vec<Session>>,
    accounting: RwLock<Vec<AccountingRow>>,
}

impl MemoryStorage {
    pub fn new(users: Vec<User>) -> Self {
        let users = users.into_iter().map(|u| (u.name.clone(), u)).collect();
        MemoryStorage {
            users: RwLock::new(users),
            ..Default::default()
        }
    }

    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.name.clone(), user);
    }

    pub async fn archived_sessions(&self) -> Vec<Session> {
        self.archive.read().await.clone()
    }

    pub async fn accounting_rows(&self) -> Vec<AccountingRow> {
        self.accounting.read().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn no_such_session(key: &SessionKey) -> StorageError {
    StorageError::NoSuchSessionError(
        key.user.clone(),
        key.session_id.clone(),
        key.nas_ip.clone(),
    )
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_user(&self, name: &str) -> Result<Option<User>, StorageError> {
        Ok(self.users.read().await.get(name).cloned())
    }

    async fn count_active_sessions(&self, name: &str) -> Result<u32, StorageError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.keys().filter(|k| k.user == name).count() as u32)
    }

    async fn session_exists(&self, key: &SessionKey) -> Result<bool, StorageError> {
        Ok(self.sessions.read().await.contains_key(key))
    }

    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>, StorageError> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn create_session(
        &self,
        key: &SessionKey,
        assigned_ip: Ipv4Addr,
        client_ip: &str,
    ) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(key.clone()).or_insert_with(|| Session {
            key: key.clone(),
            assigned_ip,
            client_ip: client_ip.to_owned(),
            created_at: Utc::now(),
            counters: SessionCounters::default(),
        });
        Ok(())
    }

    async fn update_session(
        &self,
        key: &SessionKey,
        counters: &SessionCounters,
    ) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(key).ok_or_else(|| no_such_session(key))?;
        session.counters = *counters;
        Ok(())
    }

    async fn archive_session(&self, key: &SessionKey) -> Result<(), StorageError> {
        let session = self
            .sessions
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| no_such_session(key))?;
        self.archive.write().await.push(session);
        Ok(())
    }

    async fn finish_session(&self, key: &SessionKey) -> Result<(), StorageError> {
        match self.sessions.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(no_such_session(key)),
        }
    }

    async fn insert_accounting_row(&self, row: &AccountingRow) -> Result<(), StorageError> {
        self.accounting.write().await.push(row.clone());
        Ok(())
    }

    async fn update_remaining_quota(&self, name: &str, used: u64) -> Result<(), StorageError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(name)
            .ok_or_else(|| StorageError::NoSuchUserError(name.to_owned()))?;
        if let Some(remain) = user.block_remaining {
            let used = i64::try_from(used).unwrap_or(i64::MAX);
            user.block_remaining = Some(remain.saturating_sub(used).max(0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::storage::memory::MemoryStorage;
    use crate::storage::{SessionCounters, SessionKey, Storage, StorageError, User};

    fn user(name: &str, block_remaining: Option<i64>) -> User {
        User {
            name: name.to_owned(),
            password: "pw".to_owned(),
            block_remaining,
            active_until: None,
            simultaneous_use: 1,
            dedicated_ip: None,
            ratelimit: None,
            dns_one: None,
            dns_two: None,
        }
    }

    #[tokio::test]
    async fn it_should_manage_session_lifecycle() -> Result<(), StorageError> {
        let storage = MemoryStorage::new(vec![user("alice", None)]);
        let key = SessionKey::new("alice", "s1", "10.0.0.1");
        let ip = Ipv4Addr::new(192, 168, 0, 10);

        assert!(!storage.session_exists(&key).await?);
        storage.create_session(&key, ip, "aa:bb").await?;
        storage.create_session(&key, ip, "aa:bb").await?;
        assert_eq!(storage.count_active_sessions("alice").await?, 1);

        let counters = SessionCounters {
            bytes_in: 10,
            bytes_out: 20,
            packets_in: 1,
            packets_out: 2,
            session_time: 30,
        };
        storage.update_session(&key, &counters).await?;
        assert_eq!(storage.get_session(&key).await?.unwrap().counters, counters);

        storage.archive_session(&key).await?;
        storage.finish_session(&key).await?;
        assert_eq!(storage.count_active_sessions("alice").await?, 0);
        assert_eq!(storage.archived_sessions().await[0].counters, counters);

        assert_eq!(
            storage.finish_session(&key).await,
            Err(StorageError::NoSuchSessionError(
                "alice".to_owned(),
                "s1".to_owned(),
                "10.0.0.1".to_owned()
            ))
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_should_never_drop_quota_below_zero() -> Result<(), StorageError> {
        let storage = MemoryStorage::new(vec![user("bob", Some(100)), user("carol", None)]);

        storage.update_remaining_quota("bob", 40).await?;
        assert_eq!(storage.get_user("bob").await?.unwrap().block_remaining, Some(60));
        storage.update_remaining_quota("bob", 1000).await?;
        assert_eq!(storage.get_user("bob").await?.unwrap().block_remaining, Some(0));

        storage.update_remaining_quota("carol", 1000).await?;
        assert_eq!(storage.get_user("carol").await?.unwrap().block_remaining, None);

        assert_eq!(
            storage.update_remaining_quota("dave", 1).await,
            Err(StorageError::NoSuchUserError("dave".to_owned()))
        );
        Ok(())
    }
}

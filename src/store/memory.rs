use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{RecordStore, StoreError};
use crate::auth::Principal;

/// A user document: principal identifier plus the API keys it owns.
#[derive(Clone, Debug)]
struct UserRecord {
    user_id: String,
    api_keys: Vec<String>,
}

/// Users collection held in memory.
///
/// Clones share the same underlying collection.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl MemoryRecordStore {
    /// Builds a store from `(user_id, api_keys)` pairs.
    pub fn from_users<I, K>(users: I) -> Self
    where
        I: IntoIterator<Item = (String, K)>,
        K: IntoIterator<Item = String>,
    {
        let users = users
            .into_iter()
            .map(|(user_id, keys)| {
                let record = UserRecord {
                    user_id: user_id.clone(),
                    api_keys: keys.into_iter().collect(),
                };
                (user_id, record)
            })
            .collect();

        Self {
            users: Arc::new(RwLock::new(users)),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_principal(&self, api_key: &str) -> Result<Principal, StoreError> {
        let users = self.users.read().await;

        users
            .values()
            .find(|user| user.api_keys.iter().any(|k| k == api_key))
            .map(|user| Principal::new(user.user_id.clone()))
            .ok_or(StoreError::NotFound)
    }
}

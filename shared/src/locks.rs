use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::UserId;

/// Serializes mutations of a single user's record. Different users never
/// contend with each other.
#[derive(Clone, Debug, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>,
}

pub struct UserGuard {
    _guard: OwnedMutexGuard<()>,
}

impl UserLocks {
    pub async fn lock(&self, user_id: UserId) -> UserGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody holds or waits on anymore
            map.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            map.entry(user_id).or_default().clone()
        };

        UserGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::UserLocks;

    #[tokio::test]
    async fn same_user_waits() {
        let locks = UserLocks::default();
        let guard = locks.lock(1).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(blocked.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(50), locks.lock(1)).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn different_users_are_independent() {
        let locks = UserLocks::default();
        let _first = locks.lock(1).await;

        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(2)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = UserLocks::default();
        for user in 0..10 {
            drop(locks.lock(user).await);
        }
        let _guard = locks.lock(100).await;
        assert_eq!(locks.tracked(), 1);
    }
}

//! In-memory durable user store for tests.

use async_trait::async_trait;
use session_service::errors::SessionError;
use chrono::Utc;
use session_service::models::{SortDirection, User, UserChanges, UserFilter, UserOrder};
use session_service::repositories::UserRepository;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory [`UserRepository`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    unavailable: Arc<AtomicBool>,
    lookups_by_id: Arc<AtomicUsize>,
}

impl MockUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user, as an out-of-band store update would.
    pub fn upsert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    /// Make every call fail with `SessionError::Database`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get_user_by_id` calls, i.e. cache-aside fallbacks.
    pub fn lookups_by_id(&self) -> usize {
        self.lookups_by_id.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), SessionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::Database(
                "injected user store failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, SessionError> {
        self.lookups_by_id.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.get(id))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, SessionError> {
        self.check_available()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn create_user(&self, user: &User) -> Result<(), SessionError> {
        self.check_available()?;
        let mut users = self.users.lock().unwrap();
        if users.values().any(|existing| existing.email == user.email) {
            return Err(SessionError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, SessionError> {
        self.check_available()?;
        let mut matching: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|user| filter.role.map_or(true, |role| user.role == role))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare_by(filter.order, a, b).then_with(|| a.id.cmp(&b.id));
            match filter.sort {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        Ok(matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<Option<User>, SessionError> {
        self.check_available()?;
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &changes.email {
            if users
                .values()
                .any(|existing| existing.id != id && &existing.email == email)
            {
                return Err(SessionError::Conflict(
                    "A user with this email already exists".to_string(),
                ));
            }
        }
        Ok(users.get_mut(&id).map(|user| {
            changes.apply_to(user, Utc::now());
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, SessionError> {
        self.check_available()?;
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }
}

fn compare_by(order: UserOrder, a: &User, b: &User) -> CmpOrdering {
    match order {
        UserOrder::Name => a.name.cmp(&b.name),
        UserOrder::Surname => a.surname.cmp(&b.surname),
        UserOrder::Email => a.email.cmp(&b.email),
        UserOrder::CreatedDate => a.created_at.cmp(&b.created_at),
    }
}

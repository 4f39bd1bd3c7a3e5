//! Seams to the collaborators that own users and build requests.
//!
//! The scheduling core only needs point lookups and a single request update, so
//! the traits stay that small. The in-memory implementations back the host
//! process and the tests.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ScheduleError;
use crate::model::BuildRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Builder,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Ulid) -> Result<Option<User>, ScheduleError>;

    async fn user_exists(&self, id: Ulid) -> Result<bool, ScheduleError> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn find_by_id(&self, id: Ulid) -> Result<Option<BuildRequest>, ScheduleError>;

    /// Overwrite the stored request. Fails with `RequestNotFound` if it vanished.
    async fn update(&self, request: &BuildRequest) -> Result<(), ScheduleError>;
}

/// Bound a store call by `timeout`; an expired deadline is reported as
/// `StoreTimeout(op)` and nothing is retried.
pub async fn with_deadline<T, F>(op: &'static str, timeout: Duration, fut: F) -> Result<T, ScheduleError>
where
    F: Future<Output = Result<T, ScheduleError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            metrics::counter!(crate::observability::STORE_TIMEOUTS_TOTAL, "op" => op).increment(1);
            Err(ScheduleError::StoreTimeout(op))
        }
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: DashMap<Ulid, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Ulid) -> Result<Option<User>, ScheduleError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }
}

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: DashMap<Ulid, BuildRequest>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, request: BuildRequest) {
        self.requests.insert(request.id, request);
    }

    pub fn get(&self, id: &Ulid) -> Option<BuildRequest> {
        self.requests.get(id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn find_by_id(&self, id: Ulid) -> Result<Option<BuildRequest>, ScheduleError> {
        Ok(self.get(&id))
    }

    async fn update(&self, request: &BuildRequest) -> Result<(), ScheduleError> {
        match self.requests.get_mut(&request.id) {
            Some(mut stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(ScheduleError::RequestNotFound(request.id)),
        }
    }
}

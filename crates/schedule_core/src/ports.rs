//! crates/schedule_core/src/ports.rs
//!
//! Defines the service contracts (traits) the schedule core relies on.
//! These traits form the boundary of the hexagonal architecture: the core only
//! ever sees these interfaces, never a concrete database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::{
    Caller, Class, ClassType, Record, Scope, Subject, Teacher, TimeBlock, User, UserCredentials,
};
use crate::drafts::{ClassTypeDraft, SubjectDraft, TeacherDraft};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn not_found(kind: &str, id: Uuid) -> Self {
        PortError::NotFound(format!("{kind} {id} not found"))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Read side used by schedule assembly.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Time blocks of `owner` that pass the coarse bounds for `as_of`: started
    /// on or before it, not yet ended, and not excluded by their weekday mask.
    ///
    /// May return blocks that do not actually occur on `as_of`; callers refine.
    async fn find_time_blocks(&self, owner: Uuid, as_of: NaiveDate) -> PortResult<Vec<TimeBlock>>;

    async fn find_class(&self, class_id: Uuid) -> PortResult<Class>;

    async fn find_subject(&self, subject_id: Uuid) -> PortResult<Subject>;

    async fn find_class_type(&self, class_type_id: Uuid) -> PortResult<ClassType>;

    async fn find_teacher(&self, teacher_id: Uuid) -> PortResult<Teacher>;
}

/// Scoped storage for one kind of user-owned record.
#[async_trait]
pub trait RecordStore<T: Record + Send + Sync + 'static>: Send + Sync {
    /// Records visible in `scope`, in creation order.
    async fn list(&self, scope: Scope) -> PortResult<Vec<T>>;

    /// A record visible in `scope`; records outside the scope are `NotFound`.
    async fn get(&self, scope: Scope, id: Uuid) -> PortResult<T>;

    /// Stores a new record. Fails with `Conflict` if the owner already has a
    /// record with the same natural key.
    async fn insert(&self, record: T) -> PortResult<T>;

    /// Replaces the record with `id` visible in `scope` by `record`, which
    /// carries the same id and owner. Natural keys stay unique per owner.
    async fn update(&self, scope: Scope, id: Uuid, record: T) -> PortResult<T>;

    /// Deletes a record visible in `scope`, together with its dependents.
    async fn delete(&self, scope: Scope, id: Uuid) -> PortResult<()>;
}

/// Upsert-by-natural-key for the reference data named when creating a class.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn upsert_subject(&self, owner: Uuid, draft: SubjectDraft) -> PortResult<Subject>;

    async fn upsert_class_type(&self, owner: Uuid, draft: ClassTypeDraft) -> PortResult<ClassType>;

    async fn upsert_teacher(&self, owner: Uuid, draft: TeacherDraft) -> PortResult<Teacher>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        is_staff: bool,
    ) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    // --- Auth Sessions ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Resolves a live session to its caller; unknown or expired sessions are
    /// `Unauthorized`.
    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Caller>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the store ports. It backs the server when no
//! `DATABASE_URL` is configured and gives the HTTP tests a hermetic store.
//!
//! Tables are kept in insertion order, which is the creation order the
//! PostgreSQL adapter sorts by.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use schedule_core::domain::{
    Caller, Class, ClassType, Record, Scope, Subject, Task, Teacher, TimeBlock, User,
    UserCredentials,
};
use schedule_core::drafts::{ClassTypeDraft, Draft, SubjectDraft, TeacherDraft};
use schedule_core::ports::{
    CatalogStore, PortError, PortResult, RecordStore, ScheduleStore, UserStore,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

//=========================================================================================
// Tables
//=========================================================================================

struct StoredUser {
    credentials: UserCredentials,
    created: DateTime<Utc>,
}

impl StoredUser {
    fn to_domain(&self) -> User {
        User {
            user_id: self.credentials.user_id,
            username: self.credentials.username.clone(),
            is_staff: self.credentials.is_staff,
            created: self.created,
        }
    }
}

#[derive(Default)]
pub struct Tables {
    users: Vec<StoredUser>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
    subjects: Vec<Subject>,
    teachers: Vec<Teacher>,
    class_types: Vec<ClassType>,
    classes: Vec<Class>,
    time_blocks: Vec<TimeBlock>,
    tasks: Vec<Task>,
}

impl Tables {
    fn remove_class(&mut self, class_id: Uuid) {
        self.classes.retain(|c| c.id != class_id);
        self.time_blocks.retain(|b| b.class_id != class_id);
        self.tasks.retain(|t| t.class_id != Some(class_id));
    }
}

/// Maps a domain record onto its in-memory table.
pub trait InMemory: Record + Clone + Send + Sync + 'static {
    fn table(tables: &Tables) -> &Vec<Self>;

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self>;

    /// Rejects records pointing at rows that do not exist.
    fn check_references(&self, _tables: &Tables) -> PortResult<()> {
        Ok(())
    }

    /// Removes or detaches dependents of a deleted record.
    fn cascade(_tables: &mut Tables, _id: Uuid) {}
}

fn missing_reference(kind: &str) -> PortError {
    PortError::Conflict(format!("{kind} references a record that does not exist"))
}

impl InMemory for Subject {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.subjects
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.subjects
    }

    fn cascade(tables: &mut Tables, id: Uuid) {
        let orphaned: Vec<Uuid> = tables
            .classes
            .iter()
            .filter(|c| c.subject_id == id)
            .map(|c| c.id)
            .collect();
        for class_id in orphaned {
            tables.remove_class(class_id);
        }
    }
}

impl InMemory for Teacher {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.teachers
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.teachers
    }

    fn cascade(tables: &mut Tables, id: Uuid) {
        for class in tables.classes.iter_mut().filter(|c| c.teacher_id == Some(id)) {
            class.teacher_id = None;
        }
    }
}

impl InMemory for ClassType {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.class_types
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.class_types
    }

    fn cascade(tables: &mut Tables, id: Uuid) {
        for class in tables
            .classes
            .iter_mut()
            .filter(|c| c.class_type_id == Some(id))
        {
            class.class_type_id = None;
        }
    }
}

impl InMemory for Class {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.classes
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.classes
    }

    fn check_references(&self, tables: &Tables) -> PortResult<()> {
        let subject_ok = tables.subjects.iter().any(|s| s.id == self.subject_id);
        let type_ok = self
            .class_type_id
            .map_or(true, |id| tables.class_types.iter().any(|t| t.id == id));
        let teacher_ok = self
            .teacher_id
            .map_or(true, |id| tables.teachers.iter().any(|t| t.id == id));
        if subject_ok && type_ok && teacher_ok {
            Ok(())
        } else {
            Err(missing_reference(Self::KIND))
        }
    }

    fn cascade(tables: &mut Tables, id: Uuid) {
        tables.remove_class(id);
    }
}

impl InMemory for TimeBlock {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.time_blocks
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.time_blocks
    }

    fn check_references(&self, tables: &Tables) -> PortResult<()> {
        if tables.classes.iter().any(|c| c.id == self.class_id) {
            Ok(())
        } else {
            Err(missing_reference(Self::KIND))
        }
    }
}

impl InMemory for Task {
    fn table(tables: &Tables) -> &Vec<Self> {
        &tables.tasks
    }

    fn table_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.tasks
    }

    fn check_references(&self, tables: &Tables) -> PortResult<()> {
        match self.class_id {
            Some(class_id) if !tables.classes.iter().any(|c| c.id == class_id) => {
                Err(missing_reference(Self::KIND))
            }
            _ => Ok(()),
        }
    }
}

//=========================================================================================
// The Store
//=========================================================================================

/// A process-local store; all data is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find<T: InMemory>(&self, scope: Scope, id: Uuid) -> PortResult<T> {
        T::table(&*self.tables.read().await)
            .iter()
            .find(|r| r.id() == id && scope.permits(r.owner()))
            .cloned()
            .ok_or_else(|| PortError::not_found(T::KIND, id))
    }

    /// Returns the owner's record with the draft's natural key, creating it if
    /// there is none yet.
    async fn upsert<D>(&self, owner: Uuid, draft: D) -> PortResult<D::Record>
    where
        D: Draft,
        D::Record: InMemory,
    {
        let record = draft
            .into_record(owner)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let mut tables = self.tables.write().await;
        let table = <D::Record as InMemory>::table_mut(&mut tables);
        if let Some(existing) = table
            .iter()
            .find(|r| r.owner() == owner && r.natural_key() == record.natural_key())
        {
            return Ok(existing.clone());
        }
        table.push(record.clone());
        Ok(record)
    }
}

/// Rejects a record whose natural key another record of the same owner holds.
fn check_key_free<T: InMemory>(tables: &Tables, record: &T) -> PortResult<()> {
    let Some(key) = record.natural_key() else {
        return Ok(());
    };
    let taken = T::table(tables).iter().any(|r| {
        r.id() != record.id() && r.owner() == record.owner() && r.natural_key() == Some(key)
    });
    if taken {
        return Err(PortError::Conflict(format!("{} '{}' already exists", T::KIND, key)));
    }
    Ok(())
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl<T: InMemory> RecordStore<T> for MemoryStore {
    async fn list(&self, scope: Scope) -> PortResult<Vec<T>> {
        Ok(T::table(&*self.tables.read().await)
            .iter()
            .filter(|r| scope.permits(r.owner()))
            .cloned()
            .collect())
    }

    async fn get(&self, scope: Scope, id: Uuid) -> PortResult<T> {
        self.find(scope, id).await
    }

    async fn insert(&self, record: T) -> PortResult<T> {
        let mut tables = self.tables.write().await;
        record.check_references(&tables)?;
        check_key_free(&tables, &record)?;
        T::table_mut(&mut tables).push(record.clone());
        Ok(record)
    }

    async fn update(&self, scope: Scope, id: Uuid, record: T) -> PortResult<T> {
        let mut tables = self.tables.write().await;
        let position = T::table(&tables)
            .iter()
            .position(|r| r.id() == id && scope.permits(r.owner()))
            .ok_or_else(|| PortError::not_found(T::KIND, id))?;
        record.check_references(&tables)?;
        check_key_free(&tables, &record)?;
        T::table_mut(&mut tables)[position] = record.clone();
        Ok(record)
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        let table = T::table_mut(&mut tables);
        let position = table
            .iter()
            .position(|r| r.id() == id && scope.permits(r.owner()))
            .ok_or_else(|| PortError::not_found(T::KIND, id))?;
        table.remove(position);
        T::cascade(&mut tables, id);
        Ok(())
    }
}

//=========================================================================================
// `ScheduleStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn find_time_blocks(&self, owner: Uuid, as_of: NaiveDate) -> PortResult<Vec<TimeBlock>> {
        Ok(self
            .tables
            .read()
            .await
            .time_blocks
            .iter()
            .filter(|b| b.owner == owner && b.within_coarse_bounds(as_of))
            .cloned()
            .collect())
    }

    async fn find_class(&self, class_id: Uuid) -> PortResult<Class> {
        self.find(Scope::All, class_id).await
    }

    async fn find_subject(&self, subject_id: Uuid) -> PortResult<Subject> {
        self.find(Scope::All, subject_id).await
    }

    async fn find_class_type(&self, class_type_id: Uuid) -> PortResult<ClassType> {
        self.find(Scope::All, class_type_id).await
    }

    async fn find_teacher(&self, teacher_id: Uuid) -> PortResult<Teacher> {
        self.find(Scope::All, teacher_id).await
    }
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_subject(&self, owner: Uuid, draft: SubjectDraft) -> PortResult<Subject> {
        self.upsert(owner, draft).await
    }

    async fn upsert_class_type(&self, owner: Uuid, draft: ClassTypeDraft) -> PortResult<ClassType> {
        self.upsert(owner, draft).await
    }

    async fn upsert_teacher(&self, owner: Uuid, draft: TeacherDraft) -> PortResult<Teacher> {
        self.upsert(owner, draft).await
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        is_staff: bool,
    ) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.credentials.username == username)
        {
            return Err(PortError::Conflict("user already exists".to_string()));
        }
        let stored = StoredUser {
            credentials: UserCredentials {
                user_id: Uuid::new_v4(),
                username: username.to_string(),
                hashed_password: hashed_password.to_string(),
                is_staff,
            },
            created: Utc::now(),
        };
        let user = stored.to_domain();
        tables.users.push(stored);
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        self.tables
            .read()
            .await
            .users
            .iter()
            .find(|u| u.credentials.username == username)
            .map(|u| u.credentials.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables
            .read()
            .await
            .users
            .iter()
            .find(|u| u.credentials.user_id == user_id)
            .map(StoredUser::to_domain)
            .ok_or_else(|| PortError::not_found("user", user_id))
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        Ok(self
            .tables
            .read()
            .await
            .users
            .iter()
            .map(StoredUser::to_domain)
            .collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        tables.sessions.retain(|_, (_, expires)| *expires > now);
        tables
            .sessions
            .insert(session_id.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Caller> {
        let tables = self.tables.read().await;
        let (user_id, expires_at) = tables
            .sessions
            .get(session_id)
            .copied()
            .ok_or(PortError::Unauthorized)?;
        if expires_at <= Utc::now() {
            drop(tables);
            self.tables.write().await.sessions.remove(session_id);
            return Err(PortError::Unauthorized);
        }
        let user = tables
            .users
            .iter()
            .find(|u| u.credentials.user_id == user_id)
            .ok_or(PortError::Unauthorized)?;
        Ok(Caller {
            user_id,
            is_staff: user.credentials.is_staff,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.sessions.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use schedule_core::drafts::{ClassDraft, TaskDraft, TimeBlockDraft};

    async fn seeded_class(store: &MemoryStore, owner: Uuid, title: &str) -> Class {
        let subject = store
            .upsert_subject(
                owner,
                SubjectDraft {
                    title: title.to_string(),
                    color: "112233".to_string(),
                },
            )
            .await
            .unwrap();
        let draft = ClassDraft {
            subject: SubjectDraft {
                title: title.to_string(),
                color: "112233".to_string(),
            },
            class_type: None,
            teacher: None,
            location: "Room 1".to_string(),
        };
        store
            .insert(draft.into_class(owner, &subject, None, None))
            .await
            .unwrap()
    }

    fn block_for(class: &Class) -> TimeBlock {
        TimeBlockDraft {
            class_id: class.id,
            recurrence_interval: Some(7),
            days_of_week: None,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: None,
            time_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            time_end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        }
        .into_record(class.owner)
        .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn upsert_returns_the_existing_record() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let draft = SubjectDraft {
            title: "Physics".to_string(),
            color: "ff0000".to_string(),
        };
        let first = store.upsert_subject(owner, draft.clone()).await.unwrap();
        let second = store.upsert_subject(owner, draft.clone()).await.unwrap();
        assert_eq!(first.id, second.id);

        let other = store.upsert_subject(Uuid::new_v4(), draft).await.unwrap();
        assert_ne!(first.id, other.id);
    }

    #[test_log::test(tokio::test)]
    async fn duplicate_natural_keys_conflict() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let draft = SubjectDraft {
            title: "Physics".to_string(),
            color: "ff0000".to_string(),
        };
        store
            .insert(draft.clone().into_record(owner).unwrap())
            .await
            .unwrap();
        let result = store.insert(draft.into_record(owner).unwrap()).await;
        assert!(matches!(result, Err(PortError::Conflict(_))));
    }

    #[test_log::test(tokio::test)]
    async fn scope_hides_foreign_records() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let class = seeded_class(&store, owner, "Chemistry").await;

        let stranger = Scope::Owner(Uuid::new_v4());
        let hidden: PortResult<Class> = store.get(stranger, class.id).await;
        assert!(matches!(hidden, Err(PortError::NotFound(_))));
        let listed: Vec<Class> = store.list(stranger).await.unwrap();
        assert!(listed.is_empty());
        let all: Vec<Class> = store.list(Scope::All).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn deleting_a_subject_removes_its_classes_and_blocks() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let class = seeded_class(&store, owner, "History").await;
        store.insert(block_for(&class)).await.unwrap();
        let task = TaskDraft {
            title: "Essay".to_string(),
            description: None,
            priority: Default::default(),
            is_completed: false,
            class_id: Some(class.id),
            due_date: None,
        }
        .into_record(owner)
        .unwrap();
        store.insert(task).await.unwrap();

        RecordStore::<Subject>::delete(&store, Scope::Owner(owner), class.subject_id)
            .await
            .unwrap();

        let classes: Vec<Class> = store.list(Scope::All).await.unwrap();
        let blocks: Vec<TimeBlock> = store.list(Scope::All).await.unwrap();
        let tasks: Vec<Task> = store.list(Scope::All).await.unwrap();
        assert!(classes.is_empty());
        assert!(blocks.is_empty());
        assert!(tasks.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn time_blocks_need_an_existing_class() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let class = seeded_class(&store, owner, "Art").await;
        let mut block = block_for(&class);
        block.class_id = Uuid::new_v4();
        assert!(matches!(
            store.insert(block).await,
            Err(PortError::Conflict(_))
        ));
    }

    #[test_log::test(tokio::test)]
    async fn expired_sessions_are_rejected() {
        let store = MemoryStore::new();
        let user = store.create_user("ada", "hash", false).await.unwrap();
        store
            .create_auth_session("live", user.user_id, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        store
            .create_auth_session("stale", user.user_id, Utc::now() - Duration::days(1))
            .await
            .unwrap();

        let caller = store.validate_auth_session("live").await.unwrap();
        assert_eq!(caller.user_id, user.user_id);
        assert_eq!(
            store.validate_auth_session("stale").await,
            Err(PortError::Unauthorized)
        );

        assert!(!store.tables.read().await.sessions.contains_key("stale"));

        store.delete_auth_session("live").await.unwrap();
        assert_eq!(
            store.validate_auth_session("live").await,
            Err(PortError::Unauthorized)
        );
    }

    #[test_log::test(tokio::test)]
    async fn new_sessions_prune_expired_ones() {
        let store = MemoryStore::new();
        let user = store.create_user("ada", "hash", false).await.unwrap();
        store
            .create_auth_session("stale", user.user_id, Utc::now() - Duration::days(1))
            .await
            .unwrap();
        store
            .create_auth_session("fresh", user.user_id, Utc::now() + Duration::days(1))
            .await
            .unwrap();

        let tables = store.tables.read().await;
        assert_eq!(tables.sessions.len(), 1);
        assert!(tables.sessions.contains_key("fresh"));
    }

    #[test_log::test(tokio::test)]
    async fn update_replaces_a_record_in_place() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let class = seeded_class(&store, owner, "Biology").await;
        let block = store.insert(block_for(&class)).await.unwrap();
        let later = seeded_class(&store, owner, "Geology").await;
        store.insert(block_for(&later)).await.unwrap();

        let mut revised = block.clone();
        revised.recurrence_interval = Some(14);
        store
            .update(Scope::Owner(owner), block.id, revised.clone())
            .await
            .unwrap();

        let blocks: Vec<TimeBlock> = store.list(Scope::All).await.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], revised);

        let hidden = store
            .update(Scope::Owner(Uuid::new_v4()), block.id, revised)
            .await;
        assert!(matches!(hidden, Err(PortError::NotFound(_))));
    }

    #[test_log::test(tokio::test)]
    async fn update_keeps_natural_keys_unique() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let draft = |title: &str| SubjectDraft {
            title: title.to_string(),
            color: "00ff00".to_string(),
        };
        let physics = store
            .insert(draft("Physics").into_record(owner).unwrap())
            .await
            .unwrap();
        store
            .insert(draft("Music").into_record(owner).unwrap())
            .await
            .unwrap();

        let clash = draft("Music").into_revision(&physics).unwrap();
        assert!(matches!(
            store.update(Scope::Owner(owner), physics.id, clash).await,
            Err(PortError::Conflict(_))
        ));

        let recolored = SubjectDraft {
            color: "0000ff".to_string(),
            ..draft("Physics")
        }
        .into_revision(&physics)
        .unwrap();
        let stored = store
            .update(Scope::Owner(owner), physics.id, recolored)
            .await
            .unwrap();
        assert_eq!(stored.color, "0000ff");
        assert_eq!(stored.id, physics.id);
    }

    #[test_log::test(tokio::test)]
    async fn usernames_are_unique() {
        let store = MemoryStore::new();
        store.create_user("ada", "hash", false).await.unwrap();
        assert!(matches!(
            store.create_user("ada", "other", false).await,
            Err(PortError::Conflict(_))
        ));
    }
}

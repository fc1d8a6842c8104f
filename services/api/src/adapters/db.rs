//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete PostgreSQL
//! implementation of the core's store ports. It handles all interactions with
//! the database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use schedule_core::domain::{
    Caller, Class, ClassType, Priority, Record, Scope, Subject, Task, Teacher, TimeBlock, User,
    UserCredentials, WeekdayMask,
};
use schedule_core::drafts::{ClassTypeDraft, Draft, SubjectDraft, TeacherDraft};
use schedule_core::ports::{
    CatalogStore, PortError, PortResult, RecordStore, ScheduleStore, UserStore,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports on PostgreSQL.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps constraint violations on insert to `Conflict`.
fn insert_error(kind: &str, e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            PortError::Conflict(format!("{kind} already exists"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::Conflict(format!("{kind} references a record that does not exist"))
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

pub type Insert<'q, R> = QueryAs<'q, Postgres, R, PgArguments>;

/// Maps a domain record onto its table.
pub trait Table: Record + Sized + Send + Sync + 'static {
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin;

    const TABLE: &'static str;
    /// Column list, in the order `bind_insert` binds values.
    const COLUMNS: &'static [&'static str];

    fn to_domain(row: Self::Row) -> PortResult<Self>;

    fn bind_insert<'q>(&self, query: Insert<'q, Self::Row>) -> Insert<'q, Self::Row>;

    fn columns() -> String {
        Self::COLUMNS.join(", ")
    }
}

#[derive(FromRow)]
pub struct SubjectRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    color: String,
    created_at: DateTime<Utc>,
}

impl Table for Subject {
    type Row = SubjectRow;
    const TABLE: &'static str = "subjects";
    const COLUMNS: &'static [&'static str] = &["id", "owner_id", "title", "color", "created_at"];

    fn to_domain(row: SubjectRow) -> PortResult<Self> {
        Ok(Subject {
            id: row.id,
            owner: row.owner_id,
            title: row.title,
            color: row.color,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, SubjectRow>) -> Insert<'q, SubjectRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.title.clone())
            .bind(self.color.clone())
            .bind(self.created)
    }
}

#[derive(FromRow)]
pub struct TeacherRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    phone: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl Table for Teacher {
    type Row = TeacherRow;
    const TABLE: &'static str = "teachers";
    const COLUMNS: &'static [&'static str] =
        &["id", "owner_id", "name", "phone", "email", "created_at"];

    fn to_domain(row: TeacherRow) -> PortResult<Self> {
        Ok(Teacher {
            id: row.id,
            owner: row.owner_id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, TeacherRow>) -> Insert<'q, TeacherRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.name.clone())
            .bind(self.phone.clone())
            .bind(self.email.clone())
            .bind(self.created)
    }
}

#[derive(FromRow)]
pub struct ClassTypeRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    is_custom: bool,
    created_at: DateTime<Utc>,
}

impl Table for ClassType {
    type Row = ClassTypeRow;
    const TABLE: &'static str = "class_types";
    const COLUMNS: &'static [&'static str] =
        &["id", "owner_id", "title", "is_custom", "created_at"];

    fn to_domain(row: ClassTypeRow) -> PortResult<Self> {
        Ok(ClassType {
            id: row.id,
            owner: row.owner_id,
            title: row.title,
            is_custom: row.is_custom,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, ClassTypeRow>) -> Insert<'q, ClassTypeRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.title.clone())
            .bind(self.is_custom)
            .bind(self.created)
    }
}

#[derive(FromRow)]
pub struct ClassRow {
    id: Uuid,
    owner_id: Uuid,
    subject_id: Uuid,
    class_type_id: Option<Uuid>,
    teacher_id: Option<Uuid>,
    location: String,
    created_at: DateTime<Utc>,
}

impl Table for Class {
    type Row = ClassRow;
    const TABLE: &'static str = "classes";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "subject_id",
        "class_type_id",
        "teacher_id",
        "location",
        "created_at",
    ];

    fn to_domain(row: ClassRow) -> PortResult<Self> {
        Ok(Class {
            id: row.id,
            owner: row.owner_id,
            subject_id: row.subject_id,
            class_type_id: row.class_type_id,
            teacher_id: row.teacher_id,
            location: row.location,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, ClassRow>) -> Insert<'q, ClassRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.subject_id)
            .bind(self.class_type_id)
            .bind(self.teacher_id)
            .bind(self.location.clone())
            .bind(self.created)
    }
}

#[derive(FromRow)]
pub struct TimeBlockRow {
    id: Uuid,
    owner_id: Uuid,
    class_id: Uuid,
    recurrence_interval: Option<i32>,
    days_of_week: Option<i16>,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    time_start: NaiveTime,
    time_end: NaiveTime,
    created_at: DateTime<Utc>,
}

impl Table for TimeBlock {
    type Row = TimeBlockRow;
    const TABLE: &'static str = "time_blocks";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "class_id",
        "recurrence_interval",
        "days_of_week",
        "start_date",
        "end_date",
        "time_start",
        "time_end",
        "created_at",
    ];

    fn to_domain(row: TimeBlockRow) -> PortResult<Self> {
        let days_of_week = match row.days_of_week {
            Some(bits) => Some(
                u8::try_from(bits)
                    .ok()
                    .and_then(WeekdayMask::from_bits)
                    .ok_or_else(|| {
                        PortError::Unexpected(format!(
                            "time block {} has an invalid weekday mask {}",
                            row.id, bits
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(TimeBlock {
            id: row.id,
            owner: row.owner_id,
            class_id: row.class_id,
            recurrence_interval: row.recurrence_interval,
            days_of_week,
            start_date: row.start_date,
            end_date: row.end_date,
            time_start: row.time_start,
            time_end: row.time_end,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, TimeBlockRow>) -> Insert<'q, TimeBlockRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.class_id)
            .bind(self.recurrence_interval)
            .bind(self.days_of_week.map(|mask| i16::from(mask.bits())))
            .bind(self.start_date)
            .bind(self.end_date)
            .bind(self.time_start)
            .bind(self.time_end)
            .bind(self.created)
    }
}

#[derive(FromRow)]
pub struct TaskRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    priority: i16,
    is_completed: bool,
    class_id: Option<Uuid>,
    due_date: Option<NaiveDate>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Table for Task {
    type Row = TaskRow;
    const TABLE: &'static str = "tasks";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "title",
        "description",
        "priority",
        "is_completed",
        "class_id",
        "due_date",
        "completed_at",
        "created_at",
    ];

    fn to_domain(row: TaskRow) -> PortResult<Self> {
        let priority = Priority::from_i16(row.priority).ok_or_else(|| {
            PortError::Unexpected(format!(
                "task {} has an invalid priority {}",
                row.id, row.priority
            ))
        })?;
        Ok(Task {
            id: row.id,
            owner: row.owner_id,
            title: row.title,
            description: row.description,
            priority,
            is_completed: row.is_completed,
            class_id: row.class_id,
            due_date: row.due_date,
            completed_at: row.completed_at,
            created: row.created_at,
        })
    }

    fn bind_insert<'q>(&self, query: Insert<'q, TaskRow>) -> Insert<'q, TaskRow> {
        query
            .bind(self.id)
            .bind(self.owner)
            .bind(self.title.clone())
            .bind(self.description.clone())
            .bind(self.priority.as_i16())
            .bind(self.is_completed)
            .bind(self.class_id)
            .bind(self.due_date)
            .bind(self.completed_at)
            .bind(self.created)
    }
}

#[derive(FromRow)]
struct UserRow {
    user_id: Uuid,
    username: String,
    is_staff: bool,
    created_at: DateTime<Utc>,
}
impl UserRow {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            username: self.username,
            is_staff: self.is_staff,
            created: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRow {
    user_id: Uuid,
    username: String,
    hashed_password: String,
    is_staff: bool,
}

#[derive(FromRow)]
struct CallerRow {
    user_id: Uuid,
    is_staff: bool,
}

//=========================================================================================
// Generic Record Queries
//=========================================================================================

impl DbAdapter {
    async fn select_all<T: Table>(&self, sql: &str, scope: Scope) -> PortResult<Vec<T>> {
        sqlx::query_as::<_, T::Row>(sql)
            .bind(scope.owner_filter())
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(T::to_domain)
            .collect()
    }

    async fn insert_row<T: Table>(&self, record: &T) -> PortResult<T> {
        let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({cols}) VALUES ({}) RETURNING {cols}",
            T::TABLE,
            placeholders.join(", "),
            cols = T::columns(),
        );
        let row = record
            .bind_insert(sqlx::query_as::<_, T::Row>(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(T::KIND, e))?;
        T::to_domain(row)
    }

    /// Inserts `record` unless the owner already has one with the same natural
    /// key, and returns whichever row is stored.
    async fn update_row<T: Table>(&self, scope: Scope, id: Uuid, record: &T) -> PortResult<T> {
        let sql = update_statement::<T>();
        let row = record
            .bind_insert(sqlx::query_as::<_, T::Row>(&sql))
            .bind(id)
            .bind(scope.owner_filter())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| insert_error(T::KIND, e))?
            .ok_or_else(|| PortError::not_found(T::KIND, id))?;
        T::to_domain(row)
    }

    async fn upsert_row<T: Table>(&self, record: T, key_column: &str) -> PortResult<T> {
        let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({cols}) VALUES ({}) \
             ON CONFLICT (owner_id, {key}) DO UPDATE SET {key} = EXCLUDED.{key} \
             RETURNING {cols}",
            placeholders.join(", "),
            table = T::TABLE,
            cols = T::columns(),
            key = key_column,
        );
        let row = record
            .bind_insert(sqlx::query_as::<_, T::Row>(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| insert_error(T::KIND, e))?;
        T::to_domain(row)
    }
}

/// Full-row replacement. Binds the columns first, then the id and the owner filter.
fn update_statement<T: Table>() -> String {
    let n = T::COLUMNS.len();
    let placeholders: Vec<String> = (1..=n).map(|i| format!("${i}")).collect();
    format!(
        "UPDATE {} SET ({cols}) = ({}) \
         WHERE id = ${} AND (${}::uuid IS NULL OR owner_id = ${}) \
         RETURNING {cols}",
        T::TABLE,
        placeholders.join(", "),
        n + 1,
        n + 2,
        n + 2,
        cols = T::columns(),
    )
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl<T: Table> RecordStore<T> for DbAdapter {
    async fn list(&self, scope: Scope) -> PortResult<Vec<T>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE ($1::uuid IS NULL OR owner_id = $1) ORDER BY created_at ASC, id ASC",
            T::columns(),
            T::TABLE
        );
        self.select_all(&sql, scope).await
    }

    async fn get(&self, scope: Scope, id: Uuid) -> PortResult<T> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
            T::columns(),
            T::TABLE
        );
        let row = sqlx::query_as::<_, T::Row>(&sql)
            .bind(id)
            .bind(scope.owner_filter())
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::not_found(T::KIND, id))?;
        T::to_domain(row)
    }

    async fn insert(&self, record: T) -> PortResult<T> {
        self.insert_row(&record).await
    }

    async fn update(&self, scope: Scope, id: Uuid, record: T) -> PortResult<T> {
        self.update_row(scope, id, &record).await
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> PortResult<()> {
        // Dependents go with their parent through ON DELETE rules in the schema.
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 AND ($2::uuid IS NULL OR owner_id = $2)",
            T::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(scope.owner_filter())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::not_found(T::KIND, id));
        }
        Ok(())
    }
}

//=========================================================================================
// `ScheduleStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ScheduleStore for DbAdapter {
    async fn find_time_blocks(&self, owner: Uuid, as_of: NaiveDate) -> PortResult<Vec<TimeBlock>> {
        let sql = format!(
            "SELECT {} FROM time_blocks \
             WHERE owner_id = $1 \
             AND start_date <= $2 \
             AND (end_date IS NULL OR end_date >= $2) \
             AND (days_of_week IS NULL OR (days_of_week & $3) <> 0) \
             ORDER BY created_at ASC, id ASC",
            TimeBlock::columns()
        );
        let weekday_bit = i16::from(WeekdayMask::bit(as_of.weekday()));
        sqlx::query_as::<_, TimeBlockRow>(&sql)
            .bind(owner)
            .bind(as_of)
            .bind(weekday_bit)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?
            .into_iter()
            .map(TimeBlock::to_domain)
            .collect()
    }

    async fn find_class(&self, class_id: Uuid) -> PortResult<Class> {
        RecordStore::<Class>::get(self, Scope::All, class_id).await
    }

    async fn find_subject(&self, subject_id: Uuid) -> PortResult<Subject> {
        RecordStore::<Subject>::get(self, Scope::All, subject_id).await
    }

    async fn find_class_type(&self, class_type_id: Uuid) -> PortResult<ClassType> {
        RecordStore::<ClassType>::get(self, Scope::All, class_type_id).await
    }

    async fn find_teacher(&self, teacher_id: Uuid) -> PortResult<Teacher> {
        RecordStore::<Teacher>::get(self, Scope::All, teacher_id).await
    }
}

//=========================================================================================
// `CatalogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CatalogStore for DbAdapter {
    async fn upsert_subject(&self, owner: Uuid, draft: SubjectDraft) -> PortResult<Subject> {
        let record = draft
            .into_record(owner)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.upsert_row(record, "title").await
    }

    async fn upsert_class_type(&self, owner: Uuid, draft: ClassTypeDraft) -> PortResult<ClassType> {
        let record = draft
            .into_record(owner)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.upsert_row(record, "title").await
    }

    async fn upsert_teacher(&self, owner: Uuid, draft: TeacherDraft) -> PortResult<Teacher> {
        let record = draft
            .into_record(owner)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.upsert_row(record, "name").await
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        hashed_password: &str,
        is_staff: bool,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (user_id, username, hashed_password, is_staff) VALUES ($1, $2, $3, $4) \
             RETURNING user_id, username, is_staff, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(hashed_password)
        .bind(is_staff)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| insert_error("user", e))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRow>(
            "SELECT user_id, username, hashed_password, is_staff FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))?;

        Ok(UserCredentials {
            user_id: record.user_id,
            username: record.username,
            hashed_password: record.hashed_password,
            is_staff: record.is_staff,
        })
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, username, is_staff, created_at FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::not_found("user", user_id))?;
        Ok(record.to_domain())
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, username, is_staff, created_at FROM users ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(UserRow::to_domain).collect())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Caller> {
        let record = sqlx::query_as::<_, CallerRow>(
            "SELECT u.user_id, u.is_staff FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        Ok(Caller {
            user_id: record.user_id,
            is_staff: record.is_staff,
        })
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_statement_binds_columns_then_id_and_owner() {
        assert_eq!(
            update_statement::<Subject>(),
            "UPDATE subjects SET (id, owner_id, title, color, created_at) = ($1, $2, $3, $4, $5) \
             WHERE id = $6 AND ($7::uuid IS NULL OR owner_id = $7) \
             RETURNING id, owner_id, title, color, created_at"
        );
    }

    #[test]
    fn update_statement_covers_every_column() {
        let sql = update_statement::<Task>();
        let bound = Task::COLUMNS.len();
        assert!(sql.starts_with("UPDATE tasks SET ("));
        assert!(sql.contains(&format!("${bound})")));
        assert!(sql.contains(&format!("WHERE id = ${}", bound + 1)));
    }
}

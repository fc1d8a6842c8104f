//! services/api/src/web/records.rs
//!
//! CRUD handlers for the user-owned records. Listing, retrieval and deletion
//! are generic over [`Resource`]; creation and replacement are per kind because
//! each kind is built from its own draft.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use schedule_core::domain::{
    Caller, Class, ClassType, Record, Scope, Subject, Task, Teacher, TimeBlock,
};
use schedule_core::drafts::{
    ClassDraft, ClassTypeDraft, Draft, SubjectDraft, TaskDraft, TeacherDraft, TimeBlockDraft,
    ValidationError,
};
use schedule_core::ports::{PortError, RecordStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

type HandlerError = (StatusCode, String);

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a port failure to a response, logging anything that is not the
/// client's fault.
pub fn port_failure(action: &str, e: PortError) -> HandlerError {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
        PortError::Unexpected(msg) => {
            error!("Failed to {}: {}", action, msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {}", action),
            )
        }
    }
}

fn invalid(e: ValidationError) -> HandlerError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

//=========================================================================================
// Generic Resource Handlers
//=========================================================================================

/// A record kind exposed under its own collection path.
pub trait Resource: Record + Serialize + ToSchema + Sized + Send + Sync + 'static {
    const PATH: &'static str;

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>>;

    /// Puts a listing into its presentation order; creation order by default.
    fn arrange(_records: &mut [Self]) {}
}

impl Resource for Subject {
    const PATH: &'static str = "/subjects";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.subjects
    }
}

impl Resource for Teacher {
    const PATH: &'static str = "/teachers";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.teachers
    }
}

impl Resource for ClassType {
    const PATH: &'static str = "/class-types";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.class_types
    }
}

impl Resource for Class {
    const PATH: &'static str = "/classes";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.classes
    }
}

impl Resource for TimeBlock {
    const PATH: &'static str = "/times";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.time_blocks
    }
}

impl Resource for Task {
    const PATH: &'static str = "/tasks";

    fn store(state: &AppState) -> &Arc<dyn RecordStore<Self>> {
        &state.tasks
    }

    fn arrange(records: &mut [Self]) {
        records.sort_by(Task::agenda_order);
    }
}

/// GET /<kind> - Records visible to the caller.
pub async fn list_handler<R: Resource>(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<R>>, HandlerError> {
    let mut records = R::store(&state)
        .list(caller.scope())
        .await
        .map_err(|e| port_failure(&format!("list {} records", R::KIND), e))?;
    R::arrange(&mut records);
    Ok(Json(records))
}

/// GET /<kind>/{id} - A single record visible to the caller.
pub async fn get_handler<R: Resource>(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<R>, HandlerError> {
    let record = R::store(&state)
        .get(caller.scope(), id)
        .await
        .map_err(|e| port_failure(&format!("load {}", R::KIND), e))?;
    Ok(Json(record))
}

/// DELETE /<kind>/{id} - Deletes a record visible to the caller, with its dependents.
pub async fn delete_handler<R: Resource>(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, HandlerError> {
    R::store(&state)
        .delete(caller.scope(), id)
        .await
        .map_err(|e| port_failure(&format!("delete {}", R::KIND), e))?;
    info!(%id, kind = R::KIND, "Deleted record.");
    Ok(StatusCode::NO_CONTENT)
}

async fn insert_draft<D>(
    state: &AppState,
    caller: Caller,
    draft: D,
) -> Result<(StatusCode, Json<D::Record>), HandlerError>
where
    D: Draft,
    D::Record: Resource,
{
    let record = draft.into_record(caller.user_id).map_err(invalid)?;
    let stored = <D::Record as Resource>::store(state)
        .insert(record)
        .await
        .map_err(|e| port_failure(&format!("create {}", <D::Record as Record>::KIND), e))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Validates `draft` as the new content of the record with `id` and stores it.
async fn replace_draft<D>(
    state: &AppState,
    caller: Caller,
    id: Uuid,
    draft: D,
) -> Result<Json<D::Record>, HandlerError>
where
    D: Draft,
    D::Record: Resource,
{
    let store = <D::Record as Resource>::store(state);
    let kind = <D::Record as Record>::KIND;
    let current = store
        .get(caller.scope(), id)
        .await
        .map_err(|e| port_failure(&format!("load {}", kind), e))?;
    let record = draft.into_revision(&current).map_err(invalid)?;
    let stored = store
        .update(caller.scope(), id, record)
        .await
        .map_err(|e| port_failure(&format!("update {}", kind), e))?;
    info!(%id, kind, "Updated record.");
    Ok(Json(stored))
}

/// The owner of the record with `id`, as long as the caller can see it.
async fn owner_of<R: Resource>(
    state: &AppState,
    caller: Caller,
    id: Uuid,
) -> Result<Uuid, HandlerError> {
    R::store(state)
        .get(caller.scope(), id)
        .await
        .map(|record| record.owner())
        .map_err(|e| port_failure(&format!("load {}", R::KIND), e))
}

/// Rejects references to classes that `owner` does not own.
async fn require_class_of(
    state: &AppState,
    owner: Uuid,
    class_id: Uuid,
) -> Result<(), HandlerError> {
    match state.classes.get(Scope::Owner(owner), class_id).await {
        Ok(_) => Ok(()),
        Err(PortError::NotFound(_)) => Err((
            StatusCode::BAD_REQUEST,
            format!("class {} does not exist", class_id),
        )),
        Err(e) => Err(port_failure("load class", e)),
    }
}

//=========================================================================================
// Create Handlers
//=========================================================================================

/// POST /subjects - Create a subject.
#[utoipa::path(
    post,
    path = "/subjects",
    request_body = SubjectDraft,
    responses(
        (status = 201, description = "Subject created", body = Subject),
        (status = 400, description = "Invalid subject"),
        (status = 409, description = "A subject with this title already exists")
    )
)]
pub async fn create_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<SubjectDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    insert_draft(&state, caller, draft).await
}

/// POST /teachers - Create a teacher.
#[utoipa::path(
    post,
    path = "/teachers",
    request_body = TeacherDraft,
    responses(
        (status = 201, description = "Teacher created", body = Teacher),
        (status = 400, description = "Invalid teacher"),
        (status = 409, description = "A teacher with this name already exists")
    )
)]
pub async fn create_teacher_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<TeacherDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    insert_draft(&state, caller, draft).await
}

/// POST /class-types - Create a class type.
#[utoipa::path(
    post,
    path = "/class-types",
    request_body = ClassTypeDraft,
    responses(
        (status = 201, description = "Class type created", body = ClassType),
        (status = 400, description = "Invalid class type"),
        (status = 409, description = "A class type with this title already exists")
    )
)]
pub async fn create_class_type_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<ClassTypeDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    insert_draft(&state, caller, draft).await
}

/// POST /classes - Create a class.
///
/// The nested subject, type and teacher are matched by title or name among the
/// caller's records and created when missing.
#[utoipa::path(
    post,
    path = "/classes",
    request_body = ClassDraft,
    responses(
        (status = 201, description = "Class created", body = Class),
        (status = 400, description = "Invalid class")
    )
)]
pub async fn create_class_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<ClassDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    draft.validate().map_err(invalid)?;
    let class = resolve_class(&state, caller.user_id, draft).await?;
    let stored = state
        .classes
        .insert(class)
        .await
        .map_err(|e| port_failure("create class", e))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Upserts the draft's reference data for `owner` and builds the class on it.
async fn resolve_class(
    state: &AppState,
    owner: Uuid,
    draft: ClassDraft,
) -> Result<Class, HandlerError> {
    let subject = state
        .catalog
        .upsert_subject(owner, draft.subject.clone())
        .await
        .map_err(|e| port_failure("resolve subject", e))?;
    let class_type = match draft.class_type.clone() {
        Some(class_type) => Some(
            state
                .catalog
                .upsert_class_type(owner, class_type)
                .await
                .map_err(|e| port_failure("resolve class type", e))?,
        ),
        None => None,
    };
    let teacher = match draft.teacher.clone() {
        Some(teacher) => Some(
            state
                .catalog
                .upsert_teacher(owner, teacher)
                .await
                .map_err(|e| port_failure("resolve teacher", e))?,
        ),
        None => None,
    };
    Ok(draft.into_class(owner, &subject, class_type.as_ref(), teacher.as_ref()))
}

/// POST /times - Create a time block for one of the caller's classes.
#[utoipa::path(
    post,
    path = "/times",
    request_body = TimeBlockDraft,
    responses(
        (status = 201, description = "Time block created", body = TimeBlock),
        (status = 400, description = "Invalid time block or unknown class")
    )
)]
pub async fn create_time_block_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<TimeBlockDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    require_class_of(&state, caller.user_id, draft.class_id).await?;
    insert_draft(&state, caller, draft).await
}

/// POST /tasks - Create a task, optionally attached to one of the caller's classes.
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = TaskDraft,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid task or unknown class")
    )
)]
pub async fn create_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<TaskDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    if let Some(class_id) = draft.class_id {
        require_class_of(&state, caller.user_id, class_id).await?;
    }
    insert_draft(&state, caller, draft).await
}

//=========================================================================================
// Update Handlers
//=========================================================================================

/// PUT /subjects/{id} - Replace a subject.
#[utoipa::path(
    put,
    path = "/subjects/{id}",
    params(("id" = Uuid, Path, description = "The subject's id.")),
    request_body = SubjectDraft,
    responses(
        (status = 200, description = "Subject updated", body = Subject),
        (status = 400, description = "Invalid subject"),
        (status = 404, description = "No such subject"),
        (status = 409, description = "A subject with this title already exists")
    )
)]
pub async fn update_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<SubjectDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    replace_draft(&state, caller, id, draft).await
}

/// PUT /teachers/{id} - Replace a teacher.
#[utoipa::path(
    put,
    path = "/teachers/{id}",
    params(("id" = Uuid, Path, description = "The teacher's id.")),
    request_body = TeacherDraft,
    responses(
        (status = 200, description = "Teacher updated", body = Teacher),
        (status = 400, description = "Invalid teacher"),
        (status = 404, description = "No such teacher"),
        (status = 409, description = "A teacher with this name already exists")
    )
)]
pub async fn update_teacher_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<TeacherDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    replace_draft(&state, caller, id, draft).await
}

/// PUT /class-types/{id} - Replace a class type.
#[utoipa::path(
    put,
    path = "/class-types/{id}",
    params(("id" = Uuid, Path, description = "The class type's id.")),
    request_body = ClassTypeDraft,
    responses(
        (status = 200, description = "Class type updated", body = ClassType),
        (status = 400, description = "Invalid class type"),
        (status = 404, description = "No such class type"),
        (status = 409, description = "A class type with this title already exists")
    )
)]
pub async fn update_class_type_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ClassTypeDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    replace_draft(&state, caller, id, draft).await
}

/// PUT /classes/{id} - Replace a class.
///
/// The nested reference data is resolved among the class owner's records, as
/// on creation.
#[utoipa::path(
    put,
    path = "/classes/{id}",
    params(("id" = Uuid, Path, description = "The class's id.")),
    request_body = ClassDraft,
    responses(
        (status = 200, description = "Class updated", body = Class),
        (status = 400, description = "Invalid class"),
        (status = 404, description = "No such class")
    )
)]
pub async fn update_class_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ClassDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    draft.validate().map_err(invalid)?;
    let current = state
        .classes
        .get(caller.scope(), id)
        .await
        .map_err(|e| port_failure("load class", e))?;
    let mut class = resolve_class(&state, current.owner, draft).await?;
    class.adopt(&current);
    let stored = state
        .classes
        .update(caller.scope(), id, class)
        .await
        .map_err(|e| port_failure("update class", e))?;
    info!(%id, kind = Class::KIND, "Updated record.");
    Ok(Json(stored))
}

/// PUT /times/{id} - Replace a time block.
#[utoipa::path(
    put,
    path = "/times/{id}",
    params(("id" = Uuid, Path, description = "The time block's id.")),
    request_body = TimeBlockDraft,
    responses(
        (status = 200, description = "Time block updated", body = TimeBlock),
        (status = 400, description = "Invalid time block or unknown class"),
        (status = 404, description = "No such time block")
    )
)]
pub async fn update_time_block_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<TimeBlockDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = owner_of::<TimeBlock>(&state, caller, id).await?;
    require_class_of(&state, owner, draft.class_id).await?;
    replace_draft(&state, caller, id, draft).await
}

/// PUT /tasks/{id} - Replace a task. Completing it records the completion time.
#[utoipa::path(
    put,
    path = "/tasks/{id}",
    params(("id" = Uuid, Path, description = "The task's id.")),
    request_body = TaskDraft,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Invalid task or unknown class"),
        (status = 404, description = "No such task")
    )
)]
pub async fn update_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(draft): Json<TaskDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = owner_of::<Task>(&state, caller, id).await?;
    if let Some(class_id) = draft.class_id {
        require_class_of(&state, owner, class_id).await?;
    }
    replace_draft(&state, caller, id, draft).await
}

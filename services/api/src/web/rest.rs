//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the schedule and user endpoints and the
//! master definition for the OpenAPI specification.

use crate::web::{auth, records, records::Resource, state::AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use schedule_core::domain::{
    Caller, Class, ClassType, Priority, ScheduleItem, Subject, Task, Teacher, TimeBlock, User,
};
use schedule_core::drafts::{
    ClassDraft, ClassTypeDraft, SubjectDraft, TaskDraft, TeacherDraft, TimeBlockDraft,
};
use schedule_core::schedule::build_schedule;
use std::sync::Arc;
use tracing::error;
use utoipa::openapi::path::{OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::{
    Array, Content, HttpMethod, KnownFormat, ObjectBuilder, Paths, Ref, Required,
    ResponseBuilder, SchemaFormat, Type,
};
use utoipa::{Modify, OpenApi};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        schedule_handler,
        list_users_handler,
        get_user_handler,
        records::create_subject_handler,
        records::create_teacher_handler,
        records::create_class_type_handler,
        records::create_class_handler,
        records::create_time_block_handler,
        records::create_task_handler,
        records::update_subject_handler,
        records::update_teacher_handler,
        records::update_class_type_handler,
        records::update_class_handler,
        records::update_time_block_handler,
        records::update_task_handler,
    ),
    modifiers(&CollectionPaths),
    components(
        schemas(
            auth::Credentials, auth::AuthResponse, User, Subject, Teacher, ClassType, Class,
            TimeBlock, Task, Priority, ScheduleItem, SubjectDraft, TeacherDraft, ClassTypeDraft,
            ClassDraft, TimeBlockDraft, TaskDraft
        )
    ),
    tags(
        (name = "Schedule API", description = "Classes, recurring time blocks, tasks and the daily schedule.")
    )
)]
pub struct ApiDoc;

/// Documents the list, get and delete routes every collection shares.
struct CollectionPaths;

impl Modify for CollectionPaths {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        document_collection::<Subject>(&mut openapi.paths);
        document_collection::<Teacher>(&mut openapi.paths);
        document_collection::<ClassType>(&mut openapi.paths);
        document_collection::<Class>(&mut openapi.paths);
        document_collection::<TimeBlock>(&mut openapi.paths);
        document_collection::<Task>(&mut openapi.paths);
    }
}

fn document_collection<R: Resource>(paths: &mut Paths) {
    let kind = R::KIND;
    let operation_kind = kind.replace(' ', "_");
    let record = Ref::from_schema_name(R::name());
    let unauthorized = ResponseBuilder::new().description("Not logged in").build();
    let not_found = ResponseBuilder::new()
        .description(format!("No such {kind}"))
        .build();
    let id = || {
        ParameterBuilder::new()
            .name("id")
            .parameter_in(ParameterIn::Path)
            .required(Required::True)
            .description(Some(format!("The {kind}'s id.")))
            .schema(Some(
                ObjectBuilder::new()
                    .schema_type(Type::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid))),
            ))
            .build()
    };

    let list = OperationBuilder::new()
        .operation_id(Some(format!("list_{operation_kind}")))
        .summary(Some(format!("List the {kind} records visible to the caller.")))
        .response(
            "200",
            ResponseBuilder::new()
                .description(format!("Visible {kind} records"))
                .content(
                    "application/json",
                    Content::new(Some(Array::new(record.clone()))),
                )
                .build(),
        )
        .response("401", unauthorized.clone())
        .build();
    paths.add_path_operation(R::PATH, vec![HttpMethod::Get], list);

    let member = format!("{}/{{id}}", R::PATH);
    let get = OperationBuilder::new()
        .operation_id(Some(format!("get_{operation_kind}")))
        .summary(Some(format!("Retrieve a {kind}.")))
        .parameter(id())
        .response(
            "200",
            ResponseBuilder::new()
                .description(format!("The {kind}"))
                .content("application/json", Content::new(Some(record)))
                .build(),
        )
        .response("401", unauthorized.clone())
        .response("404", not_found.clone())
        .build();
    paths.add_path_operation(&member, vec![HttpMethod::Get], get);

    let delete = OperationBuilder::new()
        .operation_id(Some(format!("delete_{operation_kind}")))
        .summary(Some(format!("Delete a {kind} together with its dependents.")))
        .parameter(id())
        .response(
            "204",
            ResponseBuilder::new()
                .description(format!("The {kind} was deleted"))
                .build(),
        )
        .response("401", unauthorized)
        .response("404", not_found)
        .build();
    paths.add_path_operation(&member, vec![HttpMethod::Delete], delete);
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// The caller's classes taking place on a date, ordered by start time.
///
/// Returns an empty list when nothing is scheduled.
#[utoipa::path(
    get,
    path = "/schedule/{date}",
    params(
        ("date" = String, Path, description = "Viewing date as YYYY-MM-DD.", example = "2020-01-06")
    ),
    responses(
        (status = 200, description = "The schedule for the date", body = [ScheduleItem]),
        (status = 400, description = "The date is not a valid calendar date"),
        (status = 401, description = "Not logged in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn schedule_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(date): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match build_schedule(state.schedule.as_ref(), caller.user_id, &date).await {
        Ok(items) => Ok(Json(items)),
        Err(e) if e.is_client_error() => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!(user_id = %caller.user_id, %date, "Failed to build schedule: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to build schedule".to_string(),
            ))
        }
    }
}

/// List every registered user. Staff only.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Caller is not staff")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !caller.is_staff {
        return Err((StatusCode::FORBIDDEN, "Staff only".to_string()));
    }
    let users = state
        .users
        .list_users()
        .await
        .map_err(|e| records::port_failure("list users", e))?;
    Ok(Json(users))
}

/// Retrieve a user. Callers may view themselves; staff may view anyone.
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = Uuid, Path, description = "The user's id.")
    ),
    responses(
        (status = 200, description = "The user", body = User),
        (status = 403, description = "Not permitted to view this user"),
        (status = 404, description = "No such user")
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if !caller.can_view_user(id) {
        return Err((StatusCode::FORBIDDEN, "Not permitted".to_string()));
    }
    let user = state
        .users
        .get_user(id)
        .await
        .map_err(|e| records::port_failure("load user", e))?;
    Ok(Json(user))
}

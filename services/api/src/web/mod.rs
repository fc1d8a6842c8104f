pub mod auth;
pub mod middleware;
pub mod records;
pub mod rest;
pub mod state;

pub use middleware::require_auth;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use schedule_core::domain::{Class, ClassType, Subject, Task, Teacher, TimeBlock};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use auth::{login_handler, logout_handler, signup_handler};
use records::{
    create_class_handler, create_class_type_handler, create_subject_handler,
    create_task_handler, create_teacher_handler, create_time_block_handler, delete_handler,
    get_handler, list_handler, update_class_handler, update_class_type_handler,
    update_subject_handler, update_task_handler, update_teacher_handler,
    update_time_block_handler, Resource,
};
use rest::{get_user_handler, list_users_handler, schedule_handler, ApiDoc};
use state::AppState;

/// Routes for one record collection: list and create on the collection,
/// retrieve, replace and delete on its members.
fn collection<R, C, CT, U, UT>(create: C, update: U) -> Router<Arc<AppState>>
where
    R: Resource,
    C: axum::handler::Handler<CT, Arc<AppState>>,
    U: axum::handler::Handler<UT, Arc<AppState>>,
    CT: 'static,
    UT: 'static,
{
    Router::new()
        .route(R::PATH, get(list_handler::<R>).post(create))
        .route(
            &format!("{}/{{id}}", R::PATH),
            get(get_handler::<R>)
                .put(update)
                .delete(delete_handler::<R>),
        )
}

/// Builds the complete application router, Swagger UI included.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(app_state.config.cors_origin.clone())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/schedule/{date}", get(schedule_handler))
        .route("/users", get(list_users_handler))
        .route("/users/{id}", get(get_user_handler))
        .merge(collection::<Subject, _, _, _, _>(
            create_subject_handler,
            update_subject_handler,
        ))
        .merge(collection::<Teacher, _, _, _, _>(
            create_teacher_handler,
            update_teacher_handler,
        ))
        .merge(collection::<ClassType, _, _, _, _>(
            create_class_type_handler,
            update_class_type_handler,
        ))
        .merge(collection::<Class, _, _, _, _>(
            create_class_handler,
            update_class_handler,
        ))
        .merge(collection::<TimeBlock, _, _, _, _>(
            create_time_block_handler,
            update_time_block_handler,
        ))
        .merge(collection::<Task, _, _, _, _>(create_task_handler, update_task_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

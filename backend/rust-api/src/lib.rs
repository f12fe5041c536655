use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod access;
pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// Adds a restrictive Content-Security-Policy header; the API only serves JSON.
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    // Everything under /api/v1 except register/login needs a bearer token
    let api = Router::new()
        .nest("/profiles", profile_routes())
        .nest("/first-aid", first_aid_routes())
        .nest("/appointments", appointment_routes())
        .nest("/consultations", consultation_routes())
        .nest("/prescriptions", prescription_routes())
        .nest("/messages", message_routes())
        .nest("/dashboard", dashboard_routes())
        .nest("/admin", admin_routes())
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/auth", auth_routes(app_state.clone()))
        .nest("/api/v1", api)
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
        .layer(middleware::from_fn(middlewares::trace::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let register_route = Router::new()
        .route("/register", post(handlers::auth::register))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::register_rate_limit_middleware,
        ));

    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route(
            "/me",
            get(handlers::auth::get_current_user).put(handlers::auth::update_current_user),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    register_route.merge(login_route).merge(protected_routes)
}

fn profile_routes() -> Router<Arc<AppState>> {
    use handlers::profiles::*;

    Router::new()
        .route("/patients", get(list_patients))
        .route("/patients/{user_id}", get(get_patient))
        .route("/physicians", get(list_physicians))
        .route("/physicians/{user_id}", get(get_physician))
}

fn first_aid_routes() -> Router<Arc<AppState>> {
    use handlers::first_aid::*;

    Router::new()
        // Catalogue
        .route("/modules", get(list_modules))
        .route("/modules/by-category", get(modules_by_category))
        .route("/modules/by-difficulty", get(modules_by_difficulty))
        .route("/modules/{id}", get(get_module))
        .route("/modules/{id}/contents", get(module_contents))
        .route("/modules/{id}/quizzes", get(module_quizzes))
        .route("/contents", get(list_contents))
        .route("/contents/by-module", get(contents_by_module))
        .route("/contents/by-type", get(contents_by_type))
        .route("/contents/{id}", get(get_content))
        // Quizzes
        .route("/quizzes", get(list_quizzes))
        .route("/quizzes/by-module", get(quizzes_by_module))
        .route("/quizzes/{id}", get(get_quiz))
        .route("/quizzes/{id}/questions", get(quiz_questions))
        .route("/quizzes/{id}/submit", post(submit_quiz))
        // Own results
        .route("/results", get(my_results))
        .route("/results/by-module", get(my_results_by_module))
        .route("/results/summary", get(my_summary))
}

fn appointment_routes() -> Router<Arc<AppState>> {
    use handlers::appointments::*;

    Router::new()
        .route("/", get(list_appointments).post(create_appointment))
        .route("/upcoming", get(upcoming))
        .route("/by-date", get(by_date))
        .route("/urgent", get(urgent))
        .route(
            "/{id}",
            get(get_appointment)
                .patch(update_appointment)
                .delete(delete_appointment),
        )
        .route("/{id}/status", post(update_status))
}

fn consultation_routes() -> Router<Arc<AppState>> {
    use handlers::consultations::*;

    Router::new()
        .route("/", get(list_consultations).post(create_consultation))
        .route("/active", get(active_consultations))
        .route("/by-type", get(by_type))
        .route(
            "/{id}",
            get(get_consultation)
                .patch(update_consultation)
                .delete(delete_consultation),
        )
        .route("/{id}/end", post(end_consultation))
        .route("/{id}/messages", get(consultation_messages))
        .route("/{id}/prescriptions", get(consultation_prescriptions))
}

fn prescription_routes() -> Router<Arc<AppState>> {
    use handlers::prescriptions::*;

    Router::new()
        .route("/", get(list_prescriptions).post(create_prescription))
        .route("/active", get(active_prescriptions))
        .route("/by-patient", get(by_patient))
        .route(
            "/{id}",
            get(get_prescription)
                .patch(update_prescription)
                .delete(delete_prescription),
        )
}

fn message_routes() -> Router<Arc<AppState>> {
    use handlers::messages::*;

    Router::new()
        .route("/", get(list_messages).post(send_message))
        .route("/read-all", post(mark_all_read))
        .route("/unread", get(unread_messages))
        .route("/by-consultation", get(by_consultation))
        .route("/{id}", get(get_message).delete(delete_message))
        .route("/{id}/read", post(mark_read))
}

fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/patient", get(handlers::dashboard::patient_dashboard))
        .route("/physician", get(handlers::dashboard::physician_dashboard))
}

fn admin_routes() -> Router<Arc<AppState>> {
    use handlers::admin::*;

    Router::new()
        // User management
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
        // First-aid authoring
        .route("/first-aid/modules", post(create_module))
        .route("/first-aid/modules/{id}", patch(update_module))
        .route("/first-aid/modules/{id}/contents", post(add_content))
        .route("/first-aid/modules/{id}/quizzes", post(create_quiz))
        .route(
            "/first-aid/contents/{id}",
            patch(update_content).delete(delete_content),
        )
        .route(
            "/first-aid/quizzes/{id}",
            get(get_quiz).patch(update_quiz),
        )
        .route(
            "/first-aid/quizzes/{id}/questions",
            put(replace_questions),
        )
        // Reporting
        .route("/statistics", get(get_statistics))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
}

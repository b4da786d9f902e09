use super::{handlers, state::AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Creates the Axum router with all the application routes.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/api/fact-check", post(handlers::fact_check_handler))
        .route("/api/analyze", post(handlers::analyze_handler))
        .route(
            "/api/chats",
            get(handlers::list_chats_handler)
                .post(handlers::create_chat_handler)
                .delete(handlers::delete_chat_handler),
        )
        .route("/api/auth/signup", post(handlers::signup_handler))
        .route("/api/auth/verify", post(handlers::verify_handler))
        .route("/api/auth/login", post(handlers::login_handler))
        .route(
            "/api/auth/forgot-password",
            post(handlers::forgot_password_handler),
        )
        .route(
            "/api/auth/reset-password",
            post(handlers::reset_password_handler),
        )
        .route(
            "/api/sync",
            get(handlers::sync_handler).post(handlers::sync_handler),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
}

use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post, put}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/transactions", post(handlers::form_add))
        .route("/transactions/:id/edit", post(handlers::form_edit))
        .route("/transactions/:id/delete", post(handlers::form_delete))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route(
            "/api/transactions",
            get(handlers::list_transactions).post(handlers::create_transaction),
        )
        .route(
            "/api/transactions/:id",
            put(handlers::update_transaction).delete(handlers::delete_transaction),
        )
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/signup", post(handlers::signup))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/auth/session", get(handlers::get_session))
        .with_state(state)
}

use crate::actions::{self, DeleteOutcome, EditOutcome};
use crate::errors::AppError;
use crate::models::{
    Credentials, DashboardResponse, DeleteForm, EditForm, MessageResponse, SessionResponse,
    Transaction, TransactionForm, TransactionId,
};
use crate::state::AppState;
use crate::summary::build_dashboard;
use crate::ui::render_index;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};

async fn dashboard(state: &AppState) -> DashboardResponse {
    let session = state.session().await;
    let ledger = state.ledger.lock().await;
    build_dashboard(state.mode, &session, &ledger.transactions, ledger.revision)
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(render_index(&dashboard(&state).await))
}

pub async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardResponse> {
    Json(dashboard(&state).await)
}

pub async fn list_transactions(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.transactions().await)
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<TransactionForm>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let created = actions::add_transaction(&state, &payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<EditForm>,
) -> Result<Response, AppError> {
    let id = TransactionId::new(id);
    Ok(match actions::edit_transaction(&state, &id, &payload).await? {
        EditOutcome::Updated(tx) => Json(tx).into_response(),
        EditOutcome::Cancelled => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(payload): Query<DeleteForm>,
) -> Result<Json<MessageResponse>, AppError> {
    let id = TransactionId::new(id);
    let message = match actions::delete_transaction(&state, &id, &payload).await? {
        DeleteOutcome::Deleted => "deleted",
        DeleteOutcome::Cancelled => "cancelled",
    };
    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

pub async fn form_add(
    State(state): State<AppState>,
    Form(payload): Form<TransactionForm>,
) -> Result<Redirect, AppError> {
    actions::add_transaction(&state, &payload).await?;
    Ok(Redirect::to("/"))
}

pub async fn form_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(payload): Form<EditForm>,
) -> Result<Redirect, AppError> {
    actions::edit_transaction(&state, &TransactionId::new(id), &payload).await?;
    Ok(Redirect::to("/"))
}

pub async fn form_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(payload): Form<DeleteForm>,
) -> Result<Redirect, AppError> {
    actions::delete_transaction(&state, &TransactionId::new(id), &payload).await?;
    Ok(Redirect::to("/"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<SessionResponse>, AppError> {
    actions::login(&state, &payload).await?;
    Ok(Json(state.session().await.to_response()))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<Credentials>,
) -> Result<Json<MessageResponse>, AppError> {
    actions::signup(&state, &payload).await?;
    Ok(Json(MessageResponse {
        message: "Account created. Check your email to verify it if confirmation is enabled."
            .to_string(),
    }))
}

pub async fn logout(State(state): State<AppState>) -> Json<SessionResponse> {
    actions::logout(&state).await;
    Json(state.session().await.to_response())
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(state.session().await.to_response())
}

//! User intents. Each write checks the session first, then validates, then
//! calls the backend, and finishes with a full reload.

use crate::auth::validate_credentials;
use crate::errors::{AppError, AuthError, StoreError};
use crate::models::{
    parse_amount, parse_date, BackendMode, Credentials, DeleteForm, EditForm, Transaction,
    TransactionForm, TransactionId, TransactionPatch, User,
};
use crate::state::{AppState, Session};
use axum::http::StatusCode;
use tracing::{error, info, warn};

#[derive(Debug, PartialEq)]
pub enum EditOutcome {
    Updated(Transaction),
    Cancelled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

async fn require_privileged(state: &AppState, message: &str) -> Result<(), AppError> {
    if state.is_privileged().await {
        Ok(())
    } else {
        Err(AppError::forbidden(message))
    }
}

/// Maps a failed backend write. An expired session also ends the admin
/// session here, so the page stops offering writes.
async fn write_failure(state: &AppState, verb: &str, err: StoreError) -> AppError {
    error!("failed to {verb} transaction: {err}");
    match err {
        StoreError::NotFound(_) => AppError::from(err),
        StoreError::Unauthorized(_) => {
            *state.session.lock().await = Session::default();
            warn!("admin session expired");
            AppError {
                status: StatusCode::UNAUTHORIZED,
                message: "Session expired. Please log in again.".to_string(),
            }
        }
        StoreError::Query(_) | StoreError::Write(_) => AppError {
            status: StatusCode::BAD_GATEWAY,
            message: format!("Failed to {verb} transaction: {err}"),
        },
    }
}

pub async fn add_transaction(
    state: &AppState,
    form: &TransactionForm,
) -> Result<Transaction, AppError> {
    require_privileged(state, "Only admins can add transactions.").await?;
    let record = form.validate()?;
    let created = match state.store.insert(record).await {
        Ok(created) => created,
        Err(err) => return Err(write_failure(state, "add", err).await),
    };
    info!(id = %created.id, "transaction added");
    state.reload().await;
    Ok(created)
}

/// Overwrites amount, description and date together. A blank amount means
/// the user backed out. A missing description or date keeps the current one;
/// when the row is not cached yet only the supplied fields are sent and the
/// backend decides whether the id exists.
pub async fn edit_transaction(
    state: &AppState,
    id: &TransactionId,
    form: &EditForm,
) -> Result<EditOutcome, AppError> {
    require_privileged(state, "Only admins can edit transactions.").await?;
    let Some(amount) = form.amount.as_deref().filter(|text| !text.trim().is_empty()) else {
        return Ok(EditOutcome::Cancelled);
    };
    let amount = parse_amount(amount)?;
    let current = state.find(id).await;

    let date = match form.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(text) => Some(parse_date(text)?),
        None => current.as_ref().map(|tx| tx.date),
    };
    let description = match &form.description {
        Some(text) => Some(text.clone()),
        None => current.map(|tx| tx.description.unwrap_or_default()),
    };

    let patch = TransactionPatch {
        date,
        description,
        amount: Some(amount),
    };
    let updated = match state.store.update(id, patch).await {
        Ok(updated) => updated,
        Err(err) => return Err(write_failure(state, "update", err).await),
    };
    info!(%id, "transaction updated");
    state.reload().await;
    Ok(EditOutcome::Updated(updated))
}

pub async fn delete_transaction(
    state: &AppState,
    id: &TransactionId,
    form: &DeleteForm,
) -> Result<DeleteOutcome, AppError> {
    require_privileged(state, "Only admins can delete transactions.").await?;
    if !form.confirm {
        return Ok(DeleteOutcome::Cancelled);
    }
    if let Err(err) = state.store.delete(id).await {
        return Err(write_failure(state, "delete", err).await);
    }
    info!(%id, "transaction deleted");
    state.reload().await;
    Ok(DeleteOutcome::Deleted)
}

pub async fn login(state: &AppState, credentials: &Credentials) -> Result<User, AppError> {
    let (email, password) = validate_credentials(credentials)?;
    let user = state.identity.sign_in(&email, &password).await.map_err(|err| {
        warn!("login failed: {err}");
        AppError::from(err)
    })?;
    *state.session.lock().await = Session::signed_in(user.clone());
    info!(user = %user.id, "admin session started");
    state.reload().await;
    Ok(user)
}

pub async fn signup(state: &AppState, credentials: &Credentials) -> Result<Option<User>, AppError> {
    if state.mode != BackendMode::Remote {
        return Err(AuthError::Unavailable.into());
    }
    let (email, password) = validate_credentials(credentials)?;
    let user = state.identity.sign_up(&email, &password).await?;
    info!(%email, "account created");
    Ok(user)
}

/// The local session is cleared even if the provider call fails.
pub async fn logout(state: &AppState) {
    if let Err(err) = state.identity.sign_out().await {
        warn!("sign-out failed: {err}");
    }
    *state.session.lock().await = Session::default();
    info!("admin session ended");
    state.reload().await;
}

/// Picks up an existing provider session at startup.
pub async fn restore_session(state: &AppState) {
    match state.identity.current_session().await {
        Ok(Some(user)) => {
            info!(user = %user.id, "restored session");
            *state.session.lock().await = Session::signed_in(user);
        }
        Ok(None) => {}
        Err(err) => warn!("could not restore session: {err}"),
    }
}

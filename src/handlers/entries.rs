use axum::{extract::State, Json};
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::models::entry::{
    ActivityRecord, EntriesResponse, LogStatus, StatusResponse, SubmitEntryRequest,
    SubmitEntryResponse,
};
use crate::AppState;

/// One submission, in strict sequence: generate the feedback message, append
/// the record, reload the full log for the running totals. A store failure
/// degrades into a `store_error` message rather than an API error — the
/// generated message is still returned even when the record was dropped.
pub async fn submit_entry(
    State(state): State<AppState>,
    Json(body): Json<SubmitEntryRequest>,
) -> AppResult<Json<SubmitEntryResponse>> {
    if !body.sleep.is_finite() || body.sleep < 0.0 {
        return Err(AppError::Validation(
            "Sleep hours must be a non-negative number".into(),
        ));
    }
    if !body.study.is_finite() || body.study < 0.0 {
        return Err(AppError::Validation(
            "Study hours must be a non-negative number".into(),
        ));
    }

    let date = body
        .date
        .unwrap_or_else(|| Utc::now().date_naive())
        .format("%Y-%m-%d")
        .to_string();
    let comment = body.comment.unwrap_or_default();

    let ai_msg = state
        .generator
        .generate(body.steps, body.sleep, body.study, &comment)
        .await;

    let record = ActivityRecord {
        date,
        steps: body.steps,
        sleep: body.sleep,
        study: body.study,
        comment,
        ai_msg: ai_msg.clone(),
    };

    let mut store_error = None;
    match state.store.append(&record).await {
        Ok(()) => {
            tracing::info!(date = %record.date, steps = record.steps, "Activity record appended");
        }
        Err(e) => {
            // No retry and no queue: the record is dropped, the user is told.
            tracing::error!(
                backend = state.store.backend_name(),
                error = %e,
                "Append failed, record dropped"
            );
            store_error = Some(format!("Could not save the record: {e}"));
        }
    }

    let records = match state.store.load().await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(
                backend = state.store.backend_name(),
                error = %e,
                "Reload after append failed"
            );
            store_error.get_or_insert(format!("Could not reload the log: {e}"));
            Vec::new()
        }
    };

    Ok(Json(SubmitEntryResponse {
        record,
        ai_msg,
        status: LogStatus::from_records(&records),
        store_error,
    }))
}

/// Full log, newest first. A failed load degrades to an empty list plus a
/// visible message instead of an error response.
pub async fn list_entries(State(state): State<AppState>) -> Json<EntriesResponse> {
    match state.store.load().await {
        Ok(mut entries) => {
            entries.reverse();
            Json(EntriesResponse {
                entries,
                store_error: None,
            })
        }
        Err(e) => {
            tracing::warn!(backend = state.store.backend_name(), error = %e, "Load failed");
            Json(EntriesResponse {
                entries: Vec::new(),
                store_error: Some(format!("Could not read the log: {e}")),
            })
        }
    }
}

/// Running totals, recomputed from the full log on every call.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    match state.store.load().await {
        Ok(records) => Json(StatusResponse {
            status: LogStatus::from_records(&records),
            store_error: None,
        }),
        Err(e) => {
            tracing::warn!(backend = state.store.backend_name(), error = %e, "Load failed");
            Json(StatusResponse {
                status: LogStatus::from_records(&[]),
                store_error: Some(format!("Could not read the log: {e}")),
            })
        }
    }
}

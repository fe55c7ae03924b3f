use super::rows::{CachedItemRow, PendingOperationRow};
use crate::domain::entities::{CachedItem, ItemState, PendingOperation};
use crate::domain::value_objects::{
    ClientId, OperationKind, OperationPayload, OperationStatus, Scope,
};
use crate::shared::error::AppError;
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;

pub(crate) fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| AppError::Storage(format!("Invalid timestamp: {millis}")))
}

pub(crate) fn pending_operation_from_row(
    row: PendingOperationRow,
) -> Result<PendingOperation, AppError> {
    Ok(PendingOperation {
        client_id: ClientId::new(row.client_id).map_err(AppError::Storage)?,
        kind: OperationKind::from_str(&row.kind).map_err(AppError::Storage)?,
        payload: OperationPayload::from_json_str(&row.payload)?,
        target: Scope::parse(&row.target).map_err(AppError::Storage)?,
        status: OperationStatus::from_str(&row.status).map_err(AppError::Storage)?,
        attempts: u32::try_from(row.attempts).unwrap_or(0),
        last_error: row.last_error,
        created_at: millis_to_datetime(row.created_at)?,
        sequence: Some(row.sequence),
        next_attempt_at: row.next_attempt_at.map(millis_to_datetime).transpose()?,
    })
}

pub(crate) fn cached_item_from_row(row: CachedItemRow) -> Result<CachedItem, AppError> {
    Ok(CachedItem {
        server_id: row.server_id,
        client_id: row
            .client_id
            .map(ClientId::new)
            .transpose()
            .map_err(AppError::Storage)?,
        scope: Scope::parse(&row.scope).map_err(AppError::Storage)?,
        version: row.version,
        created_at: millis_to_datetime(row.created_at)?,
        body: serde_json::from_str(&row.body)?,
        state: ItemState::from_str(&row.state).map_err(AppError::Storage)?,
    })
}

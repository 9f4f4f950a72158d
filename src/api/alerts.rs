use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::server::AppState;
use crate::alerts::{AlertDefinition, AlertUpdate, NewAlert};
use crate::errors::Result;

/// Response envelope shared by the JSON endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub user_id: Option<String>,
    pub symbol: Option<String>,
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> Result<Json<ApiResponse<Vec<AlertDefinition>>>> {
    let alerts = match (&query.user_id, &query.symbol) {
        (Some(user_id), symbol) => {
            let alerts = state.store.list_by_user(user_id).await?;
            match symbol {
                Some(symbol) => alerts.into_iter().filter(|a| &a.symbol == symbol).collect(),
                None => alerts,
            }
        }
        (None, Some(symbol)) => state.store.list_by_symbol(symbol).await?,
        (None, None) => state.store.list_all().await?,
    };

    Ok(Json(ApiResponse::new("Alerts retrieved", alerts)))
}

pub async fn create_alert(
    State(state): State<AppState>,
    Json(request): Json<NewAlert>,
) -> Result<(StatusCode, Json<ApiResponse<AlertDefinition>>)> {
    let alert = state.store.create(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new("Alert created", alert))))
}

pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AlertDefinition>>> {
    let alert = state.store.get(&id).await?;
    Ok(Json(ApiResponse::new("Alert retrieved", alert)))
}

pub async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<AlertUpdate>,
) -> Result<Json<ApiResponse<AlertDefinition>>> {
    let alert = state.store.update(&id, update).await?;
    Ok(Json(ApiResponse::new("Alert updated", alert)))
}

pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>> {
    state.store.delete(&id).await?;
    Ok(Json(ApiResponse::message("Alert deleted")))
}

use axum::{
    body::Bytes,
    extract::{Path, Query, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Days, NaiveDate};
use lotto_types::{parse_draw_date, DrawResult, SellerId, SlotLabel, DRAW_DATE_FORMAT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::validate_percentage;
use crate::service::{DrawError, DrawOutcome, DrawRequest};
use crate::DrawService;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest {
    draw_time: Option<String>,
    draw_date: Option<String>,
    login_id: Option<SellerId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    draw_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draw_time: Option<SlotLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<DrawResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DrawQuery {
    draw_date: Option<String>,
    draw_time: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NextSlotResponse {
    draw_date: String,
    draw_time: SlotLabel,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PriorityResponse {
    seller_id: SellerId,
    prior_winning: bool,
}

#[derive(Deserialize)]
struct WinPercentageRequest {
    percentage: f64,
}

#[derive(Serialize)]
struct WinPercentageResponse {
    percentage: f64,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn draw_error_response(err: DrawError) -> Response {
    let status = match &err {
        DrawError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DrawError::AggregationTimeout { .. } | DrawError::ExecutionTimeout { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        DrawError::Engine(_) | DrawError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

fn format_date(date: NaiveDate) -> String {
    date.format(DRAW_DATE_FORMAT).to_string()
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

pub(super) async fn trigger_draw(
    AxumState(service): AxumState<Arc<DrawService>>,
    body: Bytes,
) -> Response {
    let payload: TriggerRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::debug!(%err, "invalid trigger body");
            return error_response(StatusCode::BAD_REQUEST, format!("invalid body: {err}"));
        }
    };
    let request = match DrawRequest::parse(
        payload.draw_date.as_deref(),
        payload.draw_time.as_deref(),
        payload.login_id,
    ) {
        Ok(request) => request,
        Err(err) => return draw_error_response(err),
    };

    match service.generate(request).await {
        Ok(DrawOutcome::Generated(result)) => Json(TriggerResponse {
            status: "generated",
            draw_date: None,
            draw_time: None,
            result: Some(result),
        })
        .into_response(),
        Ok(DrawOutcome::AlreadyGenerated(key)) => (
            StatusCode::CONFLICT,
            Json(TriggerResponse {
                status: "already_generated",
                draw_date: Some(format_date(key.draw_date)),
                draw_time: Some(key.draw_slot),
                result: None,
            }),
        )
            .into_response(),
        Ok(DrawOutcome::InProgress(key)) => (
            StatusCode::CONFLICT,
            Json(TriggerResponse {
                status: "in_progress",
                draw_date: Some(format_date(key.draw_date)),
                draw_time: Some(key.draw_slot),
                result: None,
            }),
        )
            .into_response(),
        Err(err) => draw_error_response(err),
    }
}

pub(super) async fn get_draw(
    AxumState(service): AxumState<Arc<DrawService>>,
    Query(query): Query<DrawQuery>,
) -> Response {
    let request = match DrawRequest::parse(
        query.draw_date.as_deref(),
        query.draw_time.as_deref(),
        None,
    ) {
        Ok(request) => request,
        Err(err) => return draw_error_response(err),
    };
    match service.find(request.key).await {
        Ok(Some(result)) => Json(result).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no result for {}", request.key),
        ),
        Err(err) => draw_error_response(err),
    }
}

pub(super) async fn latest_draw(
    AxumState(service): AxumState<Arc<DrawService>>,
    Query(query): Query<DrawQuery>,
) -> Response {
    let date = match query.draw_date.as_deref() {
        Some(raw) => match parse_draw_date(raw) {
            Ok(date) => date,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
        },
        None => service.clock().today(),
    };
    match service.latest_for_date(date, None).await {
        Ok(Some(result)) => Json(result).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no results for {}", format_date(date)),
        ),
        Err(err) => draw_error_response(err),
    }
}

pub(super) async fn next_slot(AxumState(service): AxumState<Arc<DrawService>>) -> Response {
    let now = service.clock().now();
    let today = now.date_naive();
    let (date, slot) = match SlotLabel::next_after(now.time()) {
        Some(slot) => (today, slot),
        // past the last draw: first slot of the next business day
        None => match (today.checked_add_days(Days::new(1)), SlotLabel::all().next()) {
            (Some(tomorrow), Some(first)) => (tomorrow, first),
            _ => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "no upcoming slot")
            }
        },
    };
    Json(NextSlotResponse {
        draw_date: format_date(date),
        draw_time: slot,
    })
    .into_response()
}

pub(super) async fn toggle_priority(
    AxumState(service): AxumState<Arc<DrawService>>,
    Path(seller_id): Path<SellerId>,
) -> Response {
    match service.toggle_seller_priority(seller_id).await {
        Ok(Some(prior_winning)) => {
            tracing::info!(seller = seller_id, prior_winning, "seller priority toggled");
            Json(PriorityResponse {
                seller_id,
                prior_winning,
            })
            .into_response()
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("seller {seller_id} not found"),
        ),
        Err(err) => draw_error_response(err),
    }
}

pub(super) async fn set_win_percentage(
    AxumState(service): AxumState<Arc<DrawService>>,
    body: Bytes,
) -> Response {
    let payload: WinPercentageRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid body: {err}"))
        }
    };
    let percentage = match validate_percentage(payload.percentage) {
        Ok(percentage) => percentage,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };
    match service.record_win_percent(percentage).await {
        Ok(()) => {
            tracing::info!(percentage, "win percentage updated");
            Json(WinPercentageResponse { percentage }).into_response()
        }
        Err(err) => draw_error_response(err),
    }
}

pub(super) async fn draw_metrics(AxumState(service): AxumState<Arc<DrawService>>) -> Response {
    Json(service.metrics().snapshot()).into_response()
}

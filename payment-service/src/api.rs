use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use crate::error::PaymentError;
use crate::gateway::{MidtransNotification, NotificationVerifier};
use crate::models::Payment;
use crate::store::{PaymentListParams, SortColumn, SortOrder};
use crate::workflow::{CreatePayment, PaymentWorkflow, WebhookOutcome};

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<PaymentWorkflow>,
    pub notifications: NotificationVerifier,
}

/// Envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: Option<T>) -> Self {
        Self {
            status: "success".to_string(),
            message: "success".to_string(),
            data,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    data: Option<serde_json::Value>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            data: None,
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let status = match err {
            PaymentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: err.to_string(),
            data: None,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Unprocessable Entity".to_string(),
            data: serde_json::to_value(&errors).ok(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            status: "error".to_string(),
            message: self.message,
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    #[serde(rename = "orderID")]
    pub order_id: Uuid,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[serde(rename = "expiredAt")]
    pub expired_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListQuery {
    #[validate(range(min = 1))]
    pub page: i64,
    #[validate(range(min = 1, max = 100))]
    pub limit: i64,
    pub sort_column: Option<SortColumn>,
    pub sort_order: Option<SortOrder>,
}

impl PaymentListQuery {
    fn into_params(self) -> PaymentListParams {
        let params = PaymentListParams::new(self.page, self.limit);
        match self.sort_column {
            Some(column) => params.with_sort(column, self.sort_order.unwrap_or(SortOrder::Desc)),
            None => params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub uuid: Uuid,
    #[serde(rename = "orderID")]
    pub order_id: Uuid,
    pub amount: f64,
    pub status: String,
    pub payment_link: String,
    pub invoice_link: Option<String>,
    pub va_number: Option<String>,
    pub bank: Option<String>,
    pub acquirer: Option<String>,
    #[serde(rename = "transactionID")]
    pub transaction_id: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expired_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            uuid: payment.uuid,
            order_id: payment.order_id,
            amount: payment.amount.to_f64().unwrap_or_default(),
            status: payment.status.to_string(),
            payment_link: payment.payment_link,
            invoice_link: payment.invoice_link,
            va_number: payment.va_number,
            bank: payment.bank,
            acquirer: payment.acquirer,
            transaction_id: payment.transaction_id,
            description: payment.description,
            paid_at: payment.paid_at,
            expired_at: payment.expired_at,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    pub count: i64,
    pub total_page: i64,
    pub current_page: i64,
    pub next_page: Option<i64>,
    pub previous_page: Option<i64>,
    pub limit: i64,
    pub data: Vec<T>,
}

impl<T> PaginationResult<T> {
    pub fn new(page: i64, limit: i64, count: i64, data: Vec<T>) -> Self {
        let total_page = if limit > 0 { (count + limit - 1) / limit } else { 0 };
        Self {
            count,
            total_page,
            current_page: page,
            next_page: (page < total_page).then_some(page + 1),
            previous_page: (page > 1).then_some(page - 1),
            limit,
            data,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/api/v1/payments", get(list_payments).post(create_payment))
        .route("/api/v1/payments/webhook", post(webhook))
        .route("/api/v1/payments/:uuid", get(get_payment))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn list_payments(
    State(state): State<AppState>,
    query: Result<Query<PaymentListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<PaginationResult<PaymentResponse>>>, ApiError> {
    let Query(query) = query?;
    query.validate()?;

    let (page, limit) = (query.page, query.limit);
    let (payments, count) = state.workflow.list(&query.into_params()).await?;
    let data = payments.into_iter().map(PaymentResponse::from).collect();

    Ok(Json(ApiResponse::success(Some(PaginationResult::new(
        page, limit, count, data,
    )))))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    // an id that is not a UUID cannot match any payment
    let uuid = Uuid::parse_str(&uuid).map_err(|_| PaymentError::PaymentNotFound)?;
    let payment = state.workflow.get_by_uuid(uuid).await?;
    Ok(Json(ApiResponse::success(Some(payment.into()))))
}

pub async fn create_payment(
    State(state): State<AppState>,
    request: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ApiError> {
    let Json(request) = request?;
    request.validate()?;

    let amount = BigDecimal::from_f64(request.amount)
        .ok_or_else(|| PaymentError::Validation("amount is not a finite number".to_string()))?;

    let payment = state
        .workflow
        .create_payment(CreatePayment {
            order_id: request.order_id,
            amount,
            description: request.description,
            expired_at: request.expired_at,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(Some(payment.into()))),
    ))
}

pub async fn webhook(
    State(state): State<AppState>,
    request: Result<Json<MidtransNotification>, JsonRejection>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let Json(notification) = request?;
    let notification = state.notifications.verify(notification)?;

    match state.workflow.handle_webhook(notification).await {
        Ok(WebhookOutcome::Applied(_)) | Ok(WebhookOutcome::Duplicate(_)) => {
            Ok(Json(ApiResponse::success(None)))
        }
        // logged by the publisher and the store
        Err(e @ (PaymentError::Publish(_) | PaymentError::Storage(_))) => Err(e.into()),
        Err(e) => {
            tracing::warn!("Webhook rejected: {}", e);
            Err(e.into())
        }
    }
}

pub async fn welcome() -> Json<ApiResponse<()>> {
    Json(ApiResponse {
        status: "success".to_string(),
        message: "Welcome to Payment Service".to_string(),
        data: None,
    })
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn not_found(uri: axum::http::Uri) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("Path {} Not Found", uri.path()),
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_reports_neighbouring_pages() {
        let result = PaginationResult::new(2, 10, 25, vec![(); 10]);
        assert_eq!(result.total_page, 3);
        assert_eq!(result.next_page, Some(3));
        assert_eq!(result.previous_page, Some(1));
    }

    #[test]
    fn single_page_has_no_neighbours() {
        let result = PaginationResult::new(1, 10, 4, vec![(); 4]);
        assert_eq!(result.total_page, 1);
        assert_eq!(result.next_page, None);
        assert_eq!(result.previous_page, None);
    }

    #[test]
    fn empty_listing_has_zero_pages() {
        let result: PaginationResult<()> = PaginationResult::new(1, 10, 0, vec![]);
        assert_eq!(result.total_page, 0);
        assert_eq!(result.next_page, None);
    }

    #[test]
    fn sort_column_without_order_defaults_to_descending() {
        let query = PaymentListQuery {
            page: 1,
            limit: 10,
            sort_column: Some(SortColumn::Amount),
            sort_order: None,
        };
        let params = query.into_params();
        assert_eq!(params.sort.column, SortColumn::Amount);
        assert_eq!(params.sort.order, SortOrder::Desc);
    }

    #[test]
    fn validation_errors_map_to_unprocessable_entity() {
        let err = ApiError::from(PaymentError::Validation("bad".to_string()));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        let err = ApiError::from(PaymentError::ExpiredAtInvalid);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn non_positive_amount_fails_validation() {
        let request = PaymentRequest {
            order_id: Uuid::new_v4(),
            amount: 0.0,
            description: None,
            expired_at: Utc::now(),
        };
        assert!(request.validate().is_err());
    }
}

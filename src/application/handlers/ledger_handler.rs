use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::services::ledger_service::{LedgerService, Signup, TradeOrder};
use crate::auth::Claims;
use crate::domain::entities::settlement::SettlementRecord;
use crate::domain::entities::stock::{NewStockSnapshot, StockSnapshot};
use crate::domain::entities::transaction::Transaction;
use crate::domain::entities::user::UserProfile;
use crate::domain::errors::LedgerError;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A ledger error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LedgerError::invalid(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(LedgerError::invalid(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LedgerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::DependencyFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Email", default)]
    pub email: String,
    #[serde(alias = "Password")]
    pub password: String,
    #[serde(alias = "Balance", default)]
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "Password")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserProfile,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(alias = "Ticker")]
    pub ticker: String,
    #[serde(alias = "OpenPrice")]
    pub open_price: f64,
    #[serde(alias = "ClosePrice")]
    pub close_price: f64,
    #[serde(alias = "High")]
    pub high: f64,
    #[serde(alias = "Low")]
    pub low: f64,
    #[serde(alias = "Volume")]
    pub volume: i64,
}

impl From<IngestRequest> for NewStockSnapshot {
    fn from(r: IngestRequest) -> Self {
        NewStockSnapshot {
            ticker: r.ticker,
            open_price: r.open_price,
            close_price: r.close_price,
            high: r.high,
            low: r.low,
            volume: r.volume,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub data: StockSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StockDataResponse {
    pub data: Vec<StockSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TickerResponse {
    pub ticker: Vec<StockSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserTransactionsResponse {
    pub transaction: Vec<Transaction>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionRangeResponse {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    #[serde(alias = "UserID", default)]
    pub user_id: Option<i64>,
    #[serde(alias = "Ticker")]
    pub ticker: String,
    #[serde(alias = "TransactionType")]
    pub transaction_type: String,
    #[serde(alias = "TransactionVolume")]
    pub transaction_volume: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionAccepted {
    pub message: String,
    pub settlement_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub settlement: SettlementRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SettlementListResponse {
    pub settlements: Vec<SettlementRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn signup(
    State(service): State<Arc<LedgerService>>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(body) = body?;
    service
        .signup(Signup {
            username: body.username,
            email: body.email,
            password: body.password,
            balance: body.balance,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User created successfully".to_string(),
        }),
    ))
}

pub async fn login(
    State(service): State<Arc<LedgerService>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(body) = body?;
    let token = service.login(&body.username, &body.password).await?;
    Ok(Json(TokenResponse { token }))
}

pub async fn get_user_data(
    State(service): State<Arc<LedgerService>>,
    Path(username): Path<String>,
) -> ApiResult<UserResponse> {
    let user = service.user_profile(&username).await?;
    Ok(Json(UserResponse { user }))
}

pub async fn ingest_stock_data(
    State(service): State<Arc<LedgerService>>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    let Json(body) = body?;
    let data = service.ingest_snapshot(body.into()).await?;
    Ok(Json(IngestResponse {
        message: "Data saved successfully".to_string(),
        data,
    }))
}

pub async fn retrieve_stock_data(
    State(service): State<Arc<LedgerService>>,
) -> ApiResult<StockDataResponse> {
    let data = service.all_snapshots().await?;
    Ok(Json(StockDataResponse { data }))
}

pub async fn specific_stock_data(
    State(service): State<Arc<LedgerService>>,
    Path(ticker): Path<String>,
) -> ApiResult<TickerResponse> {
    let ticker = service.snapshots_for_ticker(&ticker).await?;
    Ok(Json(TickerResponse { ticker }))
}

pub async fn user_transactions(
    State(service): State<Arc<LedgerService>>,
    user_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<UserTransactionsResponse> {
    let Path(user_id) = user_id?;
    let transaction = service.transactions_for_user(user_id).await?;
    Ok(Json(UserTransactionsResponse { transaction }))
}

/// Accept a trade for asynchronous settlement
pub async fn submit_transaction(
    State(service): State<Arc<LedgerService>>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> ApiResult<TransactionAccepted> {
    let Json(body) = body?;
    let handle = service
        .submit_trade(
            claims.user_id,
            TradeOrder {
                user_id: body.user_id,
                ticker: body.ticker,
                side: body.transaction_type,
                volume: body.transaction_volume,
            },
        )
        .await?;

    // The settlement keeps running in the worker; its outcome is read back by id
    Ok(Json(TransactionAccepted {
        message: "Transaction is processing".to_string(),
        settlement_id: handle.settlement_id,
    }))
}

pub async fn transactions_between(
    State(service): State<Arc<LedgerService>>,
    params: Result<Path<(i64, String, String)>, PathRejection>,
) -> ApiResult<TransactionRangeResponse> {
    let Path((user_id, start, end)) = params?;
    let transactions = service.transactions_between(user_id, &start, &end).await?;
    Ok(Json(TransactionRangeResponse { transactions }))
}

pub async fn get_settlement(
    State(service): State<Arc<LedgerService>>,
    settlement_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<SettlementResponse> {
    let Path(settlement_id) = settlement_id?;
    let settlement = service.settlement(settlement_id).await?;
    Ok(Json(SettlementResponse { settlement }))
}

pub async fn user_settlements(
    State(service): State<Arc<LedgerService>>,
    user_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<SettlementListResponse> {
    let Path(user_id) = user_id?;
    let settlements = service.settlements_for_user(user_id).await?;
    Ok(Json(SettlementListResponse { settlements }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LedgerError::invalid("x"), StatusCode::BAD_REQUEST),
            (LedgerError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (LedgerError::not_found("x"), StatusCode::NOT_FOUND),
            (LedgerError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                LedgerError::InsufficientBalance {
                    required: 2.0,
                    available: 1.0,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (LedgerError::dependency("x"), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[test]
    fn test_transaction_request_accepts_pascal_case_fields() {
        let body: TransactionRequest = serde_json::from_str(
            r#"{"UserID": 3, "Ticker": "AAPL", "TransactionType": "Buy", "TransactionVolume": 5}"#,
        )
        .unwrap();
        assert_eq!(body.user_id, Some(3));
        assert_eq!(body.ticker, "AAPL");
        assert_eq!(body.transaction_type, "Buy");
        assert_eq!(body.transaction_volume, 5);

        let body: TransactionRequest = serde_json::from_str(
            r#"{"ticker": "AAPL", "transaction_type": "sell", "transaction_volume": 1}"#,
        )
        .unwrap();
        assert_eq!(body.user_id, None);
    }

    #[test]
    fn test_ingest_request_accepts_both_casings() {
        let body: IngestRequest = serde_json::from_str(
            r#"{"Ticker": "AAPL", "OpenPrice": 1.0, "close_price": 2.0, "High": 3.0, "low": 0.5, "Volume": 10}"#,
        )
        .unwrap();
        let snapshot: NewStockSnapshot = body.into();
        assert_eq!(snapshot.close_price, 2.0);
        assert_eq!(snapshot.low, 0.5);
    }
}

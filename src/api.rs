//! HTTP surface of the ledger node.
//!
//! Handlers only translate between JSON and [`Ledger`] calls. Every failure is
//! rendered as `{ "ok": false, "error", "kind" }`: 400 for validation errors,
//! 500 for storage failures.

use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::storage::LedgerStore;
use crate::types::LedgerEvent;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

type ApiResult = Result<Json<Value>, LedgerError>;

pub struct AppState<S> {
    ledger: Arc<Ledger<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Key material of the sender; the sender address is derived from it.
    pub pkey: String,
    /// Recipient address.
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedBlock {
    pub block: String,
    #[serde(rename = "prevBlock")]
    pub prev_block: String,
    pub address: String,
    pub nonce: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = json!({
            "ok": false,
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (status, Json(body)).into_response()
    }
}

fn rejected(operation: &'static str, err: LedgerError) -> LedgerError {
    if err.is_validation() {
        tracing::warn!(operation, kind = err.kind(), error = %err, "request rejected");
    } else {
        tracing::error!(operation, error = %err, "storage failure");
    }
    err
}

fn malformed_body(operation: &'static str, rejection: JsonRejection) -> LedgerError {
    rejected(operation, LedgerError::MalformedRequest(rejection.body_text()))
}

fn malformed_path(operation: &'static str, rejection: PathRejection) -> LedgerError {
    rejected(operation, LedgerError::MalformedRequest(rejection.body_text()))
}

fn record(event: &LedgerEvent) {
    match event {
        LedgerEvent::TransferApplied { transaction } => tracing::info!(
            id = transaction.id,
            sender = %transaction.sender,
            recipient = %transaction.recipient,
            amount = transaction.amount,
            "transfer applied"
        ),
        LedgerEvent::BlockAccepted { block, reward } => tracing::info!(
            id = block.id,
            hash = %block.block_hash,
            miner = %block.miner_address,
            reward = reward.amount,
            "block accepted"
        ),
    }
}

fn to_json<T: Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|err| LedgerError::StorageFailure(err.to_string()))
}

/// Runs a mutation on the blocking pool; sled commits may flush to disk.
async fn mutate<S, F>(state: &AppState<S>, operation: &'static str, op: F) -> ApiResult
where
    S: LedgerStore,
    F: FnOnce(&Ledger<S>) -> crate::Result<LedgerEvent> + Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);
    let outcome = tokio::task::spawn_blocking(move || op(&ledger))
        .await
        .map_err(|err| LedgerError::StorageFailure(format!("worker failed: {}", err)))
        .and_then(|result| result);
    match outcome {
        Ok(event) => {
            record(&event);
            Ok(Json(json!({ "ok": true })))
        }
        Err(err) => Err(rejected(operation, err)),
    }
}

// --- Addresses ---

async fn get_address<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> ApiResult {
    let record = state
        .ledger
        .address(&address)
        .map_err(|err| rejected("get_address", err))?;
    Ok(Json(json!({
        "address": record.address,
        "balance": record.balance,
    })))
}

async fn list_addresses<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let addresses = state
        .ledger
        .addresses()
        .map_err(|err| rejected("list_addresses", err))?;
    to_json(addresses)
}

// --- Transactions ---

async fn create_transaction<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<TransactionRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload.map_err(|rejection| malformed_body("transfer", rejection))?;
    mutate(&state, "transfer", move |ledger| {
        ledger.submit_transfer(&req.pkey, &req.address, req.amount)
    })
    .await
}

async fn get_transaction<S: LedgerStore>(
    State(state): State<AppState<S>>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(|rejection| malformed_path("get_transaction", rejection))?;
    match state
        .ledger
        .transaction(id)
        .map_err(|err| rejected("get_transaction", err))?
    {
        Some(transaction) => to_json(transaction),
        None => Ok(Json(json!({}))),
    }
}

async fn address_transactions<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> ApiResult {
    let transactions = state
        .ledger
        .transactions_for(&address)
        .map_err(|err| rejected("address_transactions", err))?;
    to_json(transactions)
}

async fn list_transactions<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let transactions = state
        .ledger
        .transactions()
        .map_err(|err| rejected("list_transactions", err))?;
    to_json(transactions)
}

// --- Blocks ---

async fn get_tip<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let tip = state
        .ledger
        .tip_hash()
        .map_err(|err| rejected("get_tip", err))?;
    Ok(Json(json!({ "block": tip })))
}

async fn submit_block<S: LedgerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<SubmittedBlock>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload.map_err(|rejection| malformed_body("submit_block", rejection))?;
    mutate(&state, "submit_block", move |ledger| {
        ledger.submit_block(&req.block, &req.prev_block, &req.address, &req.nonce)
    })
    .await
}

async fn list_blocks<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let blocks = state
        .ledger
        .blocks()
        .map_err(|err| rejected("list_blocks", err))?;
    to_json(blocks)
}

async fn get_block<S: LedgerStore>(
    State(state): State<AppState<S>>,
    id: Result<Path<u64>, PathRejection>,
) -> ApiResult {
    let Path(id) = id.map_err(|rejection| malformed_path("get_block", rejection))?;
    match state
        .ledger
        .block(id)
        .map_err(|err| rejected("get_block", err))?
    {
        Some(block) => to_json(block),
        None => Ok(Json(json!({}))),
    }
}

// --- Node ---

async fn verify<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let report = state
        .ledger
        .verify_chain()
        .map_err(|err| rejected("verify", err))?;
    to_json(report)
}

async fn stats<S: LedgerStore>(State(state): State<AppState<S>>) -> ApiResult {
    let stats = state
        .ledger
        .stats()
        .map_err(|err| rejected("stats", err))?;
    to_json(stats)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "hashledger",
    }))
}

pub fn router<S: LedgerStore>(ledger: Arc<Ledger<S>>) -> Router {
    Router::new()
        .route("/address/:address", get(get_address::<S>))
        .route("/addresses", get(list_addresses::<S>))
        .route("/transaction", post(create_transaction::<S>))
        .route("/transaction/:id", get(get_transaction::<S>))
        .route("/transactions", get(list_transactions::<S>))
        .route("/transactions/:address", get(address_transactions::<S>))
        .route("/block", get(get_tip::<S>).post(submit_block::<S>))
        .route("/blocks", get(list_blocks::<S>))
        .route("/blocks/:id", get(get_block::<S>))
        .route("/verify", get(verify::<S>))
        .route("/stats", get(stats::<S>))
        .route("/health", get(health))
        .with_state(AppState { ledger })
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<S, F>(
    listener: TcpListener,
    ledger: Arc<Ledger<S>>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: LedgerStore,
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(addr = %listener.local_addr()?, "ledger API listening");
    axum::serve(listener, router(ledger))
        .with_graceful_shutdown(shutdown)
        .await
}

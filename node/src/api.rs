//! # REST API
//!
//! Builds the axum router that exposes the ledger over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! Callers identify themselves with a `caller` (or `depositor`) field. The
//! node trusts it; authenticating that address is the job of whatever sits
//! in front of the node.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Description                       |
//! |--------|-----------------------------|-----------------------------------|
//! | GET    | `/health`                   | Liveness probe                    |
//! | GET    | `/status`                   | Entity count, state root, pauses  |
//! | POST   | `/entities`                 | Register an entity                |
//! | PUT    | `/entities`                 | Replace roles and metadata        |
//! | GET    | `/entities/:address`        | Entity of an address              |
//! | DELETE | `/entities/:address`        | Remove an entity                  |
//! | GET    | `/registry/:id`             | Entity by numeric id              |
//! | POST   | `/wallets`                  | Assign a treasury/assistant       |
//! | DELETE | `/wallets`                  | Revoke a treasury/assistant       |
//! | POST   | `/deposits`                 | Deposit funds                     |
//! | POST   | `/withdrawals`              | Entity withdrawal                 |
//! | POST   | `/fees/withdrawals`         | Protocol fee withdrawal           |
//! | GET    | `/balances/:entity/:asset`  | One balance                       |
//! | GET    | `/assets/:entity`           | Asset list, optionally paginated  |
//!
//! Every mutation is persisted, together with the custody image, before the
//! response is sent.
//!
//! Fee routing (`LedgerService::route_fee`) has no route. The host that
//! charges fees calls the library directly; only collecting them is exposed.
//!
//! ## Errors
//!
//! Ledger errors map onto status codes and a JSON body
//! `{ "error": "<message>", "kind": "<LedgerError kind>" }`.

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nova_ledger::config::DEFAULT_PAGE_SIZE;
use nova_ledger::{
    Address, Amount, AssetId, CustodyVault, EntityId, EntityInfo, Governance, LedgerDb,
    LedgerError, LedgerService, Region, RoleKind, WalletKind,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The ledger.
    pub ledger: Arc<LedgerService>,
    /// Pause flags, reported by `/status`.
    pub governance: Arc<Governance>,
    /// Custody behind the ledger. Persisted with every save.
    pub vault: Arc<CustodyVault>,
    /// Persistent storage. Written after every successful mutation.
    pub db: LedgerDb,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Writes the current ledger state and custody image to disk.
    ///
    /// Runs under the ledger lock, so the image matches the state.
    fn persist(&self) -> Result<(), ApiError> {
        self.ledger
            .with_state(|state| self.db.save_with_custody(state, &self.vault.snapshot()))
            .map_err(|e| {
                tracing::error!(error = %e, "failed to persist ledger state");
                ApiError::Internal("failed to persist ledger state".to_string())
            })
    }

    /// Records a rejected ledger call and converts it.
    fn rejected(&self, err: LedgerError) -> ApiError {
        self.metrics.record_rejection(err.kind());
        ApiError::Ledger(err)
    }

    fn refresh_entity_gauge(&self) {
        self.metrics
            .entities_registered
            .set(self.ledger.entity_count() as i64);
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    /// The ledger refused the operation.
    Ledger(LedgerError),
    /// The request itself was malformed.
    BadRequest(String),
    /// The node failed after the ledger accepted the operation.
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Machine-readable kind.
    pub kind: String,
}

/// HTTP status for a ledger error.
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::EntityAlreadyExists(_) => StatusCode::CONFLICT,
        LedgerError::NoSuchEntity(_) | LedgerError::UnknownEntityId(_) => StatusCode::NOT_FOUND,
        LedgerError::InvalidRoleSet
        | LedgerError::ZeroAmount
        | LedgerError::ZeroDepositNotAllowed
        | LedgerError::PaymentMismatch { .. }
        | LedgerError::ArrayLengthMismatch { .. } => StatusCode::BAD_REQUEST,
        LedgerError::NotEntityTreasury { .. }
        | LedgerError::NotEntityAssistant { .. }
        | LedgerError::Unauthorized(_) => StatusCode::FORBIDDEN,
        LedgerError::NothingToWithdraw(_)
        | LedgerError::InsufficientFunds { .. }
        | LedgerError::Overflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::RegionPaused(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::TransferFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Ledger(err) => (
                status_for(&err),
                ErrorBody {
                    error: err.to_string(),
                    kind: err.kind().to_string(),
                },
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: msg,
                    kind: "BadRequest".to_string(),
                },
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: msg,
                    kind: "Internal".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /entities` and `PUT /entities`.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntityRequest {
    pub caller: Address,
    pub roles: Vec<RoleKind>,
    #[serde(default)]
    pub metadata_uri: String,
}

/// Response carrying an entity id.
#[derive(Debug, Serialize, Deserialize)]
pub struct EntityIdResponse {
    pub id: EntityId,
}

/// Body of `POST /wallets` and `DELETE /wallets`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletRequest {
    /// Owner of the entity.
    pub caller: Address,
    /// Role scope; absent for entity-wide.
    #[serde(default)]
    pub scope: Option<RoleKind>,
    pub kind: WalletKind,
    pub wallet: Address,
}

/// Response of wallet assignment calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    /// Whether the call changed anything.
    pub changed: bool,
}

/// Body of `POST /deposits`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DepositRequest {
    pub depositor: Address,
    pub entity: EntityId,
    pub asset: AssetId,
    pub amount: Amount,
    /// Native value carried with the deposit; must equal `amount` for the
    /// native asset and be zero for tokens.
    #[serde(default)]
    pub attached_native: Amount,
}

/// Body of `POST /withdrawals`.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub caller: Address,
    pub entity: EntityId,
    pub destination: Address,
    #[serde(default)]
    pub tokens: Vec<AssetId>,
    #[serde(default)]
    pub amounts: Vec<Amount>,
}

/// Body of `POST /fees/withdrawals`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeeWithdrawalRequest {
    pub caller: Address,
    #[serde(default)]
    pub tokens: Vec<AssetId>,
    #[serde(default)]
    pub amounts: Vec<Amount>,
}

/// One transferred line.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LineItem {
    pub asset: AssetId,
    pub amount: Amount,
}

/// Response of withdrawal calls.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub lines: Vec<LineItem>,
}

/// Response of `GET /balances/:entity/:asset` and `POST /deposits`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub entity: EntityId,
    pub asset: AssetId,
    pub balance: Amount,
}

/// Query of `GET /assets/:entity`.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Response of `GET /assets/:entity`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetsResponse {
    pub entity: EntityId,
    pub assets: Vec<AssetId>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Live entities.
    pub entities: usize,
    /// Hex-encoded Merkle root of ledger state.
    pub state_root: String,
    /// Regions currently paused.
    pub paused_regions: Vec<Region>,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/entities", post(register_handler).put(update_handler))
        .route("/entities/:address", get(entity_handler).delete(remove_handler))
        .route("/registry/:id", get(entity_by_id_handler))
        .route("/wallets", post(assign_wallet_handler).delete(revoke_wallet_handler))
        .route("/deposits", post(deposit_handler))
        .route("/withdrawals", post(withdraw_handler))
        .route("/fees/withdrawals", post(fee_withdraw_handler))
        .route("/balances/:entity/:asset", get(balance_handler))
        .route("/assets/:entity", get(assets_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid address {raw}: {e}")))
}

fn parse_asset(raw: &str) -> Result<AssetId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid asset {raw}: {e}")))
}

fn lines(items: Vec<(AssetId, Amount)>) -> WithdrawalResponse {
    WithdrawalResponse {
        lines: items
            .into_iter()
            .map(|(asset, amount)| LineItem { asset, amount })
            .collect(),
    }
}

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        entities: state.ledger.entity_count(),
        state_root: hex::encode(state.ledger.state_root()),
        paused_regions: state.governance.paused_regions(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /entities`
async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<EntityRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["register"])
        .start_timer();

    let id = state
        .ledger
        .register(req.caller, &req.roles, &req.metadata_uri)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    state.refresh_entity_gauge();
    Ok((StatusCode::CREATED, Json(EntityIdResponse { id })))
}

/// `PUT /entities`
async fn update_handler(
    State(state): State<AppState>,
    Json(req): Json<EntityRequest>,
) -> Result<Json<EntityIdResponse>, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["update"])
        .start_timer();

    let id = state
        .ledger
        .update(req.caller, &req.roles, &req.metadata_uri)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    Ok(Json(EntityIdResponse { id }))
}

/// `DELETE /entities/:address`
async fn remove_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EntityIdResponse>, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["remove"])
        .start_timer();

    let caller = parse_address(&address)?;
    let id = state.ledger.remove(caller).map_err(|e| state.rejected(e))?;
    state.persist()?;
    state.refresh_entity_gauge();
    Ok(Json(EntityIdResponse { id }))
}

/// `GET /entities/:address`
async fn entity_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<EntityInfo>, ApiError> {
    let address = parse_address(&address)?;
    let info = state.ledger.get_entity(&address).map_err(ApiError::Ledger)?;
    Ok(Json(info))
}

/// `GET /registry/:id`
async fn entity_by_id_handler(
    Path(id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<EntityInfo>, ApiError> {
    let info = state
        .ledger
        .entity_by_id(EntityId::new(id))
        .map_err(ApiError::Ledger)?;
    Ok(Json(info))
}

/// `POST /wallets`
async fn assign_wallet_handler(
    State(state): State<AppState>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let changed = state
        .ledger
        .assign_wallet(req.caller, req.scope, req.kind, req.wallet)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    Ok(Json(WalletResponse { changed }))
}

/// `DELETE /wallets`
async fn revoke_wallet_handler(
    State(state): State<AppState>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let changed = state
        .ledger
        .revoke_wallet(req.caller, req.scope, req.kind, &req.wallet)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    Ok(Json(WalletResponse { changed }))
}

/// `POST /deposits`
async fn deposit_handler(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["deposit"])
        .start_timer();

    let balance = state
        .ledger
        .deposit(req.depositor, req.entity, req.asset, req.amount, req.attached_native)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    state.metrics.deposits_total.inc();
    Ok(Json(BalanceResponse {
        entity: req.entity,
        asset: req.asset,
        balance,
    }))
}

/// `POST /withdrawals`
async fn withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["withdraw"])
        .start_timer();

    let items = state
        .ledger
        .withdraw(req.caller, req.entity, req.destination, &req.tokens, &req.amounts)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    state.metrics.withdrawals_total.inc();
    Ok(Json(lines(items)))
}

/// `POST /fees/withdrawals`
async fn fee_withdraw_handler(
    State(state): State<AppState>,
    Json(req): Json<FeeWithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let _timer = state
        .metrics
        .operation_latency_seconds
        .with_label_values(&["withdraw_protocol_fees"])
        .start_timer();

    let items = state
        .ledger
        .withdraw_protocol_fees(req.caller, &req.tokens, &req.amounts)
        .map_err(|e| state.rejected(e))?;
    state.persist()?;
    state.metrics.withdrawals_total.inc();
    Ok(Json(lines(items)))
}

/// `GET /balances/:entity/:asset`
async fn balance_handler(
    Path((entity, asset)): Path<(u64, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let entity = EntityId::new(entity);
    let asset = parse_asset(&asset)?;
    Ok(Json(BalanceResponse {
        entity,
        asset,
        balance: state.ledger.balance_of(entity, asset),
    }))
}

/// `GET /assets/:entity?limit=&offset=`
///
/// Without query parameters returns the full list. With either one, returns
/// a page; `limit` defaults to the node's default page size and is clamped
/// to the configured maximum.
async fn assets_handler(
    Path(entity): Path<u64>,
    Query(page): Query<PageQuery>,
    State(state): State<AppState>,
) -> Json<AssetsResponse> {
    let entity = EntityId::new(entity);
    let assets = if page.limit.is_none() && page.offset.is_none() {
        state.ledger.list_assets(entity)
    } else {
        let limit = state
            .ledger
            .config()
            .clamp_page_size(page.limit.unwrap_or(DEFAULT_PAGE_SIZE));
        state
            .ledger
            .list_assets_paginated(entity, limit, page.offset.unwrap_or(0))
    };
    Json(AssetsResponse { entity, assets })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use crate::custody::{restore_custody, CustodyConfig, HolderSeed};
    use nova_ledger::{Collaborators, LedgerConfig};
    use tower::ServiceExt;

    struct TestNode {
        router: Router,
        state: AppState,
        vault: Arc<CustodyVault>,
    }

    /// Boots a node on `db` the way `run` does: stored state if any, then
    /// custody restored or seeded from `custody`.
    fn boot(db: LedgerDb, custody: &CustodyConfig) -> TestNode {
        let config = LedgerConfig {
            fee_collectors: vec![collector()],
            ..LedgerConfig::default()
        };
        let restored = db.load_state().expect("load").unwrap_or_default();
        let vault = Arc::new(restore_custody(&db, &restored, custody).expect("custody"));
        let governance = Arc::new(Governance::from_config(&config));
        let metrics = Arc::new(crate::metrics::LedgerMetrics::new().expect("metrics"));
        let ledger = Arc::new(LedgerService::new(
            config,
            restored,
            Collaborators {
                pause: governance.clone(),
                access: governance.clone(),
                gateway: vault.clone(),
                sink: Arc::new(crate::sink::TracingSink::new(Arc::clone(&metrics))),
            },
        ));

        let state = AppState {
            version: "0.1.0-test".into(),
            ledger,
            governance,
            vault: vault.clone(),
            db,
            metrics,
        };
        TestNode {
            router: create_router(state.clone()),
            state,
            vault,
        }
    }

    /// A node on a temporary database with no seeded holders.
    fn test_node() -> TestNode {
        boot(
            LedgerDb::open_temporary().expect("temp db"),
            &CustodyConfig::default(),
        )
    }

    fn token(i: usize) -> AssetId {
        AssetId::derive(&format!("T{i}"), "issuer")
    }

    fn owner() -> Address {
        Address::derive(b"owner")
    }

    fn treasury() -> Address {
        Address::derive(b"treasury")
    }

    fn assistant() -> Address {
        Address::derive(b"assistant")
    }

    fn collector() -> Address {
        Address::derive(b"collector")
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        send(router, req).await
    }

    async fn json_request(
        router: &Router,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        send(router, req).await
    }

    /// Registers the owner and assigns treasury and assistant wallets.
    async fn onboard(node: &TestNode) -> u64 {
        let (status, body) = json_request(
            &node.router,
            "POST",
            "/entities",
            serde_json::json!({
                "caller": owner().to_string(),
                "roles": ["provider", "issuer"],
                "metadata_uri": "ipfs://owner",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        for (kind, wallet) in [("treasury", treasury()), ("assistant", assistant())] {
            let (status, _) = json_request(
                &node.router,
                "POST",
                "/wallets",
                serde_json::json!({
                    "caller": owner().to_string(),
                    "kind": kind,
                    "wallet": wallet.to_string(),
                }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
        body["id"].as_u64().unwrap()
    }

    async fn deposit_native(node: &TestNode, entity: u64, amount: u64) -> (StatusCode, serde_json::Value) {
        json_request(
            &node.router,
            "POST",
            "/deposits",
            serde_json::json!({
                "depositor": owner().to_string(),
                "entity": entity,
                "asset": "native",
                "amount": amount,
                "attached_native": amount,
            }),
        )
        .await
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let node = test_node();
        let (status, body) = get(&node.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn register_and_fetch_entity() {
        let node = test_node();
        let id = onboard(&node).await;
        assert_eq!(id, 1);

        let (status, body) = get(&node.router, &format!("/entities/{}", owner())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["roles"], serde_json::json!(["provider", "issuer"]));
        assert_eq!(body["metadata_uri"], "ipfs://owner");

        let (status, body) = get(&node.router, "/registry/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(node.state.metrics.entities_registered.get(), 1);
    }

    #[tokio::test]
    async fn double_registration_conflicts() {
        let node = test_node();
        onboard(&node).await;
        let (status, body) = json_request(
            &node.router,
            "POST",
            "/entities",
            serde_json::json!({ "caller": owner().to_string(), "roles": ["consumer"] }),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "EntityAlreadyExists");
    }

    #[tokio::test]
    async fn empty_roles_rejected() {
        let node = test_node();
        let (status, body) = json_request(
            &node.router,
            "POST",
            "/entities",
            serde_json::json!({ "caller": owner().to_string(), "roles": [] }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "InvalidRoleSet");
    }

    #[tokio::test]
    async fn unknown_entity_is_404() {
        let node = test_node();
        let (status, body) = get(&node.router, &format!("/entities/{}", owner())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "NoSuchEntity");

        let (status, _) = get(&node.router, "/registry/77").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_address_is_400() {
        let node = test_node();
        let (status, body) = get(&node.router, "/entities/not-an-address").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "BadRequest");
    }

    #[tokio::test]
    async fn deposit_withdraw_sweep_flow() {
        let node = test_node();
        let id = onboard(&node).await;

        let (status, body) = deposit_native(&node, id, 100).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], 100);

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/withdrawals",
            serde_json::json!({
                "caller": assistant().to_string(),
                "entity": id,
                "destination": treasury().to_string(),
                "tokens": ["native"],
                "amounts": [40],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lines"][0]["amount"], 40);

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/withdrawals",
            serde_json::json!({
                "caller": assistant().to_string(),
                "entity": id,
                "destination": treasury().to_string(),
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lines"][0]["amount"], 60);

        let (_, body) = get(&node.router, &format!("/balances/{id}/native")).await;
        assert_eq!(body["balance"], 0);
        let (_, body) = get(&node.router, &format!("/assets/{id}")).await;
        assert_eq!(body["assets"], serde_json::json!(["native"]));
        assert_eq!(node.vault.holder_balance(&treasury(), AssetId::NATIVE), 100);
        assert_eq!(node.state.metrics.withdrawals_total.get(), 2);
    }

    #[tokio::test]
    async fn zero_deposit_rejected_and_counted() {
        let node = test_node();
        let id = onboard(&node).await;
        let (status, body) = deposit_native(&node, id, 0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "ZeroDepositNotAllowed");
        assert_eq!(
            node.state
                .metrics
                .rejected_operations_total
                .with_label_values(&["ZeroDepositNotAllowed"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn withdrawal_by_stranger_forbidden() {
        let node = test_node();
        let id = onboard(&node).await;
        deposit_native(&node, id, 10).await;

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/withdrawals",
            serde_json::json!({
                "caller": Address::derive(b"stranger").to_string(),
                "entity": id,
                "destination": treasury().to_string(),
                "tokens": ["native"],
                "amounts": [1],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "NotEntityAssistant");
    }

    #[tokio::test]
    async fn fee_withdrawal_requires_collector() {
        let node = test_node();
        let id = onboard(&node).await;
        deposit_native(&node, id, 50).await;
        node.state
            .ledger
            .route_fee(EntityId::new(id), AssetId::NATIVE, 20)
            .unwrap();

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/fees/withdrawals",
            serde_json::json!({ "caller": owner().to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "Unauthorized");

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/fees/withdrawals",
            serde_json::json!({ "caller": collector().to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lines"][0]["amount"], 20);
    }

    #[tokio::test]
    async fn paginated_assets() {
        let seeds = CustodyConfig {
            holders: (0..4)
                .map(|i| HolderSeed {
                    holder: owner(),
                    asset: token(i),
                    amount: 1,
                })
                .collect(),
        };
        let node = boot(LedgerDb::open_temporary().expect("temp db"), &seeds);
        let id = onboard(&node).await;
        deposit_native(&node, id, 1).await;
        for i in 0..4 {
            let (status, _) = json_request(
                &node.router,
                "POST",
                "/deposits",
                serde_json::json!({
                    "depositor": owner().to_string(),
                    "entity": id,
                    "asset": token(i).to_string(),
                    "amount": 1,
                }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (_, body) = get(&node.router, &format!("/assets/{id}?limit=2&offset=1")).await;
        assert_eq!(body["assets"].as_array().unwrap().len(), 2);
        let (_, body) = get(&node.router, &format!("/assets/{id}?limit=5&offset=4")).await;
        assert_eq!(body["assets"].as_array().unwrap().len(), 1);
        let (_, body) = get(&node.router, &format!("/assets/{id}?offset=5")).await;
        assert!(body["assets"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unseeded_token_deposit_is_a_transfer_failure() {
        let node = test_node();
        let id = onboard(&node).await;
        let (status, body) = json_request(
            &node.router,
            "POST",
            "/deposits",
            serde_json::json!({
                "depositor": owner().to_string(),
                "entity": id,
                "asset": token(0).to_string(),
                "amount": 1,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "TransferFailed");
    }

    #[tokio::test]
    async fn withdrawal_works_after_restart() {
        let seeds = CustodyConfig {
            holders: vec![HolderSeed {
                holder: owner(),
                asset: token(0),
                amount: 9,
            }],
        };
        let db = LedgerDb::open_temporary().expect("temp db");
        let id = {
            let node = boot(db.clone(), &seeds);
            let id = onboard(&node).await;
            deposit_native(&node, id, 100).await;
            let (status, _) = json_request(
                &node.router,
                "POST",
                "/deposits",
                serde_json::json!({
                    "depositor": owner().to_string(),
                    "entity": id,
                    "asset": token(0).to_string(),
                    "amount": 5,
                }),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            id
        };

        let node = boot(db, &seeds);
        let (_, body) = get(&node.router, &format!("/balances/{id}/native")).await;
        assert_eq!(body["balance"], 100);
        // Seeds already spent stay spent.
        assert_eq!(node.vault.holder_balance(&owner(), token(0)), 4);

        let (status, body) = json_request(
            &node.router,
            "POST",
            "/withdrawals",
            serde_json::json!({
                "caller": assistant().to_string(),
                "entity": id,
                "destination": treasury().to_string(),
                "tokens": ["native", token(0).to_string()],
                "amounts": [40, 5],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(node.vault.reserves(AssetId::NATIVE), 60);
        assert_eq!(node.vault.holder_balance(&treasury(), token(0)), 5);
    }

    #[tokio::test]
    async fn paused_region_is_503() {
        let node = test_node();
        let id = onboard(&node).await;
        node.state.governance.pause(Region::Funds);
        let (status, body) = deposit_native(&node, id, 5).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "RegionPaused");

        let (_, body) = get(&node.router, "/status").await;
        assert_eq!(body["paused_regions"], serde_json::json!(["funds"]));
    }

    #[tokio::test]
    async fn mutations_are_persisted() {
        let node = test_node();
        let id = onboard(&node).await;
        deposit_native(&node, id, 30).await;

        let stored = node.state.db.load_state().unwrap().expect("persisted");
        assert_eq!(stored.ledger.balance_of(EntityId::new(id), AssetId::NATIVE), 30);
        assert_eq!(stored.state_root(), node.state.ledger.state_root());

        let (_, body) = get(&node.router, "/status").await;
        assert_eq!(body["state_root"], hex::encode(stored.state_root()));
        assert_eq!(body["entities"], 1);
    }

    #[tokio::test]
    async fn remove_entity_via_delete() {
        let node = test_node();
        onboard(&node).await;
        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/entities/{}", owner()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&node.router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);
        assert_eq!(node.state.metrics.entities_registered.get(), 0);

        let (status, _) = get(&node.router, &format!("/entities/{}", owner())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

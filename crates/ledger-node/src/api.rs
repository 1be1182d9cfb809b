use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{
    Amount, Block, Chain, ChainResponse, ChainStore, ConsensusConfig, ConsensusResolver,
    LedgerError, Miner, NodeClient, NodeRegistry, StopSignal, Transaction,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub chain: Chain<dyn ChainStore>,
    pub registry: NodeRegistry,
    pub resolver: Arc<ConsensusResolver<dyn NodeClient>>,
    pub miner: Arc<Miner>,
    pub mine_timeout: Option<Duration>,
}

impl AppState {
    /// Miner and validator share `consensus.difficulty`.
    pub fn new(
        chain: Chain<dyn ChainStore>,
        registry: NodeRegistry,
        client: Arc<dyn NodeClient>,
        consensus: ConsensusConfig,
        mine_timeout: Option<Duration>,
    ) -> Self {
        let miner = Arc::new(Miner::with_difficulty(consensus.difficulty));
        Self {
            chain,
            registry,
            resolver: Arc::new(ConsensusResolver::new(client, consensus)),
            miner,
            mine_timeout,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Ledger(LedgerError::InvalidAddress(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Ledger(LedgerError::Mining(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    amount: Amount,
}

#[derive(Deserialize)]
struct RegisterIn {
    #[serde(default)]
    nodes: Vec<String>,
}

#[derive(Serialize)]
struct Mined {
    message: &'static str,
    index: u64,
    transactions: Vec<Transaction>,
    proof: u64,
    previous_hash: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(full_chain))
        .route("/chain/head", get(head))
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending))
        .route("/nodes", get(nodes))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn full_chain(State(state): State<AppState>) -> Result<Json<ChainResponse>, ApiError> {
    Ok(Json(ChainResponse::new(state.chain.blocks()?)))
}

async fn head(State(state): State<AppState>) -> Result<Json<Head>, ApiError> {
    let last = state.chain.last_block()?;
    Ok(Json(Head {
        height: last.index,
        hash: last.hash(),
    }))
}

/// Cancels the proof search if the request goes away before it finishes.
struct CancelOnDrop(StopSignal);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn mine(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    let stop = match state.mine_timeout {
        Some(timeout) => StopSignal::with_timeout(timeout),
        None => StopSignal::new(),
    };
    let _guard = CancelOnDrop(stop.clone());
    let chain = state.chain.clone();
    let miner = Arc::clone(&state.miner);
    let block: Block = tokio::task::spawn_blocking(move || chain.mine(&miner, &stop)).await??;
    Ok(Json(Mined {
        message: "New Block Forged",
        index: block.index,
        transactions: block.transactions,
        proof: block.proof,
        previous_hash: block.previous_hash,
    }))
}

async fn new_transaction(
    State(state): State<AppState>,
    Json(tx): Json<TxIn>,
) -> Result<impl IntoResponse, ApiError> {
    let index = state
        .chain
        .new_transaction(tx.sender, tx.recipient, tx.amount)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": format!("Transaction will be added to Block {index}") })),
    ))
}

async fn pending(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.chain.pool().snapshot())
}

async fn nodes(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "nodes": state.registry.members(),
        "count": state.registry.count(),
    }))
}

async fn register_nodes(
    State(state): State<AppState>,
    Json(body): Json<RegisterIn>,
) -> Result<impl IntoResponse, ApiError> {
    if body.nodes.is_empty() {
        return Err(ApiError::BadRequest(
            "Error: Please supply a valid list of nodes".into(),
        ));
    }
    state.registry.register_all(&body.nodes)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "New nodes have been added",
            "total_nodes": state.registry.members(),
        })),
    ))
}

async fn resolve(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let replaced = state
        .resolver
        .resolve_conflicts(&state.chain, &state.registry)
        .await?;
    let chain = state.chain.blocks()?;
    Ok(Json(if replaced {
        json!({ "message": "Our chain was replaced", "new_chain": chain })
    } else {
        json!({ "message": "Our chain is authoritative", "chain": chain })
    }))
}

/// Run consensus on a fixed cadence until the process exits.
pub async fn resolve_periodically(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("resolving conflicts every {:?}", every);
    loop {
        ticker.tick().await;
        if let Err(e) = state
            .resolver
            .resolve_conflicts(&state.chain, &state.registry)
            .await
        {
            warn!("periodic resolution failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpNodeClient;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ledger_core::{MemoryStore, Validator};
    use serde_json::Value;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    const DIFFICULTY: usize = 2;

    fn state() -> AppState {
        let store: Arc<dyn ChainStore> = Arc::new(MemoryStore::new());
        let chain = Chain::new(store);
        chain.ensure_genesis().unwrap();
        let client: Arc<dyn NodeClient> =
            Arc::new(HttpNodeClient::new(Duration::from_secs(2)).unwrap());
        AppState::new(
            chain,
            NodeRegistry::new(),
            client,
            ConsensusConfig {
                peer_timeout: Duration::from_secs(2),
                max_in_flight: 4,
                difficulty: DIFFICULTY,
            },
            Some(Duration::from_secs(30)),
        )
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_node_serves_genesis() {
        let app = router(state());
        let (status, body) = call(&app, get_req("/chain")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["length"], 1);
        assert_eq!(body["chain"][0]["previous_hash"], "1");
        assert_eq!(body["chain"][0]["proof"], 100);

        let (_, head) = call(&app, get_req("/chain/head")).await;
        assert_eq!(head["height"], 1);
    }

    #[tokio::test]
    async fn transaction_then_mine() {
        let state = state();
        let app = router(state.clone());
        let (status, body) = call(
            &app,
            post_json(
                "/transactions/new",
                json!({"sender": "A", "recipient": "B", "amount": 10}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Transaction will be added to Block 2");

        let (_, pending) = call(&app, get_req("/transactions/pending")).await;
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let (status, mined) = call(&app, get_req("/mine")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mined["index"], 2);
        assert_eq!(mined["transactions"][0]["sender"], "A");
        assert!(state.chain.pool().is_empty());
        let blocks = state.chain.blocks().unwrap();
        assert!(Validator::new(state.miner.proof_of_work()).is_valid_chain(&blocks));
    }

    #[tokio::test]
    async fn fractional_and_negative_amounts_pass_through() {
        let state = state();
        let app = router(state.clone());
        for amount in [json!(2.5), json!(-5), json!(10.0)] {
            let (status, _) = call(
                &app,
                post_json(
                    "/transactions/new",
                    json!({"sender": "A", "recipient": "B", "amount": amount}),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (_, pending) = call(&app, get_req("/transactions/pending")).await;
        let amounts: Vec<String> = pending
            .as_array()
            .unwrap()
            .iter()
            .map(|tx| tx["amount"].to_string())
            .collect();
        assert_eq!(amounts, ["2.5", "-5", "10.0"]);

        let (status, mined) = call(&app, get_req("/mine")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mined["transactions"][1]["amount"], json!(-5));
        let blocks = state.chain.blocks().unwrap();
        assert_eq!(blocks[1].transactions[0].amount, Amount::from(2.5));
        assert!(Validator::new(state.miner.proof_of_work()).is_valid_chain(&blocks));
    }

    #[tokio::test]
    async fn malformed_transaction_is_rejected() {
        let app = router(state());
        let (status, _) = call(
            &app,
            post_json("/transactions/new", json!({"sender": "A", "amount": 10})),
        )
        .await;
        assert!(status.is_client_error());
        let (status, _) = call(
            &app,
            post_json(
                "/transactions/new",
                json!({"sender": "A", "recipient": "B", "amount": "10"}),
            ),
        )
        .await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn register_nodes_validates_the_whole_batch() {
        let state = state();
        let app = router(state.clone());
        let (status, _) = call(
            &app,
            post_json("/nodes/register", json!({"nodes": ["http://1.2.3.4:5000", ""]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.registry.count(), 0);

        let (status, _) = call(&app, post_json("/nodes/register", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            post_json(
                "/nodes/register",
                json!({"nodes": ["http://1.2.3.4:5000", "1.2.3.4:5000", "5.6.7.8:5000"]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["total_nodes"], json!(["1.2.3.4:5000", "5.6.7.8:5000"]));
        let (_, listed) = call(&app, get_req("/nodes")).await;
        assert_eq!(listed["count"], 2);
    }

    #[tokio::test]
    async fn mining_timeout_maps_to_service_unavailable() {
        let mut state = state();
        state.miner = Arc::new(Miner::with_difficulty(64));
        state.mine_timeout = Some(Duration::from_millis(20));
        let app = router(state);
        let (status, body) = call(&app, get_req("/mine")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["message"].as_str().unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn resolve_adopts_longer_peer_chain_over_http() {
        let peer_state = state();
        for _ in 0..3 {
            peer_state
                .chain
                .mine(&peer_state.miner, &StopSignal::new())
                .unwrap();
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = listener.local_addr().unwrap();
        let peer_app = router(peer_state.clone());
        tokio::spawn(async move {
            axum::serve(listener, peer_app).await.unwrap();
        });

        let local = state();
        let app = router(local.clone());
        let (status, _) = call(
            &app,
            post_json("/nodes/register", json!({"nodes": [format!("http://{peer_addr}")]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, get_req("/nodes/resolve")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Our chain was replaced");
        assert_eq!(body["new_chain"].as_array().unwrap().len(), 4);
        assert_eq!(
            local.chain.blocks().unwrap(),
            peer_state.chain.blocks().unwrap()
        );

        // Same length now: nothing more to adopt.
        let (_, body) = call(&app, get_req("/nodes/resolve")).await;
        assert_eq!(body["message"], "Our chain is authoritative");
    }
}

use actix_web::{error, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::sync::Mutex;

use crate::blockchain::{Address, Block, Ledger, Origin, Rejected, Transaction, Wallet};
use crate::network::BlockEnvelope;

/// Shared node state: the ledger behind its single lock, and the node wallet
pub struct NodeState {
    pub ledger: Mutex<Ledger>,
    pub wallet: Wallet,
}

/// Data structure for the node state
pub type NodeData = web::Data<NodeState>;

/// Runs `f` against the locked ledger on the blocking thread pool.
///
/// Mining and peer broadcasts block the calling thread, so they must stay off
/// the async workers.
async fn with_ledger<F, R>(state: NodeData, f: F) -> actix_web::Result<R>
where
    F: FnOnce(&mut Ledger) -> R + Send + 'static,
    R: Send + 'static,
{
    web::block(move || {
        let mut ledger = state.ledger.lock().map_err(|_| "ledger lock poisoned")?;
        Ok::<R, &'static str>(f(&mut *ledger))
    })
    .await?
    .map_err(error::ErrorInternalServerError)
}

/// Generic message response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
        }
    }
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: f64,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub message: String,
    pub transaction: Transaction,
    /// Spendable balance after admission
    pub funds: f64,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    pub message: String,
    pub block: Block,
    pub funds: f64,
}

/// Response for the balance endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub funds: f64,
}

/// Response for the wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The node's address
    pub address: String,
}

/// Request for the add node endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodeRequest {
    /// Peer address as `host:port`
    pub node: String,
}

/// Response for the node endpoints
#[derive(Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    pub message: String,
    pub all_nodes: Vec<String>,
}

fn rejection_response(rejection: &Rejected) -> HttpResponse {
    let body = MessageResponse::new(format!("Creating a transaction failed: {}", rejection));
    match rejection {
        Rejected::PeerDeclined(_) => HttpResponse::InternalServerError().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Get the full chain
///
/// Peers fetch this during conflict resolution
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_chain(state: NodeData) -> actix_web::Result<HttpResponse> {
    let chain = with_ledger(state, |ledger| ledger.chain().to_vec()).await?;
    Ok(HttpResponse::Ok().json(chain))
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/transactions",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(state: NodeData) -> actix_web::Result<HttpResponse> {
    let pending = with_ledger(state, |ledger| ledger.pending_transactions().to_vec()).await?;
    Ok(HttpResponse::Ok().json(pending))
}

/// Send coins from the node wallet
///
/// Signs the transfer with the node's key and broadcasts it to all peers
#[utoipa::path(
    post,
    path = "/transaction",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction added", body = TransactionResponse),
        (status = 400, description = "Transaction rejected", body = MessageResponse),
        (status = 500, description = "Transaction declined by a peer", body = MessageResponse)
    )
)]
pub async fn new_transaction(
    state: NodeData,
    request: web::Json<TransactionRequest>,
) -> actix_web::Result<HttpResponse> {
    let request = request.into_inner();
    let recipient = Address(request.recipient);
    let signature = match state.wallet.sign_transaction(&recipient, request.amount) {
        Ok(signature) => signature,
        Err(err) => {
            return Ok(HttpResponse::BadRequest().json(MessageResponse::new(format!(
                "Signing the transaction failed: {}",
                err
            ))));
        }
    };
    let transaction = Transaction::new(
        state.wallet.address().clone(),
        recipient,
        signature,
        request.amount,
    );

    let submitted = transaction.clone();
    let outcome = with_ledger(state, move |ledger| {
        let result = ledger.submit_transaction(
            submitted.sender,
            submitted.recipient,
            submitted.signature,
            submitted.amount,
            Origin::Local,
        );
        (result, ledger.balance().unwrap_or_default())
    })
    .await?;

    Ok(match outcome {
        (Ok(()), funds) => HttpResponse::Created().json(TransactionResponse {
            message: "Successfully added transaction.".to_string(),
            transaction,
            funds,
        }),
        (Err(rejection), _) => rejection_response(&rejection),
    })
}

/// Receive a transaction from a peer
#[utoipa::path(
    post,
    path = "/broadcast-transaction",
    request_body = Transaction,
    responses(
        (status = 201, description = "Transaction added", body = MessageResponse),
        (status = 400, description = "Transaction rejected", body = MessageResponse)
    )
)]
pub async fn broadcast_transaction(
    state: NodeData,
    transaction: web::Json<Transaction>,
) -> actix_web::Result<HttpResponse> {
    let tx = transaction.into_inner();
    let result = with_ledger(state, move |ledger| {
        ledger.submit_transaction(tx.sender, tx.recipient, tx.signature, tx.amount, Origin::Peer)
    })
    .await?;

    Ok(match result {
        Ok(()) => HttpResponse::Created().json(MessageResponse::new("Successfully added transaction.")),
        Err(rejection) => rejection_response(&rejection),
    })
}

enum BlockOutcome {
    Added,
    Invalid,
    Ahead,
    Behind,
}

/// Receive a freshly mined block from a peer
///
/// A block one past our tail is validated and appended; a block further ahead
/// flags the node for conflict resolution; an older block is refused.
#[utoipa::path(
    post,
    path = "/broadcast-block",
    request_body = BlockEnvelope,
    responses(
        (status = 201, description = "Block added", body = MessageResponse),
        (status = 200, description = "Peer chain is ahead, resolution needed", body = MessageResponse),
        (status = 409, description = "Block invalid or chain shorter", body = MessageResponse)
    )
)]
pub async fn broadcast_block(
    state: NodeData,
    envelope: web::Json<BlockEnvelope>,
) -> actix_web::Result<HttpResponse> {
    let block = envelope.into_inner().block;
    let outcome = with_ledger(state, move |ledger| {
        let tail = ledger.last_block().index;
        if block.index == tail + 1 {
            if ledger.add_block(block) {
                BlockOutcome::Added
            } else {
                BlockOutcome::Invalid
            }
        } else if block.index > tail {
            ledger.mark_conflict();
            BlockOutcome::Ahead
        } else {
            BlockOutcome::Behind
        }
    })
    .await?;

    Ok(match outcome {
        BlockOutcome::Added => HttpResponse::Created().json(MessageResponse::new("Block added")),
        BlockOutcome::Invalid => HttpResponse::Conflict().json(MessageResponse::new("Block seems invalid.")),
        BlockOutcome::Ahead => {
            HttpResponse::Ok().json(MessageResponse::new("Blockchain seems to differ from local blockchain."))
        }
        BlockOutcome::Behind => HttpResponse::Conflict()
            .json(MessageResponse::new("Blockchain seems to be shorter, block not added")),
    })
}

enum MineOutcome {
    Mined(Block, f64),
    Unresolved,
    Failed,
}

/// Mine a new block
///
/// Mines all pending transactions and pays the reward to the node wallet
#[utoipa::path(
    post,
    path = "/mine",
    responses(
        (status = 201, description = "Block mined", body = MineResponse),
        (status = 409, description = "Conflicts must be resolved first", body = MessageResponse),
        (status = 500, description = "Mining failed", body = MessageResponse)
    )
)]
pub async fn mine_block(state: NodeData) -> actix_web::Result<HttpResponse> {
    let outcome = with_ledger(state, |ledger| {
        if ledger.needs_resolution() {
            return MineOutcome::Unresolved;
        }
        match ledger.mine_block() {
            Some(block) => MineOutcome::Mined(block, ledger.balance().unwrap_or_default()),
            None => MineOutcome::Failed,
        }
    })
    .await?;

    Ok(match outcome {
        MineOutcome::Mined(block, funds) => HttpResponse::Created().json(MineResponse {
            message: "Block added successfully.".to_string(),
            block,
            funds,
        }),
        MineOutcome::Unresolved => HttpResponse::Conflict()
            .json(MessageResponse::new("Resolve conflicts first, block not added!")),
        MineOutcome::Failed => {
            HttpResponse::InternalServerError().json(MessageResponse::new("Adding a block failed."))
        }
    })
}

/// Resolve conflicts with peers
///
/// Adopts the longest valid chain among peers
#[utoipa::path(
    post,
    path = "/resolve-conflicts",
    responses(
        (status = 200, description = "Resolution finished", body = MessageResponse)
    )
)]
pub async fn resolve_conflicts(state: NodeData) -> actix_web::Result<HttpResponse> {
    let replaced = with_ledger(state, |ledger| ledger.resolve()).await?;
    let message = if replaced {
        "Chain was replaced!"
    } else {
        "Local chain kept!"
    };
    Ok(HttpResponse::Ok().json(MessageResponse::new(message)))
}

/// Get the node wallet's spendable balance
#[utoipa::path(
    get,
    path = "/balance",
    responses(
        (status = 200, description = "Balance retrieved", body = BalanceResponse)
    )
)]
pub async fn get_balance(state: NodeData) -> actix_web::Result<HttpResponse> {
    let address = state.wallet.address().clone();
    let lookup = address.clone();
    let funds = with_ledger(state, move |ledger| ledger.balance_of(&lookup)).await?;

    Ok(HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        funds,
    }))
}

/// Check if the local chain is valid
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation status", body = bool)
    )
)]
pub async fn validate_chain(state: NodeData) -> actix_web::Result<HttpResponse> {
    let valid = with_ledger(state, |ledger| ledger.verify_chain()).await?;
    Ok(HttpResponse::Ok().json(valid))
}

/// Check if all pending transactions are still valid
#[utoipa::path(
    get,
    path = "/transactions/validate",
    responses(
        (status = 200, description = "Pending pool validation status", body = bool)
    )
)]
pub async fn validate_pending(state: NodeData) -> actix_web::Result<HttpResponse> {
    let valid = with_ledger(state, |ledger| ledger.verify_pending()).await?;
    Ok(HttpResponse::Ok().json(valid))
}

/// Get the node wallet's address
#[utoipa::path(
    get,
    path = "/wallet",
    responses(
        (status = 200, description = "Wallet address", body = WalletResponse)
    )
)]
pub async fn get_wallet(state: NodeData) -> HttpResponse {
    HttpResponse::Ok().json(WalletResponse {
        address: state.wallet.address().0.clone(),
    })
}

/// Register a peer node
#[utoipa::path(
    post,
    path = "/node",
    request_body = NodeRequest,
    responses(
        (status = 201, description = "Node added", body = NodesResponse),
        (status = 400, description = "No node data found", body = MessageResponse)
    )
)]
pub async fn add_node(state: NodeData, request: web::Json<NodeRequest>) -> actix_web::Result<HttpResponse> {
    let node = request.into_inner().node.trim().to_string();
    if node.is_empty() {
        return Ok(HttpResponse::BadRequest().json(MessageResponse::new("No node data found.")));
    }

    let all_nodes = with_ledger(state, move |ledger| {
        ledger.add_peer(&node);
        ledger.peers()
    })
    .await?;

    Ok(HttpResponse::Created().json(NodesResponse {
        message: "Node added successfully.".to_string(),
        all_nodes,
    }))
}

/// Forget a peer node
#[utoipa::path(
    delete,
    path = "/node/{node_url}",
    params(
        ("node_url" = String, Path, description = "Peer address as host:port")
    ),
    responses(
        (status = 200, description = "Node removed", body = NodesResponse)
    )
)]
pub async fn remove_node(state: NodeData, node_url: web::Path<String>) -> actix_web::Result<HttpResponse> {
    let node = node_url.into_inner();
    let all_nodes = with_ledger(state, move |ledger| {
        ledger.remove_peer(&node);
        ledger.peers()
    })
    .await?;

    Ok(HttpResponse::Ok().json(NodesResponse {
        message: "Node removed.".to_string(),
        all_nodes,
    }))
}

/// List peer nodes
#[utoipa::path(
    get,
    path = "/nodes",
    responses(
        (status = 200, description = "Known peers", body = NodesResponse)
    )
)]
pub async fn get_nodes(state: NodeData) -> actix_web::Result<HttpResponse> {
    let all_nodes = with_ledger(state, |ledger| ledger.peers()).await?;
    Ok(HttpResponse::Ok().json(NodesResponse {
        message: "Known nodes.".to_string(),
        all_nodes,
    }))
}

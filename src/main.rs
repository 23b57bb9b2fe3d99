use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use log::{debug, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use std::sync::{Arc, Mutex};

mod api;
mod blockchain;
mod config;
mod network;

use config::NodeConfig;

// Load the node wallet from configuration, or create a fresh one
fn load_wallet(config: &NodeConfig) -> anyhow::Result<blockchain::Wallet> {
    match &config.secret_key {
        Some(secret) => {
            let wallet = blockchain::Wallet::from_secret_hex(secret).context("NODE_SECRET_KEY")?;
            info!("Loaded wallet with address: {}", wallet.address());
            Ok(wallet)
        }
        None => {
            let wallet = blockchain::Wallet::new();
            info!("Created wallet with address: {}", wallet.address());
            debug!("Wallet private key: {}", hex::encode(wallet.export_secret_key()));
            Ok(wallet)
        }
    }
}

// Build the ledger, restoring its snapshot when storage is available
fn initialize_ledger(
    config: &NodeConfig,
    wallet: &blockchain::Wallet,
) -> anyhow::Result<blockchain::Ledger> {
    let transport = network::HttpTransport::new(config.peer_timeout)?;
    let ledger = blockchain::Ledger::new(
        Some(wallet.address().clone()),
        Arc::new(blockchain::Ed25519Verifier),
        Arc::new(transport),
    )
    .with_pow_limit(config.pow_max_iterations);

    std::fs::create_dir_all(&config.data_dir).unwrap_or_else(|e| {
        warn!("Failed to create data directory: {}", e);
    });

    match blockchain::SnapshotStore::open(&config.data_dir) {
        Ok(store) => {
            info!("Using snapshot storage at {}", config.data_dir.display());
            Ok(ledger.with_storage(store))
        }
        Err(err) => {
            warn!("Failed to open snapshot storage: {}", err);
            warn!("Running with an in-memory ledger instead");
            Ok(ledger)
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::validate_chain,
        api::handlers::get_pending_transactions,
        api::handlers::validate_pending,
        api::handlers::new_transaction,
        api::handlers::broadcast_transaction,
        api::handlers::broadcast_block,
        api::handlers::mine_block,
        api::handlers::resolve_conflicts,
        api::handlers::get_balance,
        api::handlers::get_wallet,
        api::handlers::add_node,
        api::handlers::remove_node,
        api::handlers::get_nodes
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            network::BlockEnvelope,
            api::handlers::MessageResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::BalanceResponse,
            api::handlers::WalletResponse,
            api::handlers::NodeRequest,
            api::handlers::NodesResponse
        )
    ),
    tags(
        (name = "ledger", description = "Proof-of-work ledger node endpoints")
    ),
    info(
        title = "Ledger Node API",
        version = "0.1.0",
        description = "Peer and operator endpoints of a proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn serve(config: NodeConfig, state: api::NodeData) -> std::io::Result<()> {
    info!("Starting node at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;
    let wallet = load_wallet(&config)?;

    // The blocking peer client must be built outside the async runtime
    let ledger = initialize_ledger(&config, &wallet)?;
    let state = web::Data::new(api::NodeState {
        ledger: Mutex::new(ledger),
        wallet,
    });

    actix_web::rt::System::new().block_on(serve(config, state))?;
    Ok(())
}

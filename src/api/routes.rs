use actix_web::web;

use super::handlers;

/// Configures the node routes
///
/// Paths are unversioned because peers address each other by these exact
/// paths (`/chain`, `/broadcast-transaction`, `/broadcast-block`).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/chain", web::get().to(handlers::get_chain))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/transactions", web::get().to(handlers::get_pending_transactions))
        .route("/transactions/validate", web::get().to(handlers::validate_pending))
        .route("/transaction", web::post().to(handlers::new_transaction))
        .route("/broadcast-transaction", web::post().to(handlers::broadcast_transaction))
        .route("/broadcast-block", web::post().to(handlers::broadcast_block))
        .route("/mine", web::post().to(handlers::mine_block))
        .route("/resolve-conflicts", web::post().to(handlers::resolve_conflicts))
        .route("/balance", web::get().to(handlers::get_balance))
        .route("/wallet", web::get().to(handlers::get_wallet))
        .route("/node", web::post().to(handlers::add_node))
        .route("/node/{node_url}", web::delete().to(handlers::remove_node))
        .route("/nodes", web::get().to(handlers::get_nodes));
}

// API module
//
// HTTP surface of a node: peer endpoints and local operator endpoints

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::{NodeData, NodeState};
pub use routes::configure_routes;

use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use std::time::Duration;

use super::transport::{BroadcastStatus, Transport, TransportError};
use crate::blockchain::{Block, Transaction};

/// Body of a block broadcast between nodes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockEnvelope {
    pub block: Block,
}

/// Peer transport over the node HTTP API
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Unreachable {
                peer: "<client>".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { client })
    }

    fn url(peer: &str, path: &str) -> String {
        if peer.starts_with("http://") || peer.starts_with("https://") {
            format!("{}/{}", peer.trim_end_matches('/'), path)
        } else {
            format!("http://{}/{}", peer, path)
        }
    }

    fn unreachable(peer: &str, err: reqwest::Error) -> TransportError {
        TransportError::Unreachable {
            peer: peer.to_string(),
            reason: err.to_string(),
        }
    }
}

impl Transport for HttpTransport {
    fn broadcast_transaction(
        &self,
        peer: &str,
        transaction: &Transaction,
    ) -> Result<BroadcastStatus, TransportError> {
        let url = Self::url(peer, "broadcast-transaction");
        debug!("Broadcasting transaction to {}", url);

        let response = self
            .client
            .post(&url)
            .json(transaction)
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        Ok(BroadcastStatus::from_http(response.status().as_u16()))
    }

    fn broadcast_block(&self, peer: &str, block: &Block) -> Result<BroadcastStatus, TransportError> {
        let url = Self::url(peer, "broadcast-block");
        debug!("Broadcasting block {} to {}", block.index, url);

        let response = self
            .client
            .post(&url)
            .json(&BlockEnvelope {
                block: block.clone(),
            })
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        Ok(BroadcastStatus::from_http(response.status().as_u16()))
    }

    fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, TransportError> {
        let url = Self::url(peer, "chain");
        debug!("Fetching chain from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Self::unreachable(peer, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<Block>>()
            .map_err(|e| TransportError::Decode {
                peer: peer.to_string(),
                reason: e.to_string(),
            })
    }
}

use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;

use super::block::{hash_block, Block};
use super::crypto::{Address, DigitalSignature, SignatureVerifier};
use super::storage::{Snapshot, SnapshotStore};
use super::transaction::{Transaction, MINING_REWARD};
use super::verification::{self, validate_block};
use crate::network::{BroadcastStatus, PeerRegistry, Transport};

/// Reasons a submitted transaction is turned away
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejected {
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },

    /// Admitted locally, but a peer refused it
    #[error("Transaction declined by peer {0}")]
    PeerDeclined(String),
}

/// Where a submitted transaction came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted on this node; propagated to peers
    Local,
    /// Received from a peer broadcast; not propagated again
    Peer,
}

/// A node's view of the blockchain: chain, pending pool and peers.
///
/// Mutators take `&mut self`; callers sharing a ledger across threads put a
/// single lock around it.
pub struct Ledger {
    /// The chain of blocks, genesis first
    chain: Vec<Block>,

    /// Transactions waiting to be mined
    pending_transactions: Vec<Transaction>,

    /// Known peer nodes
    peers: PeerRegistry,

    /// Identity mining rewards are paid to
    public_key: Option<Address>,

    /// Set when a peer reports our chain disagrees with theirs
    resolve_conflicts: bool,

    /// Upper bound on proof candidates per mining attempt
    pow_limit: Option<u64>,

    verifier: Arc<dyn SignatureVerifier>,
    transport: Arc<dyn Transport>,
    storage: Option<SnapshotStore>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("length", &self.chain.len())
            .field("pending", &self.pending_transactions.len())
            .field("peers", &self.peers.len())
            .field("public_key", &self.public_key)
            .field("resolve_conflicts", &self.resolve_conflicts)
            .finish()
    }
}

impl Ledger {
    /// Creates an in-memory ledger holding only the genesis block
    pub fn new(
        public_key: Option<Address>,
        verifier: Arc<dyn SignatureVerifier>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Ledger {
            chain: vec![Block::genesis()],
            pending_transactions: Vec::new(),
            peers: PeerRegistry::new(),
            public_key,
            resolve_conflicts: false,
            pow_limit: None,
            verifier,
            transport,
            storage: None,
        }
    }

    /// Attaches a snapshot store and restores whatever it holds.
    ///
    /// Missing or malformed data leaves the ledger in its genesis-only state.
    pub fn with_storage(mut self, storage: SnapshotStore) -> Self {
        self.storage = Some(storage);
        self.load_snapshot();
        self
    }

    /// Caps the proof-of-work search; mining gives up once exhausted
    pub fn with_pow_limit(mut self, max_iterations: Option<u64>) -> Self {
        self.pow_limit = max_iterations;
        self
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending_transactions
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    pub fn needs_resolution(&self) -> bool {
        self.resolve_conflicts
    }

    /// Flags that a peer holds a chain we have not reconciled with yet
    pub fn mark_conflict(&mut self) {
        self.resolve_conflicts = true;
    }

    /// Restores chain, pending pool and peers from storage
    pub fn load_snapshot(&mut self) {
        let Some(storage) = &self.storage else {
            return;
        };

        match storage.load() {
            Ok(Some(snapshot)) if !snapshot.chain.is_empty() => {
                info!(
                    "Loaded snapshot: {} blocks, {} pending transactions, {} peers",
                    snapshot.chain.len(),
                    snapshot.pending_transactions.len(),
                    snapshot.peers.len()
                );
                self.chain = snapshot.chain;
                self.pending_transactions = snapshot.pending_transactions;
                self.peers = snapshot.peers;
            }
            Ok(_) => {
                info!("No snapshot found, starting from genesis");
            }
            Err(err) => {
                warn!("Failed to load snapshot, starting from genesis: {}", err);
            }
        }
    }

    /// Persists chain, pending pool and peers. Failures are logged and absorbed.
    pub fn save_snapshot(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        let snapshot = Snapshot {
            chain: self.chain.clone(),
            pending_transactions: self.pending_transactions.clone(),
            peers: self.peers.clone(),
        };

        if let Err(err) = storage.save(&snapshot) {
            error!("Saving snapshot failed: {}", err);
        }
    }

    /// Spendable balance of `identity`: confirmed receipts minus confirmed
    /// and pending spends. Pending receipts do not count until mined.
    pub fn balance_of(&self, identity: &Address) -> f64 {
        let confirmed = self.chain.iter().flat_map(|block| block.transactions.iter());

        let mut received = 0.0;
        let mut sent = 0.0;
        for tx in confirmed {
            if &tx.recipient == identity {
                received += tx.amount;
            }
            if &tx.sender == identity {
                sent += tx.amount;
            }
        }

        sent += self
            .pending_transactions
            .iter()
            .filter(|tx| &tx.sender == identity)
            .map(|tx| tx.amount)
            .sum::<f64>();

        received - sent
    }

    /// Balance of this node's own identity
    pub fn balance(&self) -> Option<f64> {
        self.public_key.as_ref().map(|key| self.balance_of(key))
    }

    fn check_transaction(&self, transaction: &Transaction) -> Result<(), Rejected> {
        if !transaction.amount.is_finite() || transaction.amount <= 0.0 {
            return Err(Rejected::InvalidAmount(transaction.amount));
        }

        if !self.verifier.verify(transaction) {
            return Err(Rejected::InvalidSignature);
        }

        let available = self.balance_of(&transaction.sender);
        if available < transaction.amount {
            return Err(Rejected::InsufficientFunds {
                required: transaction.amount,
                available,
            });
        }

        Ok(())
    }

    /// Admits a transaction into the pending pool.
    ///
    /// Locally originated transactions are then broadcast to every peer; a
    /// peer refusing it is reported as [`Rejected::PeerDeclined`] but the
    /// local pool entry stays.
    pub fn submit_transaction(
        &mut self,
        sender: Address,
        recipient: Address,
        signature: DigitalSignature,
        amount: f64,
        origin: Origin,
    ) -> Result<(), Rejected> {
        let transaction = Transaction::new(sender, recipient, signature, amount);
        self.check_transaction(&transaction)?;

        self.pending_transactions.push(transaction.clone());
        self.save_snapshot();

        if origin == Origin::Peer {
            return Ok(());
        }

        for peer in self.peers.iter() {
            match self.transport.broadcast_transaction(peer, &transaction) {
                Ok(BroadcastStatus::Accepted) => {}
                Ok(BroadcastStatus::Declined) => {
                    warn!("Transaction declined by {}, needs resolving", peer);
                    return Err(Rejected::PeerDeclined(peer.to_string()));
                }
                Ok(BroadcastStatus::Conflict) => {
                    warn!("Peer {} reports a conflicting chain", peer);
                }
                Err(err) => {
                    warn!("{}", err);
                }
            }
        }

        Ok(())
    }

    /// Re-checks every pending signature and that no sender is overdrawn
    pub fn verify_pending(&self) -> bool {
        self.pending_transactions
            .iter()
            .all(|tx| self.verifier.verify(tx) && self.balance_of(&tx.sender) >= 0.0)
    }

    /// Mines the pending pool into a new block paying the reward to this node.
    ///
    /// Returns `None` when the node has no identity, when a pending signature
    /// no longer verifies, or when a configured proof limit is exhausted.
    pub fn mine_block(&mut self) -> Option<Block> {
        let Some(public_key) = self.public_key.clone() else {
            warn!("Mining requires a wallet");
            return None;
        };

        let mut copied_transactions = self.pending_transactions.clone();
        if let Some(bad) = copied_transactions.iter().find(|tx| !self.verifier.verify(tx)) {
            warn!("Pending transaction from {} failed verification, not mining", bad.sender);
            return None;
        }

        let last_hash = hash_block(self.last_block());
        let proof = match self.pow_limit {
            Some(limit) => match verification::proof_of_work_bounded(&copied_transactions, &last_hash, limit) {
                Some(proof) => proof,
                None => {
                    warn!("No proof found within {} iterations", limit);
                    return None;
                }
            },
            None => verification::proof_of_work(&copied_transactions, &last_hash),
        };

        copied_transactions.push(Transaction::new_reward(public_key, MINING_REWARD));

        let block = Block::new(
            self.chain.len() as u64,
            last_hash,
            copied_transactions,
            proof,
        );
        self.chain.push(block.clone());
        self.pending_transactions.clear();
        self.save_snapshot();

        info!(
            "Mined block {} with {} transactions (proof {})",
            block.index,
            block.transactions.len(),
            block.proof
        );

        for peer in self.peers.iter() {
            match self.transport.broadcast_block(peer, &block) {
                Ok(BroadcastStatus::Accepted) => {}
                Ok(BroadcastStatus::Declined) => {
                    warn!("Block declined by {}, needs resolving", peer);
                }
                Ok(BroadcastStatus::Conflict) => {
                    warn!("Peer {} reports a conflicting chain", peer);
                    self.resolve_conflicts = true;
                }
                Err(err) => {
                    warn!("{}", err);
                }
            }
        }

        Some(block)
    }

    /// Appends a block received from a peer if it extends our tail.
    ///
    /// The candidate must carry the next index and link to our tail hash.
    pub fn add_block(&mut self, candidate: Block) -> bool {
        if let Err(reason) = validate_block(&candidate, self.last_block(), self.verifier.as_ref()) {
            warn!("Rejected block {}: {}", candidate.index, reason);
            return false;
        }

        self.pending_transactions
            .retain(|pending| !candidate.transactions.contains(pending));

        info!("Accepted block {} from peer", candidate.index);
        self.chain.push(candidate);
        self.save_snapshot();
        true
    }

    /// Replaces our chain with the longest valid chain among peers.
    ///
    /// Pending transactions are dropped when the chain is replaced.
    pub fn resolve(&mut self) -> bool {
        if self.peers.is_empty() {
            debug!("No peers to resolve against");
        }

        let mut winner: Option<Vec<Block>> = None;

        for peer in self.peers.iter() {
            let peer_chain = match self.transport.fetch_chain(peer) {
                Ok(chain) => chain,
                Err(err) => {
                    warn!("Skipping {} during resolution: {}", peer, err);
                    continue;
                }
            };

            let best_length = winner.as_ref().map_or(self.chain.len(), Vec::len);
            if peer_chain.len() > best_length && self.is_chain_valid(&peer_chain) {
                debug!("Peer {} offers a valid chain of length {}", peer, peer_chain.len());
                winner = Some(peer_chain);
            }
        }

        let replaced = match winner {
            Some(chain) => {
                info!("Replacing local chain with a chain of length {}", chain.len());
                self.chain = chain;
                self.pending_transactions.clear();
                true
            }
            None => false,
        };

        self.resolve_conflicts = false;
        self.save_snapshot();
        replaced
    }

    /// Validates an arbitrary chain with this ledger's signature verifier
    pub fn is_chain_valid(&self, chain: &[Block]) -> bool {
        verification::is_chain_valid(chain, self.verifier.as_ref())
    }

    /// Validates the local chain
    pub fn verify_chain(&self) -> bool {
        self.is_chain_valid(&self.chain)
    }

    pub fn add_peer(&mut self, address: &str) {
        if self.peers.add(address) {
            debug!("Added peer {}", address);
        }
        self.save_snapshot();
    }

    pub fn remove_peer(&mut self, address: &str) {
        if self.peers.remove(address) {
            debug!("Removed peer {}", address);
        }
        self.save_snapshot();
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Ed25519Verifier, Wallet};
    use crate::blockchain::storage::CHAIN_KEY;
    use crate::network::transport::TransportError;

    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory transport: serves canned chains and records broadcasts
    #[derive(Default)]
    struct FakeTransport {
        chains: Mutex<HashMap<String, Vec<Block>>>,
        statuses: Mutex<HashMap<String, BroadcastStatus>>,
        sent_transactions: Mutex<Vec<(String, Transaction)>>,
        sent_blocks: Mutex<Vec<(String, Block)>>,
    }

    impl FakeTransport {
        fn serve_chain(&self, peer: &str, chain: Vec<Block>) {
            self.chains.lock().unwrap().insert(peer.to_string(), chain);
        }

        fn answer(&self, peer: &str, status: BroadcastStatus) {
            self.statuses.lock().unwrap().insert(peer.to_string(), status);
        }

        fn status_for(&self, peer: &str) -> Result<BroadcastStatus, TransportError> {
            self.statuses
                .lock()
                .unwrap()
                .get(peer)
                .copied()
                .ok_or_else(|| TransportError::Unreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    impl Transport for FakeTransport {
        fn broadcast_transaction(
            &self,
            peer: &str,
            transaction: &Transaction,
        ) -> Result<BroadcastStatus, TransportError> {
            self.sent_transactions
                .lock()
                .unwrap()
                .push((peer.to_string(), transaction.clone()));
            self.status_for(peer)
        }

        fn broadcast_block(&self, peer: &str, block: &Block) -> Result<BroadcastStatus, TransportError> {
            self.sent_blocks.lock().unwrap().push((peer.to_string(), block.clone()));
            self.status_for(peer)
        }

        fn fetch_chain(&self, peer: &str) -> Result<Vec<Block>, TransportError> {
            self.chains
                .lock()
                .unwrap()
                .get(peer)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    fn ledger_for(wallet: &Wallet, transport: Arc<FakeTransport>) -> Ledger {
        Ledger::new(
            Some(wallet.address().clone()),
            Arc::new(Ed25519Verifier),
            transport,
        )
    }

    fn submit(ledger: &mut Ledger, from: &Wallet, to: &Address, amount: f64) -> Result<(), Rejected> {
        let signature = from.sign_transaction(to, amount).unwrap();
        ledger.submit_transaction(from.address().clone(), to.clone(), signature, amount, Origin::Local)
    }

    /// Builds a chain of `blocks` mined blocks on top of genesis
    fn mined_chain(blocks: usize) -> Vec<Block> {
        let miner = Wallet::new();
        let mut ledger = ledger_for(&miner, Arc::new(FakeTransport::default()));
        for _ in 0..blocks {
            ledger.mine_block().unwrap();
        }
        ledger.chain().to_vec()
    }

    #[test]
    fn test_new_ledger() {
        let ledger = ledger_for(&Wallet::new(), Arc::new(FakeTransport::default()));

        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.chain()[0], Block::genesis());
        assert_eq!(ledger.balance(), Some(0.0));
        assert!(ledger.verify_chain());
    }

    #[test]
    fn test_mining_without_wallet_fails() {
        let mut ledger = Ledger::new(None, Arc::new(Ed25519Verifier), Arc::new(FakeTransport::default()));

        assert!(ledger.mine_block().is_none());
        assert_eq!(ledger.chain().len(), 1);
        assert_eq!(ledger.balance(), None);
    }

    #[test]
    fn test_mine_block_orders_reward_last_and_proof_is_valid() {
        let miner = Wallet::new();
        let friend = Wallet::new();
        let mut ledger = ledger_for(&miner, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();

        submit(&mut ledger, &miner, friend.address(), 3.0).unwrap();
        submit(&mut ledger, &miner, friend.address(), 2.0).unwrap();
        let pending = ledger.pending_transactions().to_vec();
        let last_hash = hash_block(ledger.last_block());

        let block = ledger.mine_block().unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(block.previous_hash, last_hash);
        assert!(verification::valid_proof(&pending, &last_hash, block.proof));
        assert_eq!(block.transactions.len(), 3);
        assert_eq!(&block.transactions[..2], &pending[..]);
        assert!(block.transactions[2].is_reward());
        assert_eq!(block.transactions[2].recipient, *miner.address());
        assert!(ledger.pending_transactions().is_empty());
        assert!(ledger.verify_chain());
    }

    #[test]
    fn test_balance_counts_pending_spends_but_not_pending_receipts() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = ledger_for(&alice, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();
        assert_eq!(ledger.balance_of(alice.address()), 10.0);

        submit(&mut ledger, &alice, bob.address(), 4.0).unwrap();

        assert_eq!(ledger.balance_of(alice.address()), 6.0);
        assert_eq!(ledger.balance_of(bob.address()), 0.0);

        ledger.mine_block().unwrap();

        assert_eq!(ledger.balance_of(alice.address()), 16.0);
        assert_eq!(ledger.balance_of(bob.address()), 4.0);
    }

    #[test]
    fn test_double_spend_rejected_before_mining() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let carol = Wallet::new();
        let mut ledger = ledger_for(&alice, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();

        submit(&mut ledger, &alice, bob.address(), 10.0).unwrap();
        let second = submit(&mut ledger, &alice, carol.address(), 10.0);

        assert_eq!(
            second,
            Err(Rejected::InsufficientFunds {
                required: 10.0,
                available: 0.0
            })
        );
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_invalid_submissions_leave_state_untouched() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = ledger_for(&alice, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();

        let forged = bob.sign_transaction(bob.address(), 5.0).unwrap();
        let result = ledger.submit_transaction(
            alice.address().clone(),
            bob.address().clone(),
            forged,
            5.0,
            Origin::Local,
        );
        assert_eq!(result, Err(Rejected::InvalidSignature));

        assert_eq!(submit(&mut ledger, &alice, bob.address(), -1.0), Err(Rejected::InvalidAmount(-1.0)));
        assert!(matches!(
            submit(&mut ledger, &bob, alice.address(), 1.0),
            Err(Rejected::InsufficientFunds { .. })
        ));

        let reward = ledger.submit_transaction(
            Address("MINING".to_string()),
            bob.address().clone(),
            DigitalSignature::default(),
            100.0,
            Origin::Local,
        );
        assert_eq!(reward, Err(Rejected::InvalidSignature));

        assert!(ledger.pending_transactions().is_empty());
    }

    #[test]
    fn test_local_transactions_are_broadcast_and_peer_ones_are_not() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.answer("peer-a", BroadcastStatus::Accepted);
        let mut ledger = ledger_for(&alice, transport.clone());
        ledger.add_peer("peer-a");
        ledger.add_peer("peer-down");
        ledger.mine_block().unwrap();

        submit(&mut ledger, &alice, bob.address(), 1.0).unwrap();
        assert_eq!(transport.sent_transactions.lock().unwrap().len(), 2);

        let signature = alice.sign_transaction(bob.address(), 2.0).unwrap();
        ledger
            .submit_transaction(alice.address().clone(), bob.address().clone(), signature, 2.0, Origin::Peer)
            .unwrap();
        assert_eq!(transport.sent_transactions.lock().unwrap().len(), 2);
        assert_eq!(ledger.pending_transactions().len(), 2);
    }

    #[test]
    fn test_peer_decline_reported_but_pool_entry_kept() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.answer("picky", BroadcastStatus::Declined);
        let mut ledger = ledger_for(&alice, transport);
        ledger.add_peer("picky");
        ledger.mine_block().unwrap();

        let result = submit(&mut ledger, &alice, bob.address(), 1.0);

        assert_eq!(result, Err(Rejected::PeerDeclined("picky".to_string())));
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_peer_conflict_on_transaction_is_not_a_decline() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.answer("ahead", BroadcastStatus::Conflict);
        transport.answer("peer-b", BroadcastStatus::Accepted);
        let mut ledger = ledger_for(&alice, transport.clone());
        ledger.add_peer("ahead");
        ledger.add_peer("peer-b");
        ledger.mine_block().unwrap();

        assert_eq!(submit(&mut ledger, &alice, bob.address(), 1.0), Ok(()));
        assert_eq!(ledger.pending_transactions().len(), 1);
        assert_eq!(transport.sent_transactions.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_block_broadcast_conflict_sets_flag() {
        let miner = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.answer("ahead", BroadcastStatus::Conflict);
        transport.answer("picky", BroadcastStatus::Declined);
        let mut ledger = ledger_for(&miner, transport.clone());
        ledger.add_peer("ahead");
        ledger.add_peer("picky");
        ledger.add_peer("down");

        let block = ledger.mine_block().unwrap();

        assert!(ledger.needs_resolution());
        assert_eq!(transport.sent_blocks.lock().unwrap().len(), 3);
        assert!(transport.sent_blocks.lock().unwrap().iter().all(|(_, b)| *b == block));
    }

    #[test]
    fn test_mining_aborts_on_invalid_pending_signature() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = ledger_for(&alice, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();
        submit(&mut ledger, &alice, bob.address(), 1.0).unwrap();

        // Corrupt the pool behind admission's back
        ledger.pending_transactions[0].amount = 5.0;
        assert!(!ledger.verify_pending());

        assert!(ledger.mine_block().is_none());
        assert_eq!(ledger.chain().len(), 2);
        assert_eq!(ledger.pending_transactions().len(), 1);
    }

    #[test]
    fn test_exhausted_pow_limit_aborts_mining() {
        let miner = Wallet::new();
        let mut ledger = ledger_for(&miner, Arc::new(FakeTransport::default())).with_pow_limit(Some(0));

        assert!(ledger.mine_block().is_none());
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_verify_pending() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut ledger = ledger_for(&alice, Arc::new(FakeTransport::default()));
        ledger.mine_block().unwrap();
        submit(&mut ledger, &alice, bob.address(), 7.0).unwrap();

        assert!(ledger.verify_pending());
    }

    #[test]
    fn test_add_block_accepts_peer_block_and_prunes_pool() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let mut producer = ledger_for(&alice, Arc::new(FakeTransport::default()));
        producer.mine_block().unwrap();

        let mut follower = ledger_for(&bob, Arc::new(FakeTransport::default()));
        assert!(follower.add_block(producer.chain()[1].clone()));

        let signature = alice.sign_transaction(bob.address(), 3.0).unwrap();
        for ledger in [&mut producer, &mut follower] {
            ledger
                .submit_transaction(
                    alice.address().clone(),
                    bob.address().clone(),
                    signature.clone(),
                    3.0,
                    Origin::Peer,
                )
                .unwrap();
        }
        let block = producer.mine_block().unwrap();

        assert!(follower.add_block(block));
        assert!(follower.pending_transactions().is_empty());
        assert_eq!(follower.chain(), producer.chain());
        assert_eq!(follower.balance_of(bob.address()), 3.0);
    }

    #[test]
    fn test_add_block_rejects_wrong_previous_hash() {
        let miner = Wallet::new();
        let mut ledger = ledger_for(&miner, Arc::new(FakeTransport::default()));

        let mut candidate = Block::new(
            1,
            "not-our-tail".to_string(),
            vec![Transaction::new_reward(miner.address().clone(), MINING_REWARD)],
            0,
        );
        candidate.proof = verification::proof_of_work(&[], &candidate.previous_hash);

        assert!(!ledger.add_block(candidate));
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_add_block_rejects_wrong_index() {
        let mut producer = ledger_for(&Wallet::new(), Arc::new(FakeTransport::default()));
        let mut candidate = producer.mine_block().unwrap();
        candidate.index = 5;

        let mut ledger = ledger_for(&Wallet::new(), Arc::new(FakeTransport::default()));

        assert!(!ledger.add_block(candidate));
        assert_eq!(ledger.chain(), &[Block::genesis()][..]);
        assert!(ledger.verify_chain());
    }

    #[test]
    fn test_add_block_rejects_invalid_proof() {
        let miner = Wallet::new();
        let mut ledger = ledger_for(&miner, Arc::new(FakeTransport::default()));
        let tail_hash = hash_block(ledger.last_block());
        let bad_proof = (0..).find(|p| !verification::valid_proof(&[], &tail_hash, *p)).unwrap();

        let candidate = Block::new(
            1,
            tail_hash,
            vec![Transaction::new_reward(miner.address().clone(), MINING_REWARD)],
            bad_proof,
        );

        assert!(!ledger.add_block(candidate));
        assert_eq!(ledger.chain().len(), 1);
    }

    #[test]
    fn test_resolve_adopts_longest_valid_chain_only() {
        let local = Wallet::new();
        let transport = Arc::new(FakeTransport::default());

        let valid = mined_chain(2);
        let mut broken = mined_chain(4);
        broken[2].previous_hash = "tampered".to_string();
        assert_eq!(valid.len(), 3);
        assert_eq!(broken.len(), 5);

        transport.serve_chain("honest", valid.clone());
        transport.serve_chain("liar", broken);

        let mut ledger = ledger_for(&local, transport);
        ledger.add_peer("honest");
        ledger.add_peer("liar");
        ledger.add_peer("offline");

        assert!(ledger.resolve());
        assert_eq!(ledger.chain(), &valid[..]);
    }

    #[test]
    fn test_resolve_rejects_forged_genesis() {
        let local = Wallet::new();
        let attacker = Wallet::new();

        let mut genesis = Block::genesis();
        genesis
            .transactions
            .push(Transaction::new_reward(attacker.address().clone(), 1_000_000.0));
        let last_hash = hash_block(&genesis);
        let proof = verification::proof_of_work(&[], &last_hash);
        let next = Block::new(
            1,
            last_hash,
            vec![Transaction::new_reward(attacker.address().clone(), MINING_REWARD)],
            proof,
        );

        let transport = Arc::new(FakeTransport::default());
        transport.serve_chain("attacker", vec![genesis, next]);
        let mut ledger = ledger_for(&local, transport);
        ledger.add_peer("attacker");

        assert!(!ledger.resolve());
        assert_eq!(ledger.chain(), &[Block::genesis()][..]);
        assert_eq!(ledger.balance_of(attacker.address()), 0.0);
    }

    #[test]
    fn test_resolve_keeps_longer_local_chain() {
        let local = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.serve_chain("behind", mined_chain(2));

        let mut ledger = ledger_for(&local, transport);
        for _ in 0..3 {
            ledger.mine_block().unwrap();
        }
        ledger.add_peer("behind");
        ledger.mark_conflict();
        let before = ledger.chain().to_vec();

        assert!(!ledger.resolve());
        assert_eq!(ledger.chain(), &before[..]);
        assert!(!ledger.needs_resolution());
    }

    #[test]
    fn test_resolve_is_idempotent_and_drops_pending() {
        let alice = Wallet::new();
        let bob = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.serve_chain("peer", mined_chain(3));

        let mut ledger = ledger_for(&alice, transport);
        ledger.mine_block().unwrap();
        submit(&mut ledger, &alice, bob.address(), 1.0).unwrap();
        ledger.add_peer("peer");

        assert!(ledger.resolve());
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.chain().len(), 4);

        assert!(!ledger.resolve());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let alice = Wallet::new();
        let bob = Wallet::new();
        let transport = Arc::new(FakeTransport::default());
        transport.answer("localhost:5001", BroadcastStatus::Accepted);

        let (chain, pending) = {
            let store = SnapshotStore::open(dir.path()).unwrap();
            let mut ledger = ledger_for(&alice, transport.clone()).with_storage(store);
            ledger.add_peer("localhost:5001");
            ledger.mine_block().unwrap();
            submit(&mut ledger, &alice, bob.address(), 2.0).unwrap();
            submit(&mut ledger, &alice, bob.address(), 3.0).unwrap();
            (ledger.chain().to_vec(), ledger.pending_transactions().to_vec())
        };

        let store = SnapshotStore::open(dir.path()).unwrap();
        let restored = ledger_for(&alice, transport).with_storage(store);

        assert_eq!(restored.chain(), &chain[..]);
        assert_eq!(hash_block(restored.last_block()), hash_block(&chain[1]));
        assert_eq!(restored.pending_transactions(), &pending[..]);
        assert_eq!(restored.peers(), vec!["localhost:5001".to_string()]);
    }

    #[test]
    fn test_malformed_snapshot_leaves_genesis_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.put_raw(CHAIN_KEY, b"{not json").unwrap();

        let ledger = ledger_for(&Wallet::new(), Arc::new(FakeTransport::default())).with_storage(store);

        assert_eq!(ledger.chain(), &[Block::genesis()][..]);
        assert!(ledger.pending_transactions().is_empty());
        assert!(ledger.peers().is_empty());
    }

    #[test]
    fn test_peer_management() {
        let mut ledger = ledger_for(&Wallet::new(), Arc::new(FakeTransport::default()));

        ledger.add_peer("localhost:5001");
        ledger.add_peer("localhost:5001");
        ledger.add_peer("localhost:5002");
        assert_eq!(ledger.peers().len(), 2);

        ledger.remove_peer("localhost:5001");
        ledger.remove_peer("localhost:5003");
        assert_eq!(ledger.peers(), vec!["localhost:5002".to_string()]);
    }
}

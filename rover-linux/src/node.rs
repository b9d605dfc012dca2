//! Per-rover context shared by every task: routing state, transfer waiters, announce trigger.

use std::collections::HashMap;
use std::sync::Arc;

use rover_core::{RoverId, Router, TransferDescriptor};
use tokio::sync::{mpsc, Mutex, Notify};

use crate::config::Config;

/// Outbound transfers awaiting acks, keyed by the rover they are sending to.
pub type TransferWaiters =
    Arc<Mutex<HashMap<RoverId, mpsc::UnboundedSender<TransferDescriptor>>>>;

pub struct Node {
    pub id: RoverId,
    pub config: Config,
    pub router: Mutex<Router>,
    pub waiters: TransferWaiters,
    /// Wakes the announcer early when a neighbor sends a REQUEST.
    pub announce_now: Notify,
}

impl Node {
    pub fn new(id: RoverId, config: Config) -> Arc<Self> {
        let router = Router::new(id, config.protocol.clone());
        Arc::new(Self {
            id,
            config,
            router: Mutex::new(router),
            waiters: Arc::new(Mutex::new(HashMap::new())),
            announce_now: Notify::new(),
        })
    }
}

//! Swap persistence
//!
//! The orchestrator depends only on the `SwapRepository` contract; backends
//! are pluggable. Two implementations ship: an in-memory store for tests and
//! single-process deployments, and an embedded sled store for durability
//! across restarts.

use crate::error::SwapError;
use crate::types::{Swap, SwapStatus, UserFee};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// Fields of a new swap record, minus what the repository fills in
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub user_wallet: String,
    pub source_token: String,
    pub source_amount: String,
    pub destination_chain: String,
    pub destination_token: String,
    pub destination_wallet: String,
    pub provider: String,
    pub provider_order_id: String,
    pub fee: Option<UserFee>,
}

/// Optional fields attached to a status update
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub source_signature: Option<String>,
    pub destination_tx: Option<String>,
    pub error: Option<String>,
}

/// Persistence contract consumed by the orchestrator
#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// Create a durable record with the given id and initial status
    async fn create(
        &self,
        data: NewSwap,
        initial_status: SwapStatus,
        id: &str,
    ) -> Result<Swap, SwapError>;

    /// Advance a record's status, merging any extra references
    async fn update_status(
        &self,
        id: &str,
        status: SwapStatus,
        extra: StatusUpdate,
    ) -> Result<Swap, SwapError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Swap>, SwapError>;

    /// Most-recent-first swaps for a user wallet
    async fn find_by_user(&self, wallet: &str, limit: usize) -> Result<Vec<Swap>, SwapError>;
}

fn build_swap(data: NewSwap, status: SwapStatus, id: &str) -> Swap {
    let now = Utc::now();
    Swap {
        id: id.to_string(),
        user_wallet: data.user_wallet,
        source_token: data.source_token,
        source_amount: data.source_amount,
        destination_chain: data.destination_chain,
        destination_token: data.destination_token,
        destination_wallet: data.destination_wallet,
        provider: data.provider,
        provider_order_id: data.provider_order_id,
        fee: data.fee,
        status,
        source_signature: None,
        destination_tx: None,
        error: None,
        created_at: now,
        updated_at: now,
    }
}

fn apply_update(swap: &mut Swap, status: SwapStatus, extra: StatusUpdate) {
    swap.status = status;
    if extra.source_signature.is_some() {
        swap.source_signature = extra.source_signature;
    }
    if extra.destination_tx.is_some() {
        swap.destination_tx = extra.destination_tx;
    }
    if extra.error.is_some() {
        swap.error = extra.error;
    }
    swap.updated_at = Utc::now();
}

/// In-memory repository backed by a concurrent map
#[derive(Default)]
pub struct MemorySwapStore {
    swaps: DashMap<String, Swap>,
}

impl MemorySwapStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SwapRepository for MemorySwapStore {
    async fn create(
        &self,
        data: NewSwap,
        initial_status: SwapStatus,
        id: &str,
    ) -> Result<Swap, SwapError> {
        if self.swaps.contains_key(id) {
            return Err(SwapError::Validation(format!("swap {} already exists", id)));
        }
        let swap = build_swap(data, initial_status, id);
        self.swaps.insert(id.to_string(), swap.clone());
        debug!(swap_id = %id, "Swap record created");
        Ok(swap)
    }

    async fn update_status(
        &self,
        id: &str,
        status: SwapStatus,
        extra: StatusUpdate,
    ) -> Result<Swap, SwapError> {
        let mut entry = self
            .swaps
            .get_mut(id)
            .ok_or_else(|| SwapError::NotFound(format!("swap {}", id)))?;
        apply_update(entry.value_mut(), status, extra);
        Ok(entry.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Swap>, SwapError> {
        Ok(self.swaps.get(id).map(|s| s.clone()))
    }

    async fn find_by_user(&self, wallet: &str, limit: usize) -> Result<Vec<Swap>, SwapError> {
        let mut swaps: Vec<Swap> = self
            .swaps
            .iter()
            .filter(|s| s.user_wallet == wallet)
            .map(|s| s.clone())
            .collect();
        swaps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        swaps.truncate(limit);
        Ok(swaps)
    }
}

/// Embedded sled repository; records stored as JSON under their swap id
pub struct SledSwapStore {
    db: sled::Db,
}

impl SledSwapStore {
    pub fn open(path: &str) -> Result<Self, SwapError> {
        let db = sled::open(path)
            .map_err(|e| SwapError::Configuration(format!("sled open {}: {}", path, e)))?;
        Ok(Self { db })
    }

    fn get_swap(&self, id: &str) -> Result<Option<Swap>, SwapError> {
        let Some(bytes) = self
            .db
            .get(id.as_bytes())
            .map_err(|e| SwapError::internal(format!("sled get: {}", e)))?
        else {
            return Ok(None);
        };
        let swap = serde_json::from_slice(&bytes)
            .map_err(|e| SwapError::internal(format!("corrupt swap record {}: {}", id, e)))?;
        Ok(Some(swap))
    }

    fn put_swap(&self, swap: &Swap) -> Result<(), SwapError> {
        let bytes = serde_json::to_vec(swap)
            .map_err(|e| SwapError::internal(format!("serialize swap: {}", e)))?;
        self.db
            .insert(swap.id.as_bytes(), bytes)
            .map_err(|e| SwapError::internal(format!("sled insert: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl SwapRepository for SledSwapStore {
    async fn create(
        &self,
        data: NewSwap,
        initial_status: SwapStatus,
        id: &str,
    ) -> Result<Swap, SwapError> {
        if self.get_swap(id)?.is_some() {
            return Err(SwapError::Validation(format!("swap {} already exists", id)));
        }
        let swap = build_swap(data, initial_status, id);
        self.put_swap(&swap)?;
        debug!(swap_id = %id, "Swap record created");
        Ok(swap)
    }

    async fn update_status(
        &self,
        id: &str,
        status: SwapStatus,
        extra: StatusUpdate,
    ) -> Result<Swap, SwapError> {
        let mut swap = self
            .get_swap(id)?
            .ok_or_else(|| SwapError::NotFound(format!("swap {}", id)))?;
        apply_update(&mut swap, status, extra);
        self.put_swap(&swap)?;
        Ok(swap)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Swap>, SwapError> {
        self.get_swap(id)
    }

    async fn find_by_user(&self, wallet: &str, limit: usize) -> Result<Vec<Swap>, SwapError> {
        let mut swaps = Vec::new();
        for item in self.db.iter() {
            let (_, bytes) = item.map_err(|e| SwapError::internal(format!("sled scan: {}", e)))?;
            if let Ok(swap) = serde_json::from_slice::<Swap>(&bytes) {
                if swap.user_wallet == wallet {
                    swaps.push(swap);
                }
            }
        }
        swaps.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        swaps.truncate(limit);
        Ok(swaps)
    }
}

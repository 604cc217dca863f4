//! # Server Gateway
//!
//! The server boundary: one endpoint contract per operation kind, every call
//! carrying the item's idempotency key. The transport behind the trait is
//! whatever the deployment provides; the contract is only "reliable,
//! retryable request/response" plus the write-once guarantee below.
//!
//! ## The Idempotency Guard Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Server-side, per mutating endpoint:                                │
//! │                                                                     │
//! │  1. Look the idempotency key up in a keyed write-once cache         │
//! │  2. Hit  → return the ORIGINAL result; do not re-execute            │
//! │  3. Miss → execute, store the result under the key, return it       │
//! │                                                                     │
//! │  A replay therefore reports replayed = true and the processor       │
//! │  adopts it as success. Exactly-once EFFECT, at-least-once delivery. │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryGateway`] is the in-process reference implementation of that
//! contract, with just enough server state (sales, coupon caps, credit
//! balances) to exercise every operation kind. The integration tests drive
//! the whole engine against it.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use till_core::operation::{
    CouponRedemptionOp, CreditIssueOp, CreditRedemptionOp, ExchangeOp, PaymentOp, ReturnOp,
    SaleOp, SaleRef,
};
use till_core::types::IdempotencyKey;

use crate::error::GatewayError;

// =============================================================================
// Acknowledgment
// =============================================================================

/// A successful server acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAck {
    /// The server-assigned identifier for the created entity.
    pub server_id: String,
    /// True when the idempotency guard served a cached result instead of
    /// re-executing.
    pub replayed: bool,
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// The server mutation and query endpoints, one method per operation kind.
///
/// Adding an operation kind means adding a method here and a variant to
/// `Operation`; the processor's dispatch match then fails to compile until
/// both sides agree.
#[async_trait]
pub trait ServerGateway: Send + Sync {
    async fn create_sale(
        &self,
        key: &IdempotencyKey,
        op: &SaleOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn add_payment(
        &self,
        key: &IdempotencyKey,
        op: &PaymentOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn create_return(
        &self,
        key: &IdempotencyKey,
        op: &ReturnOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn create_exchange(
        &self,
        key: &IdempotencyKey,
        op: &ExchangeOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn redeem_coupon(
        &self,
        key: &IdempotencyKey,
        op: &CouponRedemptionOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn issue_credit(
        &self,
        key: &IdempotencyKey,
        op: &CreditIssueOp,
    ) -> Result<ServerAck, GatewayError>;

    async fn redeem_credit(
        &self,
        key: &IdempotencyKey,
        op: &CreditRedemptionOp,
    ) -> Result<ServerAck, GatewayError>;

    /// Best-effort read of a customer's store-credit balance, for
    /// mid-evaluation context. Never gates a sale.
    async fn credit_balance(&self, customer_id: &str) -> Result<i64, GatewayError>;

    /// Cheap reachability probe for status displays.
    async fn is_reachable(&self) -> bool {
        true
    }
}

// =============================================================================
// In-Memory Reference Gateway
// =============================================================================

#[derive(Default)]
struct GatewayState {
    /// The keyed write-once cache: idempotency key → original ack.
    replies: HashMap<String, ServerAck>,
    /// Server-known sale ids.
    sales: Vec<String>,
    /// Coupon usage counters and caps.
    coupon_uses: HashMap<String, u32>,
    coupon_caps: HashMap<String, u32>,
    /// Store-credit balances per customer.
    credit: HashMap<String, i64>,
    /// Simulated reachability.
    offline: bool,
    /// Number of times a write actually executed (replays excluded).
    effects: u64,
    next_id: u64,
}

impl GatewayState {
    fn mint_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("srv-{prefix}-{}", self.next_id)
    }

    fn require_known_sale(&self, sale: &SaleRef) -> Result<String, GatewayError> {
        match sale {
            SaleRef::Server(id) if self.sales.iter().any(|s| s == id) => Ok(id.clone()),
            SaleRef::Server(id) => Err(GatewayError::Rejected(format!("unknown sale {id}"))),
            SaleRef::Local(id) => {
                Err(GatewayError::Rejected(format!("unresolved local sale reference {id}")))
            }
        }
    }
}

/// In-process [`ServerGateway`] implementing the idempotency-guard contract.
///
/// Used by the integration tests and as an offline stand-in; the outage
/// switch ([`MemoryGateway::set_offline`]) simulates network loss.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<GatewayState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing (true) or regaining (false) the server.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Caps total redemptions for a coupon code.
    pub async fn set_coupon_cap(&self, code: &str, cap: u32) {
        self.state.lock().await.coupon_caps.insert(code.to_string(), cap);
    }

    /// Number of writes that actually executed (idempotent replays excluded).
    pub async fn effect_count(&self) -> u64 {
        self.state.lock().await.effects
    }

    /// Number of sales the server knows about.
    pub async fn sale_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }

    /// Runs one guarded write: reachability, then the write-once cache, then
    /// the actual effect.
    async fn guarded<F>(&self, key: &IdempotencyKey, effect: F) -> Result<ServerAck, GatewayError>
    where
        F: FnOnce(&mut GatewayState) -> Result<String, GatewayError>,
    {
        let mut state = self.state.lock().await;
        if state.offline {
            return Err(GatewayError::Transient("gateway unreachable".into()));
        }
        if let Some(original) = state.replies.get(key.as_str()) {
            return Ok(ServerAck { server_id: original.server_id.clone(), replayed: true });
        }
        let server_id = effect(&mut state)?;
        state.effects += 1;
        let ack = ServerAck { server_id, replayed: false };
        state.replies.insert(key.as_str().to_string(), ack.clone());
        Ok(ack)
    }
}

#[async_trait]
impl ServerGateway for MemoryGateway {
    async fn create_sale(
        &self,
        key: &IdempotencyKey,
        _op: &SaleOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            let id = state.mint_id("sale");
            state.sales.push(id.clone());
            Ok(id)
        })
        .await
    }

    async fn add_payment(
        &self,
        key: &IdempotencyKey,
        op: &PaymentOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            state.require_known_sale(&op.sale)?;
            Ok(state.mint_id("payment"))
        })
        .await
    }

    async fn create_return(
        &self,
        key: &IdempotencyKey,
        op: &ReturnOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            state.require_known_sale(&op.original)?;
            Ok(state.mint_id("return"))
        })
        .await
    }

    async fn create_exchange(
        &self,
        key: &IdempotencyKey,
        op: &ExchangeOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            state.require_known_sale(&op.original)?;
            Ok(state.mint_id("exchange"))
        })
        .await
    }

    async fn redeem_coupon(
        &self,
        key: &IdempotencyKey,
        op: &CouponRedemptionOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            state.require_known_sale(&op.sale)?;
            let uses = state.coupon_uses.get(&op.code).copied().unwrap_or(0);
            if let Some(cap) = state.coupon_caps.get(&op.code) {
                if uses >= *cap {
                    return Err(GatewayError::Rejected(format!(
                        "coupon {} limit reached",
                        op.code
                    )));
                }
            }
            state.coupon_uses.insert(op.code.clone(), uses + 1);
            Ok(state.mint_id("redemption"))
        })
        .await
    }

    async fn issue_credit(
        &self,
        key: &IdempotencyKey,
        op: &CreditIssueOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            if let Some(source) = &op.source_sale {
                state.require_known_sale(source)?;
            }
            *state.credit.entry(op.customer_id.clone()).or_insert(0) += op.amount_cents;
            Ok(state.mint_id("credit"))
        })
        .await
    }

    async fn redeem_credit(
        &self,
        key: &IdempotencyKey,
        op: &CreditRedemptionOp,
    ) -> Result<ServerAck, GatewayError> {
        self.guarded(key, |state| {
            state.require_known_sale(&op.sale)?;
            let balance = state.credit.get(&op.customer_id).copied().unwrap_or(0);
            if balance < op.amount_cents {
                return Err(GatewayError::Rejected(format!(
                    "insufficient credit: {} < {}",
                    balance, op.amount_cents
                )));
            }
            state.credit.insert(op.customer_id.clone(), balance - op.amount_cents);
            Ok(state.mint_id("redemption"))
        })
        .await
    }

    async fn credit_balance(&self, customer_id: &str) -> Result<i64, GatewayError> {
        let state = self.state.lock().await;
        if state.offline {
            return Err(GatewayError::Transient("gateway unreachable".into()));
        }
        Ok(state.credit.get(customer_id).copied().unwrap_or(0))
    }

    async fn is_reachable(&self) -> bool {
        !self.state.lock().await.offline
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

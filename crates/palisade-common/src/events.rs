//! Structured audit event log
//!
//! Every mutating operation appends a [`LedgerEvent`] describing the state
//! transition it committed. Events are buffered in an append-only outbox
//! that downstream observers can drain or replay, and fanned out to
//! pluggable sinks as they are recorded.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::ids::{AssetId, BlockHeight, PolicyId, ProviderId, TierName};

/// State-transition events emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    /// A collateral asset was registered with the capital ledger
    AssetInitialized {
        asset: AssetId,
        external_ref: Option<String>,
    },
    /// A provider deposited capital
    DepositRecorded {
        provider: ProviderId,
        asset: AssetId,
        amount: Decimal,
        tier: TierName,
    },
    /// A provider withdrew available capital
    WithdrawalRecorded {
        provider: ProviderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// A provider claimed its earned premium balance
    PremiumsClaimed {
        provider: ProviderId,
        asset: AssetId,
        amount: Decimal,
    },
    /// Collateral was locked against a policy across one or more providers
    CollateralLocked {
        policy: PolicyId,
        asset: AssetId,
        tier: TierName,
        expiration: BlockHeight,
        total: Decimal,
        shares: Vec<(ProviderId, Decimal)>,
    },
    /// A winning policy's collateral was returned to its providers
    CollateralReleased {
        policy: PolicyId,
        asset: AssetId,
        expiration: BlockHeight,
        total: Decimal,
    },
    /// Liquidity for an expiration height was marked prepared
    LiquidityPrepared { expiration: BlockHeight },
    /// A losing policy was settled out of providers' locked collateral
    SettlementProcessed {
        policy: PolicyId,
        asset: AssetId,
        owner: String,
        amount: Decimal,
        height: BlockHeight,
        remaining_collateral: Decimal,
    },
    /// A contributing provider was unreachable during settlement and its
    /// share was redistributed (or written off when it was the sole
    /// contributor)
    ProviderDropout {
        policy: PolicyId,
        provider: ProviderId,
        share: Decimal,
        redistributed: bool,
    },
    /// A policy's premium payment was recorded and accrued as pending
    PremiumRecorded {
        policy: PolicyId,
        asset: AssetId,
        amount: Decimal,
        expiration: BlockHeight,
        shares: Vec<(ProviderId, Decimal)>,
    },
    /// A policy's pending premium shares were converted to earned balances
    PremiumDistributed {
        policy: PolicyId,
        asset: AssetId,
        amount: Decimal,
        height: BlockHeight,
    },
    /// Stale unclaimed premiums were swept from a provider
    PremiumSwept {
        provider: ProviderId,
        asset: AssetId,
        amount: Decimal,
        destination: SweepDestination,
    },
}

impl LedgerEvent {
    /// Stable event type label, used by sinks and stream consumers
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AssetInitialized { .. } => "AssetInitialized",
            LedgerEvent::DepositRecorded { .. } => "DepositRecorded",
            LedgerEvent::WithdrawalRecorded { .. } => "WithdrawalRecorded",
            LedgerEvent::PremiumsClaimed { .. } => "PremiumsClaimed",
            LedgerEvent::CollateralLocked { .. } => "CollateralLocked",
            LedgerEvent::CollateralReleased { .. } => "CollateralReleased",
            LedgerEvent::LiquidityPrepared { .. } => "LiquidityPrepared",
            LedgerEvent::SettlementProcessed { .. } => "SettlementProcessed",
            LedgerEvent::ProviderDropout { .. } => "ProviderDropout",
            LedgerEvent::PremiumRecorded { .. } => "PremiumRecorded",
            LedgerEvent::PremiumDistributed { .. } => "PremiumDistributed",
            LedgerEvent::PremiumSwept { .. } => "PremiumSwept",
        }
    }
}

/// Where swept premiums went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepDestination {
    /// Redistributed among currently active providers
    ActiveProviders,
    /// Forwarded to the fallback treasury account
    Treasury,
}

/// An event plus its identity and recording time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event id
    pub event_id: String,
    /// Recording timestamp (Unix millis)
    pub timestamp: i64,
    /// Monotonic sequence number within this outbox
    pub sequence: u64,
    /// The event payload
    pub event: LedgerEvent,
}

/// Event sink for downstream observers
pub trait EventSink: Send + Sync {
    /// Called once per recorded event, in recording order
    fn publish(&self, envelope: &EventEnvelope);
}

/// Sink that emits each event as a structured tracing record
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, envelope: &EventEnvelope) {
        info!(
            event_id = %envelope.event_id,
            sequence = envelope.sequence,
            event_type = envelope.event.event_type(),
            "ledger event"
        );
    }
}

/// Append-only, replayable audit event outbox
pub struct EventOutbox {
    buffer: RwLock<Vec<EventEnvelope>>,
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventOutbox {
    /// Create an outbox with a tracing sink attached
    pub fn new() -> Self {
        Self {
            buffer: RwLock::new(Vec::new()),
            sinks: vec![Box::new(TracingSink)],
        }
    }

    /// Create an outbox with a custom sink set (empty set is fine; events
    /// are still buffered)
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            buffer: RwLock::new(Vec::new()),
            sinks,
        }
    }

    /// Append an event, assigning its id and sequence number
    pub fn record(&self, event: LedgerEvent) -> EventEnvelope {
        let mut buffer = self.buffer.write();
        let envelope = EventEnvelope {
            event_id: uuid::Uuid::now_v7().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sequence: buffer.len() as u64,
            event,
        };
        buffer.push(envelope.clone());
        drop(buffer);

        for sink in &self.sinks {
            sink.publish(&envelope);
        }
        envelope
    }

    /// Take all buffered events, leaving the outbox empty
    pub fn drain(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut *self.buffer.write())
    }

    /// Re-publish all buffered events to a sink, in order
    pub fn replay(&self, sink: &dyn EventSink) {
        for envelope in self.buffer.read().iter() {
            sink.publish(envelope);
        }
    }

    /// Snapshot of buffered events
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.buffer.read().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }
}

impl Default for EventOutbox {
    fn default() -> Self {
        Self::new()
    }
}

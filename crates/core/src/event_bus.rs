//! Loyalty event bus: trait for emitting discrete loyalty events to the
//! notification layer (toasts, SMS, email).
//!
//! Modules accept an `Arc<dyn EventSink>`. Delivery is fire-and-forget; the
//! engine never depends on an event being delivered.

use crate::loyalty::{BadgeId, TierId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyEventType {
    ReferralApplied,
    BirthdayRewardGranted,
    TierChanged,
    BadgeEarned,
    PlanPurchased,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LoyaltyEventDetail {
    ReferralApplied {
        referrer_id: Uuid,
        referrer_bonus: u64,
        referee_bonus: u64,
    },
    BirthdayRewardGranted {
        points: u64,
    },
    TierChanged {
        from: Option<TierId>,
        to: TierId,
    },
    BadgeEarned {
        badge_id: BadgeId,
    },
    PlanPurchased {
        plan_id: Uuid,
        welcome_points: u64,
    },
}

impl LoyaltyEventDetail {
    pub fn event_type(&self) -> LoyaltyEventType {
        match self {
            LoyaltyEventDetail::ReferralApplied { .. } => LoyaltyEventType::ReferralApplied,
            LoyaltyEventDetail::BirthdayRewardGranted { .. } => {
                LoyaltyEventType::BirthdayRewardGranted
            }
            LoyaltyEventDetail::TierChanged { .. } => LoyaltyEventType::TierChanged,
            LoyaltyEventDetail::BadgeEarned { .. } => LoyaltyEventType::BadgeEarned,
            LoyaltyEventDetail::PlanPurchased { .. } => LoyaltyEventType::PlanPurchased,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoyaltyEvent {
    pub event_id: Uuid,
    pub workspace: String,
    /// The member the event is about (the referee for referrals).
    pub customer_id: Uuid,
    pub detail: LoyaltyEventDetail,
    pub timestamp: DateTime<Utc>,
}

/// Trait for emitting loyalty events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoyaltyEvent);
}

/// No-op sink for callers that don't surface notifications.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: LoyaltyEvent) {}
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<LoyaltyEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoyaltyEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn count_type(&self, event_type: LoyaltyEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.detail.event_type() == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: LoyaltyEvent) {
        self.events.lock().push(event);
    }
}

/// Convenience builder for a `LoyaltyEvent` stamped at `timestamp`.
pub fn make_event(
    workspace: impl Into<String>,
    customer_id: Uuid,
    detail: LoyaltyEventDetail,
    timestamp: DateTime<Utc>,
) -> LoyaltyEvent {
    LoyaltyEvent {
        event_id: Uuid::new_v4(),
        workspace: workspace.into(),
        customer_id,
        detail,
        timestamp,
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}

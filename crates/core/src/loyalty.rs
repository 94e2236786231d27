//! Loyalty program domain types for the salon dashboard.
//!
//! - Spend-based membership tiers with point multipliers and discounts
//! - Achievement badges that, once earned, are held permanently
//! - Referral codes with flat bonuses for both sides
//! - Purchasable membership plans granting one-time welcome points

use crate::types::Money;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type BadgeId = String;
pub type TierId = String;

// ─── Tiers ──────────────────────────────────────────────────────────────────

/// A membership level unlocked by cumulative spend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    /// Inclusive lower bound of net spend for this tier.
    pub min_spend: Money,
    /// Points earned per whole currency unit of net spend. Exact decimal, so
    /// `1.9999999` stays below 2.
    pub points_per_currency_unit: Decimal,
    pub discount_percent: u8,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl Tier {
    pub fn is_floor(&self) -> bool {
        self.min_spend.is_zero()
    }
}

// ─── Badges ─────────────────────────────────────────────────────────────────

/// Customer metric a badge threshold is compared against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BadgeMetric {
    VisitCount,
    /// Compared in major currency units.
    TotalSpent,
    ReferralCount,
    StreakDays,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BadgeDefinition {
    pub id: BadgeId,
    pub name: String,
    pub description: String,
    pub metric: BadgeMetric,
    pub threshold: f64,
}

// ─── Members ────────────────────────────────────────────────────────────────

/// A salon customer enrolled in the loyalty program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub join_date: NaiveDate,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Assigned once at enrollment, never regenerated.
    pub referral_code: String,
    #[serde(default)]
    pub referred_by_code: Option<String>,
    #[serde(default)]
    pub birthday_reward_claimed: bool,
    /// Last persisted loyalty snapshot. Its badge set is the held set that
    /// later recomputations union into.
    #[serde(default)]
    pub loyalty: Option<LoyaltyState>,
}

impl Customer {
    /// Badges held as of the last persisted snapshot.
    pub fn held_badges(&self) -> BTreeSet<BadgeId> {
        self.loyalty
            .as_ref()
            .map(|s| s.badges.clone())
            .unwrap_or_default()
    }

    /// Case-insensitive substring match on name, email or phone.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&q)
            || self.email.to_lowercase().contains(&q)
            || self.phone.to_lowercase().contains(&q)
    }

    /// Whether `today` falls in the customer's birth month.
    pub fn is_birthday_month(&self, today: NaiveDate) -> bool {
        self.date_of_birth
            .map(|dob| dob.month() == today.month())
            .unwrap_or(false)
    }
}

// ─── Purchases ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseKind {
    Sale,
    Refund,
}

/// Immutable purchase record produced by POS/invoicing. Refunds carry a
/// negative amount so net spend is always a plain fold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseEvent {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub kind: PurchaseKind,
}

impl PurchaseEvent {
    pub fn sale(customer_id: Uuid, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            amount: amount.abs(),
            timestamp,
            kind: PurchaseKind::Sale,
        }
    }

    /// Refund of `amount`; stored negated regardless of the sign passed in.
    pub fn refund(customer_id: Uuid, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            amount: -amount.abs(),
            timestamp,
            kind: PurchaseKind::Refund,
        }
    }

    pub fn is_sale(&self) -> bool {
        self.kind == PurchaseKind::Sale
    }
}

// ─── Derived State ──────────────────────────────────────────────────────────

/// Fully derived loyalty snapshot. Never edited by hand; recomputed from the
/// purchase history, referral ledger, point grants and catalogs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoyaltyState {
    pub customer_id: Uuid,
    pub total_spent: Money,
    pub tier_id: TierId,
    /// Spendable total: base + referral + streak + granted.
    pub points: u64,
    pub base_points: u64,
    pub referral_bonus_points: u64,
    pub streak_bonus_points: u64,
    /// One-time grants (birthday reward, plan welcome points).
    pub granted_points: u64,
    pub badges: BTreeSet<BadgeId>,
    pub visit_count: u32,
    pub visit_streak_days: u32,
    pub referral_count: u32,
    pub last_visit: Option<DateTime<Utc>>,
    pub next_tier_id: Option<TierId>,
    pub spend_to_next_tier: Option<Money>,
    pub birthday_reward_available: bool,
    pub computed_at: DateTime<Utc>,
}

// ─── Plans & Grants ─────────────────────────────────────────────────────────

/// A purchasable membership bundle, independent of spend tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MembershipPlan {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: u32,
    pub discount_percent: u8,
    pub welcome_points: u64,
    #[serde(default)]
    pub benefits: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum GrantSource {
    Birthday,
    PlanWelcome { plan_id: Uuid },
}

/// One-time point addition. Additive input to the points total, never
/// re-derived.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointGrant {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub points: u64,
    pub source: GrantSource,
    pub granted_at: DateTime<Utc>,
}

// ─── Referrals ──────────────────────────────────────────────────────────────

/// One customer's row in the referral ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReferralAccount {
    pub customer_id: Uuid,
    pub code: String,
    #[serde(default)]
    pub referral_count: u32,
    /// Accumulated referrer and referee bonuses.
    #[serde(default)]
    pub bonus_points: u64,
    #[serde(default)]
    pub referred_by: Option<Uuid>,
}

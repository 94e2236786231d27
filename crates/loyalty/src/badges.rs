//! Achievement badges. Acquisition is monotonic: evaluation only ever adds
//! to the held set.

use salon_core::loyalty::{BadgeDefinition, BadgeId, BadgeMetric};
use salon_core::{LoyaltyError, LoyaltyResult, Money};
use std::collections::{BTreeSet, HashSet};

/// Metric values a badge threshold can be compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BadgeMetrics {
    pub visit_count: u32,
    pub total_spent: Money,
    pub referral_count: u32,
    pub visit_streak_days: u32,
}

impl BadgeMetrics {
    pub fn value(&self, metric: BadgeMetric) -> f64 {
        match metric {
            BadgeMetric::VisitCount => self.visit_count as f64,
            BadgeMetric::TotalSpent => self.total_spent.as_major(),
            BadgeMetric::ReferralCount => self.referral_count as f64,
            BadgeMetric::StreakDays => self.visit_streak_days as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BadgeCatalog {
    badges: Vec<BadgeDefinition>,
}

impl BadgeCatalog {
    pub fn new(badges: Vec<BadgeDefinition>) -> LoyaltyResult<Self> {
        let mut ids = HashSet::new();
        for b in &badges {
            if b.id.trim().is_empty() {
                return Err(LoyaltyError::Configuration("badge id must not be empty".into()));
            }
            if !ids.insert(b.id.as_str()) {
                return Err(LoyaltyError::Configuration(format!(
                    "duplicate badge id {:?}",
                    b.id
                )));
            }
            if !b.threshold.is_finite() || b.threshold < 0.0 {
                return Err(LoyaltyError::Configuration(format!(
                    "badge {:?} has invalid threshold {}",
                    b.id, b.threshold
                )));
            }
        }
        Ok(Self { badges })
    }

    pub fn standard() -> Self {
        Self {
            badges: vec![
                badge(
                    "first_visit",
                    "First Visit",
                    "Completed a first appointment",
                    BadgeMetric::VisitCount,
                    1.0,
                ),
                badge(
                    "regular",
                    "Regular",
                    "Five visits and counting",
                    BadgeMetric::VisitCount,
                    5.0,
                ),
                badge(
                    "loyal",
                    "Loyal Client",
                    "Ten visits",
                    BadgeMetric::VisitCount,
                    10.0,
                ),
                badge(
                    "vip",
                    "VIP",
                    "Twenty-five visits",
                    BadgeMetric::VisitCount,
                    25.0,
                ),
                badge(
                    "big_spender",
                    "Big Spender",
                    "Spent 50,000 or more",
                    BadgeMetric::TotalSpent,
                    50_000.0,
                ),
                badge(
                    "ambassador",
                    "Ambassador",
                    "Referred three friends",
                    BadgeMetric::ReferralCount,
                    3.0,
                ),
                badge(
                    "streak_master",
                    "Streak Master",
                    "Visited seven days in a row",
                    BadgeMetric::StreakDays,
                    7.0,
                ),
            ],
        }
    }

    pub fn badges(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    pub fn get(&self, id: &str) -> Option<&BadgeDefinition> {
        self.badges.iter().find(|b| b.id == id)
    }

    /// Badges whose threshold `metrics` currently meets (inclusive).
    pub fn qualifying(&self, metrics: &BadgeMetrics) -> BTreeSet<BadgeId> {
        self.badges
            .iter()
            .filter(|b| metrics.value(b.metric) >= b.threshold)
            .map(|b| b.id.clone())
            .collect()
    }

    /// `previously_held ∪ qualifying(metrics)`. Never removes a badge, even
    /// one no longer in the catalog.
    pub fn evaluate(
        &self,
        metrics: &BadgeMetrics,
        previously_held: &BTreeSet<BadgeId>,
    ) -> BTreeSet<BadgeId> {
        let mut held = previously_held.clone();
        held.extend(self.qualifying(metrics));
        held
    }
}

/// Free-function form of [`BadgeCatalog::evaluate`].
pub fn evaluate_badges(
    catalog: &BadgeCatalog,
    metrics: &BadgeMetrics,
    previously_held: &BTreeSet<BadgeId>,
) -> BTreeSet<BadgeId> {
    catalog.evaluate(metrics, previously_held)
}

/// Badges in `current` that were not in `previous`.
pub fn newly_earned(previous: &BTreeSet<BadgeId>, current: &BTreeSet<BadgeId>) -> Vec<BadgeId> {
    current.difference(previous).cloned().collect()
}

fn badge(
    id: &str,
    name: &str,
    description: &str,
    metric: BadgeMetric,
    threshold: f64,
) -> BadgeDefinition {
    BadgeDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        metric,
        threshold,
    }
}

//! Tier catalog: ordered spend thresholds with point multipliers.
//!
//! A catalog is a plain value. Edits return a new catalog and leave the
//! receiver untouched, so a rejected edit can never be partially applied.

use rust_decimal::Decimal;
use salon_core::loyalty::Tier;
use salon_core::{LoyaltyError, LoyaltyResult, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierCatalog {
    /// Ascending by `min_spend`, ties broken by id.
    tiers: Vec<Tier>,
}

impl TierCatalog {
    /// Build a catalog and check its invariants.
    pub fn new(tiers: Vec<Tier>) -> LoyaltyResult<Self> {
        let catalog = Self::from_tiers(tiers);
        catalog.validate()?;
        Ok(catalog)
    }

    /// Build a catalog without validation, e.g. from stored records that may
    /// predate the current rules. Resolution still fails cleanly on it.
    pub fn from_tiers(mut tiers: Vec<Tier>) -> Self {
        sort_tiers(&mut tiers);
        Self { tiers }
    }

    /// Bronze / Silver / Gold / Platinum.
    pub fn standard() -> Self {
        Self::from_tiers(vec![
            tier(
                "bronze",
                "Bronze",
                0,
                Decimal::ONE,
                0,
                &["Member pricing on retail"],
            ),
            tier(
                "silver",
                "Silver",
                10_000,
                Decimal::new(15, 1),
                5,
                &["5% off services", "Priority booking"],
            ),
            tier(
                "gold",
                "Gold",
                25_000,
                Decimal::TWO,
                10,
                &["10% off services", "Complimentary hair spa every quarter"],
            ),
            tier(
                "platinum",
                "Platinum",
                50_000,
                Decimal::from(3),
                15,
                &["15% off services", "Dedicated stylist", "Free add-on every visit"],
            ),
        ])
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn into_tiers(self) -> Vec<Tier> {
        self.tiers
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.id == id)
    }

    pub fn floor(&self) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.is_floor())
    }

    /// The tier with the greatest `min_spend <= total_spent`. Negative net
    /// spend resolves to the floor tier.
    pub fn resolve(&self, total_spent: Money) -> LoyaltyResult<&Tier> {
        let floor = self.floor().ok_or(LoyaltyError::NoMatchingTier)?;
        Ok(self
            .tiers
            .iter()
            .rev()
            .find(|t| t.min_spend <= total_spent)
            .unwrap_or(floor))
    }

    /// Next tier above `current`, if any.
    pub fn next_tier(&self, current: &Tier) -> Option<&Tier> {
        self.tiers.iter().find(|t| t.min_spend > current.min_spend)
    }

    /// Insert `tier`, or replace the tier with the same id.
    pub fn upsert(&self, tier: Tier) -> LoyaltyResult<TierCatalog> {
        validate_tier(&tier)?;
        if self
            .tiers
            .iter()
            .any(|t| t.id != tier.id && t.min_spend == tier.min_spend)
        {
            return Err(LoyaltyError::ConflictingThreshold {
                min_spend: tier.min_spend,
            });
        }

        let mut tiers = self.tiers.clone();
        match tiers.iter_mut().find(|t| t.id == tier.id) {
            Some(existing) => *existing = tier,
            None => tiers.push(tier),
        }

        let next = Self::from_tiers(tiers);
        if next.floor().is_none() {
            return Err(LoyaltyError::MissingFloorTier);
        }
        Ok(next)
    }

    /// Remove a tier. Members on it re-resolve on their next recomputation.
    pub fn delete(&self, id: &str) -> LoyaltyResult<TierCatalog> {
        let target = self
            .get(id)
            .ok_or_else(|| LoyaltyError::not_found("tier", id))?;

        let floors = self.tiers.iter().filter(|t| t.is_floor()).count();
        if target.is_floor() && floors == 1 {
            return Err(LoyaltyError::CannotDeleteFloorTier);
        }
        if self.tiers.len() == 1 {
            return Err(LoyaltyError::CannotDeleteLastTier);
        }

        Ok(Self {
            tiers: self.tiers.iter().filter(|t| t.id != id).cloned().collect(),
        })
    }

    pub fn validate(&self) -> LoyaltyResult<()> {
        if self.tiers.is_empty() {
            return Err(LoyaltyError::Configuration("tier catalog is empty".into()));
        }
        let mut ids = HashSet::new();
        for (i, t) in self.tiers.iter().enumerate() {
            validate_tier(t).map_err(|e| LoyaltyError::Configuration(e.to_string()))?;
            if !ids.insert(t.id.as_str()) {
                return Err(LoyaltyError::Configuration(format!(
                    "duplicate tier id {:?}",
                    t.id
                )));
            }
            if i > 0 && self.tiers[i - 1].min_spend == t.min_spend {
                return Err(LoyaltyError::Configuration(format!(
                    "duplicate tier threshold {}",
                    t.min_spend
                )));
            }
        }
        if self.floor().is_none() {
            return Err(LoyaltyError::MissingFloorTier);
        }
        Ok(())
    }
}

/// Free-function form of [`TierCatalog::resolve`].
pub fn resolve_tier(total_spent: Money, catalog: &TierCatalog) -> LoyaltyResult<&Tier> {
    catalog.resolve(total_spent)
}

fn sort_tiers(tiers: &mut [Tier]) {
    tiers.sort_by(|a, b| a.min_spend.cmp(&b.min_spend).then_with(|| a.id.cmp(&b.id)));
}

fn validate_tier(tier: &Tier) -> LoyaltyResult<()> {
    if tier.id.trim().is_empty() {
        return Err(LoyaltyError::Validation("tier id must not be empty".into()));
    }
    if tier.name.trim().is_empty() {
        return Err(LoyaltyError::Validation("tier name must not be empty".into()));
    }
    if tier.min_spend.is_negative() {
        return Err(LoyaltyError::Validation(format!(
            "minimum spend must not be negative, got {}",
            tier.min_spend
        )));
    }
    if tier.points_per_currency_unit <= Decimal::ZERO {
        return Err(LoyaltyError::Validation(format!(
            "points per currency unit must be positive, got {}",
            tier.points_per_currency_unit
        )));
    }
    if tier.discount_percent > 100 {
        return Err(LoyaltyError::Validation(format!(
            "discount must be between 0 and 100, got {}",
            tier.discount_percent
        )));
    }
    Ok(())
}

fn tier(
    id: &str,
    name: &str,
    min_major: i64,
    mult: Decimal,
    discount: u8,
    benefits: &[&str],
) -> Tier {
    Tier {
        id: id.to_string(),
        name: name.to_string(),
        min_spend: Money::from_major(min_major),
        points_per_currency_unit: mult,
        discount_percent: discount,
        benefits: benefits.iter().map(|b| b.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn three_tier() -> TierCatalog {
        TierCatalog::new(vec![
            tier("base", "Base", 0, d("1.0"), 0, &[]),
            tier("mid", "Mid", 10_000, d("1.5"), 5, &[]),
            tier("top", "Top", 25_000, d("2.0"), 10, &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_inclusive_boundary() {
        let catalog = three_tier();
        assert_eq!(catalog.resolve(Money::from_major(10_000)).unwrap().id, "mid");
        assert_eq!(catalog.resolve(Money::from_cents(999_999)).unwrap().id, "base");
        assert_eq!(catalog.resolve(Money::from_major(25_000)).unwrap().id, "top");
        assert_eq!(catalog.resolve(Money::from_major(1_000_000)).unwrap().id, "top");
    }

    #[test]
    fn test_negative_spend_resolves_to_floor() {
        let catalog = three_tier();
        let t = resolve_tier(Money::from_major(-500), &catalog).unwrap();
        assert_eq!(t.id, "base");
    }

    #[test]
    fn test_resolve_fails_without_floor() {
        assert!(matches!(
            TierCatalog::default().resolve(Money::ZERO),
            Err(LoyaltyError::NoMatchingTier)
        ));
        let no_floor = TierCatalog::from_tiers(vec![tier("mid", "Mid", 100, d("1.0"), 0, &[])]);
        assert!(matches!(
            no_floor.resolve(Money::from_major(500)),
            Err(LoyaltyError::NoMatchingTier)
        ));
    }

    #[test]
    fn test_standard_catalog_is_valid() {
        let catalog = TierCatalog::standard();
        catalog.validate().unwrap();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.floor().unwrap().id, "bronze");
    }

    #[test]
    fn test_upsert_rejects_duplicate_threshold() {
        let catalog = three_tier();
        let err = catalog
            .upsert(tier("clash", "Clash", 10_000, d("1.2"), 0, &[]))
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::ConflictingThreshold { .. }));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_upsert_inserts_sorted_and_replaces_by_id() {
        let catalog = three_tier();
        let added = catalog
            .upsert(tier("elite", "Elite", 5_000, d("1.2"), 2, &[]))
            .unwrap();
        let ids: Vec<_> = added.tiers().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["base", "elite", "mid", "top"]);

        // Same id, same threshold: edit in place, not a conflict.
        let edited = added
            .upsert(tier("mid", "Middle", 10_000, d("1.75"), 7, &["Free blow-dry"]))
            .unwrap();
        let mid = edited.get("mid").unwrap();
        assert_eq!(mid.name, "Middle");
        assert_eq!(mid.points_per_currency_unit, d("1.75"));
        assert_eq!(edited.len(), 4);
    }

    #[test]
    fn test_upsert_validation() {
        let catalog = three_tier();
        let bad = [
            tier("x", "X", -1, d("1.0"), 0, &[]),
            tier("x", "X", 1, d("0.0"), 0, &[]),
            tier("x", "X", 1, d("-1.5"), 0, &[]),
            tier("x", "X", 1, d("1.0"), 101, &[]),
            tier("x", "  ", 1, d("1.0"), 0, &[]),
        ];
        for t in bad {
            let err = catalog.upsert(t).unwrap_err();
            assert!(matches!(err, LoyaltyError::Validation(_)), "{err}");
        }
    }

    #[test]
    fn test_upsert_cannot_remove_floor() {
        let catalog = three_tier();
        let err = catalog
            .upsert(tier("base", "Base", 500, d("1.0"), 0, &[]))
            .unwrap_err();
        assert!(matches!(err, LoyaltyError::MissingFloorTier));
    }

    #[test]
    fn test_delete_floor_tier_rejected() {
        let catalog = TierCatalog::new(vec![tier("base", "Base", 0, d("1.0"), 0, &[])]).unwrap();
        assert!(matches!(
            catalog.delete("base"),
            Err(LoyaltyError::CannotDeleteFloorTier)
        ));
    }

    #[test]
    fn test_delete_last_tier_rejected() {
        let catalog = TierCatalog::from_tiers(vec![tier("only", "Only", 100, d("1.0"), 0, &[])]);
        assert!(matches!(
            catalog.delete("only"),
            Err(LoyaltyError::CannotDeleteLastTier)
        ));
    }

    #[test]
    fn test_delete_falls_through_to_lower_tier() {
        let catalog = three_tier();
        let spend = Money::from_major(12_000);
        assert_eq!(catalog.resolve(spend).unwrap().id, "mid");

        let trimmed = catalog.delete("mid").unwrap();
        assert_eq!(trimmed.resolve(spend).unwrap().id, "base");
        assert!(catalog.get("mid").is_some());
        assert!(matches!(
            trimmed.delete("mid"),
            Err(LoyaltyError::NotFound { .. })
        ));
    }

    #[test]
    fn test_next_tier() {
        let catalog = three_tier();
        let base = catalog.get("base").unwrap();
        assert_eq!(catalog.next_tier(base).unwrap().id, "mid");
        let top = catalog.get("top").unwrap();
        assert!(catalog.next_tier(top).is_none());
    }

    #[test]
    fn test_validate_reports_duplicates() {
        let dup = TierCatalog::from_tiers(vec![
            tier("a", "A", 0, d("1.0"), 0, &[]),
            tier("b", "B", 0, d("1.0"), 0, &[]),
        ]);
        assert!(matches!(dup.validate(), Err(LoyaltyError::Configuration(_))));
    }

    proptest! {
        #[test]
        fn prop_resolve_is_total_with_floor(
            thresholds in proptest::collection::btree_set(1i64..100_000, 0..6),
            spend in -10_000_000i64..10_000_000,
        ) {
            let mut tiers = vec![tier("floor", "Floor", 0, d("1.0"), 0, &[])];
            for (i, th) in thresholds.iter().enumerate() {
                let mult = Decimal::from(i + 1);
                tiers.push(tier(&format!("t{i}"), "T", *th, mult, 0, &[]));
            }
            let catalog = TierCatalog::new(tiers).unwrap();
            let spent = Money::from_cents(spend);
            let resolved = catalog.resolve(spent).unwrap();

            let expected = catalog
                .tiers()
                .iter()
                .filter(|t| t.min_spend <= spent)
                .max_by_key(|t| t.min_spend)
                .map(|t| t.id.clone())
                .unwrap_or_else(|| "floor".to_string());
            prop_assert_eq!(&resolved.id, &expected);
        }
    }
}

//! Rewards computation engine: derives a member's tier, points, badges and
//! streak from their purchase history, the referral ledger, one-time grants
//! and the tier/badge catalogs.
//!
//! Recomputed on demand and never incrementally maintained, so the same
//! inputs always produce the same snapshot.

use crate::badges::{BadgeCatalog, BadgeMetrics};
use crate::referral::{ReferralBonuses, ReferralLedger};
use crate::tiers::TierCatalog;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use salon_core::config::{LoyaltyConfig, StreakBonus, StreakMode};
use salon_core::loyalty::{Customer, LoyaltyState, PointGrant, PurchaseEvent};
use salon_core::{LoyaltyResult, Money};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Everything one recomputation reads. All borrowed; nothing is mutated.
#[derive(Debug, Clone, Copy)]
pub struct ComputationInput<'a> {
    pub customer: &'a Customer,
    /// Events for other customers are ignored.
    pub events: &'a [PurchaseEvent],
    pub ledger: &'a ReferralLedger,
    pub grants: &'a [PointGrant],
    pub tiers: &'a TierCatalog,
    pub badges: &'a BadgeCatalog,
    pub now: DateTime<Utc>,
}

/// Loyalty computation engine, stateless apart from its configuration.
pub struct RewardsEngine {
    config: LoyaltyConfig,
}

impl RewardsEngine {
    pub fn new(config: &LoyaltyConfig) -> Self {
        info!(
            streak_mode = ?config.streak_mode,
            streak_window_days = config.streak_window_days,
            referrer_bonus = config.referrer_bonus,
            referee_bonus = config.referee_bonus,
            "Rewards engine initialized"
        );
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    pub fn referral_bonuses(&self) -> ReferralBonuses {
        ReferralBonuses {
            referrer: self.config.referrer_bonus,
            referee: self.config.referee_bonus,
        }
    }

    /// Derive the member's loyalty snapshot.
    ///
    /// Fails only when the tier catalog has no floor tier; every other edge
    /// case (no purchases, negative net spend, no referrals) yields a
    /// well-defined default.
    pub fn compute_loyalty_state(
        &self,
        input: &ComputationInput<'_>,
    ) -> LoyaltyResult<LoyaltyState> {
        let customer = input.customer;
        let events: Vec<&PurchaseEvent> = input
            .events
            .iter()
            .filter(|e| e.customer_id == customer.id)
            .collect();

        let total_spent: Money = events.iter().map(|e| e.amount).sum();
        let tier = input.tiers.resolve(total_spent)?;
        let base_points = base_points(total_spent, tier.points_per_currency_unit);

        let referral_bonus_points = input.ledger.bonus_points_for(customer.id);
        let referral_count = input.ledger.count_for(customer.id);

        // Visits dated after `now` are not counted until they happen.
        let visits: Vec<DateTime<Utc>> = events
            .iter()
            .filter(|e| e.is_sale() && e.timestamp <= input.now)
            .map(|e| e.timestamp)
            .collect();
        let visit_count = visits.len() as u32;
        let (visit_streak_days, last_visit) = compute_streak(
            visits.into_iter(),
            input.now,
            self.config.streak_mode,
            self.config.streak_window_days,
        );
        let streak_bonus_points = streak_bonus(visit_streak_days, &self.config.streak_bonuses);

        let granted_points: u64 = input
            .grants
            .iter()
            .filter(|g| g.customer_id == customer.id)
            .map(|g| g.points)
            .sum();

        let points = base_points
            .saturating_add(referral_bonus_points)
            .saturating_add(streak_bonus_points)
            .saturating_add(granted_points);

        let metrics = BadgeMetrics {
            visit_count,
            total_spent,
            referral_count,
            visit_streak_days,
        };
        let badges = input.badges.evaluate(&metrics, &customer.held_badges());

        let next = input.tiers.next_tier(tier);

        debug!(
            customer_id = %customer.id,
            tier = %tier.id,
            total_spent = %total_spent,
            points = points,
            streak = visit_streak_days,
            badges = badges.len(),
            "Loyalty state computed"
        );

        Ok(LoyaltyState {
            customer_id: customer.id,
            total_spent,
            tier_id: tier.id.clone(),
            points,
            base_points,
            referral_bonus_points,
            streak_bonus_points,
            granted_points,
            badges,
            visit_count,
            visit_streak_days,
            referral_count,
            last_visit,
            next_tier_id: next.map(|t| t.id.clone()),
            spend_to_next_tier: next.map(|t| t.min_spend - total_spent),
            birthday_reward_available: !customer.birthday_reward_claimed
                && customer.is_birthday_month(input.now.date_naive()),
            computed_at: input.now,
        })
    }
}

/// `floor(total_spent * multiplier)` in whole points, 0 for non-positive
/// spend. Computed in exact decimal arithmetic; saturates on overflow.
pub fn base_points(total_spent: Money, multiplier: Decimal) -> u64 {
    if total_spent.cents() <= 0 || multiplier <= Decimal::ZERO {
        return 0;
    }
    Decimal::from(total_spent.cents())
        .checked_mul(multiplier)
        .and_then(|product| product.checked_div(Decimal::ONE_HUNDRED))
        .and_then(|points| points.floor().to_u64())
        .unwrap_or(u64::MAX)
}

/// Sum of every configured bonus the streak has reached. Each bonus counts
/// once.
pub fn streak_bonus(streak_days: u32, bonuses: &[StreakBonus]) -> u64 {
    bonuses
        .iter()
        .filter(|b| streak_days >= b.min_days)
        .map(|b| b.points)
        .sum()
}

/// Returns `(streak_days, last_visit)`. A streak is live only while the last
/// visit is within `window_days` of `now`.
pub fn compute_streak(
    sale_times: impl Iterator<Item = DateTime<Utc>>,
    now: DateTime<Utc>,
    mode: StreakMode,
    window_days: i64,
) -> (u32, Option<DateTime<Utc>>) {
    let times: Vec<DateTime<Utc>> = sale_times.collect();
    let Some(last) = times.iter().copied().max() else {
        return (0, None);
    };
    if now - last > Duration::days(window_days) {
        return (0, Some(last));
    }

    let streak = match mode {
        StreakMode::RecentVisit => 1,
        StreakMode::ConsecutiveDays => {
            let days: BTreeSet<NaiveDate> = times.iter().map(|t| t.date_naive()).collect();
            let mut day = last.date_naive();
            let mut run = 0u32;
            while days.contains(&day) {
                run += 1;
                match day.pred_opt() {
                    Some(prev) => day = prev,
                    None => break,
                }
            }
            run
        }
    };
    (streak, Some(last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use salon_core::loyalty::{GrantSource, Tier};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 18, 0, 0).unwrap()
    }

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn tier(id: &str, min_major: i64, mult: &str) -> Tier {
        Tier {
            id: id.into(),
            name: id.to_uppercase(),
            min_spend: Money::from_major(min_major),
            points_per_currency_unit: d(mult),
            discount_percent: 0,
            benefits: vec![],
        }
    }

    fn catalog() -> TierCatalog {
        TierCatalog::new(vec![
            tier("bronze", 0, "1"),
            tier("silver", 10_000, "1.5"),
            tier("gold", 25_000, "2"),
        ])
        .unwrap()
    }

    fn customer() -> Customer {
        Customer {
            id: Uuid::new_v4(),
            name: "Anita Rao".into(),
            email: "anita@example.com".into(),
            phone: "555-0101".into(),
            join_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 6, 2),
            referral_code: "ANIT2345".into(),
            referred_by_code: None,
            birthday_reward_claimed: false,
            loyalty: None,
        }
    }

    fn sale(c: &Customer, major: i64, days_ago: i64) -> PurchaseEvent {
        PurchaseEvent::sale(c.id, Money::from_major(major), now() - Duration::days(days_ago))
    }

    struct Fixture {
        engine: RewardsEngine,
        ledger: ReferralLedger,
        tiers: TierCatalog,
        badges: BadgeCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: RewardsEngine::new(&LoyaltyConfig::default()),
                ledger: ReferralLedger::default(),
                tiers: catalog(),
                badges: BadgeCatalog::standard(),
            }
        }

        fn compute(
            &self,
            c: &Customer,
            events: &[PurchaseEvent],
            grants: &[PointGrant],
        ) -> LoyaltyState {
            self.engine
                .compute_loyalty_state(&ComputationInput {
                    customer: c,
                    events,
                    ledger: &self.ledger,
                    grants,
                    tiers: &self.tiers,
                    badges: &self.badges,
                    now: now(),
                })
                .unwrap()
        }
    }

    #[test]
    fn test_no_transactions_defaults() {
        let f = Fixture::new();
        let c = customer();
        let state = f.compute(&c, &[], &[]);
        assert_eq!(state.tier_id, "bronze");
        assert_eq!(state.points, 0);
        assert!(state.badges.is_empty());
        assert_eq!(state.visit_count, 0);
        assert_eq!(state.visit_streak_days, 0);
        assert_eq!(state.last_visit, None);
        assert_eq!(state.next_tier_id.as_deref(), Some("silver"));
        assert_eq!(state.spend_to_next_tier, Some(Money::from_major(10_000)));
        assert!(state.birthday_reward_available);
    }

    #[test]
    fn test_base_points_floor_never_rounds_up() {
        assert_eq!(base_points(Money::from_major(999), d("1.5")), 1498);
        assert_eq!(base_points(Money::from_cents(1), d("1")), 0);
        assert_eq!(base_points(Money::from_cents(30), d("10")), 3);
        assert_eq!(base_points(Money::from_major(-100), d("2")), 0);
        assert_eq!(base_points(Money::from_major(100), d("0.1")), 10);
    }

    #[test]
    fn test_multiplier_just_below_whole_number_floors_down() {
        assert_eq!(base_points(Money::from_major(1), d("1.9999999")), 1);
        assert_eq!(base_points(Money::from_major(3), d("0.9999999")), 2);
        assert_eq!(base_points(Money::from_major(1_000), d("2.9999999")), 2999);
        assert_eq!(base_points(Money::from_major(1), d("2")), 2);
    }

    #[test]
    fn test_multiplier_overflow_saturates() {
        let huge = Decimal::MAX / Decimal::TEN;
        assert_eq!(base_points(Money::from_cents(i64::MAX), huge), u64::MAX);
    }

    #[test]
    fn test_future_sales_not_counted_as_visits() {
        let f = Fixture::new();
        let c = customer();
        let events = vec![sale(&c, 100, 2), sale(&c, 100, -3)];
        let state = f.compute(&c, &events, &[]);
        assert_eq!(state.visit_count, 1);
        assert_eq!(state.last_visit, Some(now() - Duration::days(2)));
        assert!(state.badges.contains("first_visit"));
        assert!(!state.badges.contains("regular"));
    }

    #[test]
    fn test_tier_boundary_and_multiplier() {
        let f = Fixture::new();
        let c = customer();
        let events = vec![sale(&c, 6_000, 40), sale(&c, 4_000, 20)];
        let state = f.compute(&c, &events, &[]);
        assert_eq!(state.total_spent, Money::from_major(10_000));
        assert_eq!(state.tier_id, "silver");
        assert_eq!(state.base_points, 15_000);
        assert_eq!(state.visit_count, 2);
    }

    #[test]
    fn test_negative_net_spend_resolves_to_floor() {
        let f = Fixture::new();
        let c = customer();
        let events = vec![
            sale(&c, 100, 10),
            PurchaseEvent::refund(c.id, Money::from_major(300), now() - Duration::days(9)),
        ];
        let state = f.compute(&c, &events, &[]);
        assert_eq!(state.total_spent, Money::from_major(-200));
        assert_eq!(state.tier_id, "bronze");
        assert_eq!(state.base_points, 0);
        assert_eq!(state.visit_count, 1);
    }

    #[test]
    fn test_streak_bonus_stacks_once() {
        let bonuses = LoyaltyConfig::default().streak_bonuses;
        assert_eq!(streak_bonus(30, &bonuses), 6000);
        assert_eq!(streak_bonus(29, &bonuses), 1000);
        assert_eq!(streak_bonus(7, &bonuses), 1000);
        assert_eq!(streak_bonus(6, &bonuses), 0);
    }

    #[test]
    fn test_consecutive_day_streak_feeds_points() {
        let f = Fixture::new();
        let c = customer();
        let events: Vec<_> = (0..30).map(|d| sale(&c, 10, d)).collect();
        let state = f.compute(&c, &events, &[]);
        assert_eq!(state.visit_streak_days, 30);
        assert_eq!(state.streak_bonus_points, 6000);
        assert_eq!(state.base_points, 300);
        assert_eq!(state.points, 6300);
        assert!(state.badges.contains("streak_master"));
    }

    #[test]
    fn test_streak_breaks_on_gap_and_expires() {
        let c = customer();
        let times = [0, 1, 3, 4, 5].map(|d| now() - Duration::days(d));
        let (streak, _) = compute_streak(times.into_iter(), now(), StreakMode::ConsecutiveDays, 2);
        assert_eq!(streak, 2);

        let stale = [3, 4, 5].map(|d| now() - Duration::days(d));
        let (streak, last) =
            compute_streak(stale.into_iter(), now(), StreakMode::ConsecutiveDays, 2);
        assert_eq!(streak, 0);
        assert_eq!(last, Some(now() - Duration::days(3)));

        let f = Fixture::new();
        let state = f.compute(&c, &[sale(&c, 10, 1)], &[]);
        assert_eq!(state.visit_streak_days, 1);
    }

    #[test]
    fn test_recent_visit_mode_is_binary() {
        let times = (0..10).map(|d| now() - Duration::days(d));
        let (streak, _) = compute_streak(times, now(), StreakMode::RecentVisit, 2);
        assert_eq!(streak, 1);

        let times = [now() - Duration::days(3)];
        let (streak, _) = compute_streak(times.into_iter(), now(), StreakMode::RecentVisit, 2);
        assert_eq!(streak, 0);
    }

    #[test]
    fn test_future_sales_ignored_for_streak() {
        let later = [now() + Duration::days(1)];
        let (streak, last) = compute_streak(
            later.into_iter().filter(|t| *t <= now()),
            now(),
            StreakMode::ConsecutiveDays,
            2,
        );
        assert_eq!((streak, last), (0, None));
    }

    #[test]
    fn test_referral_and_grants_are_additive() {
        let mut f = Fixture::new();
        let referrer = customer();
        let mut referee = customer();
        referee.referral_code = "NEWC2345".into();
        f.ledger = f
            .ledger
            .register(referrer.id, &referrer.referral_code)
            .unwrap()
            .register(referee.id, &referee.referral_code)
            .unwrap();
        let (ledger, _) = f
            .ledger
            .apply_referral(referee.id, "anit2345", f.engine.referral_bonuses())
            .unwrap();
        f.ledger = ledger;

        let grants = vec![PointGrant {
            id: Uuid::new_v4(),
            customer_id: referee.id,
            points: 1000,
            source: GrantSource::Birthday,
            granted_at: now(),
        }];

        let events = vec![sale(&referee, 200, 10)];
        let state = f.compute(&referee, &events, &grants);
        assert_eq!(state.referral_bonus_points, 250);
        assert_eq!(state.granted_points, 1000);
        assert_eq!(state.points, 200 + 250 + 1000);

        let state = f.compute(&referrer, &[], &grants);
        assert_eq!(state.referral_count, 1);
        assert_eq!(state.referral_bonus_points, 500);
        assert_eq!(state.granted_points, 0);
        assert_eq!(state.points, 500);
    }

    #[test]
    fn test_previously_held_badges_survive_refund() {
        let f = Fixture::new();
        let mut c = customer();
        let mut events = vec![sale(&c, 55_000, 60)];
        let first = f.compute(&c, &events, &[]);
        assert!(first.badges.contains("big_spender"));
        assert_eq!(first.tier_id, "gold");

        c.loyalty = Some(first);
        events.push(PurchaseEvent::refund(
            c.id,
            Money::from_major(20_000),
            now() - Duration::days(50),
        ));
        let second = f.compute(&c, &events, &[]);
        assert_eq!(second.total_spent, Money::from_major(35_000));
        assert!(second.badges.contains("big_spender"));
        assert!(second.badges.contains("first_visit"));
    }

    #[test]
    fn test_foreign_events_ignored() {
        let f = Fixture::new();
        let c = customer();
        let other = customer();
        let events = vec![sale(&c, 100, 1), sale(&other, 90_000, 1)];
        let state = f.compute(&c, &events, &[]);
        assert_eq!(state.total_spent, Money::from_major(100));
    }

    #[test]
    fn test_claimed_birthday_not_available() {
        let f = Fixture::new();
        let mut c = customer();
        c.birthday_reward_claimed = true;
        assert!(!f.compute(&c, &[], &[]).birthday_reward_available);
        c.birthday_reward_claimed = false;
        c.date_of_birth = None;
        assert!(!f.compute(&c, &[], &[]).birthday_reward_available);
    }

    #[test]
    fn test_missing_floor_is_the_only_failure() {
        let f = Fixture::new();
        let c = customer();
        let broken = TierCatalog::from_tiers(vec![tier("silver", 10_000, "1.5")]);
        let result = f.engine.compute_loyalty_state(&ComputationInput {
            customer: &c,
            events: &[],
            ledger: &f.ledger,
            grants: &[],
            tiers: &broken,
            badges: &f.badges,
            now: now(),
        });
        assert!(result.is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_recomputation_is_deterministic(
                amounts in proptest::collection::vec(
                    (-5_000i64..20_000, 0i64..60, any::<bool>()),
                    0..40,
                )
            ) {
                let f = Fixture::new();
                let c = customer();
                let events: Vec<_> = amounts
                    .iter()
                    .map(|(amt, days, refund)| {
                        let at = now() - Duration::days(*days);
                        if *refund {
                            PurchaseEvent::refund(c.id, Money::from_major(*amt), at)
                        } else {
                            PurchaseEvent::sale(c.id, Money::from_major(*amt), at)
                        }
                    })
                    .collect();
                let a = f.compute(&c, &events, &[]);
                let b = f.compute(&c, &events, &[]);
                prop_assert_eq!(
                    serde_json::to_string(&a).unwrap(),
                    serde_json::to_string(&b).unwrap()
                );
            }

            #[test]
            fn prop_base_points_never_exceed_exact_product(
                cents in 0i64..100_000_000,
                mult_tenths in 1u32..50,
            ) {
                let mult = Decimal::new(mult_tenths as i64, 1);
                let points = base_points(Money::from_cents(cents), mult);
                // Exact rational: cents * tenths / 1000.
                let exact_floor = (cents as u128 * mult_tenths as u128 / 1000) as u64;
                prop_assert_eq!(points, exact_floor);
            }
        }
    }
}

//! Member directory: enrollment, purchase intake, recomputation, queries and
//! fleet-wide statistics for one workspace.
//!
//! Every write goes through a `Collection`, so concurrent requests never
//! interleave a read-modify-write of the same collection. When two
//! collections are written together the lock order is members, then grants.

use crate::badges::{newly_earned, BadgeCatalog};
use crate::engine::{ComputationInput, RewardsEngine};
use crate::plans::PlanManager;
use crate::referral::{generate_code, normalize_code, ReferralLedger, ReferralOutcome};
use crate::repository::{keys, Collection};
use crate::tiers::TierCatalog;
use chrono::{DateTime, NaiveDate, Utc};
use salon_core::event_bus::{make_event, LoyaltyEventDetail};
use salon_core::loyalty::{
    Customer, GrantSource, LoyaltyState, PointGrant, PurchaseEvent, PurchaseKind, ReferralAccount,
    Tier,
};
use salon_core::{EventSink, LoyaltyConfig, LoyaltyError, LoyaltyResult, Money, RecordStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Code of the member who referred this one, as typed at the front desk.
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    /// Case-insensitive substring over name, email and phone.
    pub query: Option<String>,
    pub tier_id: Option<String>,
}

/// Read-only aggregate handed to report and export collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetStats {
    pub total_members: u64,
    /// Every catalog tier is present, zero counts included.
    pub per_tier_counts: BTreeMap<String, u64>,
    pub total_points_issued: u64,
    pub average_spend: Money,
}

pub struct MemberDirectory {
    workspace: String,
    engine: RewardsEngine,
    badges: BadgeCatalog,
    tiers: Collection<Tier>,
    members: Collection<Customer>,
    purchases: Collection<PurchaseEvent>,
    referrals: Collection<ReferralAccount>,
    grants: Collection<PointGrant>,
    plans: PlanManager,
    events: Arc<dyn EventSink>,
}

impl MemberDirectory {
    /// Open the directory for `workspace`, installing the standard tier
    /// catalog if the workspace has none yet.
    pub fn new(
        store: Arc<dyn RecordStore>,
        workspace: &str,
        config: &LoyaltyConfig,
        events: Arc<dyn EventSink>,
    ) -> LoyaltyResult<Self> {
        let directory = Self {
            workspace: workspace.to_string(),
            engine: RewardsEngine::new(config),
            badges: BadgeCatalog::standard(),
            tiers: Collection::new(store.clone(), workspace, keys::TIERS),
            members: Collection::new(store.clone(), workspace, keys::MEMBERS),
            purchases: Collection::new(store.clone(), workspace, keys::PURCHASES),
            referrals: Collection::new(store.clone(), workspace, keys::REFERRALS),
            grants: Collection::new(store.clone(), workspace, keys::GRANTS),
            plans: PlanManager::new(store, workspace),
            events,
        };

        let seeded = directory.tiers.update(|tiers| {
            if !tiers.is_empty() {
                return Ok(false);
            }
            *tiers = TierCatalog::standard().into_tiers();
            Ok(true)
        })?;
        info!(workspace = %workspace, seeded_tiers = seeded, "Member directory initialized");
        Ok(directory)
    }

    pub fn with_badges(mut self, badges: BadgeCatalog) -> Self {
        self.badges = badges;
        self
    }

    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    pub fn plans(&self) -> &PlanManager {
        &self.plans
    }

    pub fn badge_catalog(&self) -> &BadgeCatalog {
        &self.badges
    }

    // ─── Tier administration ───────────────────────────────────────────────

    pub fn tier_catalog(&self) -> LoyaltyResult<TierCatalog> {
        Ok(TierCatalog::from_tiers(self.tiers.load()?))
    }

    /// Create or edit a tier. Rejected edits leave the stored catalog as it was.
    pub fn upsert_tier(&self, tier: Tier) -> LoyaltyResult<TierCatalog> {
        let tier_id = tier.id.clone();
        let next = self.tiers.update(|records| {
            let next = TierCatalog::from_tiers(records.clone()).upsert(tier)?;
            *records = next.tiers().to_vec();
            Ok(next)
        })?;
        info!(workspace = %self.workspace, tier = %tier_id, tiers = next.len(), "Tier saved");
        Ok(next)
    }

    /// Members on the deleted tier fall through to the next-lower tier on
    /// their next recomputation.
    pub fn delete_tier(&self, id: &str) -> LoyaltyResult<TierCatalog> {
        let next = self.tiers.update(|records| {
            let next = TierCatalog::from_tiers(records.clone()).delete(id)?;
            *records = next.tiers().to_vec();
            Ok(next)
        })?;
        info!(workspace = %self.workspace, tier = %id, tiers = next.len(), "Tier deleted");
        Ok(next)
    }

    // ─── Members ───────────────────────────────────────────────────────────

    pub fn get_member(&self, id: Uuid) -> LoyaltyResult<Customer> {
        self.members
            .load()?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| LoyaltyError::not_found("member", id))
    }

    pub fn referral_ledger(&self) -> LoyaltyResult<ReferralLedger> {
        Ok(ReferralLedger::from_accounts(self.referrals.load()?))
    }

    /// Enroll a member. The referral code is generated here and never
    /// changes; an entered referrer code is applied exactly once.
    ///
    /// The referral ledger is written first. If saving the member then fails,
    /// the ledger entry and any referral bonus it granted are withdrawn.
    pub fn enroll(
        &self,
        req: NewMember,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<(Customer, ReferralOutcome)> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(LoyaltyError::Validation("member name must not be empty".into()));
        }
        let id = Uuid::new_v4();
        let code_len = self.engine.config().referral_code_length;
        let bonuses = self.engine.referral_bonuses();
        let entered_code = entered_referral_code(req.referral_code.as_deref());

        let (code, outcome) = self.referrals.update(|accounts| {
            let ledger = ReferralLedger::from_accounts(std::mem::take(accounts));
            let code = generate_code(&name, &ledger, code_len, &mut rand::thread_rng())?;
            let ledger = ledger.register(id, &code)?;
            let (ledger, outcome) = match entered_code {
                Some(entered) => ledger.apply_referral(id, entered, bonuses)?,
                None => (ledger, ReferralOutcome::NoReferrer),
            };
            *accounts = ledger.into_accounts();
            Ok((code, outcome))
        })?;

        let customer = Customer {
            id,
            name,
            email: req.email.trim().to_string(),
            phone: req.phone.trim().to_string(),
            join_date: now.date_naive(),
            date_of_birth: req.date_of_birth,
            referral_code: code,
            referred_by_code: match &outcome {
                ReferralOutcome::Applied { .. } => entered_code.map(normalize_code),
                _ => None,
            },
            birthday_reward_claimed: false,
            loyalty: None,
        };
        let saved = self.members.update(|members| {
            members.push(customer.clone());
            Ok(())
        });
        if let Err(err) = saved {
            self.withdraw_referral(id, &outcome);
            return Err(err);
        }

        match &outcome {
            ReferralOutcome::Applied {
                referrer_id,
                referrer_bonus,
                referee_bonus,
            } => {
                metrics::counter!("loyalty.referrals_applied").increment(1);
                info!(
                    referee = %id,
                    referrer = %referrer_id,
                    referrer_bonus = *referrer_bonus,
                    referee_bonus = *referee_bonus,
                    "Referral applied"
                );
                self.emit(
                    id,
                    LoyaltyEventDetail::ReferralApplied {
                        referrer_id: *referrer_id,
                        referrer_bonus: *referrer_bonus,
                        referee_bonus: *referee_bonus,
                    },
                    now,
                );
            }
            _ if entered_code.is_some() => {
                metrics::counter!("loyalty.referral_misses").increment(1);
                debug!(member = %id, outcome = ?outcome, "Referral code not applied");
            }
            _ => {}
        }

        info!(
            workspace = %self.workspace,
            member = %id,
            code = %customer.referral_code,
            "Member enrolled"
        );
        Ok((customer, outcome))
    }

    /// Undo the ledger side of an enrollment whose member record was never
    /// saved.
    fn withdraw_referral(&self, customer_id: Uuid, outcome: &ReferralOutcome) {
        let reverted = self.referrals.update(|accounts| {
            let ledger = ReferralLedger::from_accounts(std::mem::take(accounts));
            *accounts = ledger.withdraw(customer_id, outcome).into_accounts();
            Ok(())
        });
        match reverted {
            Ok(()) => warn!(
                member = %customer_id,
                "Enrollment failed, referral ledger entry withdrawn"
            ),
            Err(e) => error!(
                member = %customer_id,
                error = %e,
                "Enrollment failed and the referral ledger entry could not be withdrawn"
            ),
        }
    }

    /// Edit contact details. Identity, referral code and loyalty state are
    /// not editable.
    pub fn update_member(&self, id: Uuid, req: MemberUpdate) -> LoyaltyResult<Customer> {
        self.members.update(|members| {
            let c = members
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| LoyaltyError::not_found("member", id))?;
            if let Some(name) = req.name {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(LoyaltyError::Validation("member name must not be empty".into()));
                }
                c.name = name;
            }
            if let Some(email) = req.email {
                c.email = email.trim().to_string();
            }
            if let Some(phone) = req.phone {
                c.phone = phone.trim().to_string();
            }
            if let Some(dob) = req.date_of_birth {
                c.date_of_birth = Some(dob);
            }
            Ok(c.clone())
        })
    }

    /// Append a purchase event from POS/invoicing. The log is append-only.
    pub fn record_purchase(&self, event: PurchaseEvent) -> LoyaltyResult<()> {
        match event.kind {
            PurchaseKind::Sale if event.amount.cents() <= 0 => {
                return Err(LoyaltyError::Validation("sale amount must be positive".into()));
            }
            PurchaseKind::Refund if event.amount.cents() >= 0 => {
                return Err(LoyaltyError::Validation("refund amount must be negative".into()));
            }
            _ => {}
        }
        self.get_member(event.customer_id)?;

        let (customer_id, amount, kind) = (event.customer_id, event.amount, event.kind);
        self.purchases.update(|events| {
            if events.iter().any(|e| e.id == event.id) {
                return Err(LoyaltyError::Validation(format!(
                    "purchase event {} already recorded",
                    event.id
                )));
            }
            events.push(event);
            Ok(())
        })?;
        debug!(member = %customer_id, amount = %amount, kind = ?kind, "Purchase recorded");
        Ok(())
    }

    // ─── Recomputation ─────────────────────────────────────────────────────

    /// Recompute and persist one member's loyalty snapshot.
    pub fn recompute(&self, customer_id: Uuid, now: DateTime<Utc>) -> LoyaltyResult<LoyaltyState> {
        let mut refreshed = self.refresh(now, |c| c.id == customer_id)?;
        refreshed
            .pop()
            .map(|(_, state)| state)
            .ok_or_else(|| LoyaltyError::not_found("member", customer_id))
    }

    /// Members matching `filter`, each with a snapshot recomputed against the
    /// current tier catalog. Sorted by name.
    pub fn list_members(
        &self,
        filter: &MemberFilter,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<(Customer, LoyaltyState)>> {
        let query = filter.query.as_deref().unwrap_or("");
        let mut members: Vec<_> = self
            .refresh(now, |c| c.matches_query(query))?
            .into_iter()
            .filter(|(_, s)| filter.tier_id.as_ref().map_or(true, |t| &s.tier_id == t))
            .collect();
        members.sort_by(|(a, _), (b, _)| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(members)
    }

    /// Fleet statistics over every member, recomputed against the current
    /// catalog on each call.
    pub fn fleet_stats(&self, now: DateTime<Utc>) -> LoyaltyResult<FleetStats> {
        let members = self.list_members(&MemberFilter::default(), now)?;
        Ok(fleet_stats(&members, &self.tier_catalog()?))
    }

    /// Recompute every selected member in one pass under the members lock,
    /// persisting the snapshots so held badges accumulate.
    fn refresh(
        &self,
        now: DateTime<Utc>,
        select: impl Fn(&Customer) -> bool,
    ) -> LoyaltyResult<Vec<(Customer, LoyaltyState)>> {
        let tiers = self.tier_catalog()?;
        let ledger = self.referral_ledger()?;
        let grants = self.grants.load()?;
        let mut by_customer: HashMap<Uuid, Vec<PurchaseEvent>> = HashMap::new();
        for e in self.purchases.load()? {
            by_customer.entry(e.customer_id).or_default().push(e);
        }

        let changes = self.members.update(|members| {
            let mut out = Vec::new();
            for c in members.iter_mut().filter(|c| select(c)) {
                let events = by_customer.get(&c.id).map(Vec::as_slice).unwrap_or(&[]);
                let state = self.engine.compute_loyalty_state(&ComputationInput {
                    customer: c,
                    events,
                    ledger: &ledger,
                    grants: &grants,
                    tiers: &tiers,
                    badges: &self.badges,
                    now,
                })?;
                let previous = c.loyalty.replace(state.clone());
                out.push((c.clone(), previous, state));
            }
            Ok(out)
        })?;

        metrics::counter!("loyalty.recomputations").increment(changes.len() as u64);
        Ok(changes
            .into_iter()
            .map(|(customer, previous, state)| {
                self.announce_changes(customer.id, previous.as_ref(), &state, now);
                (customer, state)
            })
            .collect())
    }

    fn announce_changes(
        &self,
        customer_id: Uuid,
        previous: Option<&LoyaltyState>,
        state: &LoyaltyState,
        now: DateTime<Utc>,
    ) {
        if let Some(prev) = previous {
            if prev.tier_id != state.tier_id {
                metrics::counter!("loyalty.tier_changes").increment(1);
                info!(
                    member = %customer_id,
                    from = %prev.tier_id,
                    to = %state.tier_id,
                    "Tier changed"
                );
                self.emit(
                    customer_id,
                    LoyaltyEventDetail::TierChanged {
                        from: Some(prev.tier_id.clone()),
                        to: state.tier_id.clone(),
                    },
                    now,
                );
            }
        }

        let held = previous.map(|p| p.badges.clone()).unwrap_or_default();
        for badge_id in newly_earned(&held, &state.badges) {
            metrics::counter!("loyalty.badges_earned").increment(1);
            info!(member = %customer_id, badge = %badge_id, "Badge earned");
            self.emit(customer_id, LoyaltyEventDetail::BadgeEarned { badge_id }, now);
        }
    }

    // ─── One-time grants ───────────────────────────────────────────────────

    /// Grant the birthday reward. Once claimed the flag stays set for good;
    /// there is no yearly reset.
    ///
    /// The grant is saved before the member's claimed flag. A claim whose
    /// flag write failed finds its earlier grant on retry and reuses it, so a
    /// member never holds more than one birthday grant.
    pub fn claim_birthday_reward(
        &self,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<(Customer, PointGrant)> {
        let points = self.engine.config().birthday_reward;
        let (customer, grant, resumed) = self.members.update(|members| {
            let c = members
                .iter_mut()
                .find(|c| c.id == customer_id)
                .ok_or_else(|| LoyaltyError::not_found("member", customer_id))?;
            if c.birthday_reward_claimed {
                return Err(LoyaltyError::AlreadyClaimed);
            }

            let (grant, resumed) = self.grants.update(|grants| {
                let earlier = grants
                    .iter()
                    .find(|g| g.customer_id == customer_id && g.source == GrantSource::Birthday);
                if let Some(earlier) = earlier {
                    return Ok((earlier.clone(), true));
                }
                let grant = PointGrant {
                    id: Uuid::new_v4(),
                    customer_id,
                    points,
                    source: GrantSource::Birthday,
                    granted_at: now,
                };
                grants.push(grant.clone());
                Ok((grant, false))
            })?;
            c.birthday_reward_claimed = true;
            Ok((c.clone(), grant, resumed))
        })?;

        if resumed {
            debug!(member = %customer_id, grant = %grant.id, "Reusing grant from an earlier claim");
        }
        let points = grant.points;
        metrics::counter!("loyalty.birthday_rewards").increment(1);
        metrics::counter!("loyalty.points_granted").increment(points);
        info!(member = %customer_id, points, "Birthday reward granted");
        self.emit(customer_id, LoyaltyEventDetail::BirthdayRewardGranted { points }, now);
        Ok((customer, grant))
    }

    /// Record a plan purchase as a one-time welcome-point grant. The plan
    /// price is a separate revenue stream and does not count toward spend.
    pub fn purchase_plan(
        &self,
        customer_id: Uuid,
        plan_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<PointGrant> {
        self.get_member(customer_id)?;
        let plan = self.plans.get_plan(plan_id)?;

        let grant = PointGrant {
            id: Uuid::new_v4(),
            customer_id,
            points: plan.welcome_points,
            source: GrantSource::PlanWelcome { plan_id },
            granted_at: now,
        };
        self.grants.update(|grants| {
            grants.push(grant.clone());
            Ok(())
        })?;

        metrics::counter!("loyalty.plan_purchases").increment(1);
        metrics::counter!("loyalty.points_granted").increment(plan.welcome_points);
        info!(
            member = %customer_id,
            plan = %plan.name,
            points = plan.welcome_points,
            "Plan purchased"
        );
        self.emit(
            customer_id,
            LoyaltyEventDetail::PlanPurchased {
                plan_id,
                welcome_points: plan.welcome_points,
            },
            now,
        );
        Ok(grant)
    }

    fn emit(&self, customer_id: Uuid, detail: LoyaltyEventDetail, now: DateTime<Utc>) {
        self.events
            .emit(make_event(self.workspace.clone(), customer_id, detail, now));
    }
}

/// The referrer code typed at enrollment, if any. Blank input counts as none.
fn entered_referral_code(raw: Option<&str>) -> Option<&str> {
    raw.filter(|code| !code.trim().is_empty())
}

/// Fold member snapshots into fleet-wide statistics.
pub fn fleet_stats(members: &[(Customer, LoyaltyState)], catalog: &TierCatalog) -> FleetStats {
    let mut per_tier_counts: BTreeMap<String, u64> =
        catalog.tiers().iter().map(|t| (t.id.clone(), 0)).collect();
    let mut total_points_issued = 0u64;
    let mut total_spent = Money::ZERO;

    for (_, state) in members {
        *per_tier_counts.entry(state.tier_id.clone()).or_insert(0) += 1;
        total_points_issued = total_points_issued.saturating_add(state.points);
        total_spent += state.total_spent;
    }

    let total_members = members.len() as u64;
    let average_spend = if total_members == 0 {
        Money::ZERO
    } else {
        Money::from_cents(total_spent.cents() / total_members as i64)
    };

    FleetStats {
        total_members,
        per_tier_counts,
        total_points_issued,
        average_spend,
    }
}

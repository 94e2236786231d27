//! Referral ledger: referral codes, referral counts and the flat bonuses
//! both sides of a referral receive.
//!
//! Applying a referral is a one-time ledger event. The accumulated bonus is
//! an additive input to the points total, never re-derived.

use rand::Rng;
use salon_core::loyalty::ReferralAccount;
use salon_core::{LoyaltyError, LoyaltyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

/// Code alphabet without look-alikes (0/O, 1/I/L).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_PREFIX_LEN: usize = 4;
const MAX_CODE_ATTEMPTS: usize = 64;

/// Flat bonus amounts. Not scaled by tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralBonuses {
    pub referrer: u64,
    pub referee: u64,
}

impl Default for ReferralBonuses {
    fn default() -> Self {
        Self {
            referrer: 500,
            referee: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReferralOutcome {
    Applied {
        referrer_id: Uuid,
        referrer_bonus: u64,
        referee_bonus: u64,
    },
    /// No account owns the code. Silently ignored so a typo never blocks
    /// enrollment; callers may choose to warn.
    NoReferrer,
    /// The referee was already referred once; nothing changes.
    AlreadyReferred { referrer_id: Uuid },
    /// The code belongs to the referee.
    SelfReferral,
}

impl ReferralOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReferralOutcome::Applied { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferralLedger {
    accounts: BTreeMap<Uuid, ReferralAccount>,
}

impl ReferralLedger {
    pub fn from_accounts(accounts: Vec<ReferralAccount>) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.customer_id, a)).collect(),
        }
    }

    pub fn into_accounts(self) -> Vec<ReferralAccount> {
        self.accounts.into_values().collect()
    }

    pub fn account(&self, customer_id: Uuid) -> Option<&ReferralAccount> {
        self.accounts.get(&customer_id)
    }

    /// Case-insensitive exact match on the trimmed code.
    pub fn find_by_code(&self, code: &str) -> Option<&ReferralAccount> {
        let code = normalize_code(code);
        if code.is_empty() {
            return None;
        }
        self.accounts.values().find(|a| normalize_code(&a.code) == code)
    }

    pub fn bonus_points_for(&self, customer_id: Uuid) -> u64 {
        self.account(customer_id).map(|a| a.bonus_points).unwrap_or(0)
    }

    pub fn count_for(&self, customer_id: Uuid) -> u32 {
        self.account(customer_id).map(|a| a.referral_count).unwrap_or(0)
    }

    /// Open an account for `customer_id` owning `code`.
    pub fn register(&self, customer_id: Uuid, code: &str) -> LoyaltyResult<ReferralLedger> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Err(LoyaltyError::Validation("referral code must not be empty".into()));
        }
        if self.accounts.contains_key(&customer_id) {
            return Err(LoyaltyError::Validation(format!(
                "customer {customer_id} already has a referral code"
            )));
        }
        if self.find_by_code(&normalized).is_some() {
            return Err(LoyaltyError::Validation(format!(
                "referral code {normalized} is already in use"
            )));
        }

        let mut next = self.clone();
        next.accounts.insert(
            customer_id,
            ReferralAccount {
                customer_id,
                code: normalized,
                referral_count: 0,
                bonus_points: 0,
                referred_by: None,
            },
        );
        Ok(next)
    }

    /// Apply `code` on behalf of `referee_id`. Only an `Applied` outcome
    /// changes the ledger.
    pub fn apply_referral(
        &self,
        referee_id: Uuid,
        code: &str,
        bonuses: ReferralBonuses,
    ) -> LoyaltyResult<(ReferralLedger, ReferralOutcome)> {
        let referee = self
            .account(referee_id)
            .ok_or_else(|| LoyaltyError::not_found("referral account", referee_id))?;

        if let Some(referrer_id) = referee.referred_by {
            return Ok((self.clone(), ReferralOutcome::AlreadyReferred { referrer_id }));
        }

        let Some(referrer) = self.find_by_code(code) else {
            debug!(referee = %referee_id, code = %code, "Referral code matched no member");
            return Ok((self.clone(), ReferralOutcome::NoReferrer));
        };
        let referrer_id = referrer.customer_id;
        if referrer_id == referee_id {
            return Ok((self.clone(), ReferralOutcome::SelfReferral));
        }

        let mut next = self.clone();
        if let Some(r) = next.accounts.get_mut(&referrer_id) {
            r.referral_count += 1;
            r.bonus_points += bonuses.referrer;
        }
        if let Some(r) = next.accounts.get_mut(&referee_id) {
            r.referred_by = Some(referrer_id);
            r.bonus_points += bonuses.referee;
        }

        Ok((
            next,
            ReferralOutcome::Applied {
                referrer_id,
                referrer_bonus: bonuses.referrer,
                referee_bonus: bonuses.referee,
            },
        ))
    }

    /// Reverse `register` for `customer_id`, and the referral carried by
    /// `outcome` when it was applied.
    pub fn withdraw(&self, customer_id: Uuid, outcome: &ReferralOutcome) -> ReferralLedger {
        let mut next = self.clone();
        let Some(removed) = next.accounts.remove(&customer_id) else {
            return next;
        };
        if let ReferralOutcome::Applied {
            referrer_id,
            referrer_bonus,
            ..
        } = outcome
        {
            if removed.referred_by == Some(*referrer_id) {
                if let Some(r) = next.accounts.get_mut(referrer_id) {
                    r.referral_count = r.referral_count.saturating_sub(1);
                    r.bonus_points = r.bonus_points.saturating_sub(*referrer_bonus);
                }
            }
        }
        next
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Generate a code unused in `ledger`: up to four alphanumerics from the
/// member's name followed by random characters, `len` characters in total.
pub fn generate_code<R: Rng + ?Sized>(
    name: &str,
    ledger: &ReferralLedger,
    len: usize,
    rng: &mut R,
) -> LoyaltyResult<String> {
    let prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(CODE_PREFIX_LEN.min(len.saturating_sub(2)))
        .collect::<String>()
        .to_uppercase();
    let random_len = len.saturating_sub(prefix.len()).max(2);

    for _ in 0..MAX_CODE_ATTEMPTS {
        let suffix: String = (0..random_len)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        let code = format!("{prefix}{suffix}");
        if ledger.find_by_code(&code).is_none() {
            return Ok(code);
        }
    }
    Err(LoyaltyError::Internal(anyhow::anyhow!(
        "could not generate a unique referral code after {MAX_CODE_ATTEMPTS} attempts"
    )))
}

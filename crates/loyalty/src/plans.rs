//! Membership plan CRUD. Plans are purchasable bundles, separate from spend
//! tiers; buying one grants welcome points once (see `MemberDirectory`).

use crate::repository::{keys, Collection};
use chrono::Utc;
use salon_core::loyalty::MembershipPlan;
use salon_core::{LoyaltyError, LoyaltyResult, RecordStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub price_cents: i64,
    pub duration_days: u32,
    #[serde(default)]
    pub discount_percent: u8,
    #[serde(default)]
    pub welcome_points: u64,
    #[serde(default)]
    pub benefits: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub duration_days: Option<u32>,
    pub discount_percent: Option<u8>,
    pub welcome_points: Option<u64>,
    pub benefits: Option<Vec<String>>,
}

pub struct PlanManager {
    plans: Collection<MembershipPlan>,
}

impl PlanManager {
    pub fn new(store: Arc<dyn RecordStore>, workspace: &str) -> Self {
        info!(workspace = %workspace, "Plan manager initialized");
        Self {
            plans: Collection::new(store, workspace, keys::PLANS),
        }
    }

    /// Sorted by price, then name.
    pub fn list_plans(&self) -> LoyaltyResult<Vec<MembershipPlan>> {
        let mut plans = self.plans.load()?;
        plans.sort_by(|a, b| a.price_cents.cmp(&b.price_cents).then_with(|| a.name.cmp(&b.name)));
        Ok(plans)
    }

    pub fn get_plan(&self, id: Uuid) -> LoyaltyResult<MembershipPlan> {
        self.plans
            .load()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| LoyaltyError::not_found("plan", id))
    }

    pub fn create_plan(&self, req: NewPlan) -> LoyaltyResult<MembershipPlan> {
        let plan = MembershipPlan {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            price_cents: req.price_cents,
            duration_days: req.duration_days,
            discount_percent: req.discount_percent,
            welcome_points: req.welcome_points,
            benefits: req.benefits,
            created_at: Utc::now(),
        };
        validate_plan(&plan)?;

        self.plans.update(|plans| {
            plans.push(plan.clone());
            Ok(())
        })?;
        info!(
            plan_id = %plan.id,
            name = %plan.name,
            price_cents = plan.price_cents,
            "Plan created"
        );
        Ok(plan)
    }

    pub fn update_plan(&self, id: Uuid, req: PlanUpdate) -> LoyaltyResult<MembershipPlan> {
        let updated = self.plans.update(|plans| {
            let plan = plans
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| LoyaltyError::not_found("plan", id))?;

            let mut next = plan.clone();
            if let Some(name) = req.name {
                next.name = name.trim().to_string();
            }
            if let Some(price) = req.price_cents {
                next.price_cents = price;
            }
            if let Some(days) = req.duration_days {
                next.duration_days = days;
            }
            if let Some(discount) = req.discount_percent {
                next.discount_percent = discount;
            }
            if let Some(points) = req.welcome_points {
                next.welcome_points = points;
            }
            if let Some(benefits) = req.benefits {
                next.benefits = benefits;
            }
            validate_plan(&next)?;

            *plan = next.clone();
            Ok(next)
        })?;
        info!(plan_id = %id, "Plan updated");
        Ok(updated)
    }

    pub fn delete_plan(&self, id: Uuid) -> LoyaltyResult<()> {
        self.plans.update(|plans| {
            let before = plans.len();
            plans.retain(|p| p.id != id);
            if plans.len() == before {
                return Err(LoyaltyError::not_found("plan", id));
            }
            Ok(())
        })?;
        info!(plan_id = %id, "Plan deleted");
        Ok(())
    }

    /// Install demo plans when the workspace has none.
    pub fn seed_defaults(&self) -> LoyaltyResult<usize> {
        if !self.plans.load()?.is_empty() {
            return Ok(0);
        }
        let defaults = [
            ("Glow Monthly", 99_900, 30, 5, 200, vec!["5% off all services"]),
            (
                "Radiance Quarterly",
                249_900,
                90,
                10,
                750,
                vec!["10% off all services", "One free hair spa"],
            ),
            (
                "Luxe Annual",
                899_900,
                365,
                20,
                3_000,
                vec!["20% off all services", "Monthly manicure", "Birthday facial"],
            ),
        ];
        let count = defaults.len();
        for (name, price, days, discount, points, benefits) in defaults {
            self.create_plan(NewPlan {
                name: name.to_string(),
                price_cents: price,
                duration_days: days,
                discount_percent: discount,
                welcome_points: points,
                benefits: benefits.into_iter().map(String::from).collect(),
            })?;
        }
        info!(count, "Seeded default membership plans");
        Ok(count)
    }
}

fn validate_plan(plan: &MembershipPlan) -> LoyaltyResult<()> {
    if plan.name.is_empty() {
        return Err(LoyaltyError::Validation("plan name must not be empty".into()));
    }
    if plan.price_cents < 0 {
        return Err(LoyaltyError::Validation(format!(
            "plan price must not be negative, got {}",
            plan.price_cents
        )));
    }
    if plan.duration_days == 0 {
        return Err(LoyaltyError::Validation("plan duration must be at least one day".into()));
    }
    if plan.discount_percent > 100 {
        return Err(LoyaltyError::Validation(format!(
            "plan discount must be between 0 and 100, got {}",
            plan.discount_percent
        )));
    }
    Ok(())
}

//! Salon loyalty and rewards engine.
//!
//! Derives each member's tier, points, badges and visit streak from their
//! purchase history and referral graph, and administers the tier catalog,
//! membership plans and one-time point grants around it. Records live in a
//! whole-collection `RecordStore`; every write is serialized per collection.

pub mod badges;
pub mod directory;
pub mod engine;
pub mod plans;
pub mod referral;
pub mod repository;
pub mod tiers;

pub use badges::{evaluate_badges, BadgeCatalog, BadgeMetrics};
pub use directory::{
    fleet_stats, FleetStats, MemberDirectory, MemberFilter, MemberUpdate, NewMember,
};
pub use engine::{ComputationInput, RewardsEngine};
pub use plans::{NewPlan, PlanManager, PlanUpdate};
pub use referral::{ReferralBonuses, ReferralLedger, ReferralOutcome};
pub use tiers::{resolve_tier, TierCatalog};

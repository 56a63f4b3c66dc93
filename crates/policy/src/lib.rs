//! Layered device policies and the decisions made against them.
//!
//! Core principle: **a layer may only add restrictions.** Each author in a
//! subject's chain (coordinator, guardian, constitutional, the subject
//! themselves) contributes a [`DevicePolicy`]; folding the chain yields a
//! [`ComputedPolicy`] in which restriction sets are unions, numeric
//! ceilings are minimums, and [`INALIENABLE_FEATURES`] are never disabled.
//!
//! Access checks ([`ComputedPolicy::check_content`], `check_feature`,
//! `check_route`, `check_time`) are pure functions of the computed policy.
//! [`AccessGate`] wraps an optional policy and applies a [`FailMode`] when
//! none could be obtained.

mod access;
mod capability;
mod computed;
mod error;
pub mod pattern;
mod policy;
mod rules;
mod tier;

pub use access::{
    AccessGate, BlockReason, ContentRequest, Decision, FailMode, TimeAccess, TimeStatus,
};
pub use capability::{CapabilityFlags, CapabilityKind, CapabilityOverrides};
pub use computed::{ChainVersion, ComputedPolicy, LayerWindows, TimeLimits};
pub use error::{Error, Result};
pub use pattern::RoutePattern;
pub use policy::{chain_links, order_chain, DevicePolicy, PolicyChainLink, PolicyId};
pub use rules::{
    is_inalienable, AgeRating, ContentRules, FeatureRules, MonitoringRules, RuleSet, TimeRules,
    TimeWindow, INALIENABLE_FEATURES, MAX_REACH_LEVEL, MAX_RETENTION_DAYS,
};
pub use tier::{Tier, TierPermissions};

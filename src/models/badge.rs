// SPDX-License-Identifier: MIT

//! Badge catalog, reward rules, and typed rule criteria.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::stats::UserStats;

/// A badge in the catalog. Badges without a rule are granted manually
/// and are never touched by automatic reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Badge {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub icon: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Automatic award rule, absent for manual badges.
    #[serde(default)]
    pub rule: Option<RewardRule>,
}

/// Award rule attached to a badge. The criterion is stored as a JSON
/// string and parsed on use, so a rule that fails to parse disables
/// its badge instead of failing the whole evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RewardRule {
    pub name: String,
    /// JSON-encoded [`RuleCriteria`].
    pub criteria: String,
}

impl RewardRule {
    pub fn parse_criteria(&self) -> serde_json::Result<RuleCriteria> {
        serde_json::from_str(&self.criteria)
    }
}

/// Statistic a rule compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub enum RuleField {
    TotalSessions,
    CompletedChallenges,
    TotalCalories,
    TotalDuration,
}

/// Comparison operator for a rule criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum RuleOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "==")]
    Equal,
}

/// A single threshold comparison against a user's aggregate stats.
///
/// Criteria strings written before field validation existed may carry
/// extra keys (a display name, for example); those are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RuleCriteria {
    pub field: RuleField,
    pub operator: RuleOperator,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub value: u64,
}

impl RuleCriteria {
    /// Evaluate this criterion against computed stats. Total over all
    /// field/operator combinations, so evaluation cannot fail.
    pub fn is_satisfied_by(&self, stats: &UserStats) -> bool {
        let observed = match self.field {
            RuleField::TotalSessions => stats.total_sessions,
            RuleField::CompletedChallenges => stats.completed_challenges,
            RuleField::TotalCalories => stats.total_calories,
            RuleField::TotalDuration => stats.total_duration,
        };
        match self.operator {
            RuleOperator::GreaterThan => observed > self.value,
            RuleOperator::GreaterThanOrEqual => observed >= self.value,
            RuleOperator::LessThanOrEqual => observed <= self.value,
            RuleOperator::Equal => observed == self.value,
        }
    }
}

/// A badge held by a user. Document id is `{user_id}_{badge_id}`, so a
/// user can hold each badge at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserBadge {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub badge_id: u64,
    pub reason: String,
    /// RFC 3339 timestamp of the grant.
    pub awarded_at: String,
}

impl UserBadge {
    pub fn document_id(user_id: u64, badge_id: u64) -> String {
        format!("{user_id}_{badge_id}")
    }
}

/// Outcome of one reconciliation pass: badge ids granted and revoked,
/// each in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BadgeSyncResult {
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<number>"))]
    pub added: Vec<u64>,
    #[cfg_attr(feature = "binding-generation", ts(type = "Array<number>"))]
    pub removed: Vec<u64>,
}

impl BadgeSyncResult {
    /// Diff the badges a user should hold against the ones they do
    /// hold. Both inputs are restricted to rule-bearing badges, so
    /// manually granted badges never show up on either side.
    pub fn diff(eligible: &BTreeSet<u64>, held: &BTreeSet<u64>) -> Self {
        Self {
            added: eligible.difference(held).copied().collect(),
            removed: held.difference(eligible).copied().collect(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

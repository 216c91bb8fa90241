// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod badge;
pub mod challenge;
pub mod stats;
pub mod user;

pub use badge::{
    Badge, BadgeSyncResult, RewardRule, RuleCriteria, RuleField, RuleOperator, UserBadge,
};
pub use challenge::{ChallengeParticipation, ParticipationStatus, WorkoutEntry};
pub use stats::UserStats;
pub use user::{UserProfile, UserRole};

// SPDX-License-Identifier: MIT

//! Challenge participation model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle status of a user's participation in a challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipationStatus {
    /// Joined but no workout logged yet
    #[default]
    NotStarted,
    /// At least one workout logged
    InProgress,
    /// Challenge goal reached
    Completed,
}

/// Stored participation record in Firestore.
///
/// Workout entries are embedded in the participation document, so the
/// per-user aggregate read is a single filtered collection query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ChallengeParticipation {
    /// Participation ID (also used as document ID)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    /// Owning user ID
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    /// Challenge this participation belongs to
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub challenge_id: u64,
    /// Current status
    pub status: ParticipationStatus,
    /// When the user joined (RFC3339)
    pub joined_at: String,
    /// Logged workout entries
    #[serde(default)]
    pub entries: Vec<WorkoutEntry>,
}

/// One logged workout under a participation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct WorkoutEntry {
    /// When the workout was logged (RFC3339)
    pub logged_at: String,
    /// Duration in minutes, if recorded
    pub duration_minutes: Option<u32>,
    /// Calories burned, if recorded
    pub calories: Option<u32>,
    /// Free-form note
    pub notes: Option<String>,
}

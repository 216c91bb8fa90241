//! Aggregate fitness statistics derived from a user's participations.
//!
//! A snapshot is recomputed from the raw participation records on every
//! reconciliation pass and is never persisted or cached beyond that pass,
//! so it cannot drift from the underlying workout data.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::challenge::{ChallengeParticipation, ParticipationStatus};

/// Derived statistics for a user, reduced over all of their challenge
/// participations and the workout entries recorded under them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserStats {
    /// Number of workout entries across all participations
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_sessions: u64,
    /// Number of participations with status `COMPLETED`
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub completed_challenges: u64,
    /// Sum of calories over all entries (missing values count as 0)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_calories: u64,
    /// Sum of duration minutes over all entries (missing values count as 0)
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_duration: u64,
}

impl UserStats {
    /// Reduce a user's participations into a stats snapshot.
    ///
    /// An entry with no recorded calories or duration still counts as one
    /// session; the missing value contributes 0 to the corresponding sum.
    pub fn from_participations(participations: &[ChallengeParticipation]) -> Self {
        let mut stats = Self::default();

        for participation in participations {
            if participation.status == ParticipationStatus::Completed {
                stats.completed_challenges += 1;
            }

            for entry in &participation.entries {
                stats.total_sessions += 1;
                stats.total_calories += u64::from(entry.calories.unwrap_or(0));
                stats.total_duration += u64::from(entry.duration_minutes.unwrap_or(0));
            }
        }

        stats
    }
}

//! User profile model for storage and API.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Access level attached to a profile. Permission checks read the
/// stored profile, never the token, so a role change takes effect on
/// the next request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    SuperAdmin,
    GymOwner,
    #[default]
    Client,
}

impl UserRole {
    /// Whether this role may manage the badge catalog and trigger
    /// syncs for other users.
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::SuperAdmin | UserRole::GymOwner)
    }
}

/// User profile stored in Firestore (document ID is the user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserProfile {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    /// Email address (may be None if not shared)
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    /// When the profile was created (RFC 3339)
    pub created_at: String,
    /// When badges were last reconciled for this user, if ever
    #[serde(default)]
    pub last_badge_sync_at: Option<String>,
}

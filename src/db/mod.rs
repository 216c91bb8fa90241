//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const PARTICIPATIONS: &str = "participations";
    pub const BADGES: &str = "badges";
    /// Badge grants (keyed by `{user_id}_{badge_id}`)
    pub const USER_BADGES: &str = "user_badges";
    /// ID allocation counters (badge catalog ids)
    pub const COUNTERS: &str = "counters";
}

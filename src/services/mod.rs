// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod badge_engine;

pub use badge_engine::{BadgeEngine, SyncAllPage, SyncOptions};

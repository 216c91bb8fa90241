// SPDX-License-Identifier: MIT

//! FitNet badge service: award and revoke fitness badges from workout data.
//!
//! This crate provides the backend API that reconciles each user's granted
//! badges against aggregate stats computed from their challenge
//! participations and logged workouts.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use services::BadgeEngine;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub engine: BadgeEngine,
}

impl AppState {
    pub fn new(config: Config, db: FirestoreDb) -> Self {
        let engine = BadgeEngine::new(db.clone());
        Self { config, db, engine }
    }
}

//! Tourly — onboarding tour authoring and playback service.

pub mod api;
pub mod config;
pub mod error;
pub mod resolver;
pub mod store;
pub mod tours;
pub mod translation;

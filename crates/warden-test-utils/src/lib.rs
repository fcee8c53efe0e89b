//! Shared test utilities for the warden workspace.
//!
//! A dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`scope`]: [`ScopeFixture`] builder for staged scope directories

pub mod scope;

pub use scope::ScopeFixture;

//! SenseiiWyze credit ledger service.
//!
//! This crate provides:
//!
//! - [`UsageTrackingService`], the transactional ledger over a
//!   [`wyze_credits_store::Store`]
//! - Result envelopes that turn ledger failures into stable messages
//! - The HTTP API exposing balances, usage tracking and credit grants
//!
//! # Authentication
//!
//! The HTTP API supports three authentication methods:
//!
//! 1. **User JWT tokens** - HS256 bearer tokens for end-user requests
//! 2. **Service API keys** - For requests from other backends
//! 3. **Admin API keys** - For credit grants and purges

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod outcome;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{
    AddCredits, CreditCheck, CreditReceipt, TrackUsage, UsageOverview, UsageReceipt,
    UsageTrackingService,
};
pub use outcome::{AddCreditsResult, FailureKind, TrackUsageResult};
pub use routes::create_router;
pub use state::AppState;

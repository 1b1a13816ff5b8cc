pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod quickmode;
pub mod strategy;
pub mod types;

pub use auth::{RefreshingTokenSource, StaticToken, TokenRefreshCallback, TokenSet, TokenSource};
pub use client::{ClientOptions, SensonetClient};
pub use controller::{Controller, ControllerOptions, StrategyOutcome};
pub use error::{Error, Result};
pub use quickmode::{QuickMode, QuickModeTracker};
pub use strategy::{which_override, HeatingParams, HotwaterParams, Override, Strategy};
pub use types::Param;

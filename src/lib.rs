#![warn(clippy::all, clippy::pedantic)]
#![allow(
    async_fn_in_trait,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default
)]

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod webhook;

pub use config::Config;
pub use error::{GatewayError, Result};

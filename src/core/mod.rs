pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod hud;
pub mod registry;
pub mod router;
pub mod rule;
pub mod sharing;
pub mod speakers;

pub mod config;
pub mod db;
pub mod diagnostics;
pub mod formatter;
pub mod overlay;
pub mod resolver;
pub mod timefmt;

/// Application name for XDG paths and log targets
pub const APP_NAME: &str = "rbcast";

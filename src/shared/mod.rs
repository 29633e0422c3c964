pub mod config;
pub mod diff;
pub mod dirs;
pub mod env_var;
pub mod logging;
pub mod session_store;

mod backend;
pub mod commit;
pub mod config;
pub mod diff;
pub mod open;

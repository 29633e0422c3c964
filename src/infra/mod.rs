pub mod locator;
pub mod remote;

//! CLI command modules

pub mod init;
pub mod plugins;
pub mod resolve;
pub mod validate;

pub mod args;
pub mod commands;
pub mod errors;
pub mod server;

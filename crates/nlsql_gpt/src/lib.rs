//! Chat completions client used as the language backend.

pub mod client;
pub mod errors;

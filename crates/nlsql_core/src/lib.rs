//! Natural-language question answering over a relational database.
//!
//! A question is normalized through the alias table, turned into a statement
//! by the language backend, checked by the safety filter and executed. A
//! statement that fails gets one repair attempt. The last successful turn of
//! each session is remembered and offered as context for the next question.

pub mod alias;
pub mod backend;
pub mod errors;
pub mod executor;
pub mod extract;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod safety;
pub mod schema;
pub mod synthesizer;

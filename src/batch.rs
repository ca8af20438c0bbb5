//! Packing many records into one inference call and splitting the reply back.
//!
//! The protocol is positional: the `i`-th entry of a parsed reply belongs to
//! the `i`-th record that went into the prompt.

#[path = "batch/prompt.rs"]
mod prompt;

#[path = "batch/parser.rs"]
mod parser;


pub use parser::{parse_batch_response, ParseStrategy, ParsedBatch};
pub use prompt::BatchPromptBuilder;

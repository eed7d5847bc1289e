pub mod cli;
pub mod engine;
pub mod eval;
pub mod parser;
pub mod value;

// Re-export main types
pub use parser::{parse, parse_text, Augmentations, ParseOptions, ParseResult};
pub use value::{Value, ValueType};

// Re-export the runtime for convenience
pub use engine::BlockEngine;

pub mod budget;
pub mod bus;
pub mod cache;
pub mod chunk;
pub mod core;
pub mod corpus;
pub mod embed;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod nlp;
pub mod retrieve;
pub mod store;
pub mod summarize;
pub mod text;

// --- Primary exports ---
pub use core::config::Config;
pub use core::engine::Engine;
pub use core::error::{RagError, RagResult};
pub use core::types;
pub use core::types::*;

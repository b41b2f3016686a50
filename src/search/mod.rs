//! The read path: query analysis, three-signal fusion and boost rules.
pub mod boosts;
pub mod context;
pub mod engine;
pub mod fusion;
pub mod query;
pub mod structural;

pub use context::render_context;
pub use engine::{QueryEngine, SearchResult};

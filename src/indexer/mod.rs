pub mod chunker;
pub mod core;
pub mod files;
pub mod generic;
pub mod languages;
pub mod markdown;
pub mod markup;
pub mod procedural;
pub mod terms;

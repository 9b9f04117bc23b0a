pub mod config;
pub mod indexing;

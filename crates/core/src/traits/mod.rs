//! Core traits for pluggable components

mod retriever;

pub use retriever::{RetrieveOptions, Retriever};

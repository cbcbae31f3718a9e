//! Storage module for model inputs and fitted outputs.

mod context;
mod embeddings;
pub mod npy;

pub use context::ContextMatrix;
pub use embeddings::EmbeddingSet;

//! Askdoc Text - Document loading and chunking
//!
//! Turns a source file into a [`askdoc_core::Document`] and splits it
//! into overlapping [`askdoc_core::Chunk`]s sized for embedding.

pub mod chunker;
pub mod loader;

pub use chunker::Chunker;
pub use loader::{FileType, TextLoader};

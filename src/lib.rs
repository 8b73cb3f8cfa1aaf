//! Fetch embeddings from a vector store, project them to 2D with t-SNE and
//! draw a scatter plot colored by one payload attribute.

pub mod colormap;
pub mod config;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod qdrant;
pub mod record;
pub mod render;
pub mod store;
pub mod tsne;
pub mod vector_ops;

pub use error::{PipelineError, Result};

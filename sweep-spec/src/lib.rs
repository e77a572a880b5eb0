//! OpenAPI ingestion and the uniform endpoint model.
//!
//! [`loader`] resolves `$ref`s, validates the document against OpenAPI 3,
//! and flattens paths × methods into a [`SpecSnapshot`]. [`chunker`]
//! partitions a raw spec document into fixed-size path slices for
//! parallel workers.

pub mod chunker;
pub mod loader;
pub mod model;

pub use loader::{load_spec, parse_document, SpecSource};
pub use model::{Endpoint, SchemeKind, SecurityRequirement, SecurityScheme, SpecSnapshot};

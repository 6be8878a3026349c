//! # weave-model
//!
//! Core library for the Weave interface definition language: assemble
//! JSON model documents into an immutable semantic model, traverse the
//! relationship graph between shapes, query shapes with selectors, and
//! validate the result with a parallel, suppressible pipeline.
//!
//! ```no_run
//! use weave_model::assembler::ModelAssembler;
//! use weave_model::loader;
//! use weave_model::neighbor::NeighborIndex;
//! use weave_model::selector::Selector;
//!
//! # fn main() -> weave_model::Result<()> {
//! let mut assembler = ModelAssembler::new();
//! assembler.add_document(loader::load_file(std::path::Path::new("model.json"))?);
//! let (model, events) = assembler.assemble().into_parts();
//! let model = model.expect("assembly failed");
//!
//! let errors = Selector::parse("structure [trait|error]").unwrap();
//! for id in errors.select(&model) {
//!     println!("{id}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod config;
pub mod error;
pub mod loader;
pub mod model;
pub mod neighbor;
pub mod node;
pub mod prelude;
pub mod selector;
pub mod shape;
pub mod shape_id;
pub mod validation;

pub use error::{ModelError, Result};
pub use model::Model;
pub use node::{Node, SourceLocation};
pub use shape::{Shape, ShapeKind, ShapeType};
pub use shape_id::ShapeId;

//! Metadata registry for RNA-Seq experiments.
//!
//! Tracks a hierarchy of components, organisms, datasets, samples and
//! accessions in a single-file relational store, with bulk import, retire,
//! remap and dump operations for batch curation pipelines.

pub mod document;
pub mod error;
pub mod output;
pub mod registry;
pub mod schema;
pub mod store;

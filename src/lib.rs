//! # coursec
//!
//! A compiler for language-course content. A hand-authored specification
//! document (courses made of categories, lessons, and items, with optional
//! images) is compiled into artifacts a presentation layer can consume.
//!
//! # Architecture: Two Invocations
//!
//! ```text
//! generate   course.json  →  courses/<slug>/     (Course Tree, YAML)
//!                         →  static/images/      (image variants + ledger)
//! export     courses/<slug>/  →  export/<slug>/  (bundle, JSON)
//! ```
//!
//! `generate` runs the stages
//!
//! ```text
//! load + validate → assign identifiers → (variants ∥ emit) → prune
//! ```
//!
//! and `export` reads only the Course Tree. The Course Tree is the sole
//! contract between the two, so each can be run and tested on its own.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`spec`] | Loads the specification document and reports every validation error at once |
//! | [`ident`] | Assigns stable IDs, unique slugs, and display order; produces the compiled course |
//! | [`variants`] | Renders image variants in a bounded worker pool, skipping fresh ones |
//! | [`ledger`] | Records which variant files in the shared image root belong to a course |
//! | [`imaging`] | Pure-Rust image operations: identify, square, resize, encode |
//! | [`emit`] | Writes the Course Tree, touching only files whose bytes changed |
//! | [`prune`] | Deletes stale generated paths after strict safety checks |
//! | [`export`] | Reads the Course Tree back and writes the flattened bundle |
//! | [`pipeline`] | Run stages, cancellation, timeout, and error taxonomy |
//! | [`config`] | `coursec.toml` loading, merging, validation, and path layout |
//! | [`types`] | Course Tree records shared by `emit` and `export` |
//! | [`output`] | CLI output formatting |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Design Decisions
//!
//! ## Everything Generated Is Disposable
//!
//! The Course Tree, the image variants, and the bundle are all a function of
//! the specification and the source images. Nothing is edited by hand and
//! nothing carries state between runs except the variant ledger, which only
//! records what a previous run produced. Deleting every output root and
//! running again yields the same bytes.
//!
//! ## Stable Identifiers
//!
//! IDs hash the node kind, the parent's ID, and the node's identity (an
//! explicit `key`, else its title or prompt). Adding, removing, or reordering
//! siblings never changes an existing ID; moving a lesson to another category
//! does. Slugs are derived separately and may change when a title changes.
//!
//! ## Idempotent Writes
//!
//! Every writer compares bytes before writing and every variant is checked
//! against the ledger and its source's content hash. Running `generate`
//! twice on an unchanged specification performs no writes the second time.
//!
//! ## Pruning Is a Set Difference
//!
//! Deletions are computed as "present on disk, recorded as ours, not written
//! this run". The Course Tree directory is wholly generated; in the shared
//! image root only ledger entries are ever candidates. Every candidate is
//! checked lexically against its root before anything is deleted, and one
//! bad candidate refuses the whole prune.

pub mod config;
pub mod emit;
pub mod export;
pub mod ident;
pub mod imaging;
pub mod ledger;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod prune;
pub mod spec;
pub mod types;
pub mod variants;

#[cfg(test)]
pub(crate) mod test_helpers;

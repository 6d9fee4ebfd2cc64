//! # staves-image
//!
//! Container image packaging for staves.
//!
//! This crate turns a finished staging root into a tagged image:
//! - Build-instruction document generation
//! - In-memory build context archives
//! - Submission to the container engine

#![warn(missing_docs)]

pub mod context;
pub mod dockerfile;
pub mod engine;
pub mod tag;

pub use context::BuildContext;
pub use dockerfile::BuildInstructions;
pub use engine::ImageEngine;
pub use tag::ImageTag;

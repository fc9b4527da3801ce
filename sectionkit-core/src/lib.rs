//! # sectionkit-core
//!
//! Core library for the sectionkit theme preview builder.
//!
//! This crate holds the project layout configuration, the section settings
//! record, and the tokenizer that resolves the `section` and `schema`
//! template directives.

pub mod config;
pub mod directive;
pub mod settings;

pub use config::{Config, ConfigError};
pub use directive::{scan, DirectiveError, SectionDirective, Segment};
pub use settings::SectionSettings;

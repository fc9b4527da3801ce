//! # sectionkit-render
//!
//! Template rendering library for sectionkit.
//!
//! This crate adapts Tera to theme templates: it resolves the `section` and
//! `schema` directives, registers the `asset_url` and `stylesheet_tag`
//! filters, and renders templates straight from disk without caching.

pub mod engine;
pub mod filters;

pub use engine::{
    missing_section_marker, RenderConfig, RenderError, Scope, SectionObject, SiteRenderer,
};
pub use filters::stylesheet_link;

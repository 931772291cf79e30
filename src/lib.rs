//! File Converter API
//!
//! An HTTP service converting documents between formats (PDF ↔ DOCX,
//! images ↔ PDF). Conversions are delegated to external engines; this crate
//! validates requests, manages temporary artifacts on scratch storage and
//! streams results back.

pub mod artifact;
pub mod auth;
pub mod config;
pub mod converter;
pub mod docx_processor;
pub mod handlers;
pub mod image_processor;
pub mod office;
pub mod pdf_processor;
pub mod types;

pub use artifact::{Artifact, ArtifactKind, ScratchDir};
pub use config::AppConfig;
pub use converter::{ConversionService, Engines};
pub use types::*;

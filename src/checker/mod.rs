// src/checker/mod.rs
// =============================================================================
// This module contains the per-link checking logic.
//
// Submodules:
// - http: liveness checks and document downloads (with retry/backoff)
// - content: format/quality classification and keyword search
// - pdf: text extraction from the first pages of a PDF
// - html: visible-text extraction from HTML pages
//
// This file (mod.rs) re-exports the public API so the rest of the crate can
// write `checker::VerificationClient` instead of `checker::http::...`.
// =============================================================================

mod content;
mod html;
mod http;
mod pdf;

pub use content::{classify, Classification, ClassifierConfig};
pub use http::{Fetched, HttpConfig, Verification, VerificationClient};

#[cfg(test)]
pub(crate) use pdf::tests::tiny_pdf;

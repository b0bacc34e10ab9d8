//! Pipeline stages for PDF-to-JSON expense extraction.
//!
//! Each submodule implements one step. The engines themselves live in
//! [`crate::engines`]; the stages here decide which engine runs and what
//! to do with its output.
//!
//! ## Data Flow
//!
//! ```text
//!                        ┌─▶ digital ──┐
//! input ──▶ classify ────┤             ├─▶ llm ──▶ postprocess
//! (URL/path) (sample)    └─▶ scanned ──┘  (model)   (JSON check)
//!                           (OCR)
//! ```
//!
//! 1. [`input`]   : canonicalise a path, URL or byte buffer to a local PDF
//! 2. [`classify`]: sample the text layer and decide digital vs scanned
//! 3. [`digital`] : merge every text-layer engine per page, with [`tables`]
//! 4. [`scanned`] : OCR strategies in preference order, using [`raster`]
//! 5. [`llm`]     : the only stage with network I/O; timeout and retry
//! 6. [`postprocess`]: parse the model response as JSON
//!
//! [`pages`] holds the per-page assembly shared by 3 and 4, and
//! [`normalize`] the whitespace rules applied throughout.

pub mod classify;
pub mod digital;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod pages;
pub mod postprocess;
pub mod raster;
pub mod scanned;
pub mod tables;

//! Core domain types shared across the pipeline.

mod result;

pub use result::ProbeResult;

#![forbid(unsafe_code)]

//! Transform pipeline engine for the ulriksdal XAdES library.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! contains a sequence of transforms that are applied in order to the
//! dereferenced data before it is digested.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;
pub mod uri;
pub mod xpath_filter;

pub use pipeline::{C14nTransform, Transform, TransformData, TransformKind, TransformPipeline};

#![forbid(unsafe_code)]

//! Core types shared by every ulriksdal crate.
//!
//! The error enum, the algorithm URI table and the namespace / element
//! name constants for XML-DSig and XAdES live here so the higher layers
//! agree on spelling.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};

#![forbid(unsafe_code)]

//! DSig context: identifier attributes and detached content for
//! dereferencing references.

use std::collections::HashMap;
use ulriksdal_core::Error;

/// Context for XML-DSig operations.
#[derive(Debug, Clone, Default)]
pub struct DsigContext {
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Detached content by reference URI.
    detached: HashMap<String, Vec<u8>>,
}

impl DsigContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ID attribute name to register during processing.
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.id_attrs.iter().any(|a| a == name) {
            self.id_attrs.push(name.to_owned());
        }
    }

    /// Supply the octets an external reference URI points at.
    pub fn add_detached_content(&mut self, uri: &str, data: Vec<u8>) {
        self.detached.insert(uri.to_owned(), data);
    }

    /// Map an external URI to a local file, read eagerly.
    pub fn add_url_map(&mut self, url: &str, file_path: &str) -> Result<(), Error> {
        let data = std::fs::read(file_path)
            .map_err(|e| Error::Other(format!("url-map {url} -> {file_path}: {e}")))?;
        self.detached.insert(url.to_owned(), data);
        Ok(())
    }

    pub fn detached(&self) -> &HashMap<String, Vec<u8>> {
        &self.detached
    }
}

#![forbid(unsafe_code)]

//! XML document layer for the ulriksdal XAdES library.
//!
//! Read access goes through `roxmltree`. Qualified names and namespace
//! declarations are read back from the source text, since `roxmltree`
//! only exposes resolved names. Documents are modified by splicing text
//! at node byte ranges ([`edit`]) and re-parsing, so unchanged bytes
//! (and therefore earlier digests) survive every mutation.

pub mod document;
pub mod edit;
pub mod nodeset;
pub mod qname;
pub mod writer;
pub mod xpath;

pub use document::XmlDocument;
pub use edit::TextEdit;
pub use nodeset::NodeSet;
pub use writer::XmlWriter;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree never fetches external entities, so accepting a DTD only
/// enables the internal entity definitions some signed documents carry.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

/// Parse `text` with [`parsing_options`], mapping the error.
pub fn parse(text: &str) -> ulriksdal_core::Result<roxmltree::Document<'_>> {
    roxmltree::Document::parse_with_options(text, parsing_options())
        .map_err(|e| ulriksdal_core::Error::XmlParse(e.to_string()))
}

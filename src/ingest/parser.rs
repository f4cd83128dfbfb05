//! Access-log batch file parsing.
//!
//! A batch file is an XML document whose root carries a `batchDate`
//! attribute and whose `<entry>` children each carry `documentId` and
//! `accessCount` attributes:
//!
//! ```xml
//! <dailyAccesses batchDate="2024-05-01">
//!     <entry documentId="5" accessCount="10"/>
//!     <entry documentId="7" accessCount="3"/>
//! </dailyAccesses>
//! ```

use chrono::NaiveDate;
use thiserror::Error;

/// One `(documentId, accessCount)` pair from a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessEntry {
    pub document_id: i32,
    pub access_count: i32,
}

/// A fully parsed batch file.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessBatch {
    pub batch_date: NaiveDate,
    pub entries: Vec<AccessEntry>,
}

/// Errors that make a batch file unusable as a whole.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("missing '{0}' attribute")]
    MissingAttribute(&'static str),

    #[error("invalid batchDate: {0}")]
    InvalidDate(String),

    #[error("invalid {attribute}: {value}")]
    InvalidNumber {
        attribute: &'static str,
        value: String,
    },

    #[error("negative accessCount: {0}")]
    NegativeCount(i32),
}

/// Parse a batch file. Any malformed attribute fails the whole file; a
/// partially usable batch is never returned.
pub fn parse_batch(xml: &str) -> Result<AccessBatch, ParseError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();

    let date_raw = root
        .attribute("batchDate")
        .ok_or(ParseError::MissingAttribute("batchDate"))?;
    let batch_date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d")
        .map_err(|_| ParseError::InvalidDate(date_raw.to_string()))?;

    let mut entries = Vec::new();
    for node in root.children().filter(|n| n.is_element()) {
        if node.tag_name().name() != "entry" {
            continue;
        }
        entries.push(parse_entry(&node)?);
    }

    Ok(AccessBatch {
        batch_date,
        entries,
    })
}

fn parse_entry(node: &roxmltree::Node) -> Result<AccessEntry, ParseError> {
    let document_id = parse_int_attribute(node, "documentId")?;
    let access_count = parse_int_attribute(node, "accessCount")?;
    if access_count < 0 {
        return Err(ParseError::NegativeCount(access_count));
    }
    Ok(AccessEntry {
        document_id,
        access_count,
    })
}

fn parse_int_attribute(
    node: &roxmltree::Node,
    attribute: &'static str,
) -> Result<i32, ParseError> {
    let raw = node
        .attribute(attribute)
        .ok_or(ParseError::MissingAttribute(attribute))?;
    raw.parse().map_err(|_| ParseError::InvalidNumber {
        attribute,
        value: raw.to_string(),
    })
}

//! Content fingerprints for change detection.
//!
//! A fingerprint is SHA-256 over the canonical JSON of a snapshot component.
//! serde emits struct fields in declaration order and `PageSet` is a sorted
//! set, so equal values always serialize to equal bytes. Fetch timestamps and
//! store row ids never reach the serialized form.
//!
//! Equal fingerprints are treated as equal content. A SHA-256 collision between
//! two panel configurations is not a practical concern at this scale.

#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::core::errors::Result;
use crate::store::model::{ButtonRow, PageConfig};

/// 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 chars.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hash_hex(&self.0)
    }

    /// First 12 hex chars, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint any serializable value.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint> {
    let canonical = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Page component. An absent page is a distinct value from any present page.
pub fn page_fingerprint(page: Option<&PageConfig>) -> Result<Fingerprint> {
    fingerprint(&page)
}

/// Buttons component: the raw row sequence in fetch order, malformed rows included.
pub fn buttons_fingerprint(rows: &[ButtonRow]) -> Result<Fingerprint> {
    fingerprint(rows)
}

fn hash_hex(bytes: &[u8]) -> String {
    use fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::PageSet;

    fn rows() -> Vec<ButtonRow> {
        vec![
            ButtonRow {
                label: Some("Scene".to_string()),
                x: Some(20),
                y: Some(7),
                background: Some("#333333".to_string()),
                foreground: Some("white".to_string()),
                action: Some("change_scene:Intro".to_string()),
                image: None,
                pages: PageSet::parse("1,2"),
            },
            ButtonRow {
                label: Some("Lights".to_string()),
                x: Some(161),
                y: Some(7),
                background: Some("#444444".to_string()),
                foreground: Some("black".to_string()),
                action: None,
                image: None,
                pages: PageSet::single(1),
            },
        ]
    }

    #[test]
    fn identical_values_hash_identically() {
        assert_eq!(
            buttons_fingerprint(&rows()).unwrap(),
            buttons_fingerprint(&rows()).unwrap()
        );
    }

    #[test]
    fn order_is_significant() {
        let mut reversed = rows();
        reversed.reverse();
        assert_ne!(
            buttons_fingerprint(&rows()).unwrap(),
            buttons_fingerprint(&reversed).unwrap()
        );
    }

    #[test]
    fn page_set_spelling_does_not_matter() {
        let mut a = rows();
        let mut b = rows();
        a[0].pages = PageSet::parse("2, 1");
        b[0].pages = PageSet::parse("1;2");
        assert_eq!(
            buttons_fingerprint(&a).unwrap(),
            buttons_fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn absent_page_differs_from_default_page() {
        let page = PageConfig {
            page_number: 1,
            web_url: None,
            show_web: false,
            background: None,
        };
        assert_ne!(
            page_fingerprint(None).unwrap(),
            page_fingerprint(Some(&page)).unwrap()
        );
    }

    #[test]
    fn hex_forms() {
        let fp = buttons_fingerprint(&[]).unwrap();
        assert_eq!(fp.to_hex().len(), 64);
        assert_eq!(fp.short().len(), 12);
        assert!(fp.to_hex().starts_with(&fp.short()));
        assert_eq!(fp.to_string(), fp.to_hex());
        // sha256("[]")
        assert_eq!(
            fp.to_hex(),
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }
}

//! Value types fetched from the configuration store.
//!
//! Everything here is immutable once fetched. A newer fetch supersedes the whole
//! value; nothing is patched in place.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::{DeckError, Result};

/// Minimum populated fields for a usable button: label, x, y, bg, fg.
pub const MIN_BUTTON_FIELDS: usize = 5;

/// Total fields a button row can carry: the five required plus action and image.
pub const MAX_BUTTON_FIELDS: usize = 7;

// ──────────────────── page membership ────────────────────

/// Set of page numbers a button appears on.
///
/// The store may hold either an exact number (`"2"`) or a delimited list
/// (`"1,3, 5"`, `"1;2"`, `"4|5"`, `"1 2"`). Zero and non-numeric tokens are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageSet(BTreeSet<u32>);

impl PageSet {
    /// Parse an exact number or a delimited list.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(|c: char| matches!(c, ',' | ';' | '|') || c.is_whitespace())
                .filter_map(|token| token.trim().parse::<u32>().ok())
                .filter(|page| *page >= 1)
                .collect(),
        )
    }

    /// Set holding just `page`.
    #[must_use]
    pub fn single(page: u32) -> Self {
        Self(BTreeSet::from([page]))
    }

    /// Whether the button appears on `page`.
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.0.contains(&page)
    }

    /// True when no valid page number was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Page numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for PageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for page in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{page}")?;
            first = false;
        }
        Ok(())
    }
}

/// Membership test used by the SQLite `page_member()` scalar function.
#[must_use]
pub fn page_member(raw: &str, page: u32) -> bool {
    PageSet::parse(raw).contains(page)
}

// ──────────────────── page ────────────────────

/// One screen's page-level presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Page number, >= 1.
    pub page_number: u32,
    /// Embedded web view address.
    pub web_url: Option<String>,
    /// Show the web view. Ignored without a non-blank `web_url`.
    pub show_web: bool,
    /// Window background; the display default applies when absent or blank.
    pub background: Option<String>,
}

impl PageConfig {
    /// URL to display in the embedded web view, if the view should be visible.
    ///
    /// Visible only when the flag is set and a non-blank URL is present.
    #[must_use]
    pub fn visible_web_url(&self) -> Option<&str> {
        if !self.show_web {
            return None;
        }
        self.web_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

// ──────────────────── buttons ────────────────────

/// A button row exactly as the store returned it, minus the storage row id.
///
/// Fields are optional because the schema grew additively; validation into a
/// [`ButtonConfig`] happens when the engine materializes the row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonRow {
    /// Button text.
    pub label: Option<String>,
    /// Horizontal position in store units, before display offsets.
    pub x: Option<i64>,
    /// Vertical position in store units, before display offsets.
    pub y: Option<i64>,
    /// Fill color.
    pub background: Option<String>,
    /// Text color.
    pub foreground: Option<String>,
    /// Action expression run on click.
    pub action: Option<String>,
    /// Local path or http(s) URL of an icon.
    pub image: Option<String>,
    /// Pages this button appears on.
    pub pages: PageSet,
}

impl ButtonRow {
    /// Length of the leading run of populated required columns in
    /// (label, x, y, bg, fg).
    #[must_use]
    pub fn required_fields(&self) -> usize {
        let present = [
            self.label.is_some(),
            self.x.is_some(),
            self.y.is_some(),
            self.background.is_some(),
            self.foreground.is_some(),
        ];
        present.iter().take_while(|p| **p).count()
    }

    /// Required run plus each optional column (action, image) that is set.
    ///
    /// Optional columns only count once all required ones are present. Empty
    /// action/image strings count as absent.
    #[must_use]
    pub fn populated_fields(&self) -> usize {
        let required = self.required_fields();
        if required < MIN_BUTTON_FIELDS {
            return required;
        }
        required
            + usize::from(non_blank(self.action.as_deref()))
            + usize::from(non_blank(self.image.as_deref()))
    }

    /// Short identifier for notices and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("button '{label}'"),
            None => format!("unlabeled button at ({:?}, {:?})", self.x, self.y),
        }
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Where a button's image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum ImageRef {
    /// File on the panel's machine.
    Local(PathBuf),
    /// http(s) URL.
    Remote(String),
}

impl ImageRef {
    /// Classify by scheme; anything not http(s) is a local path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(trimmed))
        }
    }
}

/// A validated, displayable button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Button text.
    pub label: String,
    /// Horizontal position in store units.
    pub x: i32,
    /// Vertical position in store units.
    pub y: i32,
    /// Fill color.
    pub background: String,
    /// Text color.
    pub foreground: String,
    /// Action expression, if non-blank.
    pub action: Option<String>,
    /// Icon, if non-blank.
    pub image: Option<ImageRef>,
    /// Pages this button appears on.
    pub pages: PageSet,
}

impl ButtonConfig {
    /// Validate a raw row.
    ///
    /// The five required fields give label, position and colors; action and
    /// image are taken independently when non-blank. A missing required field
    /// is a [`DeckError::MalformedRecord`].
    pub fn from_row(row: &ButtonRow) -> Result<Self> {
        let populated = row.populated_fields();
        if row.required_fields() < MIN_BUTTON_FIELDS {
            return Err(DeckError::MalformedRecord {
                populated,
                details: row.describe(),
            });
        }

        let coordinate = |value: Option<i64>, axis: &str| -> Result<i32> {
            value
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| DeckError::MalformedRecord {
                    populated,
                    details: format!("{}: {axis} out of range", row.describe()),
                })
        };

        Ok(Self {
            label: row.label.clone().unwrap_or_default(),
            x: coordinate(row.x, "x")?,
            y: coordinate(row.y, "y")?,
            background: row.background.clone().unwrap_or_default(),
            foreground: row.foreground.clone().unwrap_or_default(),
            action: row
                .action
                .as_deref()
                .filter(|a| !a.trim().is_empty())
                .map(str::to_string),
            image: row
                .image
                .as_deref()
                .filter(|i| !i.trim().is_empty())
                .map(ImageRef::parse),
            pages: row.pages.clone(),
        })
    }
}

// ──────────────────── snapshot ────────────────────

/// Page + buttons for one page number as of one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Page the fetch was for.
    pub page_number: u32,
    /// Page row, `None` when the store has none (defaults apply).
    pub page: Option<PageConfig>,
    /// Button rows on that page in store order, malformed ones included.
    pub buttons: Vec<ButtonRow>,
}

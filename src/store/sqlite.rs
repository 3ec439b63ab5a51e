//! SQLite-backed configuration store.
//!
//! The panel only reads. The authoring helpers at the bottom exist for `deckmaster
//! seed` and for tests; the admin form that normally edits these tables lives
//! elsewhere.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use crate::core::errors::{DeckError, Result};
use crate::store::ConfigStore;
use crate::store::model::{ButtonRow, PageConfig, PageSet, page_member};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS pages (
    page_number INTEGER PRIMARY KEY CHECK (page_number >= 1),
    web_url     TEXT,
    show_web    INTEGER NOT NULL DEFAULT 0,
    background  TEXT
);
CREATE TABLE IF NOT EXISTS buttons (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    label      TEXT,
    pos_x      INTEGER,
    pos_y      INTEGER,
    color_bg   TEXT,
    color_fg   TEXT,
    action     TEXT,
    image_path TEXT,
    pages      TEXT NOT NULL DEFAULT '1'
);
";

/// Read connection to the panel database.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open an existing database read-only. The schema must already exist.
    pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(conn, path, busy_timeout)
    }

    /// Open (or create) the database and apply the schema.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| DeckError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA)?;
        Self::configure(conn, path, busy_timeout)
    }

    /// In-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Self::configure(conn, Path::new(":memory:"), Duration::from_millis(0))
    }

    fn configure(conn: Connection, path: &Path, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)?;
        conn.create_scalar_function(
            "page_member",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            move |ctx| {
                let pages: String = ctx.get(0)?;
                let page: i64 = ctx.get(1)?;
                Ok(u32::try_from(page).is_ok_and(|page| page_member(&pages, page)))
            },
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ──────────────────── authoring ────────────────────

    /// Insert or replace a page row.
    pub fn upsert_page(&self, page: &PageConfig) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO pages (page_number, web_url, show_web, background)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(page_number) DO UPDATE SET
                    web_url = excluded.web_url,
                    show_web = excluded.show_web,
                    background = excluded.background",
            )?
            .execute(params![
                page.page_number,
                page.web_url,
                page.show_web,
                page.background,
            ])?;
        Ok(())
    }

    /// Insert a button row; `pages` is stored verbatim so both membership forms
    /// can be exercised. Returns the row id.
    pub fn insert_button(&self, row: &ButtonRow, pages: &str) -> Result<i64> {
        self.conn
            .prepare_cached(
                "INSERT INTO buttons (label, pos_x, pos_y, color_bg, color_fg, action, image_path, pages)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?
            .execute(params![
                row.label,
                row.x,
                row.y,
                row.background,
                row.foreground,
                row.action,
                row.image,
                pages,
            ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete a button row by id. Returns whether a row was removed.
    pub fn delete_button(&self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM buttons WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Replace a button's action expression.
    pub fn set_button_action(&self, id: i64, action: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE buttons SET action = ?1 WHERE id = ?2",
            params![action, id],
        )?;
        Ok(())
    }

    /// Number of pages with a descriptor row.
    pub fn page_count(&self) -> Result<u32> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ConfigStore for SqliteStore {
    fn fetch_page(&mut self, page: u32) -> Result<Option<PageConfig>> {
        let row = self
            .conn
            .prepare_cached(
                "SELECT page_number, web_url, show_web, background
                 FROM pages WHERE page_number = ?1",
            )?
            .query_row(params![page], |row| {
                Ok(PageConfig {
                    page_number: row.get(0)?,
                    web_url: row.get(1)?,
                    show_web: row.get::<_, Option<bool>>(2)?.unwrap_or(false),
                    background: row.get(3)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    fn fetch_buttons(&mut self, page: u32) -> Result<Vec<ButtonRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT label, pos_x, pos_y, color_bg, color_fg, action, image_path, pages
             FROM buttons
             WHERE page_member(pages, ?1)
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![page], |row| {
                let pages: Option<String> = row.get(7)?;
                Ok(ButtonRow {
                    label: row.get(0)?,
                    x: row.get(1)?,
                    y: row.get(2)?,
                    background: row.get(3)?,
                    foreground: row.get(4)?,
                    action: row.get(5)?,
                    image: row.get(6)?,
                    pages: pages.as_deref().map(PageSet::parse).unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

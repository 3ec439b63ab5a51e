//! Transient on-panel notices for recoverable errors.
//!
//! Every notice expires after the configured TTL regardless of level, so a
//! recurring failure cannot pin a message over the buttons. At most
//! `max_visible` notices are kept; pushing past that evicts the oldest.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::NoticeConfig;
use crate::core::errors::DeckError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    /// Level for a reported error: store trouble is a warning, the rest errors.
    #[must_use]
    pub const fn for_error(err: &DeckError) -> Self {
        if err.is_retryable() {
            Self::Warning
        } else {
            Self::Error
        }
    }
}

/// One toast.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Monotonic id.
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Debug)]
pub struct NoticeCenter {
    ttl: Duration,
    max_visible: usize,
    next_id: u64,
    active: Vec<Notice>,
}

impl NoticeCenter {
    #[must_use]
    pub fn new(config: &NoticeConfig) -> Self {
        Self {
            ttl: Duration::from_millis(config.ttl_ms.max(1)),
            max_visible: config.max_visible.max(1),
            next_id: 1,
            active: Vec::new(),
        }
    }

    /// Add a notice. A message identical to one already showing is not
    /// duplicated and does not extend the existing one's lifetime.
    ///
    /// Returns the id of the new notice, or `None` when deduplicated.
    pub fn push(
        &mut self,
        level: NoticeLevel,
        message: impl Into<String>,
        now: Instant,
    ) -> Option<u64> {
        let message = message.into();
        if self.active.iter().any(|n| n.message == message) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.active.push(Notice {
            id,
            level,
            message,
            expires_at: now + self.ttl,
        });
        while self.active.len() > self.max_visible {
            self.active.remove(0);
        }
        Some(id)
    }

    pub fn push_error(&mut self, err: &DeckError, now: Instant) -> Option<u64> {
        self.push(NoticeLevel::for_error(err), err.to_string(), now)
    }

    /// Drop expired notices. Returns whether anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.expires_at > now);
        self.active.len() != before
    }

    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        self.active.len() != before
    }

    /// Oldest first.
    #[must_use]
    pub fn visible(&self) -> &[Notice] {
        &self.active
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn center(ttl_ms: u64, max_visible: usize) -> NoticeCenter {
        NoticeCenter::new(&NoticeConfig { ttl_ms, max_visible })
    }

    #[test]
    fn push_evicts_oldest_past_capacity() {
        let now = Instant::now();
        let mut c = center(1_000, 3);
        for i in 0..5 {
            c.push(NoticeLevel::Info, format!("n{i}"), now);
        }
        let messages: Vec<_> = c.visible().iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["n2", "n3", "n4"]);
        assert_eq!(c.visible()[0].id, 3);
    }

    #[test]
    fn every_level_expires() {
        let now = Instant::now();
        let mut c = center(100, 3);
        c.push(NoticeLevel::Error, "db down", now);
        c.push(NoticeLevel::Warning, "slow", now);
        assert!(!c.expire(now + Duration::from_millis(99)));
        assert!(c.expire(now + Duration::from_millis(100)));
        assert!(c.is_empty());
    }

    #[test]
    fn duplicates_do_not_extend_lifetime() {
        let now = Instant::now();
        let mut c = center(100, 3);
        assert!(c.push(NoticeLevel::Error, "db down", now).is_some());
        assert!(
            c.push(NoticeLevel::Error, "db down", now + Duration::from_millis(50))
                .is_none()
        );
        assert!(c.expire(now + Duration::from_millis(100)));
        assert!(c.is_empty());
        assert!(c.push(NoticeLevel::Error, "db down", now + Duration::from_millis(150)).is_some());
    }

    #[test]
    fn dismiss_by_id() {
        let now = Instant::now();
        let mut c = center(1_000, 3);
        let id = c.push(NoticeLevel::Info, "a", now).unwrap();
        c.push(NoticeLevel::Info, "b", now);
        assert!(c.dismiss(id));
        assert!(!c.dismiss(id));
        assert_eq!(c.visible().len(), 1);
    }

    #[test]
    fn error_level_follows_retryability() {
        let conn = DeckError::Connectivity {
            context: "test",
            details: String::new(),
        };
        assert_eq!(NoticeLevel::for_error(&conn), NoticeLevel::Warning);
        let missing = DeckError::UnresolvedCommand {
            command: "x".to_string(),
        };
        assert_eq!(NoticeLevel::for_error(&missing), NoticeLevel::Error);
    }
}

//! Short-lived messages shown after a user-initiated action fails.
//!
//! Background tracking never produces notices; only assist calls do.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    /// How long a notice of this level stays visible.
    pub fn ttl(self) -> Duration {
        match self {
            Self::Info => Duration::from_secs(5),
            Self::Warning => Duration::from_secs(8),
            Self::Error => Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
    expires_at: Instant,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            body: body.into(),
            expires_at: Instant::now() + level.ttl(),
        }
    }

    /// Shown when an assist feature is throttled or out of quota.
    pub fn rate_limited(feature: &str) -> Self {
        Self::new(
            NoticeLevel::Warning,
            format!("{feature} is busy"),
            "Too many requests right now. Please try again in a moment.",
        )
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Bounded FIFO of notices; expired entries disappear on access.
#[derive(Debug)]
pub struct NoticeQueue {
    items: VecDeque<Notice>,
    capacity: usize,
}

impl NoticeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append `notice`, dropping the oldest entry when full.
    pub fn push(&mut self, notice: Notice) {
        self.items.retain(|n| !n.is_expired());
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(notice);
    }

    pub fn visible(&mut self) -> Vec<&Notice> {
        self.items.retain(|n| !n.is_expired());
        self.items.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for NoticeQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

use chrono::prelude::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::*;

pub const DEFAULT_CONSOLE_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ConsoleEntry {
    pub time: DateTime<Utc>,
    pub level: ConsoleLevel,
    pub message: String,
}

/// Operator facing message log. Keeps the newest `capacity` entries.
#[derive(Debug)]
pub struct Console {
    entries: VecDeque<ConsoleEntry>,
    capacity: usize,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}

impl Console {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, level: ConsoleLevel, message: impl Into<String>) -> ConsoleEntry {
        let message = message.into();
        match level {
            ConsoleLevel::Info => info!(console = true, "{}", message),
            ConsoleLevel::Warning => warn!(console = true, "{}", message),
            ConsoleLevel::Error => error!(console = true, "{}", message),
        }
        let entry = ConsoleEntry {
            time: Utc::now(),
            level,
            message,
        };
        self.entries.push_back(entry.clone());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        entry
    }

    pub fn entries(&self) -> Vec<ConsoleEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

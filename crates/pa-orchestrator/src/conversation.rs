//! Conversation log shown to the user

use serde::{Deserialize, Serialize};
use std::fmt;

use pa_core::time::current_time_millis;

/// Author of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the user
    User,
    /// Answer from the assistant server
    Assistant,
    /// Progress and lifecycle notes from the orchestrator
    System,
    /// Failures
    Error,
}

impl Role {
    /// Label shown in front of the entry text
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Assistant",
            Role::System => "System",
            Role::Error => "Error",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One timestamped, role-tagged line of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic id, unique for the lifetime of the log
    pub id: u64,
    /// Creation time in Unix milliseconds
    pub timestamp: u64,
    pub role: Role,
    pub text: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.text)
    }
}

/// Ordered conversation entries.
///
/// Append-only apart from [`ConversationLog::clear`], in-place growth of an
/// entry while a response streams in, and removal of an entry that never
/// received any text.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
    next_id: u64,
}

impl ConversationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its id
    pub fn push(&mut self, role: Role, text: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(LogEntry {
            id,
            timestamp: current_time_millis(),
            role,
            text: text.into(),
        });
        id
    }

    /// Append `chunk` to the entry with `id`.
    ///
    /// Returns false if the entry is no longer in the log.
    pub fn append_to(&mut self, id: u64, chunk: &str) -> bool {
        match self.find_mut(id) {
            Some(entry) => {
                entry.text.push_str(chunk);
                true
            }
            None => false,
        }
    }

    /// Replace the text of the entry with `id`
    pub fn set_text(&mut self, id: u64, text: impl Into<String>) -> bool {
        match self.find_mut(id) {
            Some(entry) => {
                entry.text = text.into();
                true
            }
            None => false,
        }
    }

    /// Remove the entry with `id` if its text is still empty
    pub fn remove_if_empty(&mut self, id: u64) -> bool {
        match self.entries.iter().rposition(|e| e.id == id) {
            Some(index) if self.entries[index].text.is_empty() => {
                self.entries.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Look up an entry by id
    pub fn get(&self, id: u64) -> Option<&LogEntry> {
        self.entries.iter().rev().find(|e| e.id == id)
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy of the current entries
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.clone()
    }

    /// Put `snapshot` back at the head of the log.
    ///
    /// Entries created after the snapshot was taken are kept, in order, after
    /// the restored ones; anything else currently in the log is replaced.
    pub fn restore(&mut self, snapshot: Vec<LogEntry>) {
        let watermark = snapshot.iter().map(|e| e.id).max();
        let newer = self
            .entries
            .drain(..)
            .filter(|e| watermark.map_or(true, |mark| e.id > mark));

        let mut restored = snapshot;
        restored.extend(newer);
        self.entries = restored;
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find_mut(&mut self, id: u64) -> Option<&mut LogEntry> {
        self.entries.iter_mut().rev().find(|e| e.id == id)
    }
}

//! Persisted conversation log.
//!
//! Exchanges live in one pretty-printed JSON array, oldest first. Each append
//! reads the file, adds the new exchange, drops the oldest entries beyond the
//! cap, and rewrites the whole file. A mutex serializes appends and clears
//! within the process.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{Exchange, SourceRef};

pub const DEFAULT_MAX_EXCHANGES: usize = 100;

pub struct ConversationLog {
    path: PathBuf,
    max_exchanges: usize,
    lock: Mutex<()>,
}

impl ConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_max_exchanges(path, DEFAULT_MAX_EXCHANGES)
    }

    pub fn with_max_exchanges(path: impl Into<PathBuf>, max_exchanges: usize) -> Self {
        Self {
            path: path.into(),
            max_exchanges: max_exchanges.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored exchange in chronological order.
    ///
    /// A missing file is an empty history. An unreadable or corrupt file is
    /// logged and also read as empty.
    pub fn read(&self) -> Vec<Exchange> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load()
    }

    /// Timestamp and append an exchange, evicting the oldest past the cap.
    pub fn append(&self, question: &str, answer: &str, sources: &[SourceRef]) -> Result<Exchange> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        let exchange = Exchange {
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: answer.to_string(),
            sources: sources.to_vec(),
        };

        let mut history = self.load();
        history.push(exchange.clone());
        if history.len() > self.max_exchanges {
            let excess = history.len() - self.max_exchanges;
            history.drain(..excess);
        }

        self.save(&history)?;
        Ok(exchange)
    }

    /// Delete the log file. Clearing an absent log succeeds.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "conversation history cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }

    fn load(&self) -> Vec<Exchange> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "error loading conversation history");
                return Vec::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "corrupt conversation history");
                Vec::new()
            }
        }
    }

    fn save(&self, history: &[Exchange]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(history)?;
        std::fs::write(&self.path, json).map_err(|e| Error::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;
    use tempfile::TempDir;

    fn source() -> SourceRef {
        SourceRef {
            content: "Iron melts at 1538 C.".to_string(),
            metadata: ChunkMetadata {
                source: "/d/metals.txt".to_string(),
                filename: "metals.txt".to_string(),
                file_type: ".txt".to_string(),
                chunk_index: 0,
                page: None,
            },
            index: 0,
            score: 0.9,
        }
    }

    #[test]
    fn missing_file_is_empty_history() {
        let tmp = TempDir::new().unwrap();
        let log = ConversationLog::new(tmp.path().join("history/chat.json"));
        assert!(log.read().is_empty());
        log.clear().unwrap();
    }

    #[test]
    fn append_persists_in_order_with_sources() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("history/chat.json");
        let log = ConversationLog::new(&path);
        log.append("first?", "one", &[source()]).unwrap();
        log.append("second?", "two", &[]).unwrap();

        let reopened = ConversationLog::new(&path);
        let history = reopened.read();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "first?");
        assert_eq!(history[0].sources, vec![source()]);
        assert_eq!(history[1].answer, "two");
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[test]
    fn cap_evicts_oldest_first() {
        let tmp = TempDir::new().unwrap();
        let log = ConversationLog::with_max_exchanges(tmp.path().join("chat.json"), 3);
        for i in 0..4 {
            log.append(&format!("q{}", i), &format!("a{}", i), &[]).unwrap();
        }
        let questions: Vec<String> = log.read().into_iter().map(|e| e.question).collect();
        assert_eq!(questions, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn clear_removes_file() {
        let tmp = TempDir::new().unwrap();
        let log = ConversationLog::new(tmp.path().join("chat.json"));
        log.append("q", "a", &[]).unwrap();
        assert!(log.path().exists());
        log.clear().unwrap();
        assert!(!log.path().exists());
        assert!(log.read().is_empty());
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.json");
        std::fs::write(&path, "{ not json").unwrap();
        let log = ConversationLog::new(&path);
        assert!(log.read().is_empty());
        log.append("q", "a", &[]).unwrap();
        assert_eq!(log.read().len(), 1);
    }

    #[test]
    fn file_is_a_pretty_json_array() {
        let tmp = TempDir::new().unwrap();
        let log = ConversationLog::new(tmp.path().join("chat.json"));
        log.append("q", "a", &[source()]).unwrap();
        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert!(raw.starts_with("[\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["question"], "q");
        assert_eq!(value[0]["sources"][0]["metadata"]["filename"], "metals.txt");
        assert!(value[0]["timestamp"].is_string());
    }
}

//! Accumulation of engine diagnostics.
//!
//! A running engine produces diagnostic text asynchronously into its
//! message buffer. [`MessageLog`] drains that buffer one message at a time
//! (bounding memory held inside the engine) and accumulates the text so it
//! can be inspected or cleared from the control thread at any time,
//! independent of whether a performance is active.

use std::sync::Mutex;

use crate::engine::Engine;

/// Thread-safe accumulator for engine diagnostic messages.
#[derive(Debug, Default)]
pub struct MessageLog {
    buf: Mutex<String>,
}

impl MessageLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every pending message from the engine's buffer into the log.
    ///
    /// Returns the text drained by this call, which reflects only events
    /// that happened strictly before the drain.
    pub fn drain_from(&self, engine: &dyn Engine) -> String {
        let mut drained = String::new();
        for _ in 0..engine.message_count() {
            match engine.pop_first_message() {
                Some(msg) => drained.push_str(&msg),
                None => break,
            }
        }
        if !drained.is_empty() {
            let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
            buf.push_str(&drained);
        }
        drained
    }

    /// Append text produced outside the engine buffer (e.g. session-level
    /// warnings that should be visible alongside engine output).
    pub fn append(&self, text: &str) {
        let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        buf.push_str(text);
    }

    /// The accumulated text.
    pub fn contents(&self) -> String {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Whether nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Discard the accumulated text.
    pub fn clear(&self) {
        self.buf.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct QueueEngine {
        queue: Mutex<VecDeque<String>>,
    }

    impl QueueEngine {
        fn with_messages(msgs: &[&str]) -> Self {
            Self {
                queue: Mutex::new(msgs.iter().map(|m| m.to_string()).collect()),
            }
        }
    }

    impl Engine for QueueEngine {
        fn message_count(&self) -> usize {
            self.queue.lock().unwrap().len()
        }
        fn pop_first_message(&self) -> Option<String> {
            self.queue.lock().unwrap().pop_front()
        }
    }

    #[test]
    fn test_drain_accumulates_in_order() {
        let engine = QueueEngine::with_messages(&["one\n", "two\n"]);
        let log = MessageLog::new();
        let drained = log.drain_from(&engine);
        assert_eq!(drained, "one\ntwo\n");
        assert_eq!(log.contents(), "one\ntwo\n");
        assert_eq!(engine.message_count(), 0);
    }

    #[test]
    fn test_drain_is_incremental() {
        let engine = QueueEngine::with_messages(&["first\n"]);
        let log = MessageLog::new();
        log.drain_from(&engine);
        engine.queue.lock().unwrap().push_back("second\n".to_string());
        log.drain_from(&engine);
        assert_eq!(log.contents(), "first\nsecond\n");
    }

    #[test]
    fn test_clear() {
        let log = MessageLog::new();
        log.append("warning\n");
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.contents(), "");
    }
}

//! Notification Transport
//!
//! The core only knows an opaque `send` capability; the Telegram (or any
//! other) transport lives outside this crate and implements [`Notifier`].
//! Messages longer than the transport budget are chunked here so callers
//! never have to think about it.

/// Transport message budget (characters)
pub const MESSAGE_BUDGET: usize = 4096;

/// Notification error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Send failed: {0}")]
    Send(String),
}

/// An outbound push-notification capability.
pub trait Notifier: Send + Sync {
    /// Deliver one message. Implementations may assume it fits the budget.
    fn send(&self, text: &str) -> Result<(), NotifyError>;

    /// Deliver a message of any length, chunked to the budget.
    fn send_chunked(&self, text: &str) -> Result<(), NotifyError> {
        for chunk in chunk_message(text, MESSAGE_BUDGET) {
            self.send(&chunk)?;
        }
        Ok(())
    }
}

/// Default transport: logs instead of sending. Used when no bot token is
/// configured and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "notify", "{}", text);
        Ok(())
    }
}

/// Split on line boundaries where possible, hard-split otherwise.
pub fn chunk_message(text: &str, budget: usize) -> Vec<String> {
    if text.chars().count() <= budget {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in text.split_inclusive('\n') {
        if current.chars().count() + line.chars().count() > budget {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            // A single oversized line gets hard-split
            let mut rest: Vec<char> = line.chars().collect();
            while rest.len() > budget {
                chunks.push(rest[..budget].iter().collect());
                rest = rest[budget..].to_vec();
            }
            current = rest.into_iter().collect();
        } else {
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_is_one_chunk() {
        assert_eq!(chunk_message("hello", MESSAGE_BUDGET), vec!["hello"]);
    }

    #[test]
    fn test_chunks_respect_budget() {
        let text = (0..200)
            .map(|i| format!("line number {i} with some padding text"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_message(&text, 500);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500);
        }
        // Nothing lost
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_oversized_single_line_hard_split() {
        let text = "x".repeat(1200);
        let chunks = chunk_message(&text, 500);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
    }
}

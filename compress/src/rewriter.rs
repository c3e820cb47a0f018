//! Selective compression of chat messages.
//!
//! Only user messages with plain-string content are compressed. System and
//! assistant messages, tool results, multimodal parts and anything malformed
//! pass through verbatim, and the sequence keeps its length and order.

use shrinkwrap_types::{ChatMessage, ChatPayload, Retention};

use crate::compressor::{AUDIT_TARGET, Compressor, Outcome};
use crate::tokenizer::Tokenizer;

/// Counters for one rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// User text messages handed to the compressor.
    pub processed: usize,
    /// Messages whose text actually changed.
    pub shortened: usize,
}

impl RewriteStats {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.shortened > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub messages: Vec<ChatMessage>,
    pub stats: RewriteStats,
}

#[derive(Debug, Clone)]
pub struct Rewriter<T> {
    compressor: Compressor<T>,
}

impl<T: Tokenizer> Rewriter<T> {
    #[must_use]
    pub fn new(compressor: Compressor<T>) -> Self {
        Self { compressor }
    }

    #[must_use]
    pub fn compressor(&self) -> &Compressor<T> {
        &self.compressor
    }

    /// Compress the text of every user message, leaving everything else as-is.
    #[must_use]
    pub fn rewrite(&self, messages: Vec<ChatMessage>, retention: impl Into<Retention>) -> Rewrite {
        let retention = retention.into();
        if retention.is_full() {
            return Rewrite {
                messages,
                stats: RewriteStats::default(),
            };
        }

        let mut stats = RewriteStats::default();
        let mut rewritten = Vec::with_capacity(messages.len());

        for (position, mut message) in messages.into_iter().enumerate() {
            if let Some(text) = message.user_text() {
                stats.processed += 1;
                tracing::info!(
                    target: AUDIT_TARGET,
                    ordinal = stats.processed,
                    position,
                    "Compressing user message #{} (position {position})",
                    stats.processed
                );
                if let Outcome::Compressed { text, .. } =
                    self.compressor.compress_outcome(text, retention)
                {
                    message.set_text(text);
                    stats.shortened += 1;
                }
            }
            rewritten.push(message);
        }

        if stats.processed > 0 {
            tracing::info!(
                target: AUDIT_TARGET,
                processed = stats.processed,
                shortened = stats.shortened,
                "Compression summary: processed {} user messages",
                stats.processed
            );
        }

        Rewrite {
            messages: rewritten,
            stats,
        }
    }

    /// Rewrite a parsed request body in place. Fields other than `messages`
    /// are untouched.
    pub fn rewrite_payload(
        &self,
        payload: &mut ChatPayload,
        retention: impl Into<Retention>,
    ) -> RewriteStats {
        let retention = retention.into();
        if retention.is_full() {
            return RewriteStats::default();
        }
        let messages = payload.replace_messages(Vec::new());
        let Rewrite { messages, stats } = self.rewrite(messages, retention);
        payload.replace_messages(messages);
        stats
    }
}

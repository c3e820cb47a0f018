//! Token-budgeted lossy compression.
//!
//! Given a [`Retention`], the compressor tokenizes the text, drops a uniformly
//! random set of `floor(n * (1 - fraction))` token positions, and decodes what
//! is left in its original order. It never fails: tokenizer errors and
//! degenerate output fall back to the original text, and the typed
//! [`Outcome`] records which path was taken.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use shrinkwrap_types::{Retention, TokenId};

use crate::tokenizer::{Tokenizer, TokenizerError};

/// Tracing target for compression audit records.
pub const AUDIT_TARGET: &str = "shrinkwrap::compression";

/// Where the drop-position sampler gets its randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedSource {
    /// Thread-local OS-seeded generator; calls are independent.
    #[default]
    Entropy,
    /// Every call starts from a generator seeded with this value, so the same
    /// text and retention always drop the same positions.
    Fixed(u64),
}

/// Why a text was returned without attempting compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Retention keeps every token. The tokenizer is not consulted.
    FullRetention,
    /// The text encodes to zero tokens.
    NoTokens,
    /// Rounding leaves nothing to drop.
    NothingToDrop,
}

/// Why a compression attempt was discarded in favor of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    Tokenizer(TokenizerError),
    /// The output was empty or whitespace-only while the input was not.
    DegenerateOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged(Skip),
    Compressed {
        text: String,
        original_tokens: usize,
        kept_tokens: usize,
    },
    Fallback(Fallback),
}

impl Outcome {
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        matches!(self, Outcome::Compressed { .. })
    }

    /// The text to forward: the compressed output, or `original` for every
    /// other outcome.
    #[must_use]
    pub fn text<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            Outcome::Compressed { text, .. } => text,
            Outcome::Unchanged(_) | Outcome::Fallback(_) => original,
        }
    }

    #[must_use]
    pub fn into_text(self, original: &str) -> String {
        match self {
            Outcome::Compressed { text, .. } => text,
            Outcome::Unchanged(_) | Outcome::Fallback(_) => original.to_string(),
        }
    }
}

/// Drops random tokens from text to meet a retention budget.
///
/// Stateless between calls and `Sync`, so one instance can serve every
/// request concurrently.
#[derive(Debug, Clone)]
pub struct Compressor<T> {
    tokenizer: T,
    seed: SeedSource,
}

impl<T: Tokenizer> Compressor<T> {
    #[must_use]
    pub fn new(tokenizer: T) -> Self {
        Self {
            tokenizer,
            seed: SeedSource::Entropy,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: SeedSource) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    #[must_use]
    pub fn seed(&self) -> SeedSource {
        self.seed
    }

    /// Compress `text`, returning the original on any skip or fallback.
    #[must_use]
    pub fn compress(&self, text: &str, retention: impl Into<Retention>) -> String {
        self.compress_outcome(text, retention).into_text(text)
    }

    /// Compress `text` using the configured [`SeedSource`].
    #[must_use]
    pub fn compress_outcome(&self, text: &str, retention: impl Into<Retention>) -> Outcome {
        let retention = retention.into();
        if retention.is_full() {
            return Outcome::Unchanged(Skip::FullRetention);
        }
        match self.seed {
            SeedSource::Entropy => self.compress_with_rng(text, retention, &mut rand::rng()),
            SeedSource::Fixed(seed) => {
                self.compress_with_rng(text, retention, &mut StdRng::seed_from_u64(seed))
            }
        }
    }

    /// Compress `text`, drawing drop positions from `rng`.
    pub fn compress_with_rng<R: Rng + ?Sized>(
        &self,
        text: &str,
        retention: Retention,
        rng: &mut R,
    ) -> Outcome {
        if retention.is_full() {
            return Outcome::Unchanged(Skip::FullRetention);
        }

        let tokens = match self.tokenizer.encode(text) {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(
                    tokenizer = self.tokenizer.name(),
                    "Compression failed: {e}, returning original text"
                );
                return Outcome::Fallback(Fallback::Tokenizer(e));
            }
        };

        let original_tokens = tokens.len();
        if original_tokens == 0 {
            return Outcome::Unchanged(Skip::NoTokens);
        }

        let drop_count = retention.tokens_to_drop(original_tokens);
        if drop_count == 0 {
            return Outcome::Unchanged(Skip::NothingToDrop);
        }

        let kept = retain_unsampled(&tokens, drop_count, rng);
        let compressed = match self.tokenizer.decode(&kept) {
            Ok(compressed) => compressed,
            Err(e) => {
                tracing::warn!(
                    tokenizer = self.tokenizer.name(),
                    "Compression failed: {e}, returning original text"
                );
                return Outcome::Fallback(Fallback::Tokenizer(e));
            }
        };

        if compressed.trim().is_empty() && !text.trim().is_empty() {
            tracing::warn!("Compression resulted in empty text, returning original");
            return Outcome::Fallback(Fallback::DegenerateOutput);
        }

        let kept_tokens = kept.len();
        let removed_percent = 100.0 * drop_count as f64 / original_tokens as f64;
        tracing::info!(
            target: AUDIT_TARGET,
            fraction = retention.fraction(),
            ratio = retention.ratio(),
            original_tokens,
            kept_tokens,
            removed_tokens = drop_count,
            removed_percent,
            before = text,
            after = compressed.as_str(),
            "Compression applied: {original_tokens} -> {kept_tokens} tokens"
        );

        Outcome::Compressed {
            text: compressed,
            original_tokens,
            kept_tokens,
        }
    }
}

/// Remove `drop_count` distinct, uniformly chosen positions, keeping the rest
/// in their original order.
fn retain_unsampled<R: Rng + ?Sized>(
    tokens: &[TokenId],
    drop_count: usize,
    rng: &mut R,
) -> Vec<TokenId> {
    let mut dropped = vec![false; tokens.len()];
    for position in index::sample(rng, tokens.len(), drop_count).into_iter() {
        dropped[position] = true;
    }
    tokens
        .iter()
        .zip(dropped)
        .filter_map(|(&token, drop)| (!drop).then_some(token))
        .collect()
}

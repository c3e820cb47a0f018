//! Tokenizer adapters.
//!
//! The compressor only needs two operations from a vocabulary: turn text into
//! an ordered sequence of [`TokenId`]s and turn any subsequence of that back
//! into text. [`Tokenizer`] captures that contract; [`BpeTokenizer`] is the
//! reference implementation backed by tiktoken's byte-pair vocabularies.
//!
//! - **`cl100k_base`** (default): the GPT-3.5 / GPT-4 vocabulary.
//! - **`o200k_base`**: the GPT-4o and later vocabulary.
//!
//! Dropping arbitrary tokens can split a multi-byte character across a gap.
//! The orphaned bytes decode to U+FFFD, so any subsequence of an encoded
//! sequence decodes. [`TokenizerError::Decode`] is reserved for ids outside
//! the vocabulary.

use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};

use shrinkwrap_types::TokenId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("{0} vocabulary failed to load")]
    Unavailable(Encoding),
    #[error("failed to encode text: {0}")]
    Encode(String),
    #[error("failed to decode tokens: {0}")]
    Decode(String),
}

/// Text segmentation contract used by the compressor.
///
/// `decode` must accept any subsequence of a sequence produced by `encode`,
/// including the empty one.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError>;
    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError>;
    fn name(&self) -> &str;
}

impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        (**self).encode(text)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        (**self).decode(tokens)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Tokenizer + ?Sized> Tokenizer for Arc<T> {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        (**self).encode(text)
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        (**self).decode(tokens)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Byte-pair vocabularies shipped with tiktoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Cl100kBase,
    O200kBase,
}

impl Encoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::O200kBase => "o200k_base",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cl100k_base" | "cl100k" => Some(Encoding::Cl100kBase),
            "o200k_base" | "o200k" => Some(Encoding::O200kBase),
            _ => None,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vocabularies are expensive to build (they load and index the merge table),
/// so each is built at most once per process and shared read-only.
static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn shared_encoder(encoding: Encoding) -> Option<&'static CoreBPE> {
    match encoding {
        Encoding::Cl100kBase => CL100K.get_or_init(|| cl100k_base().ok()).as_ref(),
        Encoding::O200kBase => O200K.get_or_init(|| o200k_base().ok()).as_ref(),
    }
}

/// tiktoken-backed [`Tokenizer`].
///
/// Cheap to copy; all instances for the same encoding share one vocabulary.
#[derive(Clone, Copy)]
pub struct BpeTokenizer {
    encoding: Encoding,
    bpe: &'static CoreBPE,
}

impl fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpeTokenizer")
            .field("encoding", &self.encoding)
            .field("bpe", &"<CoreBPE>")
            .finish()
    }
}

impl BpeTokenizer {
    pub fn new(encoding: Encoding) -> Result<Self, TokenizerError> {
        match shared_encoder(encoding) {
            Some(bpe) => Ok(Self { encoding, bpe }),
            None => {
                tracing::error!(%encoding, "Failed to initialize tiktoken encoder");
                Err(TokenizerError::Unavailable(encoding))
            }
        }
    }

    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Token count of `text`, without keeping the tokens around.
    #[must_use]
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        // Special-token markers like `<|endoftext|>` are treated as plain text.
        Ok(self.bpe.encode_ordinary(text))
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        if tokens.is_empty() {
            return Ok(String::new());
        }
        self.bpe
            .decode_bytes(tokens)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .map_err(|e| TokenizerError::Decode(e.to_string()))
    }

    fn name(&self) -> &str {
        self.encoding.as_str()
    }
}

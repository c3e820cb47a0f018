//! Token-budgeted lossy compression for chat prompts.
//!
//! # Architecture
//!
//! ```text
//! Rewriter
//! └── compressor: Compressor
//!     ├── tokenizer: impl Tokenizer (BpeTokenizer over tiktoken)
//!     └── seed: SeedSource (entropy or fixed)
//! ```
//!
//! [`Compressor`] shrinks one text to a [`Retention`](shrinkwrap_types::Retention)
//! budget by dropping random tokens. [`Rewriter`] applies it to the user
//! messages of a chat payload and leaves every other message untouched.
//!
//! Both are fail-open: no input makes them return an error or panic. When
//! something goes wrong the original text is kept and the reason is reported
//! through [`Outcome`].

mod compressor;
mod rewriter;
mod tokenizer;

pub use compressor::{AUDIT_TARGET, Compressor, Fallback, Outcome, SeedSource, Skip};
pub use rewriter::{Rewrite, RewriteStats, Rewriter};
pub use tokenizer::{BpeTokenizer, Encoding, Tokenizer, TokenizerError};

pub use shrinkwrap_types;

//! `shrinkwrap preview`: show what a prompt looks like at several retention
//! levels without running the proxy.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use shrinkwrap_compress::shrinkwrap_types::Retention;
use shrinkwrap_compress::{BpeTokenizer, Compressor, Encoding, Outcome, SeedSource, Tokenizer};

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Fraction of tokens to keep. Repeat for several levels; defaults to a
    /// sweep from 1.0 down to 0.1.
    #[arg(long = "keep", value_name = "FRACTION")]
    pub keep: Vec<f64>,

    /// Fixed sampler seed for reproducible output.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Tokenizer vocabulary.
    #[arg(long, default_value = "cl100k_base", value_parser = parse_encoding)]
    pub encoding: Encoding,

    /// Read the prompt from this file instead of stdin.
    pub file: Option<PathBuf>,
}

fn parse_encoding(raw: &str) -> Result<Encoding, String> {
    Encoding::parse(raw).ok_or_else(|| format!("unknown encoding {raw:?}"))
}

/// 1.0, 0.9, ..., 0.1
#[must_use]
pub fn default_sweep() -> Vec<f64> {
    (1..=10).rev().map(|tenths| f64::from(tenths) / 10.0).collect()
}

pub fn run(args: PreviewArgs) -> Result<()> {
    let text = match &args.file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read prompt from stdin")?;
            buf
        }
    };

    let levels = if args.keep.is_empty() {
        default_sweep()
    } else {
        args.keep.clone()
    };
    let retentions = levels
        .into_iter()
        .map(|keep| Retention::from_fraction(keep).with_context(|| format!("--keep {keep}")))
        .collect::<Result<Vec<_>>>()?;

    let tokenizer = BpeTokenizer::new(args.encoding)?;
    let seed = args.seed.map_or(SeedSource::Entropy, SeedSource::Fixed);
    let compressor = Compressor::new(tokenizer).with_seed(seed);

    print!("{}", render(&compressor, &text, &retentions)?);
    Ok(())
}

/// One block per retention level: a header with token counts, then the text.
pub fn render<T: Tokenizer>(
    compressor: &Compressor<T>,
    text: &str,
    retentions: &[Retention],
) -> Result<String> {
    let total = compressor.tokenizer().encode(text)?.len();
    let mut out = String::new();

    for &retention in retentions {
        let outcome = compressor.compress_outcome(text, retention);
        let kept = match &outcome {
            Outcome::Compressed { kept_tokens, .. } => *kept_tokens,
            Outcome::Unchanged(_) | Outcome::Fallback(_) => total,
        };
        let _ = writeln!(
            out,
            "=== keep {:.2}: {kept}/{total} tokens ===",
            retention.fraction()
        );
        let _ = writeln!(out, "{}\n", outcome.text(text));
    }

    Ok(out)
}

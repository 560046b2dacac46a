//! Token counting and estimation.
//!
//! Token counts drive every budget decision in the chunker, but exact
//! subword counting is optional: with the `tokenizer` feature enabled and a
//! working encoder, `count` is exact; in every other case it degrades
//! silently to the character-ratio approximation. Estimation never fails.

use crate::config::ChunkingConfig;

/// Estimates or counts tokens in a text span.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    chars_per_token: f64,
    use_tokenizer: bool,
}

impl TokenEstimator {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chars_per_token: config.chars_per_token,
            use_tokenizer: config.use_tokenizer,
        }
    }

    /// Build an estimator with an explicit ratio and no exact counting.
    pub fn approximate(chars_per_token: f64) -> Self {
        Self {
            chars_per_token,
            use_tokenizer: false,
        }
    }

    /// Approximation ratio in use.
    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Count tokens, exactly when an encoder is available, approximately
    /// otherwise.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        if self.use_tokenizer {
            if let Some(exact) = exact_count(text) {
                return exact;
            }
        }
        self.estimate_fast(text)
    }

    /// Fast ratio-based estimate, used for threshold checks where invoking
    /// an exact encoder would be wasteful.
    pub fn estimate_fast(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() as f64 / self.chars_per_token) as usize
    }

    /// Whether a text is long enough to warrant chunked processing.
    pub fn needs_chunking(&self, text: &str, threshold: usize) -> bool {
        self.estimate_fast(text) > threshold
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(&ChunkingConfig::default())
    }
}

#[cfg(feature = "tokenizer")]
fn exact_count(text: &str) -> Option<usize> {
    use std::sync::OnceLock;
    use tiktoken_rs::CoreBPE;

    // Encoder construction is expensive and can fail; try once, then stick
    // with the outcome for the process lifetime.
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    let encoder = ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().ok());
    encoder
        .as_ref()
        .map(|bpe| bpe.encode_with_special_tokens(text).len())
}

#[cfg(not(feature = "tokenizer"))]
fn exact_count(_text: &str) -> Option<usize> {
    None
}

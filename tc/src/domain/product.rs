//! Product descriptor parsing
//!
//! A raw product string is classified as a direct link, a direct variant
//! code, or a keyword expression of positive and negative terms.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("valid url regex"));

static VARIANT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid variant regex"));

static KEYWORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\w[\w'&./-]*$").expect("valid keyword regex"));

/// Raised when a raw product string cannot be classified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductParseError {
    #[error("Product is empty")]
    Empty,

    #[error("Invalid keyword token: '{0}'")]
    InvalidToken(String),
}

/// Parsed product descriptor, always carrying the original raw string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProductDescriptor {
    Url {
        raw: String,
        url: String,
    },
    Variant {
        raw: String,
        variant: String,
    },
    Keywords {
        raw: String,
        positive: Vec<String>,
        negative: Vec<String>,
    },
}

impl ProductDescriptor {
    /// Classify a raw product string
    pub fn parse(raw: &str) -> Result<Self, ProductParseError> {
        debug!(%raw, "ProductDescriptor::parse: called");
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            debug!("ProductDescriptor::parse: empty input");
            return Err(ProductParseError::Empty);
        }

        if URL_PATTERN.is_match(trimmed) {
            debug!("ProductDescriptor::parse: direct link");
            return Ok(Self::Url {
                raw: raw.to_string(),
                url: trimmed.to_string(),
            });
        }

        if VARIANT_PATTERN.is_match(trimmed) {
            debug!("ProductDescriptor::parse: variant code");
            return Ok(Self::Variant {
                raw: raw.to_string(),
                variant: trimmed.to_string(),
            });
        }

        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for token in trimmed.split(',').flat_map(str::split_whitespace) {
            if !KEYWORD_PATTERN.is_match(token) {
                debug!(%token, "ProductDescriptor::parse: token rejected");
                return Err(ProductParseError::InvalidToken(token.to_string()));
            }
            match token.strip_prefix('-') {
                Some(term) => negative.push(term.to_string()),
                None => positive.push(token.trim_start_matches('+').to_string()),
            }
        }

        if positive.is_empty() && negative.is_empty() {
            debug!("ProductDescriptor::parse: no keyword tokens");
            return Err(ProductParseError::Empty);
        }

        debug!(?positive, ?negative, "ProductDescriptor::parse: keywords");
        Ok(Self::Keywords {
            raw: raw.to_string(),
            positive,
            negative,
        })
    }

    /// The string this descriptor was parsed from
    pub fn raw(&self) -> &str {
        match self {
            Self::Url { raw, .. } | Self::Variant { raw, .. } | Self::Keywords { raw, .. } => raw,
        }
    }
}

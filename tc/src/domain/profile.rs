//! Profile domain types
//!
//! A Profile is a reusable checkout identity plus the shipping-rate quotes
//! cached for it, grouped per site.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A site that shipping rates were fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub url: String,
}

impl Site {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A single shipping-rate quote; identity is `rate_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub name: String,
    pub price: String,
    pub rate_id: String,
}

impl RateQuote {
    pub fn new(name: impl Into<String>, price: impl Into<String>, rate_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            rate_id: rate_id.into(),
        }
    }
}

/// Rate quotes fetched for one profile at one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateGroup {
    pub site: Site,
    pub rates: Vec<RateQuote>,
    pub selected_rate: Option<RateQuote>,
}

impl RateGroup {
    pub fn find(&self, rate_id: &str) -> Option<&RateQuote> {
        self.rates.iter().find(|r| r.rate_id == rate_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Location {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub apt: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub zip_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Payment {
    pub email: String,
    pub card_number: String,
    pub exp: String,
    pub cvv: String,
}

/// Checkout identity with per-site rate groups
///
/// `rates` is keyed by `site.url`, so a profile holds at most one group per site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shipping: Location,
    #[serde(default)]
    pub billing: Location,
    #[serde(default)]
    pub billing_matches_shipping: bool,
    #[serde(default)]
    pub payment: Payment,
    #[serde(default)]
    pub rates: IndexMap<String, RateGroup>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Rate group for a site, if one was fetched
    pub fn rate_group(&self, site_url: &str) -> Option<&RateGroup> {
        self.rates.get(site_url)
    }
}

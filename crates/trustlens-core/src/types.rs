//! Shared identifier types used across Trustlens.
//!
//! These newtypes give scrape targets a validated, hashable identity so the
//! scheduler can key its in-flight registry on them.

use crate::error::TrustlensError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Newtype for product identifiers with validation.
///
/// Product IDs are 10 uppercase alphanumeric characters (e.g. `B0C1234XYZ`).
/// Lowercase input is accepted and normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(String);

impl ProductId {
    /// Create a new `ProductId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is not 10 alphanumeric characters.
    pub fn new(id: impl Into<String>) -> Result<Self, TrustlensError> {
        let id = id.into().trim().to_ascii_uppercase();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), TrustlensError> {
        static PRODUCT_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            PRODUCT_REGEX.get_or_init(|| Regex::new(r"^[A-Z0-9]{10}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(TrustlensError::Validation(format!(
                "invalid product ID: must be 10 alphanumeric characters, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storefront locale a product page is served from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    /// amazon.co.jp
    #[default]
    Jp,
    /// amazon.com
    Us,
    /// amazon.co.uk
    Uk,
    /// amazon.de
    De,
    /// amazon.fr
    Fr,
    /// amazon.ca
    Ca,
}

impl Marketplace {
    /// All supported marketplaces.
    pub const ALL: [Marketplace; 6] = [
        Self::Jp,
        Self::Us,
        Self::Uk,
        Self::De,
        Self::Fr,
        Self::Ca,
    ];

    /// Short lowercase code used in config keys and target strings.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Jp => "jp",
            Self::Us => "us",
            Self::Uk => "uk",
            Self::De => "de",
            Self::Fr => "fr",
            Self::Ca => "ca",
        }
    }

    /// Storefront host name.
    #[must_use]
    pub fn host(&self) -> &'static str {
        match self {
            Self::Jp => "www.amazon.co.jp",
            Self::Us => "www.amazon.com",
            Self::Uk => "www.amazon.co.uk",
            Self::De => "www.amazon.de",
            Self::Fr => "www.amazon.fr",
            Self::Ca => "www.amazon.ca",
        }
    }

    /// Default storefront base URL (scheme and host, no trailing slash).
    #[must_use]
    pub fn default_base_url(&self) -> String {
        format!("https://{}", self.host())
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code().to_ascii_uppercase())
    }
}

impl FromStr for Marketplace {
    type Err = TrustlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.code() == code || (code == "gb" && *m == Self::Uk))
            .ok_or_else(|| TrustlensError::Validation(format!("unknown marketplace '{s}'")))
    }
}

/// One review page to scrape: a product in a given marketplace.
///
/// Immutable once created; used as the deduplication key for in-flight scrapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    product_id: ProductId,
    marketplace: Marketplace,
}

impl Target {
    /// Create a target.
    #[must_use]
    pub fn new(product_id: ProductId, marketplace: Marketplace) -> Self {
        Self {
            product_id,
            marketplace,
        }
    }

    /// Parse `MARKETPLACE:PRODUCT_ID`, or a bare product ID using `default_marketplace`.
    ///
    /// # Errors
    /// Returns error if either part is invalid.
    pub fn parse_with_default(
        s: &str,
        default_marketplace: Marketplace,
    ) -> Result<Self, TrustlensError> {
        match s.trim().split_once(':') {
            Some((market, id)) => Ok(Self::new(ProductId::new(id)?, market.parse()?)),
            None => Ok(Self::new(ProductId::new(s)?, default_marketplace)),
        }
    }

    /// The product identifier.
    #[must_use]
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// The marketplace the product is listed in.
    #[must_use]
    pub fn marketplace(&self) -> Marketplace {
        self.marketplace
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.marketplace, self.product_id)
    }
}

impl FromStr for Target {
    type Err = TrustlensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, Marketplace::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_valid() {
        let id = ProductId::new("b0c1234xyz").expect("valid product ID");
        assert_eq!(id.as_str(), "B0C1234XYZ");
        assert!(ProductId::new(" 4065123456 ").is_ok());
    }

    #[test]
    fn test_product_id_invalid() {
        let invalid_ids = vec!["", "B0C123", "B0C1234XYZ1", "B0C-234XYZ", "B0C 234XYZ"];

        for id in invalid_ids {
            assert!(ProductId::new(id).is_err(), "Should fail for: {id}");
        }
    }

    #[test]
    fn test_marketplace_parse() {
        assert_eq!("jp".parse::<Marketplace>().expect("jp"), Marketplace::Jp);
        assert_eq!("US".parse::<Marketplace>().expect("US"), Marketplace::Us);
        assert_eq!("gb".parse::<Marketplace>().expect("gb"), Marketplace::Uk);
        assert!("xx".parse::<Marketplace>().is_err());
    }

    #[test]
    fn test_marketplace_base_url() {
        assert_eq!(
            Marketplace::Jp.default_base_url(),
            "https://www.amazon.co.jp"
        );
        assert_eq!(Marketplace::Us.host(), "www.amazon.com");
    }

    #[test]
    fn test_target_parse() {
        let target: Target = "us:B0C1234XYZ".parse().expect("parse target");
        assert_eq!(target.marketplace(), Marketplace::Us);
        assert_eq!(target.product_id().as_str(), "B0C1234XYZ");
        assert_eq!(target.to_string(), "US:B0C1234XYZ");

        let bare = Target::parse_with_default("B0C1234XYZ", Marketplace::De).expect("bare id");
        assert_eq!(bare.marketplace(), Marketplace::De);
    }

    #[test]
    fn test_target_equality_is_by_value() {
        let a: Target = "jp:B0C1234XYZ".parse().expect("a");
        let b = Target::parse_with_default("b0c1234xyz", Marketplace::Jp).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_marketplace_serialization() {
        let json = serde_json::to_string(&Marketplace::Uk).expect("serialize marketplace");
        assert_eq!(json, "\"uk\"");
    }
}

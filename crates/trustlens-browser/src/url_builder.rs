use std::collections::BTreeMap;
use trustlens_core::{Marketplace, ScrapingConfig, Target};
use url::Url;

/// Builds review-page URLs per marketplace.
#[derive(Debug, Clone)]
pub struct ReviewUrlBuilder {
    base_urls: BTreeMap<Marketplace, String>,
}

impl ReviewUrlBuilder {
    pub fn new(config: &ScrapingConfig) -> Self {
        let base_urls = Marketplace::ALL
            .into_iter()
            .map(|market| (market, config.base_url(market)))
            .collect();
        Self { base_urls }
    }

    /// Storefront home for a marketplace.
    pub fn home_url(&self, marketplace: Marketplace) -> String {
        self.base_urls
            .get(&marketplace)
            .cloned()
            .unwrap_or_else(|| marketplace.default_base_url())
    }

    /// First page of all reviews for a target, newest first.
    pub fn review_url(&self, target: &Target) -> String {
        let base = self.home_url(target.marketplace());
        let raw = format!("{base}/product-reviews/{}/", target.product_id());

        match Url::parse(&raw) {
            Ok(mut url) => {
                {
                    let mut query = url.query_pairs_mut();
                    query
                        .append_pair("reviewerType", "all_reviews")
                        .append_pair("sortBy", "recent")
                        .append_pair("pageNumber", "1");
                    if target.marketplace() == Marketplace::Jp {
                        query.append_pair("language", "ja_JP");
                    }
                }
                url.into()
            }
            // A broken base override still yields something the fetcher can report on
            Err(e) => {
                tracing::warn!("Invalid review base URL {}: {}", base, e);
                raw
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(s: &str) -> Target {
        s.parse().expect("valid target")
    }

    #[test]
    fn test_review_url_jp() {
        let builder = ReviewUrlBuilder::new(&ScrapingConfig::default());
        assert_eq!(
            builder.review_url(&target("jp:B0C1234XYZ")),
            "https://www.amazon.co.jp/product-reviews/B0C1234XYZ/?reviewerType=all_reviews&sortBy=recent&pageNumber=1&language=ja_JP"
        );
    }

    #[test]
    fn test_review_url_override() {
        let mut config = ScrapingConfig::default();
        config
            .base_urls
            .insert("us".to_string(), "http://127.0.0.1:9000/".to_string());
        let builder = ReviewUrlBuilder::new(&config);

        let url = builder.review_url(&target("us:B0C1234XYZ"));
        assert!(url.starts_with("http://127.0.0.1:9000/product-reviews/B0C1234XYZ/?"));
        assert!(!url.contains("language="));
        assert_eq!(builder.home_url(Marketplace::Us), "http://127.0.0.1:9000");
    }
}

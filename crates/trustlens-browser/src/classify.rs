//! Pure classification of loaded pages.
//!
//! Works on the final URL and markup only, so every rule is unit-testable
//! without a browser.
//!
//! Block and sign-in markers are matched against the whole page only when it
//! carries no review structure. On a review page they are matched against the
//! title, headings and forms, so review bodies quoting an error message do
//! not turn a good page into a block.

use crate::fetcher::FetchOutcome;
use scraper::{Html, Selector};

/// URL fragments of the sign-in flow.
const SIGN_IN_URL_TOKENS: [&str; 2] = ["/ap/signin", "/ax/claim"];

/// URL fragments of account challenge pages.
pub const CHALLENGE_URL_TOKENS: [&str; 7] = [
    "/ap/cvf",
    "/ap/challenge",
    "/challenge/",
    "captcha",
    "/cvf/handle",
    "/ap/regchallenge",
    "aiv-auth-mfa",
];

/// Markup fragments that only appear on a sign-in form.
const SIGN_IN_MARKERS: [&str; 3] = [r#"name="signin""#, r#"id="ap_email""#, "ap_email_login"];

/// Markup fragments of robot-check pages.
const ROBOT_CHECK_MARKERS: [&str; 5] = [
    "/errors/validatecaptcha",
    "captchacharacters",
    "type the characters you see",
    "robot check",
    "表示されている文字を入力してください",
];

/// Markup fragments of the automated-access block page.
const AUTOMATED_ACCESS_MARKERS: [&str; 2] = [
    "api-services-support@amazon.com",
    "to discuss automated access",
];

/// Markup fragments of overload and rate-limit pages.
const RATE_LIMIT_MARKERS: [&str; 4] = [
    "too many requests",
    "503 - service unavailable",
    "sorry! something went wrong",
    "ご迷惑をおかけしています",
];

/// Elements present on review pages, including ones with zero reviews.
const REVIEW_STRUCTURE: &str = "[data-hook='review'], #cm_cr-review_list, #histogramTable, \
    [data-hook='histogram-table'], [data-hook='total-review-count'], [data-hook='cr-no-reviews']";

/// Parts of a review page where a block or sign-in notice would appear.
const PAGE_CHROME: &str = "title, h1, h2, h4, form";

/// Anything shorter is treated as an empty document.
const MIN_MARKUP_LEN: usize = 200;

/// Classify a page the browser finished loading.
pub fn classify_response(final_url: &str, markup: &str) -> FetchOutcome {
    let url = final_url.to_ascii_lowercase();

    if url.starts_with("chrome-error://") {
        return FetchOutcome::HardFailure("browser network error page".to_string());
    }
    if SIGN_IN_URL_TOKENS.iter().any(|t| url.contains(t)) {
        return FetchOutcome::AuthRequired;
    }
    if CHALLENGE_URL_TOKENS.iter().any(|t| url.contains(t)) {
        return FetchOutcome::SoftBlock("account challenge page".to_string());
    }

    let lower = marker_scope(markup).to_lowercase();
    if let Some(reason) = soft_block_reason(&lower) {
        return FetchOutcome::SoftBlock(reason.to_string());
    }
    if SIGN_IN_MARKERS.iter().any(|m| lower.contains(m)) {
        return FetchOutcome::AuthRequired;
    }
    if markup.trim().len() < MIN_MARKUP_LEN {
        return FetchOutcome::HardFailure(format!(
            "empty page ({} bytes)",
            markup.trim().len()
        ));
    }

    FetchOutcome::Success(markup.to_string())
}

/// Whether a URL belongs to an account challenge flow.
pub fn is_challenge_url(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    CHALLENGE_URL_TOKENS.iter().any(|t| url.contains(t))
}

/// Markup searched for block and sign-in markers.
fn marker_scope(markup: &str) -> String {
    let (Ok(structure), Ok(chrome)) = (Selector::parse(REVIEW_STRUCTURE), Selector::parse(PAGE_CHROME))
    else {
        return markup.to_string();
    };
    let document = Html::parse_document(markup);
    if document.select(&structure).next().is_none() {
        return markup.to_string();
    }
    document
        .select(&chrome)
        .map(|el| el.html())
        .collect::<Vec<_>>()
        .join("\n")
}

fn soft_block_reason(lower_markup: &str) -> Option<&'static str> {
    if ROBOT_CHECK_MARKERS.iter().any(|m| lower_markup.contains(m)) {
        Some("robot check")
    } else if AUTOMATED_ACCESS_MARKERS
        .iter()
        .any(|m| lower_markup.contains(m))
    {
        Some("automated access block")
    } else if RATE_LIMIT_MARKERS.iter().any(|m| lower_markup.contains(m)) {
        Some("rate limited")
    } else {
        None
    }
}

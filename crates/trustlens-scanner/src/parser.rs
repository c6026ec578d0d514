//! Review page markup parser.
//!
//! Turns raw review-page markup into a [`ReviewPageSnapshot`]. Widgets are
//! located through ordered selector fallbacks so a drifted layout degrades to
//! a less precise snapshot before it degrades to an error.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use thiserror::Error;
use trustlens_core::{Histogram, ReviewEntry, ReviewPageSnapshot};

/// Parser failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No rating signal of any kind was found on the page
    #[error("unrecognized page structure: {0}")]
    Unrecognized(String),
}

const REVIEW_BLOCKS: &[&str] = &[
    "#cm_cr-review_list [data-hook='review']",
    "#cm-cr-dp-review-list [data-hook='review']",
    "#reviewsMedley [data-hook='review']",
    "[data-hook='review']",
];
const REVIEW_RATING: &[&str] = &[
    "i[data-hook='review-star-rating']",
    "i[data-hook='cmps-review-star-rating']",
    "[data-hook='review-star-rating']",
];
const REVIEW_BODY: &[&str] = &[
    "[data-hook='review-body'] span",
    "[data-hook='review-body']",
    "span.review-text-content",
];
const REVIEW_DATE: &[&str] = &["[data-hook='review-date']"];
const VERIFIED_BADGE: &[&str] = &["[data-hook='avp-badge']", "[data-hook='avp-badge-linkless']"];
const HELPFUL_VOTES: &[&str] = &["[data-hook='helpful-vote-statement']"];
const REVIEW_AUTHOR: &[&str] = &[
    "[data-hook='genome-widget'] .a-profile-name",
    ".a-profile-name",
    "[data-hook='review-author']",
];
/// Display names the site assigns to reviewers who never set one
const PLACEHOLDER_AUTHORS: &[&str] = &[
    "amazon customer",
    "amazonカスタマー",
    "amazon カスタマー",
    "kindle customer",
];

const HISTOGRAM_CONTAINERS: &[&str] = &[
    "#cm_cr_dp_d_rating_histogram",
    "#histogramTable",
    "[data-hook='histogram-table']",
];
const HISTOGRAM_ROWS: &[&str] = &[
    "table#histogramTable tr",
    "ul#histogramTable li",
    "[data-hook='histogram-table'] tr",
    "[data-hook='rating-bar']",
    ".a-histogram-row",
];
const METERS: &[&str] = &[".a-meter", ".a-meter-bar", "[role='progressbar']"];

const AVERAGE_RATING: &[&str] = &[
    "[data-hook='rating-out-of-text']",
    "i[data-hook='average-star-rating'] .a-icon-alt",
    "#acrPopover",
];
const TOTAL_REVIEWS: &[&str] = &[
    "[data-hook='total-review-count']",
    "[data-hook='cr-filter-info-review-rating-count']",
    "#acrCustomerReviewText",
];
const PRODUCT_TITLE: &[&str] = &["[data-hook='product-link']", "#productTitle"];
const NO_REVIEWS: &[&str] = &["[data-hook='cr-no-reviews']", ".no-reviews-section"];
const NO_REVIEWS_TEXT: &[&str] = &[
    "no customer reviews",
    "カスタマーレビューはありません",
    "レビューはまだありません",
];

const VERIFIED_TEXT: &[&str] = &["verified purchase", "amazonで購入"];

const STAR_WORDS: [&str; 5] = ["one_star", "two_star", "three_star", "four_star", "five_star"];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

fn star_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)([1-5])\s*(?:つ|ツ)?\s*星|星\s*([1-5])|([1-5])\s*-?\s*stars?",
    )
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(\d{1,3})\s*%")
}

fn width_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"width\s*:\s*(\d{1,3}(?:\.\d+)?)%")
}

fn count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)(\d[\d,]*)\s*(?:global\s+)?(?:ratings?|reviews?|件|個の評価|人)",
    )
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"\d[\d,]*")
}

/// Rating value patterns in priority order.
fn rating_value_regexes() -> &'static [Regex; 3] {
    static RE: OnceLock<[Regex; 3]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"のうち\s*([0-5](?:[.,]\d+)?)",
            r"(?i)([0-5](?:[.,]\d+)?)\s*out of\s*5",
            r"^\s*([0-5](?:[.,]\d+)?)",
        ]
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
    })
}

fn star_class_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^a-star-(?:mini-|small-|medium-)?([1-5])(?:-\d)?$")
}

fn negative_wording_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)\b(?:bad|not|poor|broken|waste)\b|ダメ|だめ|良くない|嫌|最悪",
    )
}

fn jp_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(\d{4})年\s*(\d{1,2})月\s*(\d{1,2})日")
}

/// Parse a review page captured now.
pub fn parse(markup: &str) -> Result<ReviewPageSnapshot, ParseError> {
    parse_captured_at(markup, Utc::now())
}

/// Parse a review page captured at `captured_at`.
///
/// Deterministic for identical input. Returns `ParseError::Unrecognized`
/// only when the page carries no rating signal at all; a page that shows
/// zero reviews yields an empty snapshot.
pub fn parse_captured_at(
    markup: &str,
    captured_at: DateTime<Utc>,
) -> Result<ReviewPageSnapshot, ParseError> {
    let document = Html::parse_document(markup);

    let entries = parse_entries(&document);
    let total = select_first(&document.root_element(), TOTAL_REVIEWS)
        .and_then(|el| first_number(&element_text(&el)));
    let average = parse_average(&document);
    let title = select_first(&document.root_element(), PRODUCT_TITLE)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty());

    let widget = parse_histogram_widget(&document, total);
    let tallied = Histogram::tally(&entries);

    let (histogram, approximate) = match widget {
        Some(histogram) if histogram.total() >= entries.len() as u64 => (histogram, false),
        Some(histogram) => {
            tracing::debug!(
                "Histogram widget counts {} reviews but {} entries are visible; tallying entries",
                histogram.total(),
                entries.len()
            );
            (tallied, true)
        }
        None if !entries.is_empty() => (tallied, true),
        None if total == Some(0) || shows_no_reviews(&document) => (Histogram::default(), false),
        None if total.is_some() || average.is_some() => (Histogram::default(), true),
        None => {
            return Err(ParseError::Unrecognized(
                "no histogram, review blocks or review count found".to_string(),
            ))
        }
    };

    let snapshot = ReviewPageSnapshot::new(histogram, entries, total, captured_at)
        .map_err(|e| ParseError::Unrecognized(e.to_string()))?;

    Ok(snapshot
        .with_approximate(approximate)
        .with_average_rating(average)
        .with_title(title))
}

fn parse_entries(document: &Html) -> Vec<ReviewEntry> {
    let root = document.root_element();
    for selector in compile(REVIEW_BLOCKS) {
        let blocks: Vec<ElementRef> = root.select(&selector).collect();
        if !blocks.is_empty() {
            return blocks.iter().filter_map(parse_entry).collect();
        }
    }
    Vec::new()
}

fn parse_entry(block: &ElementRef) -> Option<ReviewEntry> {
    let rating = select_first(block, REVIEW_RATING).and_then(|el| {
        star_from_classes(&el).or_else(|| {
            let text = element_text(&el);
            let alt = el.value().attr("title").unwrap_or_default();
            rating_value(&text)
                .or_else(|| rating_value(alt))
                .and_then(round_rating)
        })
    })?;

    let body = select_first(block, REVIEW_BODY)
        .map(|el| element_text(&el))
        .unwrap_or_default();

    let verified = select_first(block, VERIFIED_BADGE).is_some() || {
        let text = element_text(block).to_lowercase();
        VERIFIED_TEXT.iter().any(|marker| text.contains(marker))
    };

    let helpful_votes = select_first(block, HELPFUL_VOTES).and_then(|el| helpful_count(&element_text(&el)));
    let reviewed_on = select_first(block, REVIEW_DATE).and_then(|el| parse_review_date(&element_text(&el)));

    let author = select_first(block, REVIEW_AUTHOR)
        .map(|el| element_text(&el))
        .filter(|name| !name.is_empty() && !PLACEHOLDER_AUTHORS.contains(&name.to_lowercase().as_str()));

    Some(ReviewEntry {
        rating,
        verified,
        text_length: body.chars().count(),
        helpful_votes,
        reviewed_on,
        author,
        body_digest: body_digest(&body),
        negative_wording: negative_wording_regex().is_match(&body),
    })
}

/// Hex SHA-256 of the body with case and whitespace folded, so copies that
/// differ only in spacing or capitalization collide.
fn body_digest(body: &str) -> Option<String> {
    let folded = normalize(body).to_lowercase();
    if folded.is_empty() {
        return None;
    }
    Some(hex::encode(Sha256::digest(folded.as_bytes())))
}

fn parse_histogram_widget(document: &Html, total: Option<u64>) -> Option<Histogram> {
    let root = document.root_element();
    let container = select_first(&root, HISTOGRAM_CONTAINERS);
    let scope = container.unwrap_or(root);

    let mut counts: [Option<u64>; 5] = [None; 5];
    let mut percents: [Option<u64>; 5] = [None; 5];
    let mut seen = Vec::new();

    for selector in compile(HISTOGRAM_ROWS) {
        for row in scope.select(&selector) {
            if seen.contains(&row.id()) {
                continue;
            }
            seen.push(row.id());

            let Some(star) = row_star(&row) else { continue };
            let index = usize::from(star - 1);
            if let Some(count) = row_count(&row) {
                counts[index] = Some(count);
            } else if let Some(percent) = row_percent(&row) {
                percents[index] = Some(percent.min(100));
            }
        }
    }

    if counts.iter().all(Option::is_some) {
        return Some(Histogram::from_counts(counts.map(|c| c.unwrap_or(0))));
    }
    if percents.iter().chain(counts.iter()).all(Option::is_none) {
        return None;
    }

    if counts.iter().all(Option::is_none) {
        let percents = percents.map(|p| p.unwrap_or(0));
        return match total {
            Some(total) => Some(Histogram::from_counts(largest_remainder(percents, total))),
            None => {
                tracing::debug!("Percentage histogram without a review total; using shares of 100");
                Some(Histogram::from_counts(largest_remainder(percents, 100)))
            }
        };
    }

    // Explicit counts mixed with percentages only reconcile against a total
    let Some(total) = total else {
        tracing::debug!("Histogram mixes counts and percentages without a review total; ignoring it");
        return None;
    };
    Some(Histogram::from_counts(merge_counts(counts, percents, total)))
}

/// Keep the explicit counts and spread the rest of `total` over the
/// percentage rows in proportion to their percentages.
pub fn merge_counts(counts: [Option<u64>; 5], percents: [Option<u64>; 5], total: u64) -> [u64; 5] {
    let explicit: u64 = counts.iter().flatten().sum();
    let mut shares = [0u64; 5];
    for (i, share) in shares.iter_mut().enumerate() {
        if counts[i].is_none() {
            *share = percents[i].unwrap_or(0);
        }
    }
    let spread = largest_remainder(shares, total.saturating_sub(explicit));

    let mut merged = [0u64; 5];
    for (i, slot) in merged.iter_mut().enumerate() {
        *slot = counts[i].unwrap_or(spread[i]);
    }
    merged
}

/// Distribute `total` over five buckets in proportion to `percents`,
/// rounding so the buckets sum to exactly `total`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn largest_remainder(percents: [u64; 5], total: u64) -> [u64; 5] {
    let sum: u64 = percents.iter().sum();
    if sum == 0 {
        return [0; 5];
    }

    let mut counts = [0u64; 5];
    let mut remainders = [(0u64, 0usize); 5];
    for (i, percent) in percents.iter().enumerate() {
        let scaled = u128::from(*percent) * u128::from(total);
        counts[i] = (scaled / u128::from(sum)) as u64;
        remainders[i] = ((scaled % u128::from(sum)) as u64, i);
    }

    let assigned: u64 = counts.iter().sum();
    // Largest remainder first; ties go to the higher star
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    for (_, index) in remainders.iter().take((total - assigned) as usize) {
        counts[*index] += 1;
    }
    counts
}

fn row_star(row: &ElementRef) -> Option<u8> {
    for attr in ["data-star-rating", "aria-label", "title"] {
        if let Some(star) = row.value().attr(attr).and_then(find_star) {
            return Some(star);
        }
    }

    for el in row.descendants().filter_map(ElementRef::wrap) {
        let value = el.value();
        if let Some(star) = value.attr("aria-label").and_then(find_star) {
            return Some(star);
        }
        if let Some(href) = value.attr("href") {
            if let Some(i) = STAR_WORDS.iter().position(|word| href.contains(word)) {
                return u8::try_from(i + 1).ok();
            }
        }
    }

    find_star(&element_text(row))
}

fn find_star(text: &str) -> Option<u8> {
    let text = normalize(text);
    let captures = star_regex().captures(&text)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

fn row_count(row: &ElementRef) -> Option<u64> {
    if let Some(count) = row.value().attr("data-count").and_then(first_number) {
        return Some(count);
    }
    let text = normalize(&element_text(row));
    let captures = count_regex().captures(&text)?;
    parse_number(captures.get(1)?.as_str())
}

fn row_percent(row: &ElementRef) -> Option<u64> {
    for selector in compile(METERS) {
        for meter in row.select(&selector) {
            let value = meter.value();
            for attr in ["aria-valuenow", "value"] {
                if let Some(n) = value.attr(attr).and_then(|v| v.trim().parse().ok()) {
                    return Some(n);
                }
            }
            if let Some(width) = value.attr("style").and_then(width_percent) {
                return Some(width);
            }
        }
    }

    if let Some(width) = width_percent(&row.html()) {
        return Some(width);
    }
    let text = normalize(&element_text(row));
    percent_regex()
        .captures(&text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn width_percent(style: &str) -> Option<u64> {
    let captures = width_regex().captures(style)?;
    let value: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some(value.round() as u64)
}

fn parse_average(document: &Html) -> Option<f64> {
    let el = select_first(&document.root_element(), AVERAGE_RATING)?;
    let text = element_text(&el);
    rating_value(&text).or_else(|| el.value().attr("title").and_then(rating_value))
}

fn rating_value(text: &str) -> Option<f64> {
    let text = normalize(text);
    rating_value_regexes().iter().find_map(|re| {
        let raw = re.captures(&text)?.get(1)?.as_str().replace(',', ".");
        raw.parse().ok()
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_rating(value: f64) -> Option<u8> {
    (value >= 0.5).then(|| (value.round() as u8).clamp(1, 5))
}

fn star_from_classes(el: &ElementRef) -> Option<u8> {
    el.value().classes().find_map(|class| {
        star_class_regex()
            .captures(class)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

fn helpful_count(text: &str) -> Option<u32> {
    let text = normalize(text);
    if text.to_lowercase().starts_with("one person") {
        return Some(1);
    }
    first_number(&text).and_then(|n| u32::try_from(n).ok())
}

/// Best-effort review date in English or Japanese layouts.
pub fn parse_review_date(text: &str) -> Option<NaiveDate> {
    let text = normalize(text);
    if let Some(c) = jp_date_regex().captures(&text) {
        let year = c.get(1)?.as_str().parse().ok()?;
        let month = c.get(2)?.as_str().parse().ok()?;
        let day = c.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let tail = text.rsplit(" on ").next().unwrap_or(&text).trim();
    ["%B %d, %Y", "%d %B %Y", "%d. %B %Y", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(tail, format).ok())
}

fn shows_no_reviews(document: &Html) -> bool {
    let root = document.root_element();
    if select_first(&root, NO_REVIEWS).is_some() {
        return true;
    }
    let text = element_text(&root).to_lowercase();
    NO_REVIEWS_TEXT.iter().any(|marker| text.contains(marker))
}

fn first_number(text: &str) -> Option<u64> {
    let text = normalize(text);
    number_regex()
        .find(&text)
        .and_then(|m| parse_number(m.as_str()))
}

fn parse_number(raw: &str) -> Option<u64> {
    raw.replace(',', "").parse().ok()
}

/// Full-width digits and punctuation to ASCII, whitespace collapsed.
fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| match c {
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '，' => ',',
            '．' => '.',
            '％' => '%',
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn compile<'a>(selectors: &'a [&'a str]) -> impl Iterator<Item = Selector> + 'a {
    selectors.iter().filter_map(|s| Selector::parse(s).ok())
}

fn select_first<'a>(scope: &ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    compile(selectors).find_map(|selector| scope.select(&selector).next())
}

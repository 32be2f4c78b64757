use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::model::CellValue;

const PRICE_PREFIXES: [&str; 4] = ["US$", "$", "€", "EUR"];

fn sku_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^([A-Z]+)(\d+)([A-Z])?$").expect("valid sku regex"))
}

fn tagline_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s-\s").expect("valid separator regex"))
}

fn leggings_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bleggings\b").expect("valid leggings regex"))
}

fn sleeves_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bsleeves\b").expect("valid sleeves regex"))
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn norm_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First run of ASCII digits, or `None` when there is none.
///
/// `"#12345-A"` → `"12345"`.
pub fn order_key(raw: &str) -> Option<String> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let digits: String = raw[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    Some(digits)
}

/// Numeric value of an order key, used for ordering results.
pub fn order_number(key: &str) -> u128 {
    key.parse().unwrap_or(0)
}

/// Monetary value of a cell. Numbers pass through; text has one currency
/// prefix stripped before parsing. Blank or unparseable values are `None`.
pub fn parse_price(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => Some(*n).filter(|n| !n.is_nan()),
        CellValue::Text(s) => parse_price_text(s),
        CellValue::Bool(_) | CellValue::Empty => None,
    }
}

fn parse_price_text(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for prefix in PRICE_PREFIXES {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
        }
    }
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Quantity of a cell. Blank and unparseable values count as zero.
pub fn parse_quantity(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Reduce a raw SKU to its base identifier.
///
/// The leading token before any space, hyphen, slash or underscore is kept.
/// Tokens shaped like letters + digits + optional letter are uppercased
/// as-is; anything else is just uppercased.
pub fn normalize_sku_base(raw: &str) -> String {
    let trimmed = raw.trim();
    let token = trimmed
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '/' | '_'))
        .next()
        .unwrap_or("");

    match sku_pattern().captures(token) {
        Some(caps) => {
            let letters = caps.get(1).map_or("", |m| m.as_str());
            let digits = caps.get(2).map_or("", |m| m.as_str());
            let suffix = caps.get(3).map_or("", |m| m.as_str());
            format!("{letters}{digits}{suffix}").to_uppercase()
        }
        None => token.to_uppercase(),
    }
}

/// Canonical product name used on both sides of item matching.
///
/// Diacritics and trademark symbols are removed, marketing taglines after
/// a spaced hyphen are dropped, and the plurals `leggings` / `sleeves` fold
/// to their singular. Result is lowercase.
pub fn canonical_product_name(raw: &str) -> String {
    let collapsed = norm_text(raw);

    let stripped: String = collapsed
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .filter(|c| !matches!(c, '™' | '®' | '©'))
        .map(|c| if matches!(c, '–' | '—') { '-' } else { c })
        .collect();

    let head = tagline_separator()
        .split(&stripped)
        .next()
        .unwrap_or("")
        .trim();

    let singular = leggings_word().replace_all(head, "legging");
    let singular = sleeves_word().replace_all(&singular, "sleeve");

    norm_text(&singular).to_lowercase()
}

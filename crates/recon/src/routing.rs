use std::sync::OnceLock;

use regex::Regex;

use crate::config::{LedgerConfig, RouteRule, RoutingConfig};
use crate::model::CanonicalRow;

fn paren_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([A-Z]{2})\)").expect("valid country code regex"))
}

/// Country code carried by a Store cell: `"Cellumove (DE)"` or
/// `"Cellumove DE"` → `DE`.
pub fn country_from_store_cell(raw: &str) -> Option<String> {
    let upper = raw.to_uppercase();
    if let Some(caps) = paren_code().captures(&upper) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    let last = upper.split_whitespace().last()?;
    if last.len() == 2 && last.chars().all(|c| c.is_ascii_uppercase()) {
        return Some(last.to_string());
    }
    None
}

/// First non-blank value of `candidates` across the group's rows.
fn first_text(rows: &[&CanonicalRow], candidates: &[String]) -> Option<String> {
    rows.iter().find_map(|row| {
        row.get_any(candidates)
            .filter(|v| !v.is_blank())
            .map(|v| v.to_text())
    })
}

fn apply_rule(rule: &RouteRule, store_cell: &str, country: Option<&str>) -> String {
    if rule.by_country.is_empty() {
        return rule.store.clone();
    }
    let from_store = country_from_store_cell(store_cell);
    let from_column = country.map(|c| c.trim().to_uppercase());
    [from_store, from_column]
        .into_iter()
        .flatten()
        .find_map(|cc| rule.by_country.get(&cc).cloned())
        .unwrap_or_else(|| rule.store.clone())
}

/// Remote store key for an order group, or `None` when nothing routes it.
pub fn route_order(
    rows: &[&CanonicalRow],
    ledger: &LedgerConfig,
    routing: &RoutingConfig,
) -> Option<String> {
    let store_cell = first_text(rows, &ledger.store).unwrap_or_default();
    let haystack = store_cell.to_lowercase();

    if !haystack.is_empty() {
        for rule in &routing.rules {
            if rule
                .contains
                .iter()
                .any(|term| haystack.contains(&term.to_lowercase()))
            {
                let country = first_text(rows, &ledger.country);
                return Some(apply_rule(rule, &store_cell, country.as_deref()));
            }
        }
    }

    routing
        .default_store
        .clone()
        .filter(|s| !s.trim().is_empty())
}

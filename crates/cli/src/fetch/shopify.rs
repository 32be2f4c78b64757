//! Shopify Admin GraphQL order export.
//!
//! Tokens are minted with the client-credentials grant against
//! `https://{domain}/admin/oauth/access_token` and then cached. A 401 on a
//! GraphQL call invalidates the cached token and retries once with a fresh
//! one.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};

use crate::exit_codes;
use crate::CliError;

use super::client::{error_text, FetchClient};
use super::token::TokenCache;

pub(super) const DEFAULT_API_VERSION: &str = "2025-10";
pub(super) const PAGE_SIZE: usize = 250;
const PAGE_DELAY: Duration = Duration::from_millis(200);

pub(super) const ORDERS_QUERY: &str = "\
query OrdersPage($first: Int!, $after: String) {
  orders(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    edges {
      node {
        id
        name
        createdAt
        displayFinancialStatus
        displayFulfillmentStatus
        customer { firstName lastName email }
        billingAddress { address1 address2 city province country zip }
        lineItems(first: 50) {
          edges {
            node {
              title
              quantity
              currentQuantity
              variantTitle
              fulfillableQuantity
              fulfillmentStatus
            }
          }
        }
      }
    }
  }
}";

/// Per-store credentials from `{STORE}_SHOPIFY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct StoreCredentials {
    pub store: String,
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
}

impl StoreCredentials {
    pub(super) fn env_names(store: &str) -> [String; 3] {
        let prefix = store.to_uppercase().replace(['-', ' '], "_");
        [
            format!("{prefix}_SHOPIFY_STORE_DOMAIN"),
            format!("{prefix}_SHOPIFY_CLIENT_ID"),
            format!("{prefix}_SHOPIFY_CLIENT_SECRET"),
        ]
    }

    pub(super) fn from_lookup(
        store: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let names = Self::env_names(store);
        let values: Vec<Option<String>> = names
            .iter()
            .map(|n| lookup(n).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
            .collect();
        let missing: Vec<&str> = names
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(n, _)| n.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(CliError::new(
                exit_codes::EXIT_FETCH_NOT_AUTH,
                format!("missing Shopify credentials for store '{store}'"),
            )
            .with_hint(format!("set {}", missing.join(", "))));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();
        let domain = next();
        Ok(Self {
            store: store.to_lowercase(),
            domain: domain
                .trim_start_matches("https://")
                .trim_end_matches('/')
                .to_string(),
            client_id: next(),
            client_secret: next(),
        })
    }

    pub(super) fn from_env(store: &str) -> Result<Self, CliError> {
        Self::from_lookup(store, |name| std::env::var(name).ok())
    }
}

pub(super) struct ShopifyClient {
    client: FetchClient,
    creds: StoreCredentials,
    base_url: String,
    api_version: String,
    cache: TokenCache,
    page_delay: Duration,
}

#[derive(Debug, Default)]
pub(super) struct FetchedOrders {
    pub orders: Vec<serde_json::Value>,
    pub pages: usize,
}

impl ShopifyClient {
    pub(super) fn new(creds: StoreCredentials, api_version: String, cache: TokenCache) -> Self {
        let base_url = format!("https://{}", creds.domain);
        Self::with_base_url(creds, api_version, cache, base_url)
    }

    pub(super) fn with_base_url(
        creds: StoreCredentials,
        api_version: String,
        cache: TokenCache,
        base_url: String,
    ) -> Self {
        Self {
            client: FetchClient::new("Shopify"),
            creds,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_version,
            cache,
            page_delay: PAGE_DELAY,
        }
    }

    #[cfg(test)]
    fn without_delays(mut self) -> Self {
        self.client = self.client.with_backoff(Duration::from_millis(1));
        self.page_delay = Duration::ZERO;
        self
    }

    /// Cached token unless `force`, else mint one.
    fn access_token(&mut self, force: bool) -> Result<String, CliError> {
        let now = Utc::now();
        if !force {
            if let Some(token) = self.cache.get(&self.creds.store, now) {
                debug!("store '{}': using cached token", self.creds.store);
                return Ok(token.to_string());
            }
        }

        let url = format!("{}/admin/oauth/access_token", self.base_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret.as_str()),
        ];
        let body = self
            .client
            .send_with_retry(|http| http.post(&url).form(&form))
            .map_err(|e| {
                CliError::new(
                    exit_codes::EXIT_FETCH_AUTH,
                    format!("token request for '{}' failed: {}", self.creds.store, e.message),
                )
            })?;

        let token = body["access_token"]
            .as_str()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CliError::new(
                    exit_codes::EXIT_FETCH_AUTH,
                    format!("no access_token returned for {}", self.creds.domain),
                )
            })?
            .to_string();
        let expires_in = body["expires_in"]
            .as_i64()
            .or_else(|| body["expires_in"].as_str().and_then(|s| s.parse().ok()));

        self.cache.put(&self.creds.store, &token, expires_in, now)?;
        info!(
            "store '{}': minted access token (cached in {})",
            self.creds.store,
            self.cache.path().display()
        );
        Ok(token)
    }

    fn graphql(&self, token: &str, variables: &serde_json::Value) -> Result<serde_json::Value, CliError> {
        let url = format!("{}/admin/api/{}/graphql.json", self.base_url, self.api_version);
        let payload = serde_json::json!({ "query": ORDERS_QUERY, "variables": variables });
        let body = self.client.send_with_retry(|http| {
            http.post(&url)
                .header("X-Shopify-Access-Token", token)
                .json(&payload)
        })?;

        if body["errors"].as_array().is_some_and(|e| !e.is_empty()) {
            return Err(CliError::new(
                exit_codes::EXIT_FETCH_VALIDATION,
                format!("Shopify GraphQL returned errors: {}", error_text(&body, "")),
            ));
        }
        Ok(body["data"].clone())
    }

    /// One page, refreshing the token once on an auth failure.
    fn orders_page(
        &mut self,
        token: &mut String,
        refreshed: &mut bool,
        after: Option<&str>,
    ) -> Result<serde_json::Value, CliError> {
        let variables = serde_json::json!({ "first": PAGE_SIZE, "after": after });
        match self.graphql(token, &variables) {
            Err(e) if e.code == exit_codes::EXIT_FETCH_AUTH && !*refreshed => {
                info!("store '{}': token rejected, refreshing", self.creds.store);
                self.cache.invalidate(&self.creds.store)?;
                *token = self.access_token(true)?;
                *refreshed = true;
                self.graphql(token, &variables)
            }
            other => other,
        }
    }

    /// Walk the orders connection. `limit` and `max_pages` of 0 mean no cap.
    pub(super) fn fetch_orders(
        &mut self,
        limit: usize,
        max_pages: usize,
        show_progress: bool,
    ) -> Result<FetchedOrders, CliError> {
        let mut token = self.access_token(false)?;
        let mut refreshed = false;
        let mut out = FetchedOrders::default();
        let mut after: Option<String> = None;

        loop {
            let data = self.orders_page(&mut token, &mut refreshed, after.as_deref())?;
            out.pages += 1;

            let conn = &data["orders"];
            let edges = conn["edges"].as_array().ok_or_else(|| {
                CliError::new(
                    exit_codes::EXIT_FETCH_UPSTREAM,
                    "Shopify response has no orders connection",
                )
            })?;
            out.orders
                .extend(edges.iter().map(|e| e["node"].clone()).filter(|n| !n.is_null()));

            if show_progress {
                eprintln!("  page {}: {} orders", out.pages, edges.len());
            }

            if limit > 0 && out.orders.len() >= limit {
                out.orders.truncate(limit);
                break;
            }
            if max_pages > 0 && out.pages >= max_pages {
                break;
            }
            let has_next = conn["pageInfo"]["hasNextPage"].as_bool().unwrap_or(false);
            let cursor = conn["pageInfo"]["endCursor"].as_str().map(str::to_string);
            match (has_next, cursor) {
                (true, Some(cursor)) => after = Some(cursor),
                _ => break,
            }

            thread::sleep(self.page_delay);
        }

        info!(
            "store '{}': fetched {} orders in {} pages",
            self.creds.store,
            out.orders.len(),
            out.pages
        );
        Ok(out)
    }
}

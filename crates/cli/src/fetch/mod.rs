//! `ordercheck fetch` — download a store's orders into an orders file.

mod client;
mod shopify;
mod token;

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::CliError;

use shopify::{ShopifyClient, StoreCredentials, DEFAULT_API_VERSION};
use token::TokenCache;

#[derive(Args)]
pub struct FetchArgs {
    /// Store name; selects the {STORE}_SHOPIFY_* credentials
    #[arg(long)]
    pub store: String,

    /// Output JSON file path (default: stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Stop after this many orders
    #[arg(long)]
    pub limit: Option<usize>,

    /// Stop after this many pages of 250 orders
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Token cache file (default: the user cache directory)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Reuse a cached token for at most this many seconds
    #[arg(long, value_name = "SECS")]
    pub token_ttl: Option<u64>,

    /// Admin API version
    #[arg(long, env = "SHOPIFY_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,
}

/// The orders file layout read back by `check --orders`.
#[derive(Serialize)]
struct OrdersFile<'a> {
    store: &'a str,
    count: usize,
    pages: usize,
    orders: &'a [serde_json::Value],
}

pub fn cmd_fetch(args: FetchArgs, quiet: bool) -> Result<(), CliError> {
    let store = args.store.trim().to_lowercase();
    if store.is_empty() {
        return Err(CliError::usage("--store must not be empty"));
    }
    let creds = StoreCredentials::from_env(&store)?;

    let cache_path = match args.token_cache.clone().or_else(TokenCache::default_path) {
        Some(path) => path,
        None => {
            return Err(CliError::usage("no user cache directory")
                .with_hint("pass --token-cache FILE"))
        }
    };
    let ttl = args
        .token_ttl
        .map(|secs| chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64));
    let cache = TokenCache::open(cache_path, ttl);

    let show_progress = !quiet && atty::is(atty::Stream::Stderr);
    if show_progress {
        eprintln!("Fetching Shopify orders for {} ({})...", store, creds.domain);
    }

    let mut client = ShopifyClient::new(creds, args.api_version, cache);
    let fetched = client.fetch_orders(
        args.limit.unwrap_or(0),
        args.max_pages.unwrap_or(0),
        show_progress,
    )?;

    let file = OrdersFile {
        store: &store,
        count: fetched.orders.len(),
        pages: fetched.pages,
        orders: &fetched.orders,
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| CliError::general(format!("cannot serialize orders: {e}")))?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, json + "\n").map_err(|e| {
                CliError::write(format!("cannot write {}: {e}", path.display()))
            })?;
            if !quiet {
                eprintln!("wrote {} orders to {}", file.count, path.display());
            }
        }
        None => println!("{json}"),
    }

    Ok(())
}

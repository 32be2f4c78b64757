//! Remote order files: JSON as written by `ordercheck fetch` or by an API
//! proxy. Accepted shapes are a bare array of orders, `{ "orders": [...] }`,
//! and GraphQL-style `{ "orders": { "edges": [{ "node": ... }] } }`, the
//! last optionally wrapped in `{ "data": ... }`.

use std::path::{Path, PathBuf};

use log::{info, warn};
use ordercheck_recon::{RemoteBook, RemoteOrder};
use serde::Deserialize;

use crate::error::IoError;

#[derive(Deserialize)]
#[serde(untagged)]
enum OrdersDocument {
    List(Vec<RemoteOrder>),
    Wrapped { orders: OrderList },
    Data { data: Box<OrdersDocument> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderList {
    List(Vec<RemoteOrder>),
    Connection { edges: Vec<OrderEdge> },
}

#[derive(Deserialize)]
struct OrderEdge {
    node: RemoteOrder,
}

impl OrdersDocument {
    fn into_orders(self) -> Vec<RemoteOrder> {
        match self {
            Self::List(orders) | Self::Wrapped { orders: OrderList::List(orders) } => orders,
            Self::Wrapped {
                orders: OrderList::Connection { edges },
            } => edges.into_iter().map(|e| e.node).collect(),
            Self::Data { data } => data.into_orders(),
        }
    }
}

pub fn parse_orders(json: &str) -> Result<Vec<RemoteOrder>, IoError> {
    let doc: OrdersDocument = serde_json::from_str(json).map_err(|e| {
        IoError::Json(format!(
            "expected an array of orders or an object with an 'orders' field: {e}"
        ))
    })?;
    Ok(doc.into_orders())
}

pub fn load_orders(path: &Path) -> Result<Vec<RemoteOrder>, IoError> {
    let content = std::fs::read_to_string(path).map_err(|e| IoError::at(path, e))?;
    parse_orders(&content).map_err(|e| match e {
        IoError::Json(msg) => IoError::Json(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Load one order file per store. A file that cannot be read or parsed
/// marks its store as failed; the run still proceeds.
pub fn load_remote_book(sources: &[(String, PathBuf)]) -> RemoteBook {
    let mut book = RemoteBook::new();
    for (store, path) in sources {
        match load_orders(path) {
            Ok(orders) => {
                info!("store '{store}': loaded {} orders from {}", orders.len(), path.display());
                book.insert_loaded(store.clone(), orders);
            }
            Err(e) => {
                warn!("store '{store}': {e}");
                book.insert_failed(store.clone(), e.to_string());
            }
        }
    }
    book
}

//! Change detection between local records and freshly fetched remote ones.
//!
//! Pure functions: the reconciler proposes mutations and never applies them.
//! A record is updated when one of its critical fields changed, or when the
//! remote side reports a version newer than the local one.

use serde_json::{Map, Value};

use super::catalog_model::{ProductFields, RecordState, StockFields};
use tradeos_onec::{RemoteProduct, RemoteStock};

/// Outcome of comparing one remote record with local state.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<F> {
    /// No local record: create it at version 1.
    Create(F),
    /// Write the merged fields and bump the version.
    Update(F),
    /// Nothing worth writing.
    Skip,
}

impl<F> Decision<F> {
    /// The `sync_version` the record will carry once this decision is applied.
    pub fn next_version(&self, existing: Option<i64>) -> Option<i64> {
        match self {
            Decision::Create(_) => Some(1),
            Decision::Update(_) => existing.map(|v| v + 1),
            Decision::Skip => None,
        }
    }
}

/// Decides what to do with a remote product.
///
/// Absent remote values (e.g. a missing price) keep the stored value.
pub fn decide_product(
    existing: Option<&RecordState<ProductFields>>,
    remote: &RemoteProduct,
) -> Decision<ProductFields> {
    let Some(existing) = existing else {
        return Decision::Create(product_fields(None, remote));
    };

    let merged = product_fields(Some(&existing.fields), remote);
    let critical_changed = merged.name != existing.fields.name
        || merged.price != existing.fields.price
        || merged.quantity != existing.fields.quantity;

    if critical_changed || is_newer(remote.version, existing.sync_version) {
        Decision::Update(merged)
    } else {
        Decision::Skip
    }
}

/// Decides what to do with a remote stock balance.
pub fn decide_stock(
    existing: Option<&RecordState<StockFields>>,
    remote: &RemoteStock,
) -> Decision<StockFields> {
    let incoming = StockFields {
        warehouse_name: remote
            .warehouse_name
            .clone()
            .or_else(|| existing.and_then(|e| e.fields.warehouse_name.clone())),
        quantity: remote.quantity,
        reserved: remote.reserved,
        available: remote.available,
    };

    let Some(existing) = existing else {
        return Decision::Create(incoming);
    };

    let critical_changed = incoming.quantity != existing.fields.quantity
        || incoming.reserved != existing.fields.reserved
        || incoming.available != existing.fields.available;

    if critical_changed || is_newer(remote.version, existing.sync_version) {
        Decision::Update(incoming)
    } else {
        Decision::Skip
    }
}

fn is_newer(remote_version: Option<i64>, local_version: i64) -> bool {
    remote_version.is_some_and(|v| v > local_version)
}

fn product_fields(existing: Option<&ProductFields>, remote: &RemoteProduct) -> ProductFields {
    ProductFields {
        external_code: remote
            .code
            .clone()
            .or_else(|| existing.and_then(|e| e.external_code.clone())),
        name: remote.name.clone(),
        description: remote
            .full_name
            .clone()
            .or_else(|| Some(remote.name.clone())),
        price: remote.price.or_else(|| existing.and_then(|e| e.price)),
        quantity: remote.quantity.or_else(|| existing.and_then(|e| e.quantity)),
        category: remote
            .category
            .clone()
            .or_else(|| existing.and_then(|e| e.category.clone())),
        external_data: external_data(existing.and_then(|e| e.external_data.as_ref()), remote),
    }
}

/// Merges the remote-only attributes over what was stored before.
fn external_data(existing: Option<&Value>, remote: &RemoteProduct) -> Option<Value> {
    let mut data = existing
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_else(Map::new);

    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            data.insert(key.to_string(), value);
        }
    };
    put("characteristics", remote.characteristics.clone());
    put("article", remote.article.clone().map(Value::String));
    put("unit", remote.unit.clone().map(Value::String));
    put("manufacturer", remote.manufacturer.clone().map(Value::String));
    put(
        "remote_updated_at",
        remote.updated_at.map(|t| Value::String(t.to_rfc3339())),
    );
    put("remote_version", remote.version.map(Value::from));

    if data.is_empty() {
        None
    } else {
        Some(Value::Object(data))
    }
}

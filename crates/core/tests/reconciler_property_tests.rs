//! Property-based tests for the catalog reconciler.
//!
//! These tests replay random sequences of remote snapshots through the
//! reconciler the way a run does, and check the versioning rules hold for
//! every sequence.

use proptest::prelude::*;
use rust_decimal::Decimal;
use tradeos_core::catalog::{
    decide_product, decide_stock, Decision, ProductFields, RecordState, StockFields,
};
use tradeos_onec::{RemoteProduct, RemoteStock};

// =============================================================================
// Generators
// =============================================================================

fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (0i64..10_000, 0u32..3).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// Remote products drawn from a small value space so repeats are common.
fn arb_remote_product() -> impl Strategy<Value = RemoteProduct> {
    (
        prop_oneof![Just("Bolt"), Just("Nut"), Just("Washer")],
        proptest::option::of(arb_decimal()),
        proptest::option::of(arb_decimal()),
        proptest::option::of("[A-Z]{3}"),
    )
        .prop_map(|(name, price, quantity, category)| RemoteProduct {
            id: "p1".to_string(),
            code: Some("C-1".to_string()),
            name: name.to_string(),
            full_name: None,
            article: None,
            unit: None,
            price,
            quantity,
            characteristics: None,
            category,
            manufacturer: None,
            updated_at: None,
            version: None,
        })
}

fn arb_remote_stock() -> impl Strategy<Value = RemoteStock> {
    (arb_decimal(), arb_decimal()).prop_map(|(quantity, reserved)| RemoteStock {
        product_id: "p1".to_string(),
        warehouse_id: "w1".to_string(),
        warehouse_name: None,
        quantity,
        reserved,
        available: quantity - reserved,
        updated_at: None,
        version: None,
    })
}

/// Applies a decision the way the store does.
fn apply<F: Clone>(state: Option<RecordState<F>>, decision: Decision<F>) -> Option<RecordState<F>> {
    let next_version = decision.next_version(state.as_ref().map(|s| s.sync_version));
    match decision {
        Decision::Create(fields) | Decision::Update(fields) => Some(RecordState {
            fields,
            sync_version: next_version.unwrap_or(1),
        }),
        Decision::Skip => state,
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// Resending the record that was just stored never writes again.
    #[test]
    fn prop_resend_after_write_is_skipped(remote in arb_remote_product()) {
        let stored = apply(None, decide_product(None, &remote));
        prop_assert_eq!(stored.as_ref().map(|s| s.sync_version), Some(1));
        prop_assert_eq!(decide_product(stored.as_ref(), &remote), Decision::Skip);
    }

    /// After N applied updates the version is N + 1, and it never decreases.
    #[test]
    fn prop_version_counts_applied_updates(
        snapshots in proptest::collection::vec(arb_remote_product(), 1..20)
    ) {
        let mut state: Option<RecordState<ProductFields>> = None;
        let mut updates = 0;
        let mut last_version = 0;

        for remote in &snapshots {
            let decision = decide_product(state.as_ref(), remote);
            if matches!(decision, Decision::Update(_)) {
                updates += 1;
            }
            prop_assert!(!(state.is_none() && matches!(decision, Decision::Update(_))));
            state = apply(state, decision);
            let version = state.as_ref().map(|s| s.sync_version).unwrap_or(0);
            prop_assert!(version >= last_version);
            last_version = version;
        }

        prop_assert_eq!(last_version, updates + 1);
    }

    /// A remote record without a price keeps the stored price.
    #[test]
    fn prop_absent_price_keeps_stored_price(
        remote in arb_remote_product(),
        stored_price in arb_decimal(),
    ) {
        let existing = RecordState {
            fields: ProductFields {
                name: remote.name.clone(),
                price: Some(stored_price),
                ..ProductFields::default()
            },
            sync_version: 3,
        };
        let without_price = RemoteProduct { price: None, ..remote };

        let merged = match decide_product(Some(&existing), &without_price) {
            Decision::Update(fields) => fields,
            Decision::Skip => existing.fields.clone(),
            Decision::Create(_) => panic!("existing record must not be recreated"),
        };
        prop_assert_eq!(merged.price, Some(stored_price));
    }

    /// Stock balances follow the same create, skip and update rules.
    #[test]
    fn prop_stock_updates_only_on_change(first in arb_remote_stock(), second in arb_remote_stock()) {
        let stored: Option<RecordState<StockFields>> = apply(None, decide_stock(None, &first));
        prop_assert_eq!(decide_stock(stored.as_ref(), &first), Decision::Skip);

        let decision = decide_stock(stored.as_ref(), &second);
        let changed = first.quantity != second.quantity
            || first.reserved != second.reserved
            || first.available != second.available;
        prop_assert_eq!(matches!(decision, Decision::Update(_)), changed);
        if changed {
            prop_assert_eq!(apply(stored, decision).map(|s| s.sync_version), Some(2));
        }
    }
}

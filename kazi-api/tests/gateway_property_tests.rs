//! Property-Based Tests for the Resource Gateway
//!
//! Runs against the in-memory datastore so every property exercises the
//! same gateway code paths the HTTP routes use.

use std::sync::Arc;

use kazi_api::resources::{CreateInvoice, CreateLocale, Invoice, InvoiceFilter, Locale};
use kazi_api::{ErrorCode, NoFilter, Page, ResourceGateway};
use kazi_test_utils::{
    assertions, fixtures, generators, Datastore, FilterExpr, InMemoryDatastore, OwnerId,
};
use proptest::prelude::*;
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

fn gateway<R: kazi_api::Resource>(store: &Arc<InMemoryDatastore>) -> ResourceGateway<R> {
    ResourceGateway::new(store.clone())
}

fn invoice_input(client_name: String, total_amount: f64) -> CreateInvoice {
    CreateInvoice {
        client_name,
        total_amount,
        ..Default::default()
    }
}

async fn create_invoices(
    gw: &ResourceGateway<Invoice>,
    owner: OwnerId,
    count: usize,
) -> Result<Vec<Invoice>, TestCaseError> {
    let mut created = Vec::with_capacity(count);
    for i in 0..count {
        let invoice = gw
            .create(owner, invoice_input(format!("Client {}", i), 10.0 * (i + 1) as f64))
            .await
            .map_err(fail)?;
        created.push(invoice);
    }
    Ok(created)
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Rows owned by one principal are invisible to every other principal,
    /// for reads, lists and writes alike.
    #[test]
    fn prop_owner_scoping_hides_foreign_rows(
        (owner, stranger) in generators::arb_owner_pair(),
        client_name in generators::arb_label(),
        amount in generators::arb_amount(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = fixtures::memory_store();
            let gw = gateway::<Invoice>(&store);
            let invoice = gw
                .create(owner, invoice_input(client_name, amount))
                .await
                .map_err(fail)?;
            prop_assert_eq!(invoice.user_id, owner);

            prop_assert!(gw.get_one(stranger, invoice.id).await.map_err(fail)?.is_none());
            let listed = gw
                .get_many(stranger, &InvoiceFilter::default(), Page::default())
                .await
                .map_err(fail)?;
            prop_assert!(listed.is_empty());

            let err = gw.soft_delete(stranger, invoice.id).await.err();
            prop_assert_eq!(err.map(|e| e.code), Some(ErrorCode::EntityNotFound));
            let err = gw.send(stranger, invoice.id).await.err();
            prop_assert_eq!(err.map(|e| e.code), Some(ErrorCode::EntityNotFound));

            let own = gw
                .get_many(owner, &InvoiceFilter::default(), Page::default())
                .await
                .map_err(fail)?;
            prop_assert_eq!(own.len(), 1);
            Ok(())
        })?;
    }

    /// Soft delete is idempotent: the second call returns the same stamp,
    /// the row drops out of lists but stays readable by id.
    #[test]
    fn prop_soft_delete_is_idempotent(
        owner in generators::arb_owner_id(),
        client_name in generators::arb_label(),
        amount in generators::arb_amount(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = fixtures::memory_store();
            let gw = gateway::<Invoice>(&store);
            let invoice = gw
                .create(owner, invoice_input(client_name, amount))
                .await
                .map_err(fail)?;

            let first = gw.soft_delete(owner, invoice.id).await.map_err(fail)?;
            let second = gw.soft_delete(owner, invoice.id).await.map_err(fail)?;
            prop_assert!(first.deleted_at.is_some());
            prop_assert_eq!(first.deleted_at, second.deleted_at);

            let rows = store.dump("invoices").await;
            prop_assert_eq!(rows.len(), 1);
            assertions::assert_soft_deleted(&rows[0]);

            let listed = gw
                .get_many(owner, &InvoiceFilter::default(), Page::default())
                .await
                .map_err(fail)?;
            prop_assert!(listed.is_empty());
            prop_assert!(gw.get_one(owner, invoice.id).await.map_err(fail)?.is_some());

            let restored = gw.restore(owner, invoice.id).await.map_err(fail)?;
            prop_assert!(restored.deleted_at.is_none());
            Ok(())
        })?;
    }

    /// However defaults are toggled, at most one locale per owner carries
    /// `is_default`, and it is the last one chosen.
    #[test]
    fn prop_exclusive_flag_has_single_holder(
        owner in generators::arb_owner_id(),
        picks in prop::collection::vec(0usize..4, 1..8),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = fixtures::memory_store();
            let gw = gateway::<Locale>(&store);
            let mut ids = Vec::new();
            for code in ["en", "fr", "de", "sw"] {
                let locale = gw
                    .add_locale(
                        owner,
                        CreateLocale {
                            locale_code: code.to_string(),
                            display_name: None,
                            make_default: false,
                        },
                    )
                    .await
                    .map_err(fail)?;
                ids.push(locale.id);
            }

            let mut last = None;
            for pick in &picks {
                let chosen = gw.set_exclusive(owner, ids[*pick]).await.map_err(fail)?;
                prop_assert!(chosen.is_default);
                last = Some(chosen.id);
            }

            let rows = store.dump("user_locales").await;
            assertions::assert_at_most_one_flagged(&rows, "is_default");
            let locales = gw
                .get_many(owner, &NoFilter::default(), Page::default())
                .await
                .map_err(fail)?;
            let holder = locales.iter().find(|l| l.is_default).map(|l| l.id);
            prop_assert_eq!(holder, last);
            Ok(())
        })?;
    }

    /// Stats never read more than `cap` rows and flag truncation exactly
    /// when more rows exist.
    #[test]
    fn prop_stats_window_respects_cap(
        owner in generators::arb_owner_id(),
        count in 0usize..8,
        cap in 1usize..6,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = fixtures::memory_store();
            let gw = gateway::<Invoice>(&store);
            create_invoices(&gw, owner, count).await?;

            let stats = gw.stats(owner, cap).await.map_err(fail)?;
            prop_assert_eq!(stats.coverage.cap, cap);
            prop_assert_eq!(stats.coverage.sample_size, count.min(cap));
            prop_assert_eq!(stats.coverage.truncated, count > cap);
            let counted: u64 = stats.by_status.values().sum();
            prop_assert_eq!(counted as usize, count.min(cap));
            Ok(())
        })?;
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[tokio::test]
async fn test_stats_cap_is_clamped() -> Result<(), String> {
    let store = fixtures::memory_store();
    let gw = gateway::<Invoice>(&store);
    let owner = fixtures::owner();
    gw.create(owner, invoice_input("Acme".to_string(), 5.0))
        .await
        .map_err(|e| e.to_string())?;

    let zero = gw.stats(owner, 0).await.map_err(|e| e.to_string())?;
    assert_eq!(zero.coverage.cap, 1);

    let huge = gw.stats(owner, 10_000).await.map_err(|e| e.to_string())?;
    assert_eq!(huge.coverage.cap, kazi_api::resource::MAX_PAGE_SIZE);
    assert!(!huge.coverage.truncated);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_locale_code_is_rejected() -> Result<(), String> {
    let store = fixtures::memory_store();
    let gw = gateway::<Locale>(&store);
    let owner = fixtures::owner();
    let input = CreateLocale {
        locale_code: "en-US".to_string(),
        display_name: Some("English".to_string()),
        make_default: true,
    };

    gw.add_locale(owner, input.clone())
        .await
        .map_err(|e| e.to_string())?;
    let err = gw
        .add_locale(owner, input.clone())
        .await
        .err()
        .ok_or("duplicate locale accepted")?;
    assert_eq!(err.code, ErrorCode::EntityAlreadyExists);

    // Another owner may use the same code.
    gw.add_locale(fixtures::owner(), input)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::test]
async fn test_set_exclusive_repairs_multiple_holders() -> Result<(), String> {
    let store = fixtures::memory_store();
    let gw = gateway::<Locale>(&store);
    let owner = fixtures::owner();
    let mut ids = Vec::new();
    for code in ["en-US", "fr-FR", "de-DE"] {
        let input = CreateLocale {
            locale_code: code.to_string(),
            ..Default::default()
        };
        ids.push(gw.create(owner, input).await.map_err(|e| e.to_string())?.id);
    }

    // Two holders written behind the gateway's back.
    let seeded = store
        .update(
            "user_locales",
            &[FilterExpr::in_list("id", vec![json!(ids[0]), json!(ids[1])])],
            fixtures::row(json!({ "is_default": true })),
        )
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(seeded.len(), 2);

    let chosen = gw.set_exclusive(owner, ids[2]).await.map_err(|e| e.to_string())?;
    assert!(chosen.is_default);

    let rows = store.dump("user_locales").await;
    let holders: Vec<_> = rows
        .iter()
        .filter(|r| r.get("is_default").and_then(|v| v.as_bool()) == Some(true))
        .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    assert_eq!(holders, vec![ids[2].to_string()]);
    Ok(())
}

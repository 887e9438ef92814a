//! Postgres-backed gateway tests.
//!
//! Needs a database with `sql/schema.sql` applied, reachable through the
//! `KAZI_DB_*` variables. Run with `--features db-tests`.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use kazi_api::resources::{CreateInvoice, CreateLocale, Invoice, Locale};
use kazi_api::{DbConfig, ErrorCode, PgDatastore, ResourceGateway};
use kazi_core::{FilterExpr, InvoiceStatus};
use kazi_storage::{Datastore, Query};
use kazi_test_utils::fixtures;
use serde_json::json;

fn store() -> Result<Arc<PgDatastore>, String> {
    PgDatastore::from_config(&DbConfig::from_env())
        .map(Arc::new)
        .map_err(|e| e.to_string())
}

#[tokio::test]
async fn test_release_commits_status_and_transaction_together() -> Result<(), String> {
    let store = store()?;
    let gw: ResourceGateway<Invoice> = ResourceGateway::new(store.clone());
    let owner = fixtures::owner();

    let invoice = gw
        .create(
            owner,
            CreateInvoice {
                client_name: "Pg Client".to_string(),
                total_amount: 75.5,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| e.to_string())?;
    let released = gw
        .release_funds(owner, invoice.id, None)
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(released.status, InvoiceStatus::Completed);
    assert_eq!(released.progress_percentage, 100);

    let transactions = store
        .select(
            &Query::table("invoice_transactions")
                .filter(FilterExpr::eq("invoice_id", json!(invoice.id))),
        )
        .await
        .map_err(|e| e.to_string())?;
    assert_eq!(transactions.len(), 1);

    gw.hard_delete(owner, invoice.id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[tokio::test]
async fn test_default_locale_is_exclusive() -> Result<(), String> {
    let store = store()?;
    let gw: ResourceGateway<Locale> = ResourceGateway::new(store);
    let owner = fixtures::owner();

    let mut ids = Vec::new();
    for code in ["en", "sw"] {
        let locale = gw
            .add_locale(
                owner,
                CreateLocale {
                    locale_code: code.to_string(),
                    display_name: None,
                    make_default: true,
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        ids.push(locale.id);
    }

    let first = gw
        .find_one(owner, ids[0])
        .await
        .map_err(|e| e.to_string())?;
    let second = gw
        .find_one(owner, ids[1])
        .await
        .map_err(|e| e.to_string())?;
    assert!(!first.is_default);
    assert!(second.is_default);

    let err = gw
        .add_locale(
            owner,
            CreateLocale {
                locale_code: "en".to_string(),
                display_name: None,
                make_default: false,
            },
        )
        .await
        .err()
        .ok_or("duplicate locale accepted")?;
    assert_eq!(err.code, ErrorCode::EntityAlreadyExists);

    for id in ids {
        gw.hard_delete(owner, id).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

//! KAZI Test Utilities
//!
//! Shared test infrastructure for the KAZI workspace:
//! - Proptest generators for identifiers, targets and lifecycle enums
//! - Fixtures for owners, stores and seeded rows
//! - Assertions over datastore results and exclusive flags

pub use kazi_core::{
    new_entity_id, ApprovalStatus, BugSeverity, BugStatus, EntityId, EntityRef, EntityType,
    ExecutionOutcome, FilterExpr, InvoiceStatus, LeadStatus, OwnerId, Record, StorageError,
    TicketPriority, TicketStatus, Timestamp, TriggerStatus,
};
pub use kazi_storage::{Datastore, InMemoryDatastore, Query, StorageResult};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for KAZI values.

    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random principal.
    pub fn arb_owner_id() -> impl Strategy<Value = OwnerId> {
        any::<u128>().prop_map(|n| OwnerId::new(Uuid::from_u128(n)))
    }

    /// Two distinct principals.
    pub fn arb_owner_pair() -> impl Strategy<Value = (OwnerId, OwnerId)> {
        (arb_owner_id(), arb_owner_id()).prop_filter("distinct owners", |(a, b)| a != b)
    }

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        any::<u128>().prop_map(Uuid::from_u128)
    }

    pub fn arb_entity_type() -> impl Strategy<Value = EntityType> {
        prop_oneof![
            Just(EntityType::Invoice),
            Just(EntityType::Lead),
            Just(EntityType::Ticket),
            Just(EntityType::BugReport),
            Just(EntityType::Project),
            Just(EntityType::Client),
            Just(EntityType::Task),
            Just(EntityType::File),
        ]
    }

    pub fn arb_entity_ref() -> impl Strategy<Value = EntityRef> {
        (arb_entity_type(), arb_entity_id()).prop_map(|(kind, id)| EntityRef::new(kind, id))
    }

    /// Timestamp within a few years of 2024-01-01.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..(3 * 365 * 24 * 3600)).prop_map(|offset| {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
            base + Duration::seconds(offset)
        })
    }

    /// Non-empty single-line text such as a name or title.
    pub fn arb_label() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,30}[A-Za-z0-9]"
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z]{1,12}", "[a-z]{2,10}", prop_oneof![Just("com"), Just("io"), Just("app")])
            .prop_map(|(user, domain, tld)| format!("{}@{}.{}", user, domain, tld))
    }

    /// Money amount with two decimals, 0.01..=99999.99.
    pub fn arb_amount() -> impl Strategy<Value = f64> {
        (1u32..10_000_000).prop_map(|cents| f64::from(cents) / 100.0)
    }

    /// BCP 47 style locale code such as `en` or `fr-CA`.
    pub fn arb_locale_code() -> impl Strategy<Value = String> {
        ("[a-z]{2}", proptest::option::of("[A-Z]{2}")).prop_map(|(lang, region)| match region {
            Some(region) => format!("{}-{}", lang, region),
            None => lang,
        })
    }

    pub fn arb_invoice_status() -> impl Strategy<Value = InvoiceStatus> {
        proptest::sample::select(InvoiceStatus::ALL)
    }

    pub fn arb_lead_status() -> impl Strategy<Value = LeadStatus> {
        proptest::sample::select(LeadStatus::ALL)
    }

    pub fn arb_ticket_status() -> impl Strategy<Value = TicketStatus> {
        proptest::sample::select(TicketStatus::ALL)
    }

    pub fn arb_ticket_priority() -> impl Strategy<Value = TicketPriority> {
        proptest::sample::select(TicketPriority::ALL)
    }

    pub fn arb_bug_severity() -> impl Strategy<Value = BugSeverity> {
        proptest::sample::select(BugSeverity::ALL)
    }

    pub fn arb_approval_status() -> impl Strategy<Value = ApprovalStatus> {
        proptest::sample::select(ApprovalStatus::ALL)
    }

    pub fn arb_execution_outcome() -> impl Strategy<Value = ExecutionOutcome> {
        proptest::sample::select(ExecutionOutcome::ALL)
    }

    /// Owned row with id, name and timestamps, ready for `Datastore::insert`.
    pub fn arb_owned_row(owner: OwnerId) -> impl Strategy<Value = Record> {
        (arb_entity_id(), arb_label(), arb_timestamp()).prop_map(move |(id, name, created_at)| {
            super::fixtures::row(serde_json::json!({
                "id": id,
                "user_id": owner,
                "name": name,
                "created_at": created_at,
                "updated_at": created_at,
            }))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common test scenarios.

    use super::*;
    use serde_json::Value;
    use std::sync::Arc;

    /// Fresh principal.
    pub fn owner() -> OwnerId {
        OwnerId::generate()
    }

    /// Two distinct principals, e.g. for cross-owner isolation tests.
    pub fn owner_pair() -> (OwnerId, OwnerId) {
        (OwnerId::generate(), OwnerId::generate())
    }

    /// Empty in-memory datastore behind the trait object the gateway takes.
    pub fn memory_store() -> Arc<InMemoryDatastore> {
        Arc::new(InMemoryDatastore::new())
    }

    /// Unwrap a `json!({...})` literal into a row. Anything else is empty.
    pub fn row(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    /// Target used by attachment tests.
    pub fn invoice_target() -> EntityRef {
        EntityRef::new(EntityType::Invoice, new_entity_id())
    }

    /// Insert `rows` into `table` and return the stored copies.
    pub async fn seed(
        store: &InMemoryDatastore,
        table: &str,
        rows: Vec<Record>,
    ) -> StorageResult<Vec<Record>> {
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(store.insert(table, row).await?);
        }
        Ok(stored)
    }

    /// Rows in `table` matching every filter.
    pub async fn rows_where(
        store: &InMemoryDatastore,
        table: &str,
        filters: Vec<FilterExpr>,
    ) -> StorageResult<Vec<Record>> {
        store.select(&Query::table(table).filters(filters)).await
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for KAZI-specific invariants.

    use super::*;

    /// Assert that a storage result is a NotFound error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &StorageResult<T>) {
        match result {
            Err(StorageError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert that a storage result is a unique-key violation.
    #[track_caller]
    pub fn assert_unique_violation<T: std::fmt::Debug>(result: &StorageResult<T>) {
        match result {
            Err(StorageError::UniqueViolation { .. }) => {}
            other => panic!("Expected UniqueViolation, got: {:?}", other),
        }
    }

    /// Assert that a guarded batch rolled back because nothing matched.
    #[track_caller]
    pub fn assert_no_match<T: std::fmt::Debug>(result: &StorageResult<T>) {
        match result {
            Err(StorageError::NoMatch { .. }) => {}
            other => panic!("Expected NoMatch, got: {:?}", other),
        }
    }

    /// Assert that at most one row has `flag` set to true.
    #[track_caller]
    pub fn assert_at_most_one_flagged(rows: &[Record], flag: &str) {
        let flagged = rows
            .iter()
            .filter(|r| r.get(flag).and_then(|v| v.as_bool()) == Some(true))
            .count();
        assert!(
            flagged <= 1,
            "Expected at most one row with {} = true, found {}",
            flag,
            flagged
        );
    }

    /// Assert that a row carries a soft-delete marker.
    #[track_caller]
    pub fn assert_soft_deleted(row: &Record) {
        match row.get("deleted_at") {
            Some(v) if !v.is_null() => {}
            other => panic!("Expected deleted_at to be set, got: {:?}", other),
        }
    }

    /// Assert every row belongs to `owner` via `column`.
    #[track_caller]
    pub fn assert_owned_by(rows: &[Record], column: &str, owner: OwnerId) {
        let expected = serde_json::json!(owner);
        for row in rows {
            assert_eq!(
                row.get(column),
                Some(&expected),
                "Row {:?} does not belong to {}",
                row.get("id"),
                owner
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_seed_and_query() -> Result<(), String> {
        let store = fixtures::memory_store();
        let owner = fixtures::owner();
        let rows = vec![
            fixtures::row(json!({ "id": new_entity_id(), "user_id": owner, "is_default": true })),
            fixtures::row(json!({ "id": new_entity_id(), "user_id": owner, "is_default": false })),
        ];
        fixtures::seed(&store, "user_locales", rows)
            .await
            .map_err(|e| e.to_string())?;

        let stored = fixtures::rows_where(
            &store,
            "user_locales",
            vec![FilterExpr::eq("user_id", json!(owner))],
        )
        .await
        .map_err(|e| e.to_string())?;
        assert_eq!(stored.len(), 2);
        assertions::assert_owned_by(&stored, "user_id", owner);
        assertions::assert_at_most_one_flagged(&stored, "is_default");
        Ok(())
    }

    #[test]
    #[should_panic(expected = "at most one row")]
    fn test_exclusive_assertion_catches_duplicates() {
        let rows = vec![
            fixtures::row(json!({ "is_primary": true })),
            fixtures::row(json!({ "is_primary": true })),
        ];
        assertions::assert_at_most_one_flagged(&rows, "is_primary");
    }

    #[test]
    fn test_owner_pair_is_distinct() {
        let (a, b) = fixtures::owner_pair();
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_locale_codes_are_well_formed(code in generators::arb_locale_code()) {
            prop_assert!(code.len() == 2 || code.len() == 5);
            prop_assert!(code[..2].chars().all(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn prop_amounts_have_cents(amount in generators::arb_amount()) {
            prop_assert!(amount >= 0.01);
            prop_assert!(amount < 100_000.0);
        }

        #[test]
        fn prop_owned_rows_carry_owner(
            (owner, row) in generators::arb_owner_id()
                .prop_flat_map(|o| (Just(o), generators::arb_owned_row(o)))
        ) {
            prop_assert_eq!(row.get("user_id"), Some(&json!(owner)));
        }
    }
}

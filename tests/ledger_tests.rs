/// Ledger tests
///
/// Exactly-once bookkeeping: committed-only reads, records that live and die
/// with their transaction, and the (namespace, name) uniqueness backstop.
/// Run with: cargo test --test ledger_tests

use migration_ledger::prelude::*;

fn key(namespace: &str, name: &str) -> LedgerKey {
    LedgerKey::new(namespace, name)
}

async fn prepared() -> (MemoryStore, Ledger) {
    let store = MemoryStore::new();
    let ledger = Ledger::default();
    ledger.ensure_schema(&store).await.unwrap();
    (store, ledger)
}

#[tokio::test]
async fn test_ensure_schema_creates_table_once() {
    let (store, ledger) = prepared().await;

    let schema = store.describe_table("migration_ledger").await.unwrap().unwrap();
    assert!(schema.has_column("namespace"));
    assert!(schema.has_column("name"));
    assert!(schema.has_column("applied_at"));
    assert_eq!(
        schema.unique_constraints(),
        vec![vec!["namespace".to_string(), "name".to_string()]]
    );

    // Second call finds the table and does not commit anything.
    let version = store.version().await;
    ledger.ensure_schema(&store).await.unwrap();
    assert_eq!(store.version().await, version);
}

#[tokio::test]
async fn test_missing_table_without_create() {
    let store = MemoryStore::new();
    let ledger = Ledger::new(LedgerConfig::new().create_if_missing(false)).unwrap();

    let err = ledger.ensure_schema(&store).await.unwrap_err();
    assert!(matches!(err, MigrationError::InvalidConfig(_)));

    // Lookups against a store that never had a ledger report "not applied".
    assert!(!ledger.has_record(&store, &key("events", "0001")).await.unwrap());
    assert!(ledger.records(&store).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_existing_table_must_have_configured_columns() {
    let store = MemoryStore::new();
    store
        .execute("CREATE TABLE migration_ledger (namespace TEXT, label TEXT)")
        .await
        .unwrap();

    let err = Ledger::default().ensure_schema(&store).await.unwrap_err();
    assert!(err.to_string().contains("has no column 'name'"));
}

#[tokio::test]
async fn test_record_visible_only_after_commit() {
    let (store, ledger) = prepared().await;
    let applied = key("events", "rename_tenant_brand");

    let mut tx = store.begin().await.unwrap();
    ledger.record_applied(tx.as_mut(), &applied).await.unwrap();

    assert!(ledger.has_record_in(tx.as_mut(), &applied).await.unwrap());
    assert!(!ledger.has_record(&store, &applied).await.unwrap());

    tx.commit().await.unwrap();
    assert!(ledger.has_record(&store, &applied).await.unwrap());
}

#[tokio::test]
async fn test_record_discarded_with_rollback() {
    let (store, ledger) = prepared().await;
    let applied = key("events", "rename_tenant_brand");

    let mut tx = store.begin().await.unwrap();
    ledger.record_applied(tx.as_mut(), &applied).await.unwrap();
    tx.rollback().await.unwrap();
    assert!(!ledger.has_record(&store, &applied).await.unwrap());

    {
        let mut tx = store.begin().await.unwrap();
        ledger.record_applied(tx.as_mut(), &applied).await.unwrap();
        // dropped without commit
    }
    assert!(!ledger.has_record(&store, &applied).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_insert_is_constraint_violation() {
    let (store, ledger) = prepared().await;
    let applied = key("authentik_brands", "0005_import_from_tenants");

    let mut tx = store.begin().await.unwrap();
    ledger.record_applied(tx.as_mut(), &applied).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = ledger.record_applied(tx.as_mut(), &applied).await.unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(err.step(), Some(&applied));
    tx.rollback().await.unwrap();

    assert_eq!(ledger.records(&store).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_name_in_different_namespaces() {
    let (store, ledger) = prepared().await;

    let mut tx = store.begin().await.unwrap();
    ledger.record_applied(tx.as_mut(), &key("authentik_events", "0001_initial")).await.unwrap();
    ledger.record_applied(tx.as_mut(), &key("authentik_brands", "0001_initial")).await.unwrap();
    tx.commit().await.unwrap();

    let records = ledger.records(&store).await.unwrap();
    let keys: Vec<&LedgerKey> = records.iter().map(|r| &r.key).collect();
    assert_eq!(
        keys,
        vec![&key("authentik_events", "0001_initial"), &key("authentik_brands", "0001_initial")]
    );
}

#[tokio::test]
async fn test_store_unavailable() {
    let (store, ledger) = prepared().await;
    store.set_available(false);

    let err = ledger.has_record(&store, &key("events", "0001")).await.unwrap_err();
    assert!(err.is_store_unavailable());

    let err = ledger.ensure_schema(&store).await.unwrap_err();
    assert!(err.is_store_unavailable());

    store.set_available(true);
    assert!(!ledger.has_record(&store, &key("events", "0001")).await.unwrap());
}

#[tokio::test]
async fn test_custom_ledger_layout() {
    let store = MemoryStore::new();
    let config = LedgerConfig::from_json(
        r#"{ "table": "django_migrations", "namespace_column": "app", "applied_at_column": "applied" }"#,
    )
    .unwrap();
    let ledger = Ledger::new(config).unwrap();
    ledger.ensure_schema(&store).await.unwrap();

    store
        .execute(
            "INSERT INTO django_migrations (app, name, applied) \
             VALUES ('authentik_brands', '0005_import_from_tenants', '2024-03-01T12:00:00Z')",
        )
        .await
        .unwrap();

    assert!(
        ledger
            .has_record(&store, &key("authentik_brands", "0005_import_from_tenants"))
            .await
            .unwrap()
    );
    let records = ledger.records(&store).await.unwrap();
    assert_eq!(records[0].applied_at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
}

/// Runner tests
///
/// Sequential runs over an explicit registry, including the tenant -> brand
/// label rewrite against a Django-style ledger.
/// Run with: cargo test --test runner_tests

use async_trait::async_trait;
use migration_ledger::migration::builtin;
use migration_ledger::prelude::*;
use std::sync::Arc;

async fn column(store: &MemoryStore, sql: &str, name: &str) -> Vec<Value> {
    store.fetch(sql).await.unwrap().column_values(name).unwrap()
}

fn texts(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

/// Store laid out like an authentik install that still carries tenant labels.
async fn tenant_era_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for sql in [
        "CREATE TABLE django_migrations (app TEXT NOT NULL, name TEXT NOT NULL, applied TIMESTAMP NOT NULL, UNIQUE (app, name))",
        "INSERT INTO django_migrations VALUES \
         ('authentik_tenants', '0001_initial', '2023-01-01T00:00:00Z'), \
         ('authentik_tenants', '0002_default_tenant', '2023-01-01T00:00:00Z'), \
         ('authentik_core', '0001_initial', '2023-01-01T00:00:00Z')",
        "CREATE TABLE django_content_type (app_label TEXT, model TEXT)",
        "INSERT INTO django_content_type VALUES ('authentik_tenants', 'tenant'), ('authentik_core', 'user')",
        "CREATE TABLE authentik_events_event (app TEXT, tenant TEXT)",
        "INSERT INTO authentik_events_event VALUES ('authentik.tenants.signals', 't1'), ('authentik.core', 't1')",
    ] {
        store.execute(sql).await.unwrap();
    }
    store
}

async fn import_brands(store: &MemoryStore) {
    store
        .execute(
            "INSERT INTO django_migrations VALUES \
             ('authentik_brands', '0005_import_from_tenants', '2024-03-01T00:00:00Z')",
        )
        .await
        .unwrap();
}

fn django_runner(store: Arc<MemoryStore>) -> Runner {
    let config = EngineConfig::new().ledger(builtin::django_ledger());
    let engine = MigrationEngine::with_config(store, config).unwrap();
    Runner::new(engine, builtin::registry().unwrap())
}

// ============================================================================
// tenant -> brand
// ============================================================================

#[tokio::test]
async fn test_nothing_runs_before_brands_import() {
    let store = tenant_era_store().await;
    let runner = django_runner(store.clone());

    assert!(runner.pending().await.unwrap().is_empty());
    let report = runner.run().await.unwrap();
    assert!(report.applied().is_empty());
    assert_eq!(report.skipped().len(), 2);

    assert!(store.describe_table("authentik_events_event").await.unwrap().unwrap().has_column("tenant"));
}

#[tokio::test]
async fn test_rewrite_labels_after_brands_import() {
    let store = tenant_era_store().await;
    import_brands(&store).await;
    let runner = django_runner(store.clone());

    assert_eq!(
        runner.pending().await.unwrap(),
        vec![
            LedgerKey::new("authentik_events", "0003_tenants_to_brands"),
            LedgerKey::new("system", "to_2024_3_tenant_to_brand"),
        ]
    );

    let report = runner.run().await.unwrap();
    assert_eq!(report.applied().len(), 2);

    assert!(store.describe_table("authentik_events_event").await.unwrap().unwrap().has_column("brand"));
    assert_eq!(
        column(&store, "SELECT app FROM django_migrations", "app").await,
        texts(&[
            "authentik_brands",
            "authentik_brands",
            "authentik_core",
            "authentik_brands",
            "authentik_events",
            "system",
        ])
    );
    assert_eq!(
        column(&store, "SELECT name FROM django_migrations WHERE app = 'authentik_brands'", "name").await,
        texts(&["0001_initial", "0002_default_brand", "0005_import_from_brands"])
    );
    assert_eq!(
        column(&store, "SELECT app_label FROM django_content_type", "app_label").await,
        texts(&["authentik_brands", "authentik_core"])
    );
    assert_eq!(
        column(&store, "SELECT app FROM authentik_events_event", "app").await,
        texts(&["authentik.brands.signals", "authentik.core"])
    );

    // Second run: both steps are in the ledger, nothing is committed.
    let version = store.version().await;
    let report = runner.run().await.unwrap();
    assert!(report.applied().is_empty());
    assert_eq!(store.version().await, version);
}

#[tokio::test]
async fn test_label_rewrite_and_ledger_insert_commit_together() {
    let store = tenant_era_store().await;
    import_brands(&store).await;
    let config = EngineConfig::new().ledger(builtin::django_ledger());
    let engine = MigrationEngine::with_config(store.clone(), config).unwrap();
    let step = builtin::system_tenant_to_brand().unwrap();

    // One UPDATE per rename (app, name, content type, event app) succeeds;
    // the ledger insert after them fails.
    store.inject_fault_after(4);
    let err = engine.apply(&step).await.unwrap_err();
    match &err {
        MigrationError::PartialStatementFailure { step: failed, statement, .. } => {
            assert_eq!(failed, step.key());
            assert!(statement.starts_with("INSERT INTO django_migrations"));
        }
        other => panic!("Expected PartialStatementFailure, got {:?}", other),
    }

    assert_eq!(
        column(&store, "SELECT app FROM django_migrations", "app").await,
        texts(&["authentik_tenants", "authentik_tenants", "authentik_core", "authentik_brands"])
    );
    assert_eq!(
        column(&store, "SELECT app_label FROM django_content_type", "app_label").await,
        texts(&["authentik_tenants", "authentik_core"])
    );
    assert_eq!(
        column(&store, "SELECT app FROM authentik_events_event", "app").await,
        texts(&["authentik.tenants.signals", "authentik.core"])
    );
    assert!(engine.needs_migration(&step).await.unwrap());
}

#[tokio::test]
async fn test_label_collision_aborts_whole_step() {
    let store = tenant_era_store().await;
    import_brands(&store).await;
    // A brands row that collides with the renamed tenants row.
    store
        .execute("INSERT INTO django_migrations VALUES ('authentik_brands', '0001_initial', '2024-03-01T00:00:00Z')")
        .await
        .unwrap();

    let config = EngineConfig::new().ledger(builtin::django_ledger());
    let engine = MigrationEngine::with_config(store.clone(), config).unwrap();
    let step = builtin::system_tenant_to_brand().unwrap();

    let err = engine.apply(&step).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::PartialStatementFailure {
            source: StoreError::ConstraintViolation(_),
            ..
        }
    ));
    assert_eq!(
        column(&store, "SELECT app_label FROM django_content_type", "app_label").await,
        texts(&["authentik_tenants", "authentik_core"])
    );
}

// ============================================================================
// Hand-written steps
// ============================================================================

/// Moves legacy jobs to a new queue; needed while any legacy job is left.
struct DrainLegacyJobs {
    key: LedgerKey,
}

#[async_trait]
impl MigrationStep for DrainLegacyJobs {
    fn key(&self) -> &LedgerKey {
        &self.key
    }

    async fn needs_migration(&self, reader: &StoreReader<'_>) -> Result<bool, MigrationError> {
        let legacy = reader
            .query(&SqlStatement::new("SELECT id FROM jobs WHERE queue = $1").bind("legacy"))
            .await?;
        Ok(!legacy.is_empty())
    }

    async fn run(&self, tx: &mut StepTransaction) -> Result<(), MigrationError> {
        let moved = tx
            .execute(SqlStatement::new("UPDATE jobs SET queue = $1 WHERE queue = $2").bind("default").bind("legacy"))
            .await?;
        if moved.rows_affected == 0 {
            return Err(tx.fail("no legacy jobs left to move"));
        }
        Ok(())
    }
}

/// Always gives up after writing something.
struct Broken {
    key: LedgerKey,
}

#[async_trait]
impl MigrationStep for Broken {
    fn key(&self) -> &LedgerKey {
        &self.key
    }

    async fn needs_migration(&self, _reader: &StoreReader<'_>) -> Result<bool, MigrationError> {
        Ok(true)
    }

    async fn run(&self, tx: &mut StepTransaction) -> Result<(), MigrationError> {
        tx.execute(SqlStatement::new("INSERT INTO jobs VALUES (99, 'broken')")).await?;
        Err(tx.fail("refusing to continue"))
    }
}

async fn jobs_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.execute("CREATE TABLE jobs (id INTEGER, queue TEXT)").await.unwrap();
    store
        .execute("INSERT INTO jobs VALUES (1, 'legacy'), (2, 'default')")
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_custom_step_with_query_guard() -> anyhow::Result<()> {
    let store = jobs_store().await;
    let mut registry = StepRegistry::new();
    registry.register(DrainLegacyJobs {
        key: LedgerKey::new("jobs", "0001_drain_legacy"),
    })?;
    let runner = Runner::new(MigrationEngine::new(store.clone()), registry);

    let report = runner.run().await?;
    assert_eq!(report.applied(), vec![&LedgerKey::new("jobs", "0001_drain_legacy")]);
    assert_eq!(
        store.fetch("SELECT queue FROM jobs").await?.column_values("queue"),
        Some(texts(&["default", "default"]))
    );
    assert!(runner.pending().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_stops_at_first_failure() {
    let store = jobs_store().await;
    let mut registry = StepRegistry::new();
    registry
        .register(DrainLegacyJobs {
            key: LedgerKey::new("jobs", "0001_drain_legacy"),
        })
        .unwrap()
        .register(Broken {
            key: LedgerKey::new("jobs", "0002_broken"),
        })
        .unwrap()
        .register(
            RenameStep::builder("jobs", "0003_rename_queue")
                .rename_column("jobs", "queue", "lane")
                .build()
                .unwrap(),
        )
        .unwrap();
    let runner = Runner::new(MigrationEngine::new(store.clone()), registry);

    let err = runner.run().await.unwrap_err();
    assert_eq!(err.failed_step, Some(LedgerKey::new("jobs", "0002_broken")));
    assert_eq!(err.completed.len(), 1);
    assert!(matches!(err.source, MigrationError::StepFailed { .. }));

    let message = err.to_string();
    assert!(message.contains("jobs/0002_broken"));
    assert!(message.contains("left unchanged"));

    // First step committed, the broken one left nothing, the third never ran.
    assert_eq!(
        column(&store, "SELECT id FROM jobs", "id").await,
        vec![Value::Integer(1), Value::Integer(2)]
    );
    assert!(store.describe_table("jobs").await.unwrap().unwrap().has_column("queue"));
    assert_eq!(
        runner.pending().await.unwrap(),
        vec![LedgerKey::new("jobs", "0002_broken"), LedgerKey::new("jobs", "0003_rename_queue")]
    );
}

#[tokio::test]
async fn test_registry_rejects_duplicate_keys() {
    let mut registry = StepRegistry::new();
    registry.register(builtin::events_tenant_to_brand().unwrap()).unwrap();

    let err = registry
        .register(builtin::events_tenant_to_brand().unwrap())
        .err()
        .unwrap();
    assert!(matches!(err, MigrationError::DuplicateStep(_)));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_unavailable_store_fails_run_before_any_step() {
    let store = jobs_store().await;
    let mut registry = StepRegistry::new();
    registry
        .register(DrainLegacyJobs {
            key: LedgerKey::new("jobs", "0001_drain_legacy"),
        })
        .unwrap();
    let runner = Runner::new(MigrationEngine::new(store.clone()), registry);

    store.set_available(false);
    let err = runner.run().await.unwrap_err();
    assert_eq!(err.failed_step, None);
    assert!(err.source.is_store_unavailable());
    assert!(err.completed.is_empty());

    store.set_available(true);
    assert_eq!(runner.run().await.unwrap().applied().len(), 1);
}

#[tokio::test]
async fn test_run_report_serializes() -> anyhow::Result<()> {
    let store = jobs_store().await;
    let mut registry = StepRegistry::new();
    registry.register(DrainLegacyJobs {
        key: LedgerKey::new("jobs", "0001_drain_legacy"),
    })?;
    let runner = Runner::new(MigrationEngine::new(store), registry);

    let report = runner.run().await?;
    let json = serde_json::to_value(&report)?;
    assert_eq!(json["run_id"], serde_json::json!(report.run_id.to_string()));
    assert_eq!(json["steps"][0]["key"]["namespace"], "jobs");
    assert_eq!(json["steps"][0]["outcome"]["Applied"]["statements"], 2);
    Ok(())
}

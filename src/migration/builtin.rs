//! The tenant-to-brand migrations, expressed as declarative steps.

use super::declarative::RenameStep;
use super::error::Result;
use super::guard::Guard;
use super::rename::{MatchMode, ValueScope};
use super::runner::StepRegistry;
use crate::config::LedgerConfig;

/// Table whose `tenant` column the events step renames.
pub const EVENTS_TABLE: &str = "authentik_events_event";

/// Ledger layout of a Django-managed store.
pub fn django_ledger() -> LedgerConfig {
    LedgerConfig::new()
        .table("django_migrations")
        .namespace_column("app")
        .name_column("name")
        .applied_at_column("applied")
}

/// `authentik_events.0003_tenants_to_brands`: rename the event column once
/// the brands history has imported its data from tenants.
pub fn events_tenant_to_brand() -> Result<RenameStep> {
    RenameStep::builder("authentik_events", "0003_tenants_to_brands")
        .guard(Guard::record_present("authentik_brands", "0005_import_from_tenants"))
        .rename_column(EVENTS_TABLE, "tenant", "brand")
        .describe("rename authentik_events_event.tenant to brand")
        .build()
}

/// `system.to_2024_3_tenant_to_brand`: rewrite every stored label that still
/// names the tenants app.
pub fn system_tenant_to_brand() -> Result<RenameStep> {
    RenameStep::builder("system", "to_2024_3_tenant_to_brand")
        .guard(Guard::record_present("authentik_brands", "0005_import_from_tenants"))
        .rename_value(
            ValueScope::new("django_migrations", "app"),
            "authentik_tenants",
            "authentik_brands",
            MatchMode::Substring,
        )
        .rename_value(
            ValueScope::new("django_migrations", "name").where_eq("app", "authentik_brands"),
            "tenant",
            "brand",
            MatchMode::Substring,
        )
        .rename_value(
            ValueScope::new("django_content_type", "app_label"),
            "authentik_tenants",
            "authentik_brands",
            MatchMode::Substring,
        )
        .rename_value(
            ValueScope::new(EVENTS_TABLE, "app"),
            "authentik.tenants",
            "authentik.brands",
            MatchMode::Substring,
        )
        .describe("rewrite tenant app labels to brand")
        .build()
}

/// Both steps in the order they have to run.
pub fn registry() -> Result<StepRegistry> {
    let mut registry = StepRegistry::new();
    registry
        .register(events_tenant_to_brand()?)?
        .register(system_tenant_to_brand()?)?;
    Ok(registry)
}

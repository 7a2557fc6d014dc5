use crate::migration::error::{MigrationError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .unwrap_or_else(|e| panic!("identifier pattern must compile: {}", e));
}

/// Check that `name` can be spliced into SQL as a bare identifier.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(MigrationError::InvalidConfig(format!(
            "{} '{}' is not a valid identifier",
            kind, name
        )))
    }
}

/// Where the ledger lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub table: String,
    pub namespace_column: String,
    pub name_column: String,
    pub applied_at_column: String,
    /// Create the ledger table on first use if it is missing
    pub create_if_missing: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: "migration_ledger".to_string(),
            namespace_column: "namespace".to_string(),
            name_column: "name".to_string(),
            applied_at_column: "applied_at".to_string(),
            create_if_missing: true,
        }
    }
}

impl LedgerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub fn namespace_column(mut self, column: &str) -> Self {
        self.namespace_column = column.to_string();
        self
    }

    pub fn name_column(mut self, column: &str) -> Self {
        self.name_column = column.to_string();
        self
    }

    pub fn applied_at_column(mut self, column: &str) -> Self {
        self.applied_at_column = column.to_string();
        self
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Identifiers must be valid and the three columns distinct.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("ledger table", &self.table)?;
        validate_identifier("namespace column", &self.namespace_column)?;
        validate_identifier("name column", &self.name_column)?;
        validate_identifier("applied_at column", &self.applied_at_column)?;

        let columns = [&self.namespace_column, &self.name_column, &self.applied_at_column];
        for (i, column) in columns.iter().enumerate() {
            if columns[i + 1..].contains(column) {
                return Err(MigrationError::InvalidConfig(format!(
                    "ledger column '{}' is used twice",
                    column
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MigrationError::InvalidConfig(format!("ledger config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ledger: LedgerConfig,
    /// Emit a tracing event for every statement a step executes
    pub log_statements: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            log_statements: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MigrationError::InvalidConfig(format!("engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.ledger.table, "migration_ledger");
        assert!(config.ledger.create_if_missing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "ledger": { "table": "django_migrations", "namespace_column": "app" }, "log_statements": false }"#,
        )
        .unwrap();
        assert_eq!(config.ledger.table, "django_migrations");
        assert_eq!(config.ledger.namespace_column, "app");
        assert_eq!(config.ledger.name_column, "name");
        assert!(!config.log_statements);
    }

    #[test]
    fn test_invalid_identifiers() {
        let err = LedgerConfig::new().table("ledger; DROP TABLE x").validate().unwrap_err();
        assert!(matches!(err, MigrationError::InvalidConfig(_)));

        assert!(LedgerConfig::new().name_column("1name").validate().is_err());
        assert!(LedgerConfig::new().name_column("namespace").validate().is_err());
        assert!(LedgerConfig::from_json("{ not json").is_err());
    }
}

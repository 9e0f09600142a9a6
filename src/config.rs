//! Layered engine configuration and tracing bootstrap.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::entities::enums::{CreditPolicy, InvoiceQuantityPolicy};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_AUDIT_SINK: &str = "tracing";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub database_url: String,

    #[validate(length(min = 1))]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// Export spans over OTLP. `OTEL_EXPORTER_OTLP_ENDPOINT` also turns this on.
    #[serde(default)]
    pub otel_enabled: bool,

    #[serde(default)]
    pub otel_endpoint: Option<String>,

    /// Apply pending migrations when the engine connects.
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Attempts per transaction when a write loses a version race (1-10)
    #[serde(default = "default_transaction_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub transaction_retry_attempts: u32,

    /// Base backoff between transaction attempts, doubled per retry
    #[serde(default = "default_transaction_retry_backoff_ms")]
    pub transaction_retry_backoff_ms: u64,

    /// Capacity of the post-commit audit channel
    #[serde(default = "default_audit_channel_capacity")]
    #[validate(custom = "validate_audit_channel_capacity")]
    pub audit_channel_capacity: usize,

    /// "tracing", "database" or "none"
    #[serde(default = "default_audit_sink")]
    #[validate(custom = "validate_audit_sink")]
    pub audit_sink: String,

    /// Used for tenants without a settings row
    #[serde(default = "default_invoice_quantity_policy")]
    pub default_invoice_quantity_policy: InvoiceQuantityPolicy,

    /// Percent over the base quantity that may still be invoiced
    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub default_invoice_tolerance_percent: Decimal,

    /// Percent over the ordered quantity that may still be received
    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub default_receipt_tolerance_percent: Decimal,

    #[serde(default = "default_credit_policy")]
    pub default_credit_policy: CreditPolicy,

    /// Zero-padded width of the numeric part of document numbers
    #[serde(default = "default_document_number_width")]
    #[validate(range(min = 1, max = 12))]
    pub document_number_width: usize,
}

impl AppConfig {
    /// Defaults for everything but the connection and environment.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            otel_enabled: false,
            otel_endpoint: None,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            transaction_retry_attempts: default_transaction_retry_attempts(),
            transaction_retry_backoff_ms: default_transaction_retry_backoff_ms(),
            audit_channel_capacity: default_audit_channel_capacity(),
            audit_sink: default_audit_sink(),
            default_invoice_quantity_policy: default_invoice_quantity_policy(),
            default_invoice_tolerance_percent: Decimal::ZERO,
            default_receipt_tolerance_percent: Decimal::ZERO,
            default_credit_policy: default_credit_policy(),
            document_number_width: default_document_number_width(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn check_cross_field(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.is_production() && self.database_url.starts_with("sqlite::memory:") {
            let mut err = ValidationError::new("database_url_in_memory");
            err.message = Some("An in-memory database must not be used in production".into());
            errors.add("database_url", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn otlp_endpoint(&self) -> Option<String> {
        let from_env = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .ok()
            .filter(|s| !s.trim().is_empty());
        match (self.otel_enabled, from_env) {
            (_, Some(endpoint)) => Some(endpoint),
            (true, None) => Some(
                self.otel_endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.to_string()),
            ),
            (false, None) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_transaction_retry_attempts() -> u32 {
    3
}
fn default_transaction_retry_backoff_ms() -> u64 {
    25
}
fn default_audit_channel_capacity() -> usize {
    1024
}
fn default_audit_sink() -> String {
    DEFAULT_AUDIT_SINK.to_string()
}
fn default_invoice_quantity_policy() -> InvoiceQuantityPolicy {
    InvoiceQuantityPolicy::Ordered
}
fn default_credit_policy() -> CreditPolicy {
    CreditPolicy::Advisory
}
fn default_document_number_width() -> usize {
    6
}

fn one_of(code: &'static str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value.to_ascii_lowercase().as_str()) {
        return Ok(());
    }
    let mut err = ValidationError::new(code);
    err.message = Some(format!("Must be one of: {}", allowed.join(", ")).into());
    Err(err)
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    one_of("log_level", level, &["trace", "debug", "info", "warn", "error"])
}

fn validate_audit_sink(value: &str) -> Result<(), ValidationError> {
    one_of("audit_sink", value, &["tracing", "database", "none"])
}

fn validate_audit_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("audit_channel_capacity");
        err.message = Some("audit_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_percent(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || *value > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("percent");
        err.message = Some("Tolerance must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

fn otlp_tracer(
    endpoint: String,
) -> Result<opentelemetry_sdk::trace::Tracer, opentelemetry::trace::TraceError> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let service_name = env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "docflow".to_string());
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(
            sdktrace::config()
                .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name)])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
}

/// Installs the global subscriber: env filter, plain or JSON output and,
/// when configured, an OTLP span exporter. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("docflow={},sea_orm=warn", cfg.log_level));

    let output = if cfg.log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };
    let registry = tracing_subscriber::registry()
        .with(output)
        .with(EnvFilter::new(directive));

    match cfg.otlp_endpoint().map(otlp_tracer) {
        Some(Ok(tracer)) => {
            let _ = registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init();
        }
        Some(Err(e)) => {
            let _ = registry.try_init();
            warn!(error = %e, "OTLP exporter unavailable; spans stay local");
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

/// Reads `config/default`, then `config/{RUN_ENV}`, then `APP__*` variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(CONFIG_DIR)
}

pub fn load_config_from(config_dir: &str) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(run_env = %run_env, config_dir, "loading configuration");

    if !Path::new(config_dir).exists() {
        info!(config_dir, "no config directory; using defaults and environment");
    }

    let app_config: AppConfig = Config::builder()
        .set_default("database_url", "sqlite://docflow.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
        .add_source(File::with_name(&format!("{config_dir}/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    app_config
        .validate()
        .and_then(|()| app_config.check_cross_field())
        .map_err(|e| {
            error!(errors = ?e, "configuration rejected");
            AppConfigError::Validation(e)
        })?;

    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "development".into())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.check_cross_field().is_ok());
        assert_eq!(cfg.default_credit_policy, CreditPolicy::Advisory);
        assert_eq!(cfg.transaction_retry_attempts, 3);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = base_config();
        cfg.transaction_retry_attempts = 0;
        cfg.audit_channel_capacity = 0;
        cfg.default_invoice_tolerance_percent = dec!(-1);
        cfg.audit_sink = "kafka".into();

        let errors = cfg.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("transaction_retry_attempts"));
        assert!(fields.contains_key("audit_channel_capacity"));
        assert!(fields.contains_key("default_invoice_tolerance_percent"));
        assert!(fields.contains_key("audit_sink"));
    }

    #[test]
    fn production_refuses_in_memory_database() {
        let mut cfg = base_config();
        cfg.environment = "production".into();
        assert!(cfg.check_cross_field().is_err());
    }

    #[test]
    fn pool_bounds_must_be_ordered() {
        let mut cfg = base_config();
        cfg.db_min_connections = 8;
        cfg.db_max_connections = 2;
        assert!(cfg.check_cross_field().is_err());
    }

    #[test]
    fn enabled_exporter_falls_back_to_local_collector() {
        let mut cfg = base_config();
        cfg.otel_enabled = true;
        if env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_err() {
            assert_eq!(cfg.otlp_endpoint().as_deref(), Some(DEFAULT_OTLP_ENDPOINT));
            cfg.otel_endpoint = Some("http://collector:4317".into());
            assert_eq!(cfg.otlp_endpoint().as_deref(), Some("http://collector:4317"));
        }
    }

    #[test]
    fn loads_layered_file() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            database_url = "sqlite::memory:"
            environment = "test"
            default_credit_policy = "ENFORCE"
            default_invoice_quantity_policy = "RECEIVED"
            default_invoice_tolerance_percent = "5"
            document_number_width = 4
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.default_credit_policy, CreditPolicy::Enforce);
        assert_eq!(
            cfg.default_invoice_quantity_policy,
            InvoiceQuantityPolicy::Received
        );
        assert_eq!(cfg.default_invoice_tolerance_percent, dec!(5));
        assert_eq!(cfg.document_number_width, 4);
    }
}

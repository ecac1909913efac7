//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::worker::RetryPolicy;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://postgres@localhost:5432/inforobot";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Enrichment Service Constants
// ============================================================================

/// Chat-completions endpoint of the extraction model.
pub const DEFAULT_ENRICH_API_URL: &str = "https://api.x.ai/v1/chat/completions";

/// Model identifier sent with every request.
pub const DEFAULT_ENRICH_MODEL: &str = "grok-3";

/// Per-call timeout in seconds.
pub const DEFAULT_ENRICH_TIMEOUT_SECS: u64 = 30;

/// Sampling temperature; low values keep the extraction verbatim.
pub const DEFAULT_ENRICH_TEMPERATURE: f32 = 0.1;

// ============================================================================
// Pipeline Constants
// ============================================================================

/// Number of concurrent worker loops.
pub const DEFAULT_PIPELINE_WORKERS: usize = 4;

/// Enrichment attempts per job when the service keeps rate-limiting.
pub const DEFAULT_PIPELINE_MAX_ATTEMPTS: u32 = 3;

/// First rate-limit backoff; doubles on every further attempt.
pub const DEFAULT_PIPELINE_RETRY_BASE_DELAY_SECS: u64 = 10;

/// Cap on a single rate-limit wait, including `Retry-After` hints.
pub const DEFAULT_PIPELINE_MAX_BACKOFF_SECS: u64 = 60;

/// Process-wide enrichment calls per second; 0 disables the throttle.
pub const DEFAULT_PIPELINE_ENRICH_RATE_PER_SEC: f64 = 0.1;

/// Reconciliation sweep period.
pub const DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Idle sleep between empty queue polls.
pub const DEFAULT_PIPELINE_POLL_INTERVAL_MS: u64 = 500;

/// How long a worker's claim on a request stays valid.
///
/// Must outlast the slowest possible job; see [`PipelineConfig::worst_case_job_time`].
pub const DEFAULT_PIPELINE_CLAIM_LEASE_SECS: u64 = 600;

/// A running job not acknowledged within this window is redelivered.
pub const DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS: u64 = 900;

/// Deliveries before a job is moved to the dead state.
pub const DEFAULT_QUEUE_MAX_DELIVERIES: i32 = 5;

/// Finished and dead jobs older than this are purged by the sweep.
pub const DEFAULT_QUEUE_RETENTION_DAYS: u64 = 7;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub enrichment: EnrichmentConfig,
    pub pipeline: PipelineConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// External enrichment (text extraction) service
#[derive(Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl std::fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl EnrichmentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Worker pool, retry, sweep, and queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Whether this process runs workers and the sweep timer
    pub enabled: bool,
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub max_backoff_secs: u64,
    pub enrich_rate_per_sec: f64,
    pub sweep_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub claim_lease_secs: u64,
    pub queue_visibility_timeout_secs: u64,
    pub queue_max_deliveries: i32,
    pub queue_retention_days: u64,
}

impl PipelineConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Minimum spacing between enrichment calls, or `None` when unthrottled
    pub fn enrich_min_interval(&self) -> Option<Duration> {
        if self.enrich_rate_per_sec > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.enrich_rate_per_sec).ok()
        } else {
            None
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn queue_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_visibility_timeout_secs)
    }

    pub fn queue_retention(&self) -> Duration {
        Duration::from_secs(self.queue_retention_days.saturating_mul(24 * 60 * 60))
    }

    /// Longest a single processing job can hold its claim
    ///
    /// Every attempt may time out, every gap may wait the full backoff cap,
    /// and every attempt may queue behind all other workers for a throttle slot.
    pub fn worst_case_job_time(&self, enrich_timeout: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        let throttle_wait = self
            .enrich_min_interval()
            .unwrap_or_default()
            .saturating_mul(u32::try_from(self.workers).unwrap_or(u32::MAX));

        enrich_timeout
            .saturating_add(throttle_wait)
            .saturating_mul(attempts)
            .saturating_add(RetryPolicy::from(self).worst_case_wait())
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env_string_or("INFOROBOT_HOST", DEFAULT_SERVER_HOST),
                port: env_or("INFOROBOT_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "INFOROBOT_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string_or("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                min_connections: env_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                ),
            },
            cors: CorsConfig {
                allowed_origins: env_string_or("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            enrichment: EnrichmentConfig {
                api_url: env_string_or("GROK_API_URL", DEFAULT_ENRICH_API_URL),
                api_key: env_string_or("GROK_API_KEY", ""),
                model: env_string_or("GROK_MODEL", DEFAULT_ENRICH_MODEL),
                timeout_secs: env_or("ENRICH_TIMEOUT_SECS", DEFAULT_ENRICH_TIMEOUT_SECS),
                temperature: env_or("ENRICH_TEMPERATURE", DEFAULT_ENRICH_TEMPERATURE),
            },
            pipeline: PipelineConfig {
                enabled: env_or("PIPELINE_ENABLED", true),
                workers: env_or("PIPELINE_WORKERS", DEFAULT_PIPELINE_WORKERS),
                max_attempts: env_or("PIPELINE_MAX_ATTEMPTS", DEFAULT_PIPELINE_MAX_ATTEMPTS),
                retry_base_delay_secs: env_or(
                    "PIPELINE_RETRY_BASE_DELAY_SECS",
                    DEFAULT_PIPELINE_RETRY_BASE_DELAY_SECS,
                ),
                max_backoff_secs: env_or(
                    "PIPELINE_MAX_BACKOFF_SECS",
                    DEFAULT_PIPELINE_MAX_BACKOFF_SECS,
                ),
                enrich_rate_per_sec: env_or(
                    "PIPELINE_ENRICH_RATE_PER_SEC",
                    DEFAULT_PIPELINE_ENRICH_RATE_PER_SEC,
                ),
                sweep_interval_secs: env_or(
                    "PIPELINE_SWEEP_INTERVAL_SECS",
                    DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS,
                ),
                poll_interval_ms: env_or(
                    "PIPELINE_POLL_INTERVAL_MS",
                    DEFAULT_PIPELINE_POLL_INTERVAL_MS,
                ),
                claim_lease_secs: env_or(
                    "PIPELINE_CLAIM_LEASE_SECS",
                    DEFAULT_PIPELINE_CLAIM_LEASE_SECS,
                ),
                queue_visibility_timeout_secs: env_or(
                    "QUEUE_VISIBILITY_TIMEOUT_SECS",
                    DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
                ),
                queue_max_deliveries: env_or("QUEUE_MAX_DELIVERIES", DEFAULT_QUEUE_MAX_DELIVERIES),
                queue_retention_days: env_or(
                    "QUEUE_RETENTION_DAYS",
                    DEFAULT_QUEUE_RETENTION_DAYS,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.enrichment.api_url.is_empty() {
            anyhow::bail!("Enrichment API URL cannot be empty");
        }

        if self.enrichment.timeout_secs == 0 {
            anyhow::bail!("Enrichment timeout must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.enrichment.temperature) {
            anyhow::bail!(
                "Enrichment temperature must be between 0.0 and 2.0, got {}",
                self.enrichment.temperature
            );
        }

        if self.pipeline.workers == 0 {
            anyhow::bail!("Pipeline needs at least one worker");
        }

        if self.pipeline.max_attempts == 0 {
            anyhow::bail!("Pipeline max_attempts must be at least 1");
        }

        if self.pipeline.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep interval must be greater than 0");
        }

        if self.pipeline.queue_max_deliveries < 1 {
            anyhow::bail!("Queue max_deliveries must be at least 1");
        }

        if !self.pipeline.enrich_rate_per_sec.is_finite() || self.pipeline.enrich_rate_per_sec < 0.0
        {
            anyhow::bail!(
                "Enrichment rate must be a non-negative number, got {}",
                self.pipeline.enrich_rate_per_sec
            );
        }

        if self.pipeline.queue_retention_days == 0 {
            anyhow::bail!("Queue retention must be at least 1 day");
        }

        let worst_case = self.pipeline.worst_case_job_time(self.enrichment.timeout());
        if self.pipeline.claim_lease() < worst_case {
            anyhow::bail!(
                "Claim lease ({}s) is shorter than the worst-case job time ({}s); \
                 raise PIPELINE_CLAIM_LEASE_SECS or lower the timeout, attempts, or backoff cap",
                self.pipeline.claim_lease_secs,
                worst_case.as_secs()
            );
        }

        if self.pipeline.queue_visibility_timeout() < self.pipeline.claim_lease() {
            anyhow::bail!(
                "Queue visibility timeout ({}s) must be at least the claim lease ({}s)",
                self.pipeline.queue_visibility_timeout_secs,
                self.pipeline.claim_lease_secs
            );
        }

        if self.enrichment.api_key.is_empty() {
            tracing::warn!("GROK_API_KEY is not set - enrichment calls will be rejected upstream");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            enrichment: EnrichmentConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ENRICH_API_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_ENRICH_MODEL.to_string(),
            timeout_secs: DEFAULT_ENRICH_TIMEOUT_SECS,
            temperature: DEFAULT_ENRICH_TEMPERATURE,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: DEFAULT_PIPELINE_WORKERS,
            max_attempts: DEFAULT_PIPELINE_MAX_ATTEMPTS,
            retry_base_delay_secs: DEFAULT_PIPELINE_RETRY_BASE_DELAY_SECS,
            max_backoff_secs: DEFAULT_PIPELINE_MAX_BACKOFF_SECS,
            enrich_rate_per_sec: DEFAULT_PIPELINE_ENRICH_RATE_PER_SEC,
            sweep_interval_secs: DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS,
            poll_interval_ms: DEFAULT_PIPELINE_POLL_INTERVAL_MS,
            claim_lease_secs: DEFAULT_PIPELINE_CLAIM_LEASE_SECS,
            queue_visibility_timeout_secs: DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
            queue_max_deliveries: DEFAULT_QUEUE_MAX_DELIVERIES,
            queue_retention_days: DEFAULT_QUEUE_RETENTION_DAYS,
        }
    }
}

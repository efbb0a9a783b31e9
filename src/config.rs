//! Runtime configuration
//!
//! Every setting can be given as a flag or through the environment, so the
//! same binary works from a shell and from a Deployment manifest.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

/// Reconciliation loop settings
#[derive(Args, Clone, Debug)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when unset
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Deadline for a single reconcile invocation, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 60)]
    pub reconcile_timeout_secs: u64,

    /// Requeue delay after a phase was applied, in seconds
    #[arg(long, env = "PROGRESS_REQUEUE_SECS", default_value_t = 1)]
    pub progress_requeue_secs: u64,

    /// Requeue delay after a failed invocation, in seconds
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 5)]
    pub error_requeue_secs: u64,

    /// Requeue delay after a failure that needs outside intervention, in seconds
    #[arg(long, env = "PERMANENT_ERROR_REQUEUE_SECS", default_value_t = 300)]
    pub permanent_error_requeue_secs: u64,

    /// Periodic re-check of converged resources, in seconds; 0 waits for a change
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 0)]
    pub resync_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            reconcile_timeout_secs: 60,
            progress_requeue_secs: 1,
            error_requeue_secs: 5,
            permanent_error_requeue_secs: 300,
            resync_interval_secs: 0,
        }
    }
}

impl ControllerConfig {
    /// Deadline for a single reconcile invocation
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Requeue delay after a phase was applied
    pub fn progress_requeue(&self) -> Duration {
        Duration::from_secs(self.progress_requeue_secs)
    }

    /// Requeue delay after a failure
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    /// Requeue delay after a failure a retry alone cannot fix
    pub fn permanent_error_requeue(&self) -> Duration {
        Duration::from_secs(self.permanent_error_requeue_secs)
    }

    /// Resync interval for converged resources, if enabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

/// Storage service connection settings
#[derive(Args, Clone, Debug)]
pub struct AdapterConfig {
    /// Base URL of the storage management API; buckets live in memory when unset
    #[arg(long = "storage-api-endpoint", env = "STORAGE_API_ENDPOINT", default_value = "")]
    pub endpoint: String,

    /// Bearer token for the storage management API
    #[arg(long = "storage-api-token", env = "STORAGE_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Request timeout for the storage management API, in seconds
    #[arg(long = "storage-api-timeout-secs", env = "STORAGE_API_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl AdapterConfig {
    /// Returns true if an external storage API is configured
    pub fn is_remote(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}

/// Admission webhook server settings
#[derive(Args, Clone, Debug)]
pub struct WebhookConfig {
    /// Address the webhook server listens on
    #[arg(long = "webhook-bind-addr", env = "WEBHOOK_BIND_ADDR", default_value = "0.0.0.0:9443")]
    pub bind_addr: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        controller: ControllerConfig,
        #[command(flatten)]
        adapter: AdapterConfig,
        #[command(flatten)]
        webhook: WebhookConfig,
    }

    #[test]
    fn test_defaults_match_flag_defaults() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        let defaults = ControllerConfig::default();

        assert_eq!(cli.controller.reconcile_timeout_secs, defaults.reconcile_timeout_secs);
        assert_eq!(cli.controller.progress_requeue_secs, defaults.progress_requeue_secs);
        assert_eq!(cli.controller.error_requeue_secs, defaults.error_requeue_secs);
        assert_eq!(
            cli.controller.permanent_error_requeue_secs,
            defaults.permanent_error_requeue_secs
        );
        assert_eq!(cli.controller.resync_interval(), None);
        assert_eq!(cli.webhook.bind_addr.port(), 9443);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::try_parse_from([
            "test",
            "--resync-interval-secs",
            "300",
            "--storage-api-endpoint",
            "https://storage.example.com",
        ])
        .unwrap();

        assert_eq!(cli.controller.resync_interval(), Some(Duration::from_secs(300)));
        assert!(cli.adapter.is_remote());
    }

    #[test]
    fn test_adapter_without_endpoint_is_local() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        assert!(!cli.adapter.is_remote());
        assert_eq!(cli.adapter.timeout_secs, 30);
    }
}

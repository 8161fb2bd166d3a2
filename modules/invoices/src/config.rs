use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the invoices module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoicesConfig {
    /// How often the overdue sweeper runs.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Default payment term; an open invoice becomes overdue after it.
    #[serde(default = "default_overdue_after_days")]
    pub overdue_after_days: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,
}

impl Default for InvoicesConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            overdue_after_days: default_overdue_after_days(),
            currency: default_currency(),
            tenant_header: default_tenant_header(),
        }
    }
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_overdue_after_days() -> u32 {
    30
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_tenant_header() -> String {
    clients::tenancy::DEFAULT_TENANT_HEADER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: InvoicesConfig = serde_json::from_value(serde_json::json!({
            "sweep_interval": "250ms",
            "overdue_after_days": 14
        }))
        .unwrap();
        assert_eq!(cfg.sweep_interval, Duration::from_millis(250));
        assert_eq!(cfg.overdue_after_days, 14);
        assert_eq!(cfg.currency, "EUR");
        assert_eq!(cfg.tenant_header, "x-tenant-id");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res: Result<InvoicesConfig, _> =
            serde_json::from_value(serde_json::json!({ "sweep_every": "1s" }));
        assert!(res.is_err());
    }
}

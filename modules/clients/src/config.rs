use serde::{Deserialize, Serialize};

/// Configuration for the clients module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientsConfig {
    /// Request header carrying the tenant id.
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,
    #[serde(default = "default_max_clients_per_tenant")]
    pub max_clients_per_tenant: usize,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            tenant_header: default_tenant_header(),
            max_clients_per_tenant: default_max_clients_per_tenant(),
        }
    }
}

fn default_tenant_header() -> String {
    crate::tenancy::DEFAULT_TENANT_HEADER.to_string()
}

fn default_max_clients_per_tenant() -> usize {
    10_000
}

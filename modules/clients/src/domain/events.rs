use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::Client;

/// Published synchronously right after a client is stored.
pub const CLIENT_CREATED: &str = "client.created";

/// Payload of [`CLIENT_CREATED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCreated {
    pub tenant_id: String,
    pub client_id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&Client> for ClientCreated {
    fn from(client: &Client) -> Self {
        Self {
            tenant_id: client.tenant_id.clone(),
            client_id: client.id,
            name: client.name.clone(),
            email: client.email.clone(),
        }
    }
}

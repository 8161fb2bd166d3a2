use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::{Client, NewClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDto {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<Client> for ClientDto {
    fn from(c: Client) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateClientReq {
    pub name: String,
    pub email: String,
}

impl From<CreateClientReq> for NewClient {
    fn from(req: CreateClientReq) -> Self {
        Self {
            name: req.name,
            email: req.email,
        }
    }
}

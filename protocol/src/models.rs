use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::identity::Role;
use crate::level::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualificationTier {
    Junior,
    MidLevel,
    Senior,
}

/// Top-level record: the consultant who owns a portfolio of clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyst {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default = "default_analyst_role")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification: Option<QualificationTier>,
}

fn default_analyst_role() -> Role {
    Role::Analyst
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Tax or registration document number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    pub analyst_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farm {
    pub id: String,
    pub name: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_hectares: Option<f64>,
}

/// Any record of the hierarchy, tagged with its level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Analyst(Analyst),
    Client(Client),
    Farm(Farm),
}

impl Entity {
    pub fn level(&self) -> Level {
        match self {
            Entity::Analyst(_) => Level::Top,
            Entity::Client(_) => Level::Mid,
            Entity::Farm(_) => Level::Leaf,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Analyst(analyst) => &analyst.id,
            Entity::Client(client) => &client.id,
            Entity::Farm(farm) => &farm.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Analyst(analyst) => &analyst.name,
            Entity::Client(client) => &client.name,
            Entity::Farm(farm) => &farm.name,
        }
    }

    /// Id of the owning record one level up; `None` for analysts.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Entity::Analyst(_) => None,
            Entity::Client(client) => Some(&client.analyst_id),
            Entity::Farm(farm) => Some(&farm.client_id),
        }
    }

    pub fn as_analyst(&self) -> Option<&Analyst> {
        match self {
            Entity::Analyst(analyst) => Some(analyst),
            _ => None,
        }
    }

    pub fn as_client(&self) -> Option<&Client> {
        match self {
            Entity::Client(client) => Some(client),
            _ => None,
        }
    }

    pub fn as_farm(&self) -> Option<&Farm> {
        match self {
            Entity::Farm(farm) => Some(farm),
            _ => None,
        }
    }

    /// Sort key for the name-ascending order every list is kept in.
    pub fn sort_key(&self) -> (String, String) {
        (self.name().to_lowercase(), self.id().to_string())
    }
}

impl From<Analyst> for Entity {
    fn from(value: Analyst) -> Self {
        Entity::Analyst(value)
    }
}

impl From<Client> for Entity {
    fn from(value: Client) -> Self {
        Entity::Client(value)
    }
}

impl From<Farm> for Entity {
    fn from(value: Farm) -> Self {
        Entity::Farm(value)
    }
}

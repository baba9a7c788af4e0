use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;
use strum_macros::EnumString;

use crate::models::Analyst;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Manager,
    Analyst,
}

impl Role {
    /// Elevated roles may browse and select any analyst; everyone else is
    /// pinned to their own portfolio.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }
}

/// The signed-in caller, as supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            name: None,
            email: None,
        }
    }

    pub fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }

    /// The caller presented as an analyst record, used in place of a fetched
    /// top-level list for restricted callers.
    pub fn as_analyst(&self) -> Analyst {
        Analyst {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            email: self.email.clone(),
            role: self.role,
            qualification: None,
        }
    }
}

//! Role-based resolution of the analyst every client/farm query is scoped to.

use fieldscope_protocol::Entity;
use fieldscope_protocol::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Admins and managers: the selected analyst is the scope.
    Elevated,
    /// Everyone else is pinned to their own portfolio.
    Restricted(&'a Identity),
    /// No caller yet. Nothing below the top level is reachable.
    Anonymous,
}

impl<'a> Scope<'a> {
    pub fn resolve(identity: Option<&'a Identity>) -> Self {
        match identity {
            Some(identity) if identity.is_elevated() => Scope::Elevated,
            Some(identity) => Scope::Restricted(identity),
            None => Scope::Anonymous,
        }
    }

    /// The analyst id mid/leaf fetches, validation and realtime use. Never the
    /// raw `top_id` for restricted callers.
    pub fn effective_top_id(self, top_id: Option<&'a str>) -> Option<&'a str> {
        match self {
            Scope::Elevated => top_id,
            Scope::Restricted(identity) => Some(identity.id.as_str()),
            Scope::Anonymous => None,
        }
    }

    /// Whether the analyst list is fetched and selectable at all.
    pub fn browses_top_level(self) -> bool {
        matches!(self, Scope::Elevated)
    }

    /// Single-row stand-in for the analyst list of a restricted caller.
    pub fn synthetic_top(self) -> Option<Entity> {
        match self {
            Scope::Restricted(identity) => Some(Entity::Analyst(identity.as_analyst())),
            Scope::Elevated | Scope::Anonymous => None,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Who a grant applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Person,
    Group,
}

/// Access level conferred by a grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Discover,
    Read,
    Edit,
}

impl Display for AccessLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AccessLevel::Discover => write!(f, "discover"),
            AccessLevel::Read => write!(f, "read"),
            AccessLevel::Edit => write!(f, "edit"),
        }
    }
}

/// One entry of an access-control list.
///
/// Works and file sets store their lists as JSONB arrays of this shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub agent_type: AgentType,
    pub agent: String,
    pub access: AccessLevel,
}

impl PermissionGrant {
    pub fn person(agent: impl Into<String>, access: AccessLevel) -> Self {
        Self {
            agent_type: AgentType::Person,
            agent: agent.into(),
            access,
        }
    }

    pub fn group(agent: impl Into<String>, access: AccessLevel) -> Self {
        Self {
            agent_type: AgentType::Group,
            agent: agent.into(),
            access,
        }
    }

    /// Plain mapping form, e.g. `{"agent_type": "person", "agent": "a", "access": "edit"}`
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        let agent_type = match self.agent_type {
            AgentType::Person => "person",
            AgentType::Group => "group",
        };
        map.insert("agent_type".to_string(), agent_type.into());
        map.insert("agent".to_string(), self.agent.clone().into());
        map.insert("access".to_string(), self.access.to_string().into());
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn to_map_matches_serialized_form() {
        let grant = PermissionGrant::person("a", AccessLevel::Edit);
        let map = serde_json::Value::Object(grant.to_map());
        assert_eq!(map, serde_json::to_value(&grant).unwrap());
        assert_eq!(
            map,
            json!({"agent_type": "person", "agent": "a", "access": "edit"})
        );
    }

    #[test]
    fn deserializes_group_grant() {
        let grant: PermissionGrant =
            serde_json::from_value(json!({"agent_type": "group", "agent": "public", "access": "read"}))
                .unwrap();
        assert_eq!(grant, PermissionGrant::group("public", AccessLevel::Read));
    }
}

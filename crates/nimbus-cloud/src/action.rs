//! Record of the mutating calls issued during one reconciliation

use serde::{Deserialize, Serialize};

/// A change that was requested from the cloud
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Type of change
    pub action_type: ActionType,

    /// Resource type ("server" or "floating-ip")
    pub resource_type: String,

    /// Server name or floating IP address
    pub resource_id: String,

    /// Human-readable description
    pub description: String,
}

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Delete,
    Attach,
    Detach,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Attach => write!(f, "attach"),
            ActionType::Detach => write!(f, "detach"),
        }
    }
}

impl Action {
    pub fn create_server(name: &str) -> Self {
        Self {
            action_type: ActionType::Create,
            resource_type: "server".to_string(),
            resource_id: name.to_string(),
            description: format!("Created server {}", name),
        }
    }

    pub fn delete_server(name: &str) -> Self {
        Self {
            action_type: ActionType::Delete,
            resource_type: "server".to_string(),
            resource_id: name.to_string(),
            description: format!("Deleted server {}", name),
        }
    }

    pub fn attach_floating_ip(server: &str, address: &str) -> Self {
        Self {
            action_type: ActionType::Attach,
            resource_type: "floating-ip".to_string(),
            resource_id: address.to_string(),
            description: format!("Attached floating IP {} to {}", address, server),
        }
    }

    pub fn detach_floating_ip(server: &str, address: &str) -> Self {
        Self {
            action_type: ActionType::Detach,
            resource_type: "floating-ip".to_string(),
            resource_id: address.to_string(),
            description: format!("Detached floating IP {} from {}", address, server),
        }
    }
}

/// Ordered list of applied actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionLog {
    actions: Vec<Action>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        tracing::info!("{}", action.description);
        self.actions.push(action);
    }

    pub fn extend(&mut self, other: ActionLog) {
        self.actions.extend(other.actions);
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Get actions by type
    pub fn by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Summary of the log
    pub fn summary(&self) -> ActionSummary {
        ActionSummary {
            create: self.by_type(ActionType::Create).len(),
            delete: self.by_type(ActionType::Delete).len(),
            attach: self.by_type(ActionType::Attach).len(),
            detach: self.by_type(ActionType::Detach).len(),
        }
    }
}

/// Counts of applied actions
#[derive(Debug, Clone)]
pub struct ActionSummary {
    pub create: usize,
    pub delete: usize,
    pub attach: usize,
    pub detach: usize,
}

impl std::fmt::Display for ActionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} deleted, {} floating IP(s) attached, {} detached",
            self.create, self.delete, self.attach, self.detach
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut log = ActionLog::new();
        log.push(Action::create_server("vm1"));
        log.push(Action::attach_floating_ip("vm1", "203.0.113.7"));

        assert!(!log.is_empty());
        assert_eq!(
            log.summary().to_string(),
            "1 created, 0 deleted, 1 floating IP(s) attached, 0 detached"
        );
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut log = ActionLog::new();
        log.push(Action::delete_server("vm1"));

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json[0]["action_type"], "delete");
        assert_eq!(json[0]["resource_id"], "vm1");
    }
}

use crate::rule::default_active;
use crate::GroupMember;
use serde::{Deserialize, Serialize};

/// Who a scheduled broadcast is sent to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipients {
    #[serde(default)]
    pub users: Vec<i64>,
    #[serde(default)]
    pub groups: Vec<i64>,
}

/// A scheduled broadcast driven by a 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub recipients: Recipients,
    /// One-shot jobs delete themselves after firing.
    #[serde(default)]
    pub run_once: bool,
    #[serde(default = "default_cron_spec")]
    pub cron_spec: String,
    #[serde(default)]
    pub action_template: String,
    #[serde(default)]
    pub parent_group: u64,
}

fn default_cron_spec() -> String {
    "0 0 * * *".to_string()
}

impl Default for Job {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            active: true,
            recipients: Recipients::default(),
            run_once: false,
            cron_spec: default_cron_spec(),
            action_template: String::new(),
            parent_group: 0,
        }
    }
}

impl GroupMember for Job {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn parent_group(&self) -> u64 {
        self.parent_group
    }

    fn set_parent(&mut self, parent: u64) {
        self.parent_group = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_record_fills_defaults() {
        let job: Job = serde_json::from_str(r#"{"display_name":"news"}"#).unwrap();
        assert!(job.active);
        assert!(!job.run_once);
        assert_eq!(job.cron_spec, "0 0 * * *");
        assert!(job.recipients.users.is_empty());
    }
}

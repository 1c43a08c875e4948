//! Repository events delivered by the hosting automation system.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of repository event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PullRequestOpened,
    PullRequestReopened,
    #[serde(alias = "pull_request_synchronize")]
    PullRequestSynchronized,
    Push,
    /// Any kind this policy does not understand. Never triggers a run.
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// The pull request action carried by this kind, if it is one.
    pub fn pull_request_action(&self) -> Option<PullRequestAction> {
        match self {
            EventKind::PullRequestOpened => Some(PullRequestAction::Opened),
            EventKind::PullRequestReopened => Some(PullRequestAction::Reopened),
            EventKind::PullRequestSynchronized => Some(PullRequestAction::Synchronize),
            EventKind::Push | EventKind::Unknown => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::PullRequestOpened => "pull_request_opened",
            EventKind::PullRequestReopened => "pull_request_reopened",
            EventKind::PullRequestSynchronized => "pull_request_synchronized",
            EventKind::Push => "push",
            EventKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Pull request activity types a workflow can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
}

impl PullRequestAction {
    pub fn defaults() -> Vec<PullRequestAction> {
        vec![
            PullRequestAction::Opened,
            PullRequestAction::Reopened,
            PullRequestAction::Synchronize,
        ]
    }
}

/// A single incoming repository notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Event {
    pub kind: EventKind,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub changed_paths: Vec<String>,
}

impl Event {
    pub fn push(branch: impl Into<String>, changed_paths: &[&str]) -> Self {
        Self {
            kind: EventKind::Push,
            branch: Some(branch.into()),
            changed_paths: changed_paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn pull_request(kind: EventKind, changed_paths: &[&str]) -> Self {
        Self {
            kind,
            branch: None,
            changed_paths: changed_paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Parse an event from the JSON shape delivered by the hosting system.
    pub fn from_json(content: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_push_event() {
        let event = Event::from_json(
            r#"{"kind": "push", "branch": "develop", "changed_paths": ["sleap/io/video.py"]}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Push);
        assert_eq!(event.branch.as_deref(), Some("develop"));
        assert_eq!(event.changed_paths, vec!["sleap/io/video.py"]);
    }

    #[test]
    fn test_unrecognized_kind_parses_as_unknown() {
        let event = Event::from_json(r#"{"kind": "pull_request_closed"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
        assert!(event.branch.is_none());
        assert!(event.changed_paths.is_empty());
    }

    #[test]
    fn test_synchronize_alias() {
        let event = Event::from_json(r#"{"kind": "pull_request_synchronize"}"#).unwrap();
        assert_eq!(event.kind, EventKind::PullRequestSynchronized);
        assert_eq!(
            event.kind.pull_request_action(),
            Some(PullRequestAction::Synchronize)
        );
    }
}

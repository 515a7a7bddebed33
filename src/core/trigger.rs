//! Trigger events and the admission gate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Kind of event that started a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Push,
    #[serde(alias = "workflow_dispatch")]
    Manual,
    PullRequest,
    Schedule,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Push => "push",
            EventType::Manual => "manual",
            EventType::PullRequest => "pull_request",
            EventType::Schedule => "schedule",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventType::Push),
            "manual" | "workflow_dispatch" => Ok(EventType::Manual),
            "pull_request" | "pull-request" => Ok(EventType::PullRequest),
            "schedule" => Ok(EventType::Schedule),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// Repository identity as an owner/name pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryIdentity {
    pub owner: String,
    pub name: String,
}

impl RepositoryIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("expected repository as owner/name, got '{}'", s)),
        }
    }
}

impl TryFrom<String> for RepositoryIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepositoryIdentity> for String {
    fn from(value: RepositoryIdentity) -> Self {
        value.to_string()
    }
}

/// The payload a workflow is triggered with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_type: EventType,
    pub branch_ref: String,
    pub repository: RepositoryIdentity,
}

impl TriggerEvent {
    pub fn new(event_type: EventType, branch_ref: impl Into<String>, repository: RepositoryIdentity) -> Self {
        Self {
            event_type,
            branch_ref: branch_ref.into(),
            repository,
        }
    }

    /// Branch name with any `refs/heads/` prefix removed
    pub fn branch(&self) -> &str {
        self.branch_ref
            .strip_prefix(BRANCH_REF_PREFIX)
            .unwrap_or(&self.branch_ref)
    }
}

/// Decides whether a workflow run may proceed at all.
///
/// Pure predicate: no side effects, so a rejection costs nothing downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GateFields")]
pub struct TriggerGate {
    pub target_branch: String,
    pub repository: RepositoryIdentity,
    /// Empty admits every event type
    pub allowed_events: Vec<EventType>,
}

/// Serialized form of a gate, normalized through `TriggerGate::new`
#[derive(Deserialize)]
struct GateFields {
    target_branch: String,
    repository: RepositoryIdentity,
    #[serde(default)]
    allowed_events: Vec<EventType>,
}

impl From<GateFields> for TriggerGate {
    fn from(fields: GateFields) -> Self {
        TriggerGate::new(fields.target_branch, fields.repository).with_events(fields.allowed_events)
    }
}

impl TriggerGate {
    pub fn new(target_branch: impl Into<String>, repository: RepositoryIdentity) -> Self {
        let target_branch: String = target_branch.into();
        let target_branch = target_branch
            .strip_prefix(BRANCH_REF_PREFIX)
            .map(str::to_string)
            .unwrap_or(target_branch);
        Self {
            target_branch,
            repository,
            allowed_events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<EventType>) -> Self {
        self.allowed_events = events;
        self
    }

    pub fn admit(&self, event: &TriggerEvent) -> bool {
        self.rejection_reason(event).is_none()
    }

    /// Why an event would be rejected, `None` when admitted
    pub fn rejection_reason(&self, event: &TriggerEvent) -> Option<String> {
        if event.branch() != self.target_branch {
            return Some(format!(
                "branch '{}' is not '{}'",
                event.branch(),
                self.target_branch
            ));
        }
        if event.repository != self.repository {
            return Some(format!(
                "repository '{}' is not '{}'",
                event.repository, self.repository
            ));
        }
        if !self.allowed_events.is_empty() && !self.allowed_events.contains(&event.event_type) {
            return Some(format!("event '{}' is not enabled", event.event_type));
        }
        None
    }
}

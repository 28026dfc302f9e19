use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the execution context that owns a set of resources
/// (a page, a connection scope, a session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContextId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Name of one resource within its owning context
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(pub String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ResourceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One open resource instance. The pair is unique among open handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub context_id: ContextId,
    pub resource_name: ResourceName,
}

impl ResourceHandle {
    pub fn new(context_id: impl Into<ContextId>, resource_name: impl Into<ResourceName>) -> Self {
        Self {
            context_id: context_id.into(),
            resource_name: resource_name.into(),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context_id, self.resource_name)
    }
}

/// Snapshot row describing a currently open resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenResource {
    pub handle: ResourceHandle,
    pub opened_at: DateTime<Utc>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Lifecycle notification emitted by a resource owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceEventKind {
    Opened,
    Closed,
    Modified,
}

impl fmt::Display for ResourceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened => write!(f, "opened"),
            Self::Closed => write!(f, "closed"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// A notification as a message, for delivery over a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub kind: ResourceEventKind,
    pub handle: ResourceHandle,
}

impl ResourceEvent {
    pub fn opened(context_id: impl Into<ContextId>, resource_name: impl Into<ResourceName>) -> Self {
        Self {
            kind: ResourceEventKind::Opened,
            handle: ResourceHandle::new(context_id, resource_name),
        }
    }

    pub fn closed(context_id: impl Into<ContextId>, resource_name: impl Into<ResourceName>) -> Self {
        Self {
            kind: ResourceEventKind::Closed,
            handle: ResourceHandle::new(context_id, resource_name),
        }
    }

    pub fn modified(context_id: impl Into<ContextId>, resource_name: impl Into<ResourceName>) -> Self {
        Self {
            kind: ResourceEventKind::Modified,
            handle: ResourceHandle::new(context_id, resource_name),
        }
    }
}

impl fmt::Display for ResourceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.handle)
    }
}

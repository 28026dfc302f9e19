//! Bookkeeping of open resources, keyed by owning context.
//!
//! Not synchronized; [`crate::QuiescenceBarrier`] owns one behind its lock.

use chrono::{DateTime, Utc};
use quiesce_common::{
    BarrierError, BarrierResult, ContextId, OpenResource, ResourceHandle, ResourceName,
};
use std::collections::HashMap;

/// State kept for one open resource
#[derive(Debug, Clone)]
struct OpenEntry {
    /// When the open notification arrived
    opened_at: DateTime<Utc>,

    /// Latest modify notification, if any
    last_modified: Option<DateTime<Utc>>,
}

/// Map of context -> open resources.
///
/// A context present in the map always has at least one open resource.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    contexts: HashMap<ContextId, HashMap<ResourceName, OpenEntry>>,
    open: usize,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an open. Fails without touching the registry if the pair is
    /// already open.
    pub fn insert(&mut self, handle: &ResourceHandle) -> BarrierResult<()> {
        let resources = self.contexts.entry(handle.context_id.clone()).or_default();
        if resources.contains_key(&handle.resource_name) {
            return Err(BarrierError::duplicate(handle));
        }
        resources.insert(
            handle.resource_name.clone(),
            OpenEntry {
                opened_at: Utc::now(),
                last_modified: None,
            },
        );
        self.open += 1;
        Ok(())
    }

    /// Record a close. Drops the context entry with its last resource.
    pub fn remove(&mut self, handle: &ResourceHandle) -> BarrierResult<()> {
        let resources = self
            .contexts
            .get_mut(&handle.context_id)
            .ok_or_else(|| BarrierError::unknown(handle))?;
        if resources.remove(&handle.resource_name).is_none() {
            return Err(BarrierError::unknown(handle));
        }
        if resources.is_empty() {
            self.contexts.remove(&handle.context_id);
        }
        self.open -= 1;
        Ok(())
    }

    /// Stamp a modification on an open resource
    pub fn touch(&mut self, handle: &ResourceHandle) -> BarrierResult<()> {
        let entry = self
            .contexts
            .get_mut(&handle.context_id)
            .and_then(|resources| resources.get_mut(&handle.resource_name))
            .ok_or_else(|| BarrierError::unknown(handle))?;
        entry.last_modified = Some(Utc::now());
        Ok(())
    }

    /// Remove every resource of one context, returning the names sorted.
    /// An unknown context yields an empty list.
    pub fn drain_context(&mut self, context_id: &ContextId) -> Vec<ResourceName> {
        let Some(resources) = self.contexts.remove(context_id) else {
            return Vec::new();
        };
        self.open -= resources.len();
        let mut names: Vec<ResourceName> = resources.into_keys().collect();
        names.sort();
        names
    }

    /// Remove everything, returning the handles sorted
    pub fn drain_all(&mut self) -> Vec<ResourceHandle> {
        let mut handles: Vec<ResourceHandle> = self
            .contexts
            .drain()
            .flat_map(|(context_id, resources)| {
                resources
                    .into_keys()
                    .map(move |name| ResourceHandle::new(context_id.clone(), name))
            })
            .collect();
        self.open = 0;
        handles.sort();
        handles
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.contexts
            .get(&handle.context_id)
            .is_some_and(|resources| resources.contains_key(&handle.resource_name))
    }

    pub fn is_context_used(&self, context_id: &ContextId) -> bool {
        self.contexts.contains_key(context_id)
    }

    pub fn len(&self) -> usize {
        self.open
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open == 0
    }

    /// Open resources sorted by context, then name
    pub fn snapshot(&self) -> Vec<OpenResource> {
        let mut rows: Vec<OpenResource> = self
            .contexts
            .iter()
            .flat_map(|(context_id, resources)| {
                resources.iter().map(move |(name, entry)| OpenResource {
                    handle: ResourceHandle::new(context_id.clone(), name.clone()),
                    opened_at: entry.opened_at,
                    last_modified: entry.last_modified,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.handle.cmp(&b.handle));
        rows
    }
}

//! Registry of known sub-applications and their runtime state

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::ApplicationDescriptor;
use super::lifecycle::RuntimeState;
use crate::error::PortalError;

#[derive(Debug, Clone)]
struct Entry {
    descriptor: Arc<ApplicationDescriptor>,
    state: RuntimeState,
}

/// Holds every registered descriptor in registration order
#[derive(Debug, Default)]
pub struct ApplicationRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ApplicationDescriptor) -> Result<(), PortalError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(PortalError::DuplicateApplication(descriptor.name));
        }

        info!("Registering application: {}", descriptor.name);
        self.index.insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(Entry {
            descriptor: Arc::new(descriptor),
            state: RuntimeState::new(),
        });
        Ok(())
    }

    /// Register in order, stopping at the first failure
    pub fn register_all<I>(&mut self, descriptors: I) -> Result<(), PortalError>
    where
        I: IntoIterator<Item = ApplicationDescriptor>,
    {
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Arc<ApplicationDescriptor>> {
        self.index.get(name).map(|&i| &self.entries[i].descriptor)
    }

    /// Descriptor whose route prefix matches `path`
    ///
    /// Returns `RoutingAmbiguity` when more than one descriptor claims the path.
    pub fn match_path(&self, path: &str) -> Result<Option<&Arc<ApplicationDescriptor>>, PortalError> {
        let mut matched = self
            .entries
            .iter()
            .filter(|entry| entry.descriptor.router_path_prefix.matches(path));

        let Some(first) = matched.next() else {
            debug!("No application matches {}", path);
            return Ok(None);
        };

        let rest: Vec<&Entry> = matched.collect();
        if !rest.is_empty() {
            let candidates = std::iter::once(first)
                .chain(rest)
                .map(|entry| entry.descriptor.name.clone())
                .collect();
            return Err(PortalError::RoutingAmbiguity {
                path: path.to_string(),
                candidates,
            });
        }

        Ok(Some(&first.descriptor))
    }

    pub fn state(&self, name: &str) -> Option<&RuntimeState> {
        self.index.get(name).map(|&i| &self.entries[i].state)
    }

    pub(crate) fn state_mut(&mut self, name: &str) -> Option<&mut RuntimeState> {
        self.index.get(name).map(|&i| &mut self.entries[i].state)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ApplicationDescriptor>> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub(crate) fn entries_mut(
        &mut self,
    ) -> impl Iterator<Item = (&Arc<ApplicationDescriptor>, &mut RuntimeState)> {
        self.entries
            .iter_mut()
            .map(|entry| (&entry.descriptor, &mut entry.state))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! manager.rs
//! Name → component registry shared by every node.
//! - Filled during setup, then frozen behind an `Arc` when the mission starts
//! - Lookups after that are plain `HashMap` reads, no lock

use crate::component::{Component, ComponentKind, downcast_component};
use log::{debug, warn};
use std::{collections::HashMap, sync::Arc};

#[derive(Default)]
pub struct ComponentManager {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one component under its name. An existing entry with the
    /// same name is replaced and returned.
    pub fn insert(&mut self, component: Arc<dyn Component>) -> Option<Arc<dyn Component>> {
        let name = component.name().to_string();
        let previous = self.components.insert(name.clone(), component);
        if previous.is_some() {
            warn!("component '{}' registered twice; keeping the later one", name);
        } else {
            debug!("component '{}' registered", name);
        }
        previous
    }

    /// Registers components; with `recursive`, group members are registered
    /// too (depth-first, members after their group).
    pub fn append<I>(&mut self, components: I, recursive: bool)
    where
        I: IntoIterator<Item = Arc<dyn Component>>,
    {
        let mut pending: Vec<Arc<dyn Component>> = components.into_iter().collect();
        pending.reverse();
        while let Some(component) = pending.pop() {
            if recursive {
                let mut members = component.members();
                members.reverse();
                self.insert(component);
                pending.extend(members);
            } else {
                self.insert(component);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).cloned()
    }

    /// Typed lookup; `None` when the name is missing or the type differs.
    pub fn get_as<T: Component>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name).and_then(downcast_component::<T>)
    }

    /// Names of every component of `kind`, sorted.
    pub fn search(&self, kind: ComponentKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .iter()
            .filter(|(_, c)| c.kind() == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl std::fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.names())
            .finish()
    }
}

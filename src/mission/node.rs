//! node.rs
//! User-defined mission states.
//!
//! Per activation the runtime calls, in order: `create`, `enter`, then `judge`
//! once per tick on the runtime thread while `control` runs once on its own
//! thread, and finally `exit` after the control thread has been joined.
//! `judge` and `control` share the node through `&self`; keep mutable state in
//! atomics or locks.

use crate::{
    component::{Component, ComponentManager},
    error::NodeError,
    logging::{RefQueue, SystemLogger},
    mission::event::{Flag, PostEvent},
    model::LinkedDataModel,
};
use std::{sync::Arc, time::Duration};

pub trait Node<F: Flag>: Send + Sync + Sized + 'static {
    /// Aggregate the data logger builds for this node on every tick.
    type Model: LinkedDataModel;

    fn create(handle: NodeHandle<F>) -> Result<Self, NodeError>;

    fn enter(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Decides the flag for this tick. A flag that maps back to this node
    /// keeps the activation going.
    fn judge(&self, model: &Self::Model) -> Result<F, NodeError>;

    /// Runs once on the control thread; should return soon after the
    /// activation's event is set.
    fn control(&self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Receives `judge` and `control` errors. Returning `Ok` recovers,
    /// returning an error stops the mission.
    fn catched(&self, error: NodeError) -> Result<(), NodeError> {
        Err(error)
    }

    /// Last check before leaving this node; `false` discards the transition.
    fn verify(&self) -> bool {
        true
    }

    fn exit(&mut self) -> Result<(), NodeError> {
        Ok(())
    }
}

/// What a node gets at construction: shared components, the activation's
/// event, and the recent-samples queue.
pub struct NodeHandle<F> {
    manager: Arc<ComponentManager>,
    event: Arc<PostEvent<F>>,
    recent: RefQueue,
    logger: SystemLogger,
    node: &'static str,
}

impl<F: Flag> Clone for NodeHandle<F> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            event: Arc::clone(&self.event),
            recent: self.recent.clone(),
            logger: self.logger.clone(),
            node: self.node,
        }
    }
}

impl<F: Flag> NodeHandle<F> {
    pub(crate) fn new(
        manager: Arc<ComponentManager>,
        event: Arc<PostEvent<F>>,
        recent: RefQueue,
        logger: SystemLogger,
        node: &'static str,
    ) -> Self {
        Self {
            manager,
            event,
            recent,
            logger,
            node,
        }
    }

    pub fn manager(&self) -> &ComponentManager {
        &self.manager
    }

    /// Typed component lookup.
    pub fn component<T: Component>(&self, name: &str) -> Result<Arc<T>, NodeError> {
        self.manager
            .get_as::<T>(name)
            .ok_or_else(|| NodeError::MissingComponent(name.to_string()))
    }

    pub fn event(&self) -> &Arc<PostEvent<F>> {
        &self.event
    }

    /// True once the judge loop has decided to leave this node.
    pub fn is_ending(&self) -> bool {
        self.event.is_set()
    }

    /// Sleeps up to `timeout`, waking early when the activation ends.
    pub fn wait_ending(&self, timeout: Duration) -> bool {
        self.event.wait(timeout)
    }

    pub fn recent(&self) -> &RefQueue {
        &self.recent
    }

    pub fn logger(&self) -> &SystemLogger {
        &self.logger
    }

    pub fn node_name(&self) -> &'static str {
        self.node
    }

    /// Free-form message in the system log, prefixed with the node name.
    pub fn log(&self, message: impl AsRef<str>) {
        self.logger
            .info(format!("[{}] {}", self.node, message.as_ref()));
    }
}

impl<F: Flag> std::fmt::Debug for NodeHandle<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node", &self.node)
            .field("components", &self.manager.len())
            .field("event", &self.event)
            .finish()
    }
}

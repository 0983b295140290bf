//! context.rs
//! The mission graph: node types as vertices, flags as edge labels.
//! - Exactly one start node; an edge may point back at its own node or at `Next::Terminal`
//! - Each registered node carries the monomorphized runner that executes one activation

use crate::{
    error::{ContextError, RuntimeError},
    mission::{
        cansat::{Engine, run_activation},
        event::Flag,
        node::Node,
    },
    utils::short_type_name,
};
use log::{debug, warn};
use std::{any::TypeId, collections::HashMap, fmt};

/// Identity of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    id: TypeId,
    name: &'static str,
}

impl NodeKey {
    pub fn of<N: 'static>() -> Self {
        Self {
            id: TypeId::of::<N>(),
            name: short_type_name::<N>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Edge target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Node(NodeKey),
    Terminal,
}

impl Next {
    pub fn node<N: 'static>() -> Self {
        Next::Node(NodeKey::of::<N>())
    }
}

pub(crate) type Runner<F> = fn(&mut Engine<F>, &Context<F>) -> Result<F, RuntimeError>;

struct Entry<F> {
    edges: HashMap<F, Next>,
    runner: Runner<F>,
}

/// One node's outgoing edges, for `Context::set_flow`.
pub struct NodeFlow<F> {
    key: NodeKey,
    edges: HashMap<F, Next>,
    runner: Runner<F>,
}

impl<F: Flag> NodeFlow<F> {
    pub fn of<N: Node<F>>(edges: impl IntoIterator<Item = (F, Next)>) -> Self {
        Self {
            key: NodeKey::of::<N>(),
            edges: edges.into_iter().collect(),
            runner: run_activation::<F, N>,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }
}

pub struct Context<F> {
    nodes: HashMap<NodeKey, Entry<F>>,
    start: Option<NodeKey>,
    current: Option<NodeKey>,
}

impl<F: Flag> Default for Context<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Flag> Context<F> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            start: None,
            current: None,
        }
    }

    fn mark_start(&mut self, key: NodeKey) -> Result<(), ContextError> {
        match self.start {
            Some(existing) if existing != key => Err(ContextError::DuplicateStart {
                existing: existing.name(),
                requested: key.name(),
            }),
            _ => {
                self.start = Some(key);
                self.current = Some(key);
                Ok(())
            }
        }
    }

    fn insert(&mut self, flow: NodeFlow<F>) {
        let NodeFlow { key, edges, runner } = flow;
        debug!("node '{}' registered with {} edges", key, edges.len());
        if self.nodes.insert(key, Entry { edges, runner }).is_some() {
            warn!("node '{}' registered twice; keeping the later edges", key);
        }
    }

    /// Registers `N` with its outgoing edges. At most one node may be the start.
    pub fn set_node<N: Node<F>>(
        &mut self,
        edges: impl IntoIterator<Item = (F, Next)>,
        start: bool,
    ) -> Result<&mut Self, ContextError> {
        let flow = NodeFlow::of::<N>(edges);
        if start {
            self.mark_start(flow.key)?;
        }
        self.insert(flow);
        Ok(self)
    }

    /// Batch registration; checks the whole graph afterwards.
    pub fn set_flow(
        &mut self,
        flows: impl IntoIterator<Item = NodeFlow<F>>,
        start: NodeKey,
    ) -> Result<&mut Self, ContextError> {
        self.mark_start(start)?;
        for flow in flows {
            self.insert(flow);
        }
        self.validate()?;
        Ok(self)
    }

    /// Every edge points at a registered node and the start node exists.
    pub fn validate(&self) -> Result<(), ContextError> {
        let start = self.start.ok_or(ContextError::NoStart)?;
        if !self.nodes.contains_key(&start) {
            return Err(ContextError::UnknownNode {
                from: "<start>",
                to: start.name(),
            });
        }
        for (key, entry) in &self.nodes {
            for next in entry.edges.values() {
                if let Next::Node(target) = next {
                    if !self.nodes.contains_key(target) {
                        return Err(ContextError::UnknownNode {
                            from: key.name(),
                            to: target.name(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn current(&self) -> Option<NodeKey> {
        self.current
    }

    pub fn start(&self) -> Option<NodeKey> {
        self.start
    }

    /// Rewinds `current` to the start node.
    pub fn reset(&mut self) {
        self.current = self.start;
    }

    fn current_entry(&self) -> Result<(NodeKey, &Entry<F>), ContextError> {
        let key = self.current.ok_or(ContextError::NoStart)?;
        let entry = self.nodes.get(&key).ok_or(ContextError::UnknownNode {
            from: "<current>",
            to: key.name(),
        })?;
        Ok((key, entry))
    }

    /// Edge target of `flag` from the current node.
    pub fn target(&self, flag: &F) -> Result<Next, ContextError> {
        let (key, entry) = self.current_entry()?;
        if entry.edges.is_empty() {
            return Err(ContextError::DeadEnd { node: key.name() });
        }
        entry
            .edges
            .get(flag)
            .copied()
            .ok_or_else(|| ContextError::UnknownFlag {
                node: key.name(),
                flag: format!("{:?}", flag),
            })
    }

    /// Whether `flag` leaves the current node (a self-edge does not).
    pub fn is_transition(&self, flag: &F) -> Result<bool, ContextError> {
        let target = self.target(flag)?;
        Ok(target != Next::Node(self.current_entry()?.0))
    }

    /// Follows the edge labelled `flag`. `current` moves to a node target and
    /// stays put on `Terminal`.
    pub fn next(&mut self, flag: &F) -> Result<Next, ContextError> {
        let target = self.target(flag)?;
        if let Next::Node(key) = target {
            self.current = Some(key);
        }
        Ok(target)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn runner(&self, key: &NodeKey) -> Option<Runner<F>> {
        self.nodes.get(key).map(|entry| entry.runner)
    }
}

impl<F: Flag> fmt::Debug for Context<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut nodes: Vec<(&str, Vec<(String, String)>)> = self
            .nodes
            .iter()
            .map(|(key, entry)| {
                let edges = entry
                    .edges
                    .iter()
                    .map(|(flag, next)| {
                        let target = match next {
                            Next::Node(k) => k.name().to_string(),
                            Next::Terminal => "TERMINAL".to_string(),
                        };
                        (format!("{:?}", flag), target)
                    })
                    .collect();
                (key.name(), edges)
            })
            .collect();
        nodes.sort_by_key(|(name, _)| *name);
        f.debug_struct("Context")
            .field("start", &self.start.map(|k| k.name()))
            .field("current", &self.current.map(|k| k.name()))
            .field("nodes", &nodes)
            .finish()
    }
}

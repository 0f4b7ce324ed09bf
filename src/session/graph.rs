//! Filter graph storage using daggy.
//!
//! Nodes are never removed, so a [`FilterId`] is the node index for the
//! life of the session. Edges are either explicit wiring requests from
//! [`Session::connect`](super::Session::connect) or live pid links.

use daggy::petgraph::algo::has_path_connecting;
use daggy::{Dag, NodeIndex, Walker};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterArgs, FilterId, FilterRegister};
use crate::pid::{Pid, PidId};
use crate::property::PropertyMap;

/// Scheduling state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterState {
    /// `process` is called on every tick.
    #[default]
    Active,
    /// The filter returned `Eos`; only an event reactivates it.
    Finished,
    /// The filter failed and is never called again.
    Failed,
}

/// Edge between two filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    /// Wiring preference from `connect`.
    Explicit,
    /// A pid linked from the parent to the child.
    Pid(PidId),
}

/// A filter instance in the graph.
pub(crate) struct FilterNode {
    pub(crate) name: String,
    pub(crate) register: Option<Arc<FilterRegister>>,
    pub(crate) args: FilterArgs,
    /// Taken out while one of its callbacks runs.
    pub(crate) filter: Option<Box<dyn Filter>>,
    pub(crate) inputs: Vec<Pid>,
    pub(crate) outputs: Vec<Pid>,
    pub(crate) state: FilterState,
    pub(crate) dest_caps: PropertyMap,
    pub(crate) finalized: bool,
}

impl FilterNode {
    pub(crate) fn new(
        name: impl Into<String>,
        register: Option<Arc<FilterRegister>>,
        args: FilterArgs,
        filter: Box<dyn Filter>,
    ) -> Self {
        Self {
            name: name.into(),
            register,
            args,
            filter: Some(filter),
            inputs: Vec::new(),
            outputs: Vec::new(),
            state: FilterState::Active,
            dest_caps: PropertyMap::new(),
            finalized: false,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state != FilterState::Failed && !self.finalized
    }
}

fn index(id: FilterId) -> NodeIndex {
    NodeIndex::new(id.0 as usize)
}

fn filter_id(idx: NodeIndex) -> FilterId {
    FilterId(idx.index() as u32)
}

/// The graph of filters and links.
pub(crate) struct FilterGraph {
    dag: Dag<FilterNode, Edge, u32>,
}

impl FilterGraph {
    pub(crate) fn new() -> Self {
        Self { dag: Dag::new() }
    }

    pub(crate) fn add(&mut self, node: FilterNode) -> FilterId {
        filter_id(self.dag.add_node(node))
    }

    pub(crate) fn node(&self, id: FilterId) -> Option<&FilterNode> {
        self.dag.node_weight(index(id))
    }

    pub(crate) fn node_mut(&mut self, id: FilterId) -> Option<&mut FilterNode> {
        self.dag.node_weight_mut(index(id))
    }

    /// Every filter id, in insertion order.
    pub(crate) fn ids(&self) -> Vec<FilterId> {
        (0..self.dag.node_count() as u32).map(FilterId).collect()
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.ids().into_iter().filter_map(|id| self.node(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.dag.node_count()
    }

    pub(crate) fn find(&self, name: &str) -> Option<FilterId> {
        self.ids()
            .into_iter()
            .find(|&id| self.node(id).is_some_and(|n| n.name == name))
    }

    /// Whether `to` is reachable from `from` along any edge.
    pub(crate) fn reaches(&self, from: FilterId, to: FilterId) -> bool {
        has_path_connecting(self.dag.graph(), index(from), index(to), None)
    }

    /// Record an explicit wiring preference.
    pub(crate) fn connect(&mut self, src: FilterId, dst: FilterId) -> Result<()> {
        if self.node(src).is_none() || self.node(dst).is_none() {
            return Err(Error::BadParam(format!("unknown filter in {src} -> {dst}")));
        }
        if src == dst {
            return Err(Error::BadParam(format!("cannot connect {src} to itself")));
        }
        if self.explicit_destinations(src).contains(&dst) {
            return Ok(());
        }
        self.dag
            .add_edge(index(src), index(dst), Edge::Explicit)
            .map_err(|_| Error::BadParam(format!("connecting {src} -> {dst} would create a cycle")))?;
        Ok(())
    }

    /// Explicit destinations of `id`, in connection order.
    pub(crate) fn explicit_destinations(&self, id: FilterId) -> Vec<FilterId> {
        let mut found: Vec<FilterId> = self
            .dag
            .children(index(id))
            .iter(&self.dag)
            .filter(|(edge, _)| matches!(self.dag.edge_weight(*edge), Some(Edge::Explicit)))
            .map(|(_, node)| filter_id(node))
            .collect();
        // Walkers yield the most recent edge first.
        found.reverse();
        found
    }

    pub(crate) fn add_pid_link(&mut self, src: FilterId, dst: FilterId, pid: PidId) -> Result<()> {
        self.dag
            .add_edge(index(src), index(dst), Edge::Pid(pid))
            .map_err(|_| Error::NotSupported(format!("linking {pid} to {dst} would create a cycle")))?;
        Ok(())
    }

    pub(crate) fn remove_pid_link(&mut self, pid: PidId) {
        let edge = self
            .dag
            .graph()
            .edge_indices()
            .find(|&e| self.dag.edge_weight(e) == Some(&Edge::Pid(pid)));
        if let Some(edge) = edge {
            self.dag.remove_edge(edge);
        }
    }

    /// Filters producing the pids linked into `id`.
    pub(crate) fn producers(&self, id: FilterId) -> Vec<FilterId> {
        self.pid_neighbors(self.dag.parents(index(id)).iter(&self.dag).collect())
    }

    /// Filters consuming the pids of `id`.
    pub(crate) fn consumers(&self, id: FilterId) -> Vec<FilterId> {
        self.pid_neighbors(self.dag.children(index(id)).iter(&self.dag).collect())
    }

    fn pid_neighbors(&self, edges: Vec<(daggy::EdgeIndex, NodeIndex)>) -> Vec<FilterId> {
        let mut found: Vec<FilterId> = Vec::new();
        for (edge, node) in edges.into_iter().rev() {
            if !matches!(self.dag.edge_weight(edge), Some(Edge::Pid(_))) {
                continue;
            }
            let id = filter_id(node);
            if !found.contains(&id) {
                found.push(id);
            }
        }
        found
    }
}

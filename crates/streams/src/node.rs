//! Pipeline nodes and submitted pipelines.
//!
//! A pipeline is a linear, single-parent chain rooted at a [`Source`]:
//!
//! ```text
//! Head(source) ◀── Stage ◀── Stage ◀── … ◀── tail
//! ```
//!
//! Nodes hold a strong reference to their upstream and a weak reference to
//! their downstream, so dropping the [`Pipeline`] releases the whole chain.
//!
//! - `apply` runs upstream-first: each node marks itself running, then applies
//!   its upstream; the head finally starts the provider. Items emitted by the
//!   provider then drive the downstream stages in emission order.
//! - `cancel` is upstream-first too: it cancels the head's source, which
//!   terminates every node attached below it.
//! - Required capabilities are the union over the node and all of its
//!   upstream nodes, computed once and memoised.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::{CapabilitySet, ExecutionContext, Item, NodeId, QueryError, QueryId, Source, Stage};

/// Execution state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Built but not yet applied.
    Idle,
    /// Applied; accepting items.
    Running,
    /// Terminal: upstream completed normally.
    Finished,
    /// Terminal: cancelled.
    Cancelled,
    /// Terminal: this node or another in the chain failed.
    Failed,
}

impl NodeState {
    /// Returns `true` for `Finished`, `Cancelled` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed)
    }
}

enum NodeKind {
    Head(Arc<Source>),
    Stage {
        stage: Arc<dyn Stage>,
        upstream: Arc<Node>,
    },
}

/// One element of a pipeline chain.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    state: Mutex<NodeState>,
    downstream: OnceLock<Weak<Node>>,
    required: OnceLock<CapabilitySet>,
}

impl Node {
    /// Creates the head node of a new chain.
    pub fn head(source: Arc<Source>) -> Arc<Self> {
        Self::with_kind(NodeKind::Head(source))
    }

    /// Appends `stage` below `upstream`.
    ///
    /// A node has at most one downstream; build each pipeline from its own head
    /// node.
    pub fn stage(upstream: Arc<Node>, stage: Arc<dyn Stage>) -> Arc<Self> {
        Self::with_kind(NodeKind::Stage { stage, upstream })
    }

    fn with_kind(kind: NodeKind) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::next(),
            kind,
            state: Mutex::new(NodeState::Idle),
            downstream: OnceLock::new(),
            required: OnceLock::new(),
        })
    }

    /// The node identity.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Provider name for the head, stage name otherwise.
    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Head(source) => source.name().as_str(),
            NodeKind::Stage { stage, .. } => stage.name().as_str(),
        }
    }

    /// The upstream node, `None` for the head.
    pub fn upstream(&self) -> Option<&Arc<Node>> {
        match &self.kind {
            NodeKind::Head(_) => None,
            NodeKind::Stage { upstream, .. } => Some(upstream),
        }
    }

    /// The source at the root of this node's chain.
    pub fn source(&self) -> &Arc<Source> {
        let mut node = self;
        loop {
            match &node.kind {
                NodeKind::Head(source) => return source,
                NodeKind::Stage { upstream, .. } => node = upstream,
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> NodeState {
        *self.lock()
    }

    /// Capabilities needed by this node and every node upstream of it.
    ///
    /// The result depends only on the shape of the chain and is memoised.
    pub fn required_capabilities(&self) -> CapabilitySet {
        self.required
            .get_or_init(|| match &self.kind {
                NodeKind::Head(source) => source.descriptor().required_capabilities().clone(),
                NodeKind::Stage { stage, upstream } => stage
                    .required_capabilities()
                    .union(&upstream.required_capabilities()),
            })
            .clone()
    }

    /// Executes the chain ending at this node.
    ///
    /// Applying a running node is a no-op, as is applying a terminal one. Any
    /// error raised while starting the provider or processing a synchronously
    /// emitted item is returned unmodified.
    pub fn apply(self: &Arc<Self>, ctx: &ExecutionContext) -> Result<(), QueryError> {
        {
            let mut state = self.lock();
            match *state {
                NodeState::Idle => *state = NodeState::Running,
                NodeState::Running => return Ok(()),
                terminal => {
                    tracing::debug!(node = %self.id, state = ?terminal, "Skipping apply of terminal node");
                    return Ok(());
                }
            }
        }

        match &self.kind {
            NodeKind::Stage { upstream, .. } => {
                upstream.connect(self);
                upstream.apply(ctx)
            }
            NodeKind::Head(source) => {
                source.attach(self);
                source.start(ctx)
            }
        }
    }

    /// Cancels the chain ending at this node, upstream first.
    ///
    /// A no-op on a node that is already terminal.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        match &self.kind {
            NodeKind::Stage { upstream, .. } => upstream.cancel(),
            NodeKind::Head(source) => {
                source.cancel();
            }
        }
        self.transition(NodeState::Cancelled);
    }

    /// Processes one item and forwards the result downstream.
    pub(crate) fn push(&self, item: Item) -> Result<(), QueryError> {
        if self.state() != NodeState::Running {
            tracing::trace!(node = %self.id, "Dropping item for inactive node");
            return Ok(());
        }

        let output = match &self.kind {
            NodeKind::Head(_) => Some(item),
            NodeKind::Stage { stage, .. } => match stage.process(item) {
                Ok(output) => output,
                Err(err) => {
                    self.transition(NodeState::Failed);
                    return Err(QueryError::Execution {
                        stage: stage.name().clone(),
                        message: err.message().to_owned(),
                    });
                }
            },
        };

        match (output, self.downstream()) {
            (Some(item), Some(next)) => next.push(item),
            _ => Ok(()),
        }
    }

    /// Moves this node and everything below it to `outcome`.
    ///
    /// Nodes that are already terminal keep their state but still forward, so
    /// a failed stage in the middle of the chain does not shield its sink.
    pub(crate) fn upstream_terminated(&self, outcome: NodeState) {
        self.transition(outcome);
        if let Some(next) = self.downstream() {
            next.upstream_terminated(outcome);
        }
    }

    fn connect(&self, downstream: &Arc<Node>) {
        if self.downstream.set(Arc::downgrade(downstream)).is_err() {
            tracing::warn!(
                node = %self.id,
                downstream = %downstream.id,
                "Node already has a downstream; ignoring second connection"
            );
        }
    }

    fn downstream(&self) -> Option<Arc<Node>> {
        self.downstream.get().and_then(Weak::upgrade)
    }

    fn transition(&self, next: NodeState) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A complete chain submitted (or ready to be submitted) for evaluation.
///
/// Cloning shares the same chain and the same [`QueryId`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    id: QueryId,
    tail: Arc<Node>,
}

/// Diagnostic view of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    /// The query id.
    pub query: QueryId,
    /// Node names, head first.
    pub nodes: Vec<String>,
    /// Union of required capabilities.
    pub required_capabilities: CapabilitySet,
    /// State of the tail node.
    pub state: NodeState,
}

impl Pipeline {
    /// Wraps the tail of a chain as a pipeline with a fresh [`QueryId`].
    pub fn new(tail: Arc<Node>) -> Self {
        Self {
            id: QueryId::next(),
            tail,
        }
    }

    /// The query identity.
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// The last node of the chain.
    pub fn tail(&self) -> &Arc<Node> {
        &self.tail
    }

    /// The source at the head of the chain.
    pub fn source(&self) -> &Arc<Source> {
        self.tail.source()
    }

    /// The nodes of the chain, head first.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        let mut nodes = vec![Arc::clone(&self.tail)];
        while let Some(up) = nodes.last().and_then(|n| n.upstream()).cloned() {
            nodes.push(up);
        }
        nodes.reverse();
        nodes
    }

    /// Union of capabilities required by every node.
    pub fn required_capabilities(&self) -> CapabilitySet {
        self.tail.required_capabilities()
    }

    /// State of the tail node.
    pub fn state(&self) -> NodeState {
        self.tail.state()
    }

    /// Executes the pipeline. See [`Node::apply`].
    pub fn apply(&self, ctx: &ExecutionContext) -> Result<(), QueryError> {
        self.tail.apply(ctx)
    }

    /// Cancels the pipeline. See [`Node::cancel`].
    pub fn cancel(&self) {
        self.tail.cancel();
    }

    /// Structured description for diagnostics.
    pub fn description(&self) -> PipelineDescription {
        PipelineDescription {
            query: self.id,
            nodes: self.nodes().iter().map(|n| n.name().to_owned()).collect(),
            required_capabilities: self.required_capabilities(),
            state: self.state(),
        }
    }

    /// Pretty-printed JSON description for logs.
    pub fn describe(&self) -> String {
        serde_json::to_string_pretty(&self.description()).unwrap_or_else(|_| self.id.to_string())
    }
}

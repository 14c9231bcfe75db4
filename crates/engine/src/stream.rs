//! Stream handles.
//!
//! [`QueryEngine::get_data`] returns a [`StreamHandle`] bound to the engine and
//! the registered head. Each call appends one stage; finishing the handle yields
//! a [`Pipeline`]. Handles are consumed as they grow, so a chain can never fork.
//!
//! Stage names are compile-time constants and must be non-empty; the stage
//! constructors panic on an empty name.

use std::sync::Arc;

use streams::{
    Cardinality, Filter, ForEach, Item, Map, Node, Pipeline, QueryError, Source, Stage, StageError,
};

use crate::QueryEngine;

/// A pipeline under construction, rooted at a registered head.
pub struct StreamHandle {
    engine: Arc<QueryEngine>,
    tail: Arc<Node>,
}

impl StreamHandle {
    pub(crate) fn new(engine: Arc<QueryEngine>, source: Arc<Source>) -> Self {
        Self {
            engine,
            tail: Node::head(source),
        }
    }

    /// Whether the head is single-shot or continuous.
    pub fn cardinality(&self) -> Cardinality {
        self.tail.source().descriptor().cardinality()
    }

    /// The head this handle was created from.
    pub fn source(&self) -> &Arc<Source> {
        self.tail.source()
    }

    /// The engine this handle is bound to.
    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    /// Appends an arbitrary stage.
    pub fn then(self, stage: impl Stage + 'static) -> Self {
        Self {
            tail: Node::stage(self.tail, Arc::new(stage)),
            engine: self.engine,
        }
    }

    /// Appends a transform.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn map<F>(self, name: &'static str, f: F) -> Self
    where
        F: Fn(Item) -> Result<Item, StageError> + Send + Sync + 'static,
    {
        self.then(Map::new(name, f))
    }

    /// Appends a predicate; items for which it returns `false` are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn filter<F>(self, name: &'static str, predicate: F) -> Self
    where
        F: Fn(&Item) -> bool + Send + Sync + 'static,
    {
        self.then(Filter::new(name, predicate))
    }

    /// Finishes the chain without appending anything.
    pub fn into_pipeline(self) -> Pipeline {
        Pipeline::new(self.tail)
    }

    /// Appends a terminal stage and finishes the chain. Nothing is evaluated.
    pub fn sink(self, stage: impl Stage + 'static) -> Pipeline {
        self.then(stage).into_pipeline()
    }

    /// Appends a callback for every item and submits the pipeline with retry
    /// enabled.
    ///
    /// Returns the pipeline so the caller can cancel it or inspect its state.
    /// Permission problems never surface here; see
    /// [`QueryEngine::last_failure`].
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn for_each<F>(self, name: &'static str, callback: F) -> Result<Pipeline, QueryError>
    where
        F: Fn(&Item) -> Result<(), StageError> + Send + Sync + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let pipeline = self.sink(ForEach::new(name, callback));
        engine.evaluate(&pipeline, true)?;
        Ok(pipeline)
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("session", &self.engine.session())
            .field("tail", &self.tail)
            .finish()
    }
}

//! Pipeline stages.
//!
//! A [`Stage`] is the per-item behaviour of a non-head node. The closure-backed
//! stages here cover what the engine's stream handles build; anything richer
//! implements [`Stage`] directly.

use crate::{Capability, CapabilitySet, Item, StageError, StageName};

/// Per-item processing of one pipeline node.
pub trait Stage: Send + Sync {
    /// Name used in errors and diagnostics.
    fn name(&self) -> &StageName;

    /// Capabilities this stage needs in addition to its upstream's.
    fn required_capabilities(&self) -> CapabilitySet {
        CapabilitySet::new()
    }

    /// Processes one item. `Ok(None)` drops the item.
    fn process(&self, item: Item) -> Result<Option<Item>, StageError>;
}

// ---------------------------------------------------------------------------

/// Transforms every item.
pub struct Map<F> {
    name: StageName,
    required: CapabilitySet,
    f: F,
}

impl<F> Map<F>
where
    F: Fn(Item) -> Result<Item, StageError> + Send + Sync,
{
    /// Creates a map stage.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn new(name: &'static str, f: F) -> Self {
        Self {
            name: StageName::from_static(name),
            required: CapabilitySet::new(),
            f,
        }
    }

    /// Declares a capability the transform needs.
    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.required.insert(capability);
        self
    }
}

impl<F> Stage for Map<F>
where
    F: Fn(Item) -> Result<Item, StageError> + Send + Sync,
{
    fn name(&self) -> &StageName {
        &self.name
    }

    fn required_capabilities(&self) -> CapabilitySet {
        self.required.clone()
    }

    fn process(&self, item: Item) -> Result<Option<Item>, StageError> {
        (self.f)(item).map(Some)
    }
}

// ---------------------------------------------------------------------------

/// Keeps the items for which the predicate holds.
pub struct Filter<F> {
    name: StageName,
    required: CapabilitySet,
    predicate: F,
}

impl<F> Filter<F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    /// Creates a filter stage.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self {
            name: StageName::from_static(name),
            required: CapabilitySet::new(),
            predicate,
        }
    }

    /// Declares a capability the predicate needs.
    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.required.insert(capability);
        self
    }
}

impl<F> Stage for Filter<F>
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    fn name(&self) -> &StageName {
        &self.name
    }

    fn required_capabilities(&self) -> CapabilitySet {
        self.required.clone()
    }

    fn process(&self, item: Item) -> Result<Option<Item>, StageError> {
        Ok((self.predicate)(&item).then_some(item))
    }
}

// ---------------------------------------------------------------------------

/// Terminal stage: hands every item to a callback.
pub struct ForEach<F> {
    name: StageName,
    required: CapabilitySet,
    callback: F,
}

impl<F> ForEach<F>
where
    F: Fn(&Item) -> Result<(), StageError> + Send + Sync,
{
    /// Creates a sink stage.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty.
    pub fn new(name: &'static str, callback: F) -> Self {
        Self {
            name: StageName::from_static(name),
            required: CapabilitySet::new(),
            callback,
        }
    }

    /// Declares a capability the callback needs.
    #[must_use]
    pub fn requiring(mut self, capability: Capability) -> Self {
        self.required.insert(capability);
        self
    }
}

impl<F> Stage for ForEach<F>
where
    F: Fn(&Item) -> Result<(), StageError> + Send + Sync,
{
    fn name(&self) -> &StageName {
        &self.name
    }

    fn required_capabilities(&self) -> CapabilitySet {
        self.required.clone()
    }

    fn process(&self, item: Item) -> Result<Option<Item>, StageError> {
        (self.callback)(&item)?;
        Ok(None)
    }
}

// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scoped context carrier
//!
//! A [`Context`] is the per-connection or per-request carrier handed to every
//! getter and setter. It holds two things:
//!
//! - an ambient key/value payload owned by the embedding system, shared
//!   immutably between a context and everything derived from it
//! - the reserved slot array with one [`IndexedValue`] per indexed variable
//!
//! The slot array is owned exclusively by its context. Deriving a child scope
//! copies the parent's cells by value; there is no parent pointer consulted at
//! read time, so writes on either side after the fork are never observed by
//! the other.
//!
//! A context is `Send` but not `Sync`: one request is processed by one task at
//! a time, and the slot array is not locked.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use crate::variable::{IndexedValue, SlotIndex};
use crate::value::VariableValue;

/// Key for ambient context values
pub type ContextKey = &'static str;

struct ValueNode {
    key: ContextKey,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<ValueNode>>,
}

/// Per-request/per-connection context
pub struct Context {
    values: Option<Arc<ValueNode>>,
    slots: Option<SlotArray>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Create an empty root context without variables
    pub fn background() -> Self {
        Self {
            values: None,
            slots: None,
        }
    }

    /// Attach an ambient value, consuming the context
    ///
    /// The slot array moves along with the context, so values set before
    /// remain visible through the returned context.
    pub fn with_value<T: Any + Send + Sync>(self, key: ContextKey, value: T) -> Self {
        Self {
            values: Some(Arc::new(ValueNode {
                key,
                value: Arc::new(value),
                parent: self.values,
            })),
            slots: self.slots,
        }
    }

    /// Look up an ambient value; the most recently attached value for a key wins
    pub fn value<T: Any>(&self, key: ContextKey) -> Option<&T> {
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            if current.key == key {
                return current.value.downcast_ref::<T>();
            }
            node = current.parent.as_deref();
        }
        None
    }

    /// Whether this context was created as a variable scope
    pub fn has_variables(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of slots currently allocated in this context
    pub fn slot_count(&self) -> usize {
        self.slots.as_ref().map_or(0, SlotArray::len)
    }

    /// Derive a context sharing the ambient payload and owning the given slots
    pub(crate) fn derive(&self, slots: SlotArray) -> Self {
        Self {
            values: self.values.clone(),
            slots: Some(slots),
        }
    }

    pub(crate) fn slots(&self) -> Option<&SlotArray> {
        self.slots.as_ref()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut node = self.values.as_deref();
        while let Some(current) = node {
            keys.push(current.key);
            node = current.parent.as_deref();
        }
        f.debug_struct("Context")
            .field("keys", &keys)
            .field("slots", &self.slot_count())
            .finish()
    }
}

/// Slot array owned by a context
///
/// Borrows of the inner cells never outlive a single method call, so user
/// getters and setters may re-enter the engine on the same context.
pub(crate) struct SlotArray {
    registry_id: u64,
    cells: RefCell<Vec<IndexedValue>>,
}

impl SlotArray {
    /// Allocate `len` invalid cells, copying the parent's cells when present
    pub(crate) fn fork(registry_id: u64, len: usize, parent: Option<&SlotArray>) -> Self {
        let mut cells = vec![IndexedValue::default(); len];
        if let Some(parent) = parent {
            let parent_cells = parent.cells.borrow();
            for (cell, inherited) in cells.iter_mut().zip(parent_cells.iter()) {
                cell.clone_from(inherited);
            }
        }
        Self {
            registry_id,
            cells: RefCell::new(cells),
        }
    }

    pub(crate) fn registry_id(&self) -> u64 {
        self.registry_id
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    /// Copy of a cell; cells past the end read as invalid
    pub(crate) fn snapshot(&self, index: SlotIndex) -> IndexedValue {
        self.cells
            .borrow()
            .get(index.as_usize())
            .cloned()
            .unwrap_or_default()
    }

    /// Mark a cell invalid
    pub(crate) fn invalidate(&self, index: SlotIndex) {
        if let Some(cell) = self.cells.borrow_mut().get_mut(index.as_usize()) {
            cell.invalidate();
        }
    }

    /// Move a cell out, leaving an invalid one in its place
    pub(crate) fn take(&self, index: SlotIndex) -> IndexedValue {
        let mut cells = self.cells.borrow_mut();
        Self::ensure_len(&mut cells, index);
        std::mem::take(&mut cells[index.as_usize()])
    }

    /// Cache a freshly computed value
    pub(crate) fn fill(&self, index: SlotIndex, value: VariableValue) {
        let mut cells = self.cells.borrow_mut();
        Self::ensure_len(&mut cells, index);
        cells[index.as_usize()].set(value);
    }

    /// Put a cell back
    pub(crate) fn store(&self, index: SlotIndex, value: IndexedValue) {
        let mut cells = self.cells.borrow_mut();
        Self::ensure_len(&mut cells, index);
        cells[index.as_usize()] = value;
    }

    // Indices registered after this array was allocated get fresh invalid cells.
    fn ensure_len(cells: &mut Vec<IndexedValue>, index: SlotIndex) {
        let needed = index.as_usize() + 1;
        if cells.len() < needed {
            cells.resize_with(needed, IndexedValue::default);
        }
    }
}

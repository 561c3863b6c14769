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

//! Variable descriptors
//!
//! A [`Variable`] is the immutable definition of a piece of request or
//! connection data: a name, opaque auxiliary data and optional getter and
//! setter functions. Variables with a setter are *indexable*: registering one
//! assigns it a stable [`SlotIndex`] into every context's slot array, which
//! makes its value cacheable per context. Variables without a setter are
//! recomputed by their getter on every lookup.

use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock};

use crate::context::Context;
use crate::error::{VariableError, VariableResult};
use crate::value::VariableValue;

/// Computes a variable's value from the context, the slot cell and the auxiliary data
///
/// The cell is invalid when the getter runs but keeps the last data, so a
/// getter may derive the new value from the previous one. Non-indexed
/// variables receive an empty cell.
pub type Getter = Arc<
    dyn Fn(&Context, &IndexedValue, Option<&VariableValue>) -> VariableResult<VariableValue>
        + Send
        + Sync,
>;

/// Stores a value into the context's slot cell
///
/// The cell is invalidated before the setter runs; a setter that succeeds is
/// expected to mark it valid (see [`default_setter`]).
pub type Setter =
    Arc<dyn Fn(&Context, &mut IndexedValue, VariableValue) -> VariableResult<()> + Send + Sync>;

/// Position of an indexed variable in a context's slot array
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// Create a slot index
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Index as `u32`
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Index as `usize`, for slice access
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cached value cell of one indexed variable within one context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedValue {
    data: Option<VariableValue>,
    valid: bool,
}

impl IndexedValue {
    /// Store a value and mark the cell valid
    pub fn set(&mut self, value: VariableValue) {
        self.data = Some(value);
        self.valid = true;
    }

    /// Mark the cell invalid, keeping the last data around
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Whether the cell holds a value usable without calling the getter
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Last computed or set value, valid or not
    pub fn data(&self) -> Option<&VariableValue> {
        self.data.as_ref()
    }
}

/// Setter storing the value verbatim
pub fn default_setter(
    _ctx: &Context,
    slot: &mut IndexedValue,
    value: VariableValue,
) -> VariableResult<()> {
    slot.set(value);
    Ok(())
}

/// Setter for string variables; only affects the slot, never the underlying request data
pub fn default_string_setter(ctx: &Context, slot: &mut IndexedValue, value: &str) -> VariableResult<()> {
    default_setter(ctx, slot, VariableValue::from(value))
}

/// Slot index together with the registry generation that assigned it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotBinding {
    generation: u64,
    index: SlotIndex,
}

/// Immutable variable definition
pub struct Variable {
    name: String,
    data: Option<VariableValue>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    flags: u32,
    binding: OnceLock<SlotBinding>,
    caller: OnceLock<String>,
}

impl Variable {
    /// Create a variable from already boxed getter and setter
    pub fn new(
        name: impl Into<String>,
        data: Option<VariableValue>,
        getter: Option<Getter>,
        setter: Option<Setter>,
        flags: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            data,
            getter,
            setter,
            flags,
            binding: OnceLock::new(),
            caller: OnceLock::new(),
        })
    }

    /// Start building a variable
    pub fn builder(name: impl Into<String>) -> VariableBuilder {
        VariableBuilder::new(name)
    }

    /// Create a string-typed variable
    ///
    /// The setter receives only string values; setting any other kind fails
    /// with [`VariableError::WrongType`] before the setter runs.
    pub fn string<G, S>(
        name: impl Into<String>,
        data: Option<VariableValue>,
        getter: Option<G>,
        setter: Option<S>,
        flags: u32,
    ) -> Arc<Self>
    where
        G: Fn(&Context, &IndexedValue, Option<&VariableValue>) -> VariableResult<String>
            + Send
            + Sync
            + 'static,
        S: Fn(&Context, &mut IndexedValue, &str) -> VariableResult<()> + Send + Sync + 'static,
    {
        let mut builder = VariableBuilder::new(name).flags(flags);
        if let Some(data) = data {
            builder = builder.data(data);
        }
        if let Some(getter) = getter {
            builder = builder.string_getter(getter);
        }
        if let Some(setter) = setter {
            builder = builder.string_setter(setter);
        }
        builder.build()
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Auxiliary data passed to the getter
    pub fn data(&self) -> Option<&VariableValue> {
        self.data.as_ref()
    }

    /// Getter function, if any
    pub fn getter(&self) -> Option<&Getter> {
        self.getter.as_ref()
    }

    /// Setter function, if any
    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    /// Reserved flag bits
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether registering this variable assigns it a slot
    pub fn is_indexable(&self) -> bool {
        self.setter.is_some()
    }

    /// Slot index, assigned at the first registration of this descriptor
    pub fn index(&self) -> Option<SlotIndex> {
        self.binding.get().map(|binding| binding.index)
    }

    /// Source location of the first registration
    pub fn caller(&self) -> Option<&str> {
        self.caller.get().map(String::as_str)
    }

    /// Slot index assigned by the given registry generation
    pub(crate) fn index_in(&self, generation: u64) -> Option<SlotIndex> {
        self.binding
            .get()
            .filter(|binding| binding.generation == generation)
            .map(|binding| binding.index)
    }

    /// Bind the slot index once; fails if the descriptor is bound elsewhere
    pub(crate) fn assign_index(&self, generation: u64, index: SlotIndex) -> bool {
        let binding = SlotBinding { generation, index };
        *self.binding.get_or_init(|| binding) == binding
    }

    /// Unbound copy sharing the getter, setter and data
    pub(crate) fn unbound_copy(&self) -> Arc<Self> {
        Self::new(
            self.name.clone(),
            self.data.clone(),
            self.getter.clone(),
            self.setter.clone(),
            self.flags,
        )
    }

    pub(crate) fn record_caller(&self, location: &Location<'_>) {
        let _ = self
            .caller
            .set(format!("{}:{}", location.file(), location.line()));
    }

    pub(crate) fn call_getter(
        &self,
        ctx: &Context,
        slot: &IndexedValue,
        data: Option<&VariableValue>,
    ) -> VariableResult<VariableValue> {
        match &self.getter {
            Some(getter) => getter(ctx, slot, data),
            None => Err(VariableError::value_not_found(&self.name)),
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .field("flags", &self.flags)
            .field("index", &self.index())
            .finish()
    }
}

/// Builder for [`Variable`]
pub struct VariableBuilder {
    name: String,
    data: Option<VariableValue>,
    getter: Option<Getter>,
    setter: Option<Setter>,
    flags: u32,
}

impl VariableBuilder {
    /// Create a builder for the named variable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: None,
            getter: None,
            setter: None,
            flags: 0,
        }
    }

    /// Auxiliary data handed to the getter
    pub fn data(mut self, data: impl Into<VariableValue>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Value getter
    pub fn getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Context, &IndexedValue, Option<&VariableValue>) -> VariableResult<VariableValue>
            + Send
            + Sync
            + 'static,
    {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Value setter; makes the variable indexable
    pub fn setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Context, &mut IndexedValue, VariableValue) -> VariableResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Use [`default_setter`]
    pub fn default_setter(self) -> Self {
        self.setter(default_setter)
    }

    /// String getter
    pub fn string_getter<F>(mut self, getter: F) -> Self
    where
        F: Fn(&Context, &IndexedValue, Option<&VariableValue>) -> VariableResult<String>
            + Send
            + Sync
            + 'static,
    {
        self.getter = Some(Arc::new(
            move |ctx: &Context, slot: &IndexedValue, data: Option<&VariableValue>| {
                getter(ctx, slot, data).map(VariableValue::from)
            },
        ));
        self
    }

    /// String setter; non-string values are rejected
    pub fn string_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Context, &mut IndexedValue, &str) -> VariableResult<()> + Send + Sync + 'static,
    {
        let name = self.name.clone();
        self.setter = Some(Arc::new(
            move |ctx: &Context, slot: &mut IndexedValue, value: VariableValue| match value
                .as_str()
            {
                Some(s) => setter(ctx, slot, s),
                None => Err(VariableError::wrong_type(&name, "string", value.kind())),
            },
        ));
        self
    }

    /// Reserved flag bits
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Finish the variable
    pub fn build(self) -> Arc<Variable> {
        Variable::new(self.name, self.data, self.getter, self.setter, self.flags)
    }
}

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

//! Variable lookup and update
//!
//! # Resolution order for names
//!
//! 1. **Exact name**: the registered variable, through the slot cache when indexed
//! 2. **Prefix**: the longest matching prefix variable, getter called with the full name
//! 3. **Protocol resource**: the name taken as a resource kind of the current protocol
//!
//! # Caching
//!
//! Indexed variables cache their value in the context's slot. A valid slot is
//! returned without calling the getter; a failing getter leaves the slot
//! invalid so the next lookup retries. Setting a variable invalidates the slot
//! before the setter runs, so a failing setter never leaves a stale value
//! behind.
//!
//! Passing the [`Variable`] itself instead of its name skips every hash
//! lookup on the indexed path.

use std::sync::Arc;

use crate::context::{Context, SlotArray};
use crate::error::{VariableError, VariableResult};
use crate::protocol::ProtocolResourceName;
use crate::registry::{Resolved, VariableRegistry};
use crate::value::VariableValue;
use crate::variable::{IndexedValue, SlotIndex, Variable};

/// Reference to a variable: by name or by descriptor
#[derive(Debug, Clone, Copy)]
pub enum VariableRef<'a> {
    /// Resolve by name
    Name(&'a str),
    /// Use the descriptor directly
    Variable(&'a Variable),
}

impl<'a> From<&'a str> for VariableRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for VariableRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a Variable> for VariableRef<'a> {
    fn from(variable: &'a Variable) -> Self {
        Self::Variable(variable)
    }
}

impl<'a> From<&'a Arc<Variable>> for VariableRef<'a> {
    fn from(variable: &'a Arc<Variable>) -> Self {
        Self::Variable(variable)
    }
}

impl VariableRegistry {
    /// Get the value of a variable in `ctx`
    pub fn get<'a>(
        &self,
        ctx: &Context,
        variable: impl Into<VariableRef<'a>>,
    ) -> VariableResult<VariableValue> {
        match variable.into() {
            VariableRef::Name(name) => self.get_by_name(ctx, name),
            VariableRef::Variable(variable) => self.get_by_variable(ctx, variable),
        }
    }

    /// Set the value of an indexed variable in `ctx`
    pub fn set<'a>(
        &self,
        ctx: &Context,
        variable: impl Into<VariableRef<'a>>,
        value: impl Into<VariableValue>,
    ) -> VariableResult<()> {
        match variable.into() {
            VariableRef::Name(name) => self.set_by_name(ctx, name, value.into()),
            VariableRef::Variable(variable) => self.set_by_variable(ctx, variable, value.into()),
        }
    }

    /// Get the value of a string variable
    pub fn get_string<'a>(
        &self,
        ctx: &Context,
        variable: impl Into<VariableRef<'a>>,
    ) -> VariableResult<String> {
        let variable = variable.into();
        expect_string(variable.name(), self.get(ctx, variable)?)
    }

    /// Set the value of a string variable
    pub fn set_string<'a>(
        &self,
        ctx: &Context,
        variable: impl Into<VariableRef<'a>>,
        value: &str,
    ) -> VariableResult<()> {
        self.set(ctx, variable, value)
    }

    /// Get the value of an integer variable
    pub fn get_int<'a>(
        &self,
        ctx: &Context,
        variable: impl Into<VariableRef<'a>>,
    ) -> VariableResult<i64> {
        let variable = variable.into();
        let value = self.get(ctx, variable)?;
        value
            .as_int()
            .ok_or_else(|| VariableError::wrong_type(variable.name(), "int", value.kind()))
    }

    /// String lookup through the exact and prefix tables only
    ///
    /// Protocol resources resolve their backing names through here, so a
    /// backing name is never taken as another resource kind.
    pub(crate) fn get_registered_string(&self, ctx: &Context, name: &str) -> VariableResult<String> {
        let value = match self.resolve(name) {
            Some(resolved) => self.get_resolved(ctx, name, resolved)?,
            None => return Err(VariableError::undefined(name)),
        };
        expect_string(name, value)
    }

    fn get_by_variable(&self, ctx: &Context, variable: &Variable) -> VariableResult<VariableValue> {
        if let Some(index) = variable.index_in(self.generation()) {
            return self.get_indexed(ctx, index, variable);
        }
        if !variable.is_indexable() {
            return variable.call_getter(ctx, &IndexedValue::default(), variable.data());
        }

        // bound to another registry: use the definition registered here
        let local = self
            .exact(variable.name())
            .ok_or_else(|| VariableError::undefined(variable.name()))?;
        match local.index_in(self.generation()) {
            Some(index) => self.get_indexed(ctx, index, &local),
            None => local.call_getter(ctx, &IndexedValue::default(), local.data()),
        }
    }

    fn get_by_name(&self, ctx: &Context, name: &str) -> VariableResult<VariableValue> {
        if let Some(resolved) = self.resolve(name) {
            return self.get_resolved(ctx, name, resolved);
        }

        let resource = ProtocolResourceName::new(name.to_string());
        match self.get_protocol_resource(ctx, &resource, None) {
            Ok(value) => Ok(VariableValue::from(value)),
            Err(err) => {
                log::trace!("[variable] {name} is not a protocol resource: {err}");
                Err(VariableError::undefined(name))
            }
        }
    }

    fn get_resolved(
        &self,
        ctx: &Context,
        name: &str,
        resolved: Resolved,
    ) -> VariableResult<VariableValue> {
        match resolved {
            Resolved::Exact(variable) => self.get_by_variable(ctx, &variable),
            Resolved::Prefix(variable) => variable.call_getter(
                ctx,
                &IndexedValue::default(),
                Some(&VariableValue::from(name)),
            ),
        }
    }

    fn set_by_variable(
        &self,
        ctx: &Context,
        variable: &Variable,
        value: VariableValue,
    ) -> VariableResult<()> {
        if let Some(index) = variable.index_in(self.generation()) {
            return self.set_indexed(ctx, index, variable, value);
        }
        if !variable.is_indexable() {
            return Err(VariableError::setter_not_found(variable.name()));
        }

        let local = self
            .exact(variable.name())
            .ok_or_else(|| VariableError::undefined(variable.name()))?;
        match local.index_in(self.generation()) {
            Some(index) => self.set_indexed(ctx, index, &local, value),
            None => Err(VariableError::setter_not_found(local.name())),
        }
    }

    fn set_by_name(&self, ctx: &Context, name: &str, value: VariableValue) -> VariableResult<()> {
        match self.resolve(name) {
            Some(Resolved::Exact(variable)) => self.set_by_variable(ctx, &variable, value),
            Some(Resolved::Prefix(_)) => Err(VariableError::setter_not_found(name)),
            None => Err(VariableError::undefined(name)),
        }
    }

    fn get_indexed(
        &self,
        ctx: &Context,
        index: SlotIndex,
        variable: &Variable,
    ) -> VariableResult<VariableValue> {
        let slots = self.slots_of(ctx)?;
        let cell = slots.snapshot(index);
        if let Some(cached) = cell.data().filter(|_| cell.is_valid()) {
            return Ok(cached.clone());
        }

        // the current owner of the index may be an override of `variable`
        let owner = self
            .indexed_variable(index)
            .ok_or_else(|| VariableError::value_not_found(variable.name()))?;
        let value = owner.call_getter(ctx, &cell, owner.data())?;
        slots.fill(index, value.clone());
        Ok(value)
    }

    fn set_indexed(
        &self,
        ctx: &Context,
        index: SlotIndex,
        variable: &Variable,
        value: VariableValue,
    ) -> VariableResult<()> {
        let slots = self.slots_of(ctx)?;
        let owner = self
            .indexed_variable(index)
            .ok_or_else(|| VariableError::setter_not_found(variable.name()))?;
        let Some(setter) = owner.setter() else {
            return Err(VariableError::setter_not_found(owner.name()));
        };

        slots.invalidate(index);
        let mut cell = slots.take(index);
        let result = setter(ctx, &mut cell, value);
        if result.is_err() {
            cell.invalidate();
        }
        slots.store(index, cell);
        result
    }

    fn slots_of<'c>(&self, ctx: &'c Context) -> VariableResult<&'c SlotArray> {
        let slots = ctx.slots().ok_or(VariableError::NoVariablesInContext)?;
        if slots.registry_id() != self.generation() {
            return Err(VariableError::InvalidContext);
        }
        Ok(slots)
    }
}

fn expect_string(name: &str, value: VariableValue) -> VariableResult<String> {
    match value {
        VariableValue::String(s) => Ok(s.to_string()),
        other => Err(VariableError::wrong_type(name, "string", other.kind())),
    }
}

impl VariableRef<'_> {
    /// Name of the referenced variable
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Variable(variable) => variable.name(),
        }
    }
}

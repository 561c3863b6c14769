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

//! Process-wide default registry
//!
//! Convenience wrappers for applications that use a single registry. The
//! registry is created on first use with [`RegistryConfig::default`], so the
//! built-in variables are always present.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::config::RegistryConfig;
use crate::context::Context;
use crate::engine::VariableRef;
use crate::error::VariableResult;
use crate::registry::VariableRegistry;
use crate::value::VariableValue;
use crate::variable::Variable;

static DEFAULT_REGISTRY: Lazy<VariableRegistry> =
    Lazy::new(|| VariableRegistry::with_config(RegistryConfig::default()));

/// The process-wide registry
pub fn default_registry() -> &'static VariableRegistry {
    &DEFAULT_REGISTRY
}

/// Register a variable in the default registry
#[track_caller]
pub fn register(variable: Arc<Variable>) -> VariableResult<()> {
    default_registry().register(variable)
}

/// Override a variable in the default registry
#[track_caller]
pub fn override_variable(variable: Arc<Variable>) -> VariableResult<()> {
    default_registry().override_variable(variable)
}

/// Register a prefix variable in the default registry
#[track_caller]
pub fn register_prefix(prefix: impl Into<String>, variable: Arc<Variable>) -> VariableResult<()> {
    default_registry().register_prefix(prefix, variable)
}

/// Override a prefix variable in the default registry
#[track_caller]
pub fn override_prefix(prefix: &str, variable: Arc<Variable>) -> VariableResult<()> {
    default_registry().override_prefix(prefix, variable)
}

/// Resolve a name in the default registry
pub fn check(name: &str) -> VariableResult<Arc<Variable>> {
    default_registry().check(name)
}

/// Create a variable scope of the default registry
pub fn new_scope(parent: &Context) -> Context {
    default_registry().new_scope(parent)
}

/// Get a variable through the default registry
pub fn get<'a>(ctx: &Context, variable: impl Into<VariableRef<'a>>) -> VariableResult<VariableValue> {
    default_registry().get(ctx, variable)
}

/// Set a variable through the default registry
pub fn set<'a>(
    ctx: &Context,
    variable: impl Into<VariableRef<'a>>,
    value: impl Into<VariableValue>,
) -> VariableResult<()> {
    default_registry().set(ctx, variable, value)
}

/// Get a string variable through the default registry
pub fn get_string<'a>(ctx: &Context, variable: impl Into<VariableRef<'a>>) -> VariableResult<String> {
    default_registry().get_string(ctx, variable)
}

/// Set a string variable through the default registry
pub fn set_string<'a>(
    ctx: &Context,
    variable: impl Into<VariableRef<'a>>,
    value: &str,
) -> VariableResult<()> {
    default_registry().set_string(ctx, variable, value)
}

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

//! Variable registry
//!
//! The registry owns three tables guarded by a single reader-writer lock:
//!
//! - **names**: exact-match name to variable
//! - **prefixes**: prefix to variable, for dynamically named families
//!   (`http_header_*`, `query_arg_*`, ...)
//! - **indexed**: dense slot index to variable, one entry per indexable
//!   variable in registration order
//!
//! Registration is expected at startup; lookups on the request path only take
//! the read lock, and never hold it while user getters or setters run.
//!
//! # Duplicate handling
//!
//! Registering a name twice keeps the first definition and logs the
//! collision. Replacing a definition requires
//! [`override_variable`](VariableRegistry::override_variable), which keeps the
//! slot index of the replaced variable so that contexts created before and
//! after the override agree on the slot layout.
//!
//! # Slot bindings
//!
//! A descriptor remembers the slot index it was given together with the
//! *generation* of the registry that gave it. Each registry starts with a
//! unique generation and [`clear`](VariableRegistry::clear) moves it to a new
//! one. A descriptor bound to another registry (or to a cleared generation)
//! is never trusted with an index: registering it stores an unbound copy, and
//! lookups through it resolve its name instead.

use std::panic::Location;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::builtin;
use crate::config::{PrefixPolicy, RegistryConfig};
use crate::context::{Context, SlotArray};
use crate::error::{VariableError, VariableResult};
use crate::protocol::ProtocolResources;
use crate::variable::{SlotIndex, Variable};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

struct RegistryTables {
    names: FxHashMap<String, Arc<Variable>>,
    prefixes: FxHashMap<String, Arc<Variable>>,
    indexed: Vec<Arc<Variable>>,
}

impl RegistryTables {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            names: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            prefixes: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            indexed: Vec::with_capacity(capacity),
        }
    }

    /// Longest registered prefix of `name`
    fn match_prefix(&self, name: &str) -> Option<&Arc<Variable>> {
        self.prefixes
            .iter()
            .filter(|(prefix, _)| name.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, variable)| variable)
    }

    /// Append an indexable variable to the index table
    ///
    /// Returns the descriptor actually stored, which is a copy when the given
    /// one is bound elsewhere.
    fn append_indexed(
        &mut self,
        variable: Arc<Variable>,
        generation: u64,
    ) -> VariableResult<(Arc<Variable>, SlotIndex)> {
        let index = u32::try_from(self.indexed.len())
            .map(SlotIndex::new)
            .map_err(|_| VariableError::evaluation(variable.name(), "slot index space exhausted"))?;
        let variable = bind_slot(variable, generation, index);
        self.indexed.push(Arc::clone(&variable));
        Ok((variable, index))
    }
}

/// Bind `variable` to a slot, falling back to an unbound copy
fn bind_slot(variable: Arc<Variable>, generation: u64, index: SlotIndex) -> Arc<Variable> {
    if variable.assign_index(generation, index) {
        return variable;
    }
    log::debug!(
        "[variable] {} is bound to another registry, registering a copy",
        variable.name()
    );
    let copy = variable.unbound_copy();
    copy.assign_index(generation, index);
    copy
}

/// How a name was resolved
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    /// Exact name match
    Exact(Arc<Variable>),
    /// Prefix match; the getter receives the full requested name
    Prefix(Arc<Variable>),
}

/// Registry of variable definitions
///
/// Registries are independent: each one has its own tables, its own slot
/// layout and its own protocol resources. Contexts created by one registry
/// are rejected by the others with [`VariableError::InvalidContext`].
pub struct VariableRegistry {
    generation: AtomicU64,
    config: RegistryConfig,
    tables: RwLock<RegistryTables>,
    pub(crate) protocols: ProtocolResources,
}

impl std::fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("VariableRegistry")
            .field("generation", &self.generation())
            .field("variable_count", &tables.names.len())
            .field("prefix_count", &tables.prefixes.len())
            .field("indexed_count", &tables.indexed.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableRegistry {
    /// Create a registry with the default configuration, built-ins included
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with a custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        let registry = Self {
            generation: AtomicU64::new(NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)),
            tables: RwLock::new(RegistryTables::with_capacity(config.initial_capacity)),
            protocols: ProtocolResources::new(),
            config,
        };
        if registry.config.register_builtins {
            builtin::register_builtins(&registry);
        }
        registry
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current generation; contexts and slot bindings of older generations are stale
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Register a variable
    ///
    /// A name that is already registered keeps its first definition; the
    /// collision is logged and the call still succeeds so that repeated module
    /// initialization is harmless. Indexable variables get the next slot index.
    #[track_caller]
    pub fn register(&self, variable: Arc<Variable>) -> VariableResult<()> {
        let caller = Location::caller();
        let mut tables = self.tables.write();
        let generation = self.generation();

        if let Some(existing) = tables.names.get(variable.name()) {
            log::log!(
                self.config.duplicate_log_level,
                "[variable] duplicate register variable: {}, the first one is registered by: {}",
                variable.name(),
                existing.caller().unwrap_or("unknown")
            );
            return Ok(());
        }

        let variable = if variable.is_indexable() {
            let (variable, index) = tables.append_indexed(variable, generation)?;
            log::trace!("[variable] register indexed variable {} at {}", variable.name(), index);
            variable
        } else {
            variable
        };

        variable.record_caller(caller);
        tables.names.insert(variable.name().to_string(), variable);
        Ok(())
    }

    /// Replace a registered variable
    ///
    /// If both the old and the new definition are indexable the new one takes
    /// over the old slot index, so values set through either descriptor are
    /// shared. If only the new one is indexable it gets a fresh index. If the
    /// new one is not indexable the old slot is left unused.
    #[track_caller]
    pub fn override_variable(&self, variable: Arc<Variable>) -> VariableResult<()> {
        let caller = Location::caller();
        let mut tables = self.tables.write();
        let generation = self.generation();

        let Some(existing) = tables.names.get(variable.name()).cloned() else {
            return Err(VariableError::not_registered(variable.name()));
        };

        let variable = if variable.is_indexable() {
            match existing.index_in(generation).filter(|_| existing.is_indexable()) {
                Some(index) => {
                    let Some(owner) = tables.indexed.get_mut(index.as_usize()) else {
                        return Err(VariableError::not_registered(existing.name()));
                    };
                    let variable = bind_slot(variable, generation, index);
                    *owner = Arc::clone(&variable);
                    log::debug!(
                        "[variable] override variable {}, inherit index {}",
                        variable.name(),
                        index
                    );
                    variable
                }
                None => {
                    let (variable, index) = tables.append_indexed(variable, generation)?;
                    log::debug!(
                        "[variable] override variable {}, new index {}",
                        variable.name(),
                        index
                    );
                    variable
                }
            }
        } else {
            log::debug!("[variable] override variable {} without index", variable.name());
            variable
        };

        variable.record_caller(caller);
        tables.names.insert(variable.name().to_string(), variable);
        Ok(())
    }

    /// Register a variable for every name starting with `prefix`
    ///
    /// Prefix variables are never indexed; their getter is called with the
    /// full requested name on every lookup. Duplicate prefixes keep the first
    /// definition.
    #[track_caller]
    pub fn register_prefix(
        &self,
        prefix: impl Into<String>,
        variable: Arc<Variable>,
    ) -> VariableResult<()> {
        let caller = Location::caller();
        let prefix = prefix.into();
        let mut tables = self.tables.write();

        if let Some(existing) = tables.prefixes.get(&prefix) {
            log::log!(
                self.config.duplicate_log_level,
                "[variable] duplicate register prefix variable: {}, the first one is registered by: {}",
                prefix,
                existing.caller().unwrap_or("unknown")
            );
            return Ok(());
        }

        if self.config.prefix_policy == PrefixPolicy::RejectOverlap {
            if let Some(existing) = tables
                .prefixes
                .keys()
                .find(|existing| existing.starts_with(&prefix) || prefix.starts_with(existing.as_str()))
            {
                return Err(VariableError::PrefixOverlap {
                    prefix,
                    existing: existing.clone(),
                });
            }
        }

        variable.record_caller(caller);
        tables.prefixes.insert(prefix, variable);
        Ok(())
    }

    /// Replace the variable registered for `prefix`
    #[track_caller]
    pub fn override_prefix(&self, prefix: &str, variable: Arc<Variable>) -> VariableResult<()> {
        let caller = Location::caller();
        let mut tables = self.tables.write();

        let Some(slot) = tables.prefixes.get_mut(prefix) else {
            return Err(VariableError::not_registered(prefix));
        };

        variable.record_caller(caller);
        *slot = variable;
        log::debug!("[variable] override prefix variable {prefix}");
        Ok(())
    }

    /// Resolve a name against the exact and prefix tables
    ///
    /// Used to validate configuration references before traffic starts.
    /// Protocol resources are not consulted.
    pub fn check(&self, name: &str) -> VariableResult<Arc<Variable>> {
        match self.resolve(name) {
            Some(Resolved::Exact(variable) | Resolved::Prefix(variable)) => Ok(variable),
            None => Err(VariableError::undefined(name)),
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<Resolved> {
        let tables = self.tables.read();
        if let Some(variable) = tables.names.get(name) {
            return Some(Resolved::Exact(Arc::clone(variable)));
        }
        tables
            .match_prefix(name)
            .map(|variable| Resolved::Prefix(Arc::clone(variable)))
    }

    /// Exact-match definition of a name
    pub(crate) fn exact(&self, name: &str) -> Option<Arc<Variable>> {
        self.tables.read().names.get(name).cloned()
    }

    /// Current definition owning a slot index
    pub(crate) fn indexed_variable(&self, index: SlotIndex) -> Option<Arc<Variable>> {
        self.tables.read().indexed.get(index.as_usize()).cloned()
    }

    /// Create a variable scope derived from `parent`
    ///
    /// The new context shares the parent's ambient payload and owns a fresh
    /// slot array sized to the current index table. If the parent is a scope
    /// of this registry its cells are copied by value; later writes on either
    /// side are not visible to the other.
    pub fn new_scope(&self, parent: &Context) -> Context {
        let (generation, len) = {
            let tables = self.tables.read();
            (self.generation(), tables.indexed.len())
        };
        let inherited = match parent.slots() {
            Some(slots) if slots.registry_id() == generation => Some(slots),
            Some(_) => {
                log::warn!(
                    "[variable] parent context belongs to another registry or a cleared generation, slots not inherited"
                );
                None
            }
            None => None,
        };
        parent.derive(SlotArray::fork(generation, len, inherited))
    }

    /// Remove every variable, prefix and index
    ///
    /// Intended for tests. The registry moves to a new generation: contexts
    /// created before are rejected with [`VariableError::InvalidContext`], and
    /// descriptors registered before behave like foreign ones (registering
    /// them again stores a fresh copy).
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        *tables = RegistryTables::with_capacity(self.config.initial_capacity);
        self.generation.store(
            NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            Ordering::Release,
        );
        log::debug!("[variable] registry cleared");
    }

    /// Number of exact-match variables
    pub fn len(&self) -> usize {
        self.tables.read().names.len()
    }

    /// Whether no exact-match variable is registered
    pub fn is_empty(&self) -> bool {
        self.tables.read().names.is_empty()
    }

    /// Number of slot indices handed out
    pub fn indexed_len(&self) -> usize {
        self.tables.read().indexed.len()
    }

    /// Whether an exact-match variable with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().names.contains_key(name)
    }

    /// Registered variable names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().names.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered prefixes, sorted
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<_> = self.tables.read().prefixes.keys().cloned().collect();
        prefixes.sort();
        prefixes
    }
}

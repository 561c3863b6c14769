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

//! Protocol resources
//!
//! Protocol-agnostic code asks for a *resource* (`PATH`, `URI`, `ARG`, ...)
//! and the registry maps it, for the protocol of the current context, to a
//! protocol-specific backing variable. For example `(Http1, PATH)` registered
//! with `request_path` resolves to the variable `Http1_request_path`.
//!
//! The protocol of a context is found through a resolver installed once by
//! the embedding system. Without a resolver every lookup fails with
//! [`VariableError::NoProtocolResolver`].

use std::borrow::{Borrow, Cow};
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::{VariableError, VariableResult};
use crate::registry::VariableRegistry;

/// Name of a protocol (`Http1`, `Http2`, `Dubbo`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolName(Cow<'static, str>);

impl ProtocolName {
    /// Create a protocol name
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Protocol name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Kind of protocol resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolResourceName(Cow<'static, str>);

impl ProtocolResourceName {
    /// Request URI
    pub const URI: Self = Self(Cow::Borrowed("URI"));
    /// Request path
    pub const PATH: Self = Self(Cow::Borrowed("PATH"));
    /// Query argument; the argument name is passed as suffix
    pub const ARG: Self = Self(Cow::Borrowed("ARG"));
    /// Cookie; the cookie name is passed as suffix
    pub const COOKIE: Self = Self(Cow::Borrowed("COOKIE"));
    /// Header; the header name is passed as suffix
    pub const HEADER: Self = Self(Cow::Borrowed("HEADER"));

    /// Create a resource name
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Resource name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_name_traits {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $ty {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&'static str> for $ty {
            fn from(name: &'static str) -> Self {
                Self(Cow::Borrowed(name))
            }
        }

        impl From<String> for $ty {
            fn from(name: String) -> Self {
                Self(Cow::Owned(name))
            }
        }
    };
}

impl_name_traits!(ProtocolName);
impl_name_traits!(ProtocolResourceName);

/// Finds the protocol of a context
pub type ProtocolResolver = Arc<dyn Fn(&Context) -> VariableResult<ProtocolName> + Send + Sync>;

/// Protocol resource table of a registry
pub(crate) struct ProtocolResources {
    table: RwLock<FxHashMap<ProtocolName, FxHashMap<ProtocolResourceName, String>>>,
    resolver: OnceCell<ProtocolResolver>,
}

impl ProtocolResources {
    pub(crate) fn new() -> Self {
        Self {
            table: RwLock::new(FxHashMap::default()),
            resolver: OnceCell::new(),
        }
    }

    fn backing_name(&self, protocol: &str, resource: &str) -> Option<String> {
        self.table
            .read()
            .get(protocol)
            .and_then(|resources| resources.get(resource))
            .cloned()
    }
}

impl VariableRegistry {
    /// Map `(protocol, resource)` to the variable `{protocol}_{var_name}`
    pub fn register_protocol_resource(
        &self,
        protocol: impl Into<ProtocolName>,
        resource: impl Into<ProtocolResourceName>,
        var_name: &str,
    ) -> VariableResult<()> {
        let protocol = protocol.into();
        let resource = resource.into();
        let mut table = self.protocols.table.write();
        let resources = table.entry(protocol.clone()).or_default();

        if resources.contains_key(&resource) {
            return Err(VariableError::duplicate(format!(
                "protocol resource {protocol}/{resource}"
            )));
        }

        let backing = format!("{protocol}_{var_name}");
        log::debug!("[variable] register protocol resource {protocol}/{resource} as {backing}");
        resources.insert(resource, backing);
        Ok(())
    }

    /// Backing variable name of a protocol resource, without any suffix
    pub fn protocol_resource_variable(
        &self,
        protocol: &ProtocolName,
        resource: &ProtocolResourceName,
    ) -> Option<String> {
        self.protocols
            .backing_name(protocol.as_str(), resource.as_str())
    }

    /// Install the protocol resolver; only the first installation succeeds
    pub fn set_protocol_resolver<F>(&self, resolver: F) -> VariableResult<()>
    where
        F: Fn(&Context) -> VariableResult<ProtocolName> + Send + Sync + 'static,
    {
        self.protocols
            .resolver
            .set(Arc::new(resolver))
            .map_err(|_| VariableError::duplicate("protocol resolver"))?;
        log::debug!("[variable] protocol resolver installed");
        Ok(())
    }

    /// Whether a protocol resolver is installed
    pub fn has_protocol_resolver(&self) -> bool {
        self.protocols.resolver.get().is_some()
    }

    /// Resolve the protocol of `ctx`
    pub fn current_protocol(&self, ctx: &Context) -> VariableResult<ProtocolName> {
        let resolver = self
            .protocols
            .resolver
            .get()
            .ok_or(VariableError::NoProtocolResolver)?;
        resolver(ctx)
    }

    /// Read a protocol resource as a string
    ///
    /// The suffix is appended to the backing variable name, which is how
    /// parameterized resources (a specific header or query argument) are
    /// addressed. The backing name is resolved against registered names and
    /// prefixes only; it is never taken as another resource kind.
    pub fn get_protocol_resource(
        &self,
        ctx: &Context,
        resource: &ProtocolResourceName,
        suffix: Option<&str>,
    ) -> VariableResult<String> {
        let protocol = self.current_protocol(ctx)?;
        let Some(mut name) = self
            .protocols
            .backing_name(protocol.as_str(), resource.as_str())
        else {
            return Err(VariableError::UnregisteredProtocolResource {
                protocol: protocol.to_string(),
            });
        };

        if let Some(suffix) = suffix {
            name.push_str(suffix);
        }

        self.get_registered_string(ctx, &name)
    }
}

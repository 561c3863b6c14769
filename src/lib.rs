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

//! Proxy variables
//!
//! Named request and connection data for a proxy: registered once at startup,
//! looked up per request by name or by pre-assigned slot index, and cached per
//! context with copy-on-fork scopes.
//!
//! ```
//! use octofhir_variables::{Context, Variable, VariableRegistry, default_string_setter};
//!
//! let registry = VariableRegistry::new();
//! let request_id = Variable::builder("request_id")
//!     .string_setter(default_string_setter)
//!     .build();
//! registry.register(request_id.clone()).unwrap();
//!
//! let connection = registry.new_scope(&Context::background());
//! registry.set_string(&connection, &request_id, "42").unwrap();
//!
//! let request = registry.new_scope(&connection);
//! assert_eq!(registry.get_string(&request, &request_id).unwrap(), "42");
//! ```

pub mod builtin;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod global;
pub mod protocol;
pub mod registry;
pub mod value;
pub mod variable;

// Re-export main types
pub use config::{PrefixPolicy, RegistryConfig};
pub use context::{Context, ContextKey};
pub use engine::VariableRef;
pub use error::{VariableError, VariableResult};
pub use global::default_registry;
pub use protocol::{ProtocolName, ProtocolResolver, ProtocolResourceName};
pub use registry::VariableRegistry;
pub use value::{HeaderMap, VariableValue};
pub use variable::{
    Getter, IndexedValue, Setter, SlotIndex, Variable, VariableBuilder, default_setter,
    default_string_setter,
};

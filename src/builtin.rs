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

//! Built-in variables
//!
//! Setter-only variables the proxy core fills in while handling a request:
//! the protocols on both sides, the downstream header maps and the trace
//! span. Reading one before it was set fails with
//! [`VariableError::ValueNotFound`](crate::VariableError::ValueNotFound).

use std::sync::Arc;

use crate::error::VariableResult;
use crate::registry::VariableRegistry;
use crate::variable::Variable;

/// Protocol spoken with the downstream peer
pub const DOWNSTREAM_PROTOCOL: &str = "builtin_variable_downstream_protocol";
/// Protocol spoken with the upstream peer
pub const UPSTREAM_PROTOCOL: &str = "builtin_variable_upstream_protocol";
/// Request headers received from downstream
pub const DOWNSTREAM_REQ_HEADERS: &str = "builtin_variable_downstream_req_headers";
/// Response headers sent to downstream
pub const DOWNSTREAM_RESP_HEADERS: &str = "builtin_variable_downstream_resp_headers";
/// Trace span of the request
pub const TRACE_SPAN: &str = "builtin_variable_trace_span";

/// Every built-in name, in registration order
pub const BUILTIN_NAMES: [&str; 5] = [
    DOWNSTREAM_PROTOCOL,
    UPSTREAM_PROTOCOL,
    DOWNSTREAM_REQ_HEADERS,
    DOWNSTREAM_RESP_HEADERS,
    TRACE_SPAN,
];

/// Fresh descriptors for the built-in variables
pub fn builtin_variables() -> Vec<Arc<Variable>> {
    BUILTIN_NAMES
        .iter()
        .map(|name| Variable::builder(*name).default_setter().build())
        .collect()
}

/// Register the built-in variables
///
/// Already registered names keep their definition.
pub fn register_builtins(registry: &VariableRegistry) {
    for variable in builtin_variables() {
        let name = variable.name().to_string();
        if let Err(err) = registry.register(variable) {
            log::warn!("[variable] failed to register builtin {name}: {err}");
        }
    }
}

/// Registered downstream protocol variable
pub fn downstream_protocol(registry: &VariableRegistry) -> VariableResult<Arc<Variable>> {
    registry.check(DOWNSTREAM_PROTOCOL)
}

/// Registered upstream protocol variable
pub fn upstream_protocol(registry: &VariableRegistry) -> VariableResult<Arc<Variable>> {
    registry.check(UPSTREAM_PROTOCOL)
}

/// Registered downstream request headers variable
pub fn downstream_req_headers(registry: &VariableRegistry) -> VariableResult<Arc<Variable>> {
    registry.check(DOWNSTREAM_REQ_HEADERS)
}

/// Registered downstream response headers variable
pub fn downstream_resp_headers(registry: &VariableRegistry) -> VariableResult<Arc<Variable>> {
    registry.check(DOWNSTREAM_RESP_HEADERS)
}

/// Registered trace span variable
pub fn trace_span(registry: &VariableRegistry) -> VariableResult<Arc<Variable>> {
    registry.check(TRACE_SPAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use crate::context::Context;
    use crate::error::VariableError;
    use crate::value::{HeaderMap, VariableValue};

    #[test]
    fn test_builtins_are_setter_only() {
        let registry = VariableRegistry::new();
        let ctx = registry.new_scope(&Context::background());

        for name in BUILTIN_NAMES {
            let variable = registry.check(name).unwrap();
            assert!(variable.index().is_some(), "{name} should be indexed");
            assert_eq!(
                registry.get(&ctx, name),
                Err(VariableError::value_not_found(name))
            );
        }
    }

    #[test]
    fn test_builtin_headers_roundtrip() {
        let registry = VariableRegistry::new();
        let ctx = registry.new_scope(&Context::background());
        let headers: HeaderMap = [("Host", "example.com")].into_iter().collect();

        let variable = downstream_req_headers(&registry).unwrap();
        registry.set(&ctx, &variable, headers).unwrap();

        let value = registry.get(&ctx, DOWNSTREAM_REQ_HEADERS).unwrap();
        assert_eq!(
            value.as_headers().and_then(|h| h.get("host")),
            Some("example.com")
        );
    }

    #[test]
    fn test_register_builtins_twice_is_harmless() {
        let registry = VariableRegistry::with_config(RegistryConfig::testing());
        register_builtins(&registry);
        register_builtins(&registry);
        assert_eq!(registry.indexed_len(), BUILTIN_NAMES.len());
        assert!(trace_span(&registry).is_ok());
        assert!(upstream_protocol(&registry).is_ok());
        assert!(downstream_protocol(&registry).is_ok());
        assert!(downstream_resp_headers(&registry).is_ok());
    }

    #[test]
    fn test_protocol_builtin_holds_any_value() {
        let registry = VariableRegistry::new();
        let ctx = registry.new_scope(&Context::background());

        registry.set(&ctx, UPSTREAM_PROTOCOL, "Http2").unwrap();
        assert_eq!(
            registry.get(&ctx, UPSTREAM_PROTOCOL),
            Ok(VariableValue::from("Http2"))
        );
    }
}

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

//! Protocol-agnostic resource lookup

use octofhir_variables::*;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod utils;
use utils::constant_variable;

/// Registry resolving the protocol from the ambient context value
fn proxy_registry() -> VariableRegistry {
    utils::init_logging();
    let registry = VariableRegistry::new();

    for (name, value) in [
        ("Http1_request_path", "/http1"),
        ("Http1_request_uri", "/http1?a=1"),
        ("Http2_request_path", "/http2"),
        ("Dubbo_request_path", "/dubbo"),
    ] {
        registry.register(constant_variable(name, value)).unwrap();
    }
    registry
        .register_prefix(
            "Http1_request_arg_",
            Variable::builder("Http1_request_arg_")
                .string_getter(|_, _, data| {
                    Ok(data
                        .and_then(VariableValue::as_str)
                        .map(|name| name.trim_start_matches("Http1_request_arg_"))
                        .unwrap_or_default()
                        .to_string())
                })
                .build(),
        )
        .unwrap();

    for protocol in ["Http1", "Http2"] {
        registry
            .register_protocol_resource(protocol, ProtocolResourceName::PATH, "request_path")
            .unwrap();
    }
    registry
        .register_protocol_resource("Http1", ProtocolResourceName::URI, "request_uri")
        .unwrap();
    registry
        .register_protocol_resource("Http1", ProtocolResourceName::ARG, "request_arg_")
        .unwrap();

    registry
        .set_protocol_resolver(|ctx| {
            ctx.value::<ProtocolName>("protocol")
                .cloned()
                .ok_or_else(|| VariableError::evaluation("protocol", "protocol not set"))
        })
        .unwrap();
    registry
}

fn request(registry: &VariableRegistry, protocol: &'static str) -> Context {
    registry.new_scope(&Context::background().with_value("protocol", ProtocolName::from(protocol)))
}

#[rstest]
#[case("Http1", "/http1")]
#[case("Http2", "/http2")]
fn test_path_per_protocol(#[case] protocol: &'static str, #[case] expected: &str) {
    let registry = proxy_registry();
    let ctx = request(&registry, protocol);
    assert_eq!(
        registry.get_protocol_resource(&ctx, &ProtocolResourceName::PATH, None),
        Ok(expected.to_string())
    );
}

#[test]
fn test_unmapped_protocol() {
    let registry = proxy_registry();
    let ctx = request(&registry, "Dubbo");
    assert_eq!(
        registry.get_protocol_resource(&ctx, &ProtocolResourceName::PATH, None),
        Err(VariableError::UnregisteredProtocolResource {
            protocol: "Dubbo".to_string()
        })
    );
}

#[test]
fn test_resource_kind_as_variable_name() {
    let registry = proxy_registry();
    let ctx = request(&registry, "Http1");

    assert_eq!(registry.get_string(&ctx, "URI"), Ok("/http1?a=1".to_string()));

    let ctx = request(&registry, "Http2");
    assert_eq!(registry.get(&ctx, "URI"), Err(VariableError::undefined("URI")));
}

#[test]
fn test_argument_suffix() {
    let registry = proxy_registry();
    let ctx = request(&registry, "Http1");
    assert_eq!(
        registry.get_protocol_resource(&ctx, &ProtocolResourceName::ARG, Some("page")),
        Ok("page".to_string())
    );
}

#[test]
fn test_backing_variable_names() {
    let registry = proxy_registry();
    assert_eq!(
        registry.protocol_resource_variable(&ProtocolName::from("Http2"), &ProtocolResourceName::PATH),
        Some("Http2_request_path".to_string())
    );
    assert_eq!(
        registry.protocol_resource_variable(&ProtocolName::from("Http2"), &ProtocolResourceName::URI),
        None
    );
}

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

//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use octofhir_variables::*;

/// Install a test logger once; repeated calls are ignored
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Registry without built-ins
pub fn test_registry() -> VariableRegistry {
    init_logging();
    VariableRegistry::with_config(RegistryConfig::testing())
}

/// Indexed string variable with the default string setter
pub fn string_variable(name: &str) -> Arc<Variable> {
    Variable::builder(name)
        .string_setter(default_string_setter)
        .build()
}

/// Non-indexed variable returning a constant
pub fn constant_variable(name: &str, value: &'static str) -> Arc<Variable> {
    Variable::builder(name)
        .getter(move |_, _, _| Ok(VariableValue::from(value)))
        .build()
}

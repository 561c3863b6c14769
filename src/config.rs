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

//! Registry configuration options

use serde::{Deserialize, Serialize};

/// How prefix registrations interact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixPolicy {
    /// Overlapping prefixes are allowed; the longest matching prefix wins
    #[default]
    LongestMatch,
    /// A prefix that is a prefix of (or prefixed by) a registered one is refused
    RejectOverlap,
}

/// Configuration for a [`VariableRegistry`](crate::VariableRegistry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Initial capacity of the name, prefix and index tables
    pub initial_capacity: usize,

    /// Prefix resolution policy
    pub prefix_policy: PrefixPolicy,

    /// Whether to register the built-in variables on construction
    pub register_builtins: bool,

    /// Log level used for duplicate registration reports
    pub duplicate_log_level: log::Level,
}

impl RegistryConfig {
    /// Create a new configuration with custom settings
    pub fn new(initial_capacity: usize, prefix_policy: PrefixPolicy, register_builtins: bool) -> Self {
        Self {
            initial_capacity,
            prefix_policy,
            register_builtins,
            duplicate_log_level: log::Level::Warn,
        }
    }

    /// Configuration refusing overlapping prefixes
    pub fn strict() -> Self {
        Self {
            prefix_policy: PrefixPolicy::RejectOverlap,
            ..Self::default()
        }
    }

    /// Create a configuration for testing
    pub fn testing() -> Self {
        Self {
            initial_capacity: 8,
            prefix_policy: PrefixPolicy::LongestMatch,
            register_builtins: false,
            duplicate_log_level: log::Level::Debug,
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 32,
            prefix_policy: PrefixPolicy::LongestMatch,
            register_builtins: true,
            duplicate_log_level: log::Level::Warn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.initial_capacity, 32);
        assert_eq!(config.prefix_policy, PrefixPolicy::LongestMatch);
        assert!(config.register_builtins);
        assert_eq!(config.duplicate_log_level, log::Level::Warn);
    }

    #[test]
    fn test_registry_config_presets() {
        assert_eq!(RegistryConfig::strict().prefix_policy, PrefixPolicy::RejectOverlap);
        assert!(!RegistryConfig::testing().register_builtins);
    }

    #[test]
    fn test_registry_config_from_json() {
        let config =
            RegistryConfig::from_json(r#"{"prefix_policy": "reject_overlap", "initial_capacity": 4}"#)
                .unwrap();
        assert_eq!(config.initial_capacity, 4);
        assert_eq!(config.prefix_policy, PrefixPolicy::RejectOverlap);
        assert!(config.register_builtins);

        assert!(RegistryConfig::from_json(r#"{"prefix_policy": "shortest"}"#).is_err());
    }
}

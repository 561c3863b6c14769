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

//! Error types for variable registration and lookup

use thiserror::Error;

/// Result type for variable operations
pub type VariableResult<T> = Result<T, VariableError>;

/// Errors that can occur while registering, resolving or updating variables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    /// Name not found in any namespace (exact, prefix, protocol resource)
    #[error("undefined variable, name: {name}")]
    UndefinedVariable {
        /// The requested name
        name: String,
    },

    /// Override attempted on a name or prefix that was never registered
    #[error("variable not registered, name: {name}")]
    NotRegistered {
        /// The name or prefix
        name: String,
    },

    /// A name, prefix, protocol resource or resolver was registered twice
    #[error("duplicate variable register, name: {name}")]
    DuplicateRegistration {
        /// The name or prefix
        name: String,
    },

    /// Prefix overlaps with an existing prefix and the registry forbids it
    #[error("prefix '{prefix}' overlaps with registered prefix '{existing}'")]
    PrefixOverlap {
        /// The rejected prefix
        prefix: String,
        /// The already registered prefix it overlaps with
        existing: String,
    },

    /// Variable exists but has neither a cached value nor a getter
    #[error("variable value not found, variable name: {name}")]
    ValueNotFound {
        /// Variable name
        name: String,
    },

    /// Set attempted on a variable that is not indexed
    #[error("setter function undefined, only indexed variables support set, variable name: {name}")]
    SetterNotFound {
        /// Variable name
        name: String,
    },

    /// Typed accessor found a value of another kind
    #[error("variable '{name}' has wrong type: expected {expected}, got {actual}")]
    WrongType {
        /// Variable name
        name: String,
        /// Expected value kind
        expected: &'static str,
        /// Actual value kind
        actual: &'static str,
    },

    /// The context carries no slot array (never created through a scope)
    #[error("no variables found in context")]
    NoVariablesInContext,

    /// The context belongs to another registry
    #[error("invalid context")]
    InvalidContext,

    /// No protocol resolver has been installed
    #[error("no way to get protocol, get protocol resource variable failed")]
    NoProtocolResolver,

    /// No backing variable for the resource under the current protocol
    #[error("unregister protocol resource, protocol: {protocol}")]
    UnregisteredProtocolResource {
        /// Protocol resolved for the context
        protocol: String,
    },

    /// Failure reported by a getter, setter or protocol resolver
    #[error("variable '{name}' evaluation error: {message}")]
    Evaluation {
        /// Variable or hook name
        name: String,
        /// Error message
        message: String,
    },
}

impl VariableError {
    /// Create an undefined variable error
    pub fn undefined(name: impl Into<String>) -> Self {
        Self::UndefinedVariable { name: name.into() }
    }

    /// Create a not registered error
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered { name: name.into() }
    }

    /// Create a duplicate registration error
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateRegistration { name: name.into() }
    }

    /// Create a value not found error
    pub fn value_not_found(name: impl Into<String>) -> Self {
        Self::ValueNotFound { name: name.into() }
    }

    /// Create a setter not found error
    pub fn setter_not_found(name: impl Into<String>) -> Self {
        Self::SetterNotFound { name: name.into() }
    }

    /// Create a wrong type error
    pub fn wrong_type(name: impl Into<String>, expected: &'static str, actual: &'static str) -> Self {
        Self::WrongType {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create an evaluation error
    pub fn evaluation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the name could not be resolved at all
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::UndefinedVariable { .. })
    }
}

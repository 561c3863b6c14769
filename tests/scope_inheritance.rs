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

//! Connection and stream scopes: values copied at fork, isolated afterwards

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use octofhir_variables::*;
use pretty_assertions::assert_eq;

mod utils;
use utils::{string_variable, test_registry};

#[test]
fn test_stream_scopes_inherit_connection_values() {
    let registry = test_registry();
    let connection_id = string_variable("connection_id");
    let stream_id = string_variable("stream_id");
    registry.register(connection_id.clone()).unwrap();
    registry.register(stream_id.clone()).unwrap();

    let connection = registry.new_scope(&Context::background());
    registry.set_string(&connection, "connection_id", "1").unwrap();

    let stream_one = registry.new_scope(&connection);
    registry.set_string(&stream_one, "stream_id", "2").unwrap();

    let stream_two = registry.new_scope(&connection);
    registry.set_string(&stream_two, "stream_id", "3").unwrap();

    assert_eq!(registry.get_string(&stream_one, "connection_id"), Ok("1".to_string()));
    assert_eq!(registry.get_string(&stream_two, "connection_id"), Ok("1".to_string()));
    assert_eq!(registry.get_string(&stream_one, "stream_id"), Ok("2".to_string()));
    assert_eq!(registry.get_string(&stream_two, "stream_id"), Ok("3".to_string()));

    // the connection never saw the per-stream values
    assert_eq!(
        registry.get(&connection, &stream_id),
        Err(VariableError::value_not_found("stream_id"))
    );
}

#[test]
fn test_child_writes_do_not_reach_parent() {
    let registry = test_registry();
    let connection_id = string_variable("connection_id");
    registry.register(connection_id.clone()).unwrap();

    let connection = registry.new_scope(&Context::background());
    registry.set_string(&connection, &connection_id, "1").unwrap();

    let stream = registry.new_scope(&connection);
    registry.set_string(&stream, &connection_id, "changed").unwrap();

    assert_eq!(registry.get_string(&stream, &connection_id), Ok("changed".to_string()));
    assert_eq!(registry.get_string(&connection, &connection_id), Ok("1".to_string()));
}

#[test]
fn test_parent_writes_after_fork_are_not_seen() {
    let registry = test_registry();
    let connection_id = string_variable("connection_id");
    registry.register(connection_id.clone()).unwrap();

    let connection = registry.new_scope(&Context::background());
    registry.set_string(&connection, &connection_id, "before").unwrap();
    let stream = registry.new_scope(&connection);
    registry.set_string(&connection, &connection_id, "after").unwrap();

    assert_eq!(registry.get_string(&stream, &connection_id), Ok("before".to_string()));
}

#[test]
fn test_getter_reads_ambient_value() {
    let registry = test_registry();
    registry
        .register(
            Variable::builder("ambient")
                .string_getter(|ctx, _, _| {
                    ctx.value::<String>("test")
                        .cloned()
                        .ok_or_else(|| VariableError::evaluation("ambient", "no test value"))
                })
                .default_setter()
                .build(),
        )
        .unwrap();

    let ctx = registry.new_scope(&Context::background());
    assert!(registry.get(&ctx, "ambient").is_err());

    // attaching a value keeps the slots
    let ctx = ctx.with_value("test", "test value".to_string());
    assert!(ctx.has_variables());
    assert_eq!(registry.get_string(&ctx, "ambient"), Ok("test value".to_string()));
}

#[test]
fn test_getter_only_variable_follows_rebound_value() {
    let registry = test_registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    registry
        .register(
            Variable::builder("test_getter")
                .string_getter(move |ctx, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    ctx.value::<String>("test")
                        .cloned()
                        .ok_or_else(|| VariableError::evaluation("test_getter", "no test value"))
                })
                .build(),
        )
        .unwrap();

    let ctx = registry.new_scope(&Context::background().with_value("test", "one".to_string()));
    assert_eq!(registry.get_string(&ctx, "test_getter"), Ok("one".to_string()));

    let ctx = ctx.with_value("test", "two".to_string());
    assert_eq!(registry.get_string(&ctx, "test_getter"), Ok("two".to_string()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_slots_survive_with_value() {
    let registry = test_registry();
    let variable = string_variable("kept");
    registry.register(variable.clone()).unwrap();

    let ctx = registry.new_scope(&Context::background());
    registry.set_string(&ctx, &variable, "value").unwrap();
    let ctx = ctx.with_value("other", 1_u8);

    assert_eq!(registry.get_string(&ctx, &variable), Ok("value".to_string()));
}

#[test]
fn test_scope_grows_for_late_registrations() {
    let registry = test_registry();
    registry.register(string_variable("early")).unwrap();
    let connection = registry.new_scope(&Context::background());
    assert_eq!(connection.slot_count(), 1);

    let late = string_variable("late");
    registry.register(late.clone()).unwrap();
    let stream = registry.new_scope(&connection);
    assert_eq!(stream.slot_count(), 2);

    registry.set_string(&connection, &late, "on connection").unwrap();
    assert_eq!(
        registry.get_string(&connection, &late),
        Ok("on connection".to_string())
    );
    assert_eq!(
        registry.get(&stream, &late),
        Err(VariableError::value_not_found("late"))
    );
}

#[test]
fn test_scope_of_foreign_registry_starts_empty() {
    let first = test_registry();
    let second = test_registry();
    let variable = string_variable("shared_name");
    first.register(variable.clone()).unwrap();
    second.register(string_variable("shared_name")).unwrap();

    let ctx = first.new_scope(&Context::background());
    first.set_string(&ctx, &variable, "first").unwrap();

    let foreign = second.new_scope(&ctx);
    assert_eq!(
        second.get(&foreign, "shared_name"),
        Err(VariableError::value_not_found("shared_name"))
    );
    assert_eq!(first.get(&foreign, &variable), Err(VariableError::InvalidContext));
}

#[test]
fn test_descriptor_of_other_registry_does_not_alias_slots() {
    let first = test_registry();
    let second = test_registry();
    let a = string_variable("a");
    let b = string_variable("b");
    first.register(a.clone()).unwrap();
    second.register(b.clone()).unwrap();
    assert_eq!(a.index(), b.index());

    let ctx = second.new_scope(&Context::background());
    second.set_string(&ctx, &b, "b-value").unwrap();
    assert_eq!(second.get(&ctx, &a), Err(VariableError::undefined("a")));
    assert_eq!(
        second.set_string(&ctx, &a, "through a"),
        Err(VariableError::undefined("a"))
    );

    // once the name exists, the foreign descriptor reaches the local slot
    second.register(a.clone()).unwrap();
    let ctx = second.new_scope(&ctx);
    assert_eq!(second.get(&ctx, &a), Err(VariableError::value_not_found("a")));
    second.set_string(&ctx, &a, "a-value").unwrap();
    assert_eq!(second.get_string(&ctx, "a"), Ok("a-value".to_string()));
    assert_eq!(second.get_string(&ctx, &b), Ok("b-value".to_string()));
    assert!(!Arc::ptr_eq(&second.check("a").unwrap(), &a));
}

#[test]
fn test_cleared_registry_rejects_old_scopes() {
    let registry = test_registry();
    let variable = string_variable("request_id");
    registry.register(variable.clone()).unwrap();
    let old = registry.new_scope(&Context::background());
    registry.set_string(&old, &variable, "old").unwrap();

    registry.clear();
    registry.register(string_variable("other")).unwrap();
    registry.register(variable.clone()).unwrap();

    assert_eq!(registry.get(&old, &variable), Err(VariableError::InvalidContext));
    let ctx = registry.new_scope(&Context::background());
    registry.set_string(&ctx, &variable, "new").unwrap();
    assert_eq!(registry.get_string(&ctx, "request_id"), Ok("new".to_string()));
    assert_eq!(
        registry.get(&ctx, "other"),
        Err(VariableError::value_not_found("other"))
    );
}

//! Shared fixture: a store of three users and the usual cursors into it.

#![allow(dead_code)]

use cursorstore_core::{Cursor, Engine, Store, Value};
use serde_json::json;

pub struct Testbed {
    pub engine: Engine,
    pub store: Store,
    pub data: Value,
    pub root: Cursor,
    pub users: Cursor,
    pub first_user: Cursor,
    pub first_user_name: Cursor,
    pub active_users: Cursor,
    pub broken: Cursor,
}

/// `users.filter(active).map(name)` as call steps.
pub fn active_user_names(users: &Cursor) -> Cursor {
    users
        .call(
            "filter",
            |this, _| {
                let active: Vec<Value> = this
                    .as_array()
                    .unwrap_or_default()
                    .iter()
                    .filter(|user| {
                        user.as_map()
                            .and_then(|m| m.get("active"))
                            .and_then(Value::as_bool)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                Value::from(active)
            },
            vec![],
        )
        .call(
            "map",
            |this, _| {
                let names: Vec<Value> = this
                    .as_array()
                    .unwrap_or_default()
                    .iter()
                    .map(|user| {
                        user.as_map()
                            .and_then(|m| m.get("name"))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect();
                Value::from(names)
            },
            vec![],
        )
}

pub fn testbed() -> Testbed {
    let engine = Engine::default();
    let data = Value::from(json!({
        "users": [
            {"name": "first", "active": true},
            {"name": "second", "active": false},
            {"name": "third", "active": true}
        ]
    }));
    let store = engine.create_store(data.clone());
    let root = store.cursor();
    let users = root.prop("users");
    let first_user = users.index(0);
    let first_user_name = first_user.prop("name");
    let active_users = active_user_names(&users);
    let broken = root.prop("doesntExist").index(0);

    Testbed {
        engine,
        store,
        data,
        root,
        users,
        first_user,
        first_user_name,
        active_users,
        broken,
    }
}

pub fn value(json: serde_json::Value) -> Value {
    Value::from(json)
}

/// Flip the `active` flag of a user map in place.
pub fn toggle_active(user: &mut Value) {
    if let Some(map) = user.as_map_mut() {
        let active = map.get("active").and_then(Value::as_bool).unwrap_or(false);
        map.insert("active".to_string(), Value::from(!active));
    }
}

//! Proptest strategies for message bodies

use amqp_harness::codec::Row;
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Field names that survive every text format unquoted
pub fn field_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,11}"
}

/// Leaf JSON values; floats are left out so equality holds after YAML
pub fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ._-]{0,24}".prop_map(Value::String),
    ]
}

/// Nested JSON documents with an object at the root
pub fn json_document() -> impl Strategy<Value = Value> {
    let value = json_leaf().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(field_name(), inner, 0..6)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    });
    prop::collection::btree_map(field_name(), value, 0..8)
        .prop_map(|map| Value::Object(map.into_iter().collect()))
}

/// CSV rows that share one header set
pub fn csv_rows() -> impl Strategy<Value = Vec<Row>> {
    (1usize..6).prop_flat_map(|columns| {
        prop::collection::btree_set(field_name(), columns).prop_flat_map(|headers| {
            let headers: Vec<String> = headers.into_iter().collect();
            let width = headers.len();
            prop::collection::vec(
                prop::collection::vec("[a-zA-Z0-9]{1,12}", width),
                1..10,
            )
            .prop_map(move |rows| {
                rows.into_iter()
                    .map(|cells| headers.iter().cloned().zip(cells).collect::<Row>())
                    .collect()
            })
        })
    })
}

/// Retry counter values, including ones past any configured maximum
pub fn retry_counter() -> impl Strategy<Value = i64> {
    0i64..1_000
}

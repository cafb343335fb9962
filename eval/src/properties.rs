//! Property-based test suites for the wire codec.

use std::rc::Rc;

use bytes::Bytes;
use proptest::prelude::*;

use crate::value::{Dict, Value};
use crate::wire;

/// Hashable scalar values, usable as mapping keys.
fn wire_key() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::None),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::Integer(n as i64)),
        any::<f64>()
            .prop_filter("NaN never compares equal", |f| !f.is_nan())
            .prop_map(Value::Float),
        prop::collection::vec(prop::char::range('a', 'z'), 0..12)
            .prop_map(|chars| Value::from(chars.into_iter().collect::<String>().as_str())),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(|b| Value::Bytes(Bytes::from(b))),
    ]
}

/// Arbitrary wire-representable values, nesting lists and mappings a
/// few levels deep.
fn wire_value() -> impl Strategy<Value = Value> {
    wire_key().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6)
                .prop_map(|items| Value::List(Rc::new(items))),
            prop::collection::vec((wire_key(), inner), 0..6).prop_map(|pairs| {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    dict.insert(key, value).expect("keys are hashable scalars");
                }
                Value::Dict(Rc::new(dict))
            }),
        ]
    })
}

proptest! {
    #[test]
    fn wire_round_trip(value in wire_value()) {
        let mut buf = Vec::new();
        wire::write_value(&mut buf, &value).unwrap();
        let back = wire::read_value(&mut buf.as_slice()).unwrap();
        prop_assert_eq!(back, value);
    }

    /// serialize(deserialize(B)) == B for any encoded value B.
    #[test]
    fn encoding_is_canonical(value in wire_value()) {
        let mut first = Vec::new();
        wire::write_value(&mut first, &value).unwrap();

        let decoded = wire::read_value(&mut first.as_slice()).unwrap();
        let mut second = Vec::new();
        wire::write_value(&mut second, &decoded).unwrap();

        prop_assert_eq!(first, second);
    }

    /// Decoding never panics on arbitrary input; it either yields a
    /// value or reports a structured error.
    #[test]
    fn decoding_arbitrary_bytes_is_total(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = wire::read_value(&mut bytes.as_slice());
    }
}

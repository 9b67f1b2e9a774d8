//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use personal_server_core::{Address, GrantDocument, Keypair, OperationRequest};

/// Generate a random signing keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_filter_map("not a valid secp256k1 scalar", |secret| {
        Keypair::from_secret(&secret).ok()
    })
}

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate an operation tag.
pub fn operation() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("llm_inference".to_string()),
        Just("agent_task".to_string()),
        "[a-z][a-z_]{0,23}",
    ]
}

/// Generate a flat parameter map with scalar values.
pub fn parameters() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(
        "[a-z_]{1,12}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[ -~]{0,32}".prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|m| m.into_iter().collect())
}

/// Generate a grant for `grantee` with arbitrary operation, parameters,
/// expiry and file list.
pub fn grant_for(grantee: Address) -> impl Strategy<Value = GrantDocument> {
    (
        operation(),
        parameters(),
        prop::option::of(0u64..=u32::MAX as u64),
        prop::option::of(prop::collection::vec(1u64..10_000_000, 0..4)),
    )
        .prop_map(move |(operation, parameters, expires, files)| GrantDocument {
            grantee,
            operation,
            parameters,
            expires,
            files,
        })
}

/// Generate a grant with a random grantee.
pub fn grant() -> impl Strategy<Value = GrantDocument> {
    address().prop_flat_map(grant_for)
}

/// Generate a well-formed operation request.
pub fn operation_request() -> impl Strategy<Value = OperationRequest> {
    (
        1u64..=u64::MAX,
        prop::option::of(operation()),
        prop::option::of(parameters()),
    )
        .prop_map(|(permission_id, operation, parameters)| OperationRequest {
            permission_id,
            operation,
            parameters,
        })
}

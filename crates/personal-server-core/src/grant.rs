//! Grant documents.
//!
//! A grant is an off-chain JSON document, referenced by a permission record,
//! naming who may run which operation with which parameters. Two shapes are
//! in circulation: a flat object, and a typed-message envelope whose
//! `message` carries the flat fields. Both normalize to [`GrantDocument`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::Address;
use crate::error::{AuthorizationError, CoreError, Result};

/// A validated grant document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantDocument {
    /// The application allowed to use this grant.
    pub grantee: Address,

    /// The operation tag this grant authorizes.
    pub operation: String,

    /// Operation parameters fixed by the grantor.
    pub parameters: Map<String, Value>,

    /// Unix seconds after which the grant is void.
    pub expires: Option<u64>,

    /// File ids named by the grant, if any.
    pub files: Option<Vec<u64>>,
}

impl GrantDocument {
    /// Parse and validate a grant from raw JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::GrantSchema(format!("not valid JSON: {}", e)))?;
        Self::from_value(&value)
    }

    /// Normalize and validate an already-parsed grant.
    pub fn from_value(value: &Value) -> Result<Self> {
        let flat = normalize(value)?;
        validate(flat)
    }

    /// Check the grant against a requester at time `now` (Unix seconds).
    ///
    /// Checks run in a fixed order: supported operation, grantee, expiry.
    pub fn authorize<S: AsRef<str>>(
        &self,
        requester: &Address,
        supported_operations: &[S],
        now: u64,
    ) -> std::result::Result<(), AuthorizationError> {
        if !supported_operations
            .iter()
            .any(|op| op.as_ref() == self.operation)
        {
            return Err(AuthorizationError::UnsupportedOperation(
                self.operation.clone(),
            ));
        }

        if &self.grantee != requester {
            return Err(AuthorizationError::GranteeMismatch {
                grantee: self.grantee.to_checksum(),
                requester: requester.to_checksum(),
            });
        }

        if let Some(expires) = self.expires {
            if expires <= now {
                return Err(AuthorizationError::Expired { expires, now });
            }
        }

        Ok(())
    }

    /// Serialize to the flat JSON shape.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("grantee".into(), Value::String(self.grantee.to_checksum()));
        obj.insert("operation".into(), Value::String(self.operation.clone()));
        obj.insert("parameters".into(), Value::Object(self.parameters.clone()));
        if let Some(expires) = self.expires {
            obj.insert("expires".into(), Value::from(expires));
        }
        if let Some(files) = &self.files {
            obj.insert("files".into(), Value::from(files.clone()));
        }
        Value::Object(obj)
    }
}

/// Pick out the flat grant object from either accepted shape.
fn normalize(value: &Value) -> Result<&Map<String, Value>> {
    let root = value
        .as_object()
        .ok_or_else(|| CoreError::GrantSchema("grant must be a JSON object".into()))?;

    if let Some(typed) = root.get("typedData") {
        return typed
            .get("message")
            .and_then(Value::as_object)
            .ok_or_else(|| CoreError::GrantSchema("typedData.message must be an object".into()));
    }

    if !root.contains_key("grantee") {
        if let Some(message) = root.get("message") {
            return message
                .as_object()
                .ok_or_else(|| CoreError::GrantSchema("message must be an object".into()));
        }
    }

    Ok(root)
}

fn validate(obj: &Map<String, Value>) -> Result<GrantDocument> {
    let grantee_str = obj
        .get("grantee")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::GrantSchema("missing string field 'grantee'".into()))?;
    if !is_prefixed_hex40(grantee_str) {
        return Err(CoreError::GrantSchema(format!(
            "grantee '{}' is not a 0x-prefixed 40 hex character address",
            grantee_str
        )));
    }
    let grantee = Address::parse(grantee_str)?;

    let operation = obj
        .get("operation")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::GrantSchema("missing string field 'operation'".into()))?;
    if operation.trim().is_empty() {
        return Err(CoreError::GrantSchema("operation must not be empty".into()));
    }

    let parameters = obj
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| CoreError::GrantSchema("missing object field 'parameters'".into()))?;

    let expires = match obj.get("expires") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            CoreError::GrantSchema("expires must be a non-negative integer".into())
        })?),
    };

    let files = match obj.get("files") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|v| {
                    v.as_u64().ok_or_else(|| {
                        CoreError::GrantSchema("files must contain non-negative integers".into())
                    })
                })
                .collect::<Result<Vec<u64>>>()?,
        ),
        Some(_) => return Err(CoreError::GrantSchema("files must be an array".into())),
    };

    Ok(GrantDocument {
        grantee,
        operation: operation.to_string(),
        parameters,
        expires,
        files,
    })
}

fn is_prefixed_hex40(s: &str) -> bool {
    s.len() == 42 && s.starts_with("0x") && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GRANTEE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn flat() -> Value {
        json!({
            "grantee": GRANTEE,
            "operation": "llm_inference",
            "parameters": {"prompt": "Summarize {{data}}"},
            "expires": 2_000_000_000u64,
        })
    }

    #[test]
    fn test_flat_shape() {
        let grant = GrantDocument::from_value(&flat()).unwrap();
        assert_eq!(grant.grantee, Address::parse(GRANTEE).unwrap());
        assert_eq!(grant.operation, "llm_inference");
        assert_eq!(grant.expires, Some(2_000_000_000));
        assert_eq!(grant.files, None);
    }

    #[test]
    fn test_typed_message_shapes_normalize() {
        let expected = GrantDocument::from_value(&flat()).unwrap();

        let typed = json!({"typedData": {"message": flat()}, "signature": "0xabc"});
        assert_eq!(GrantDocument::from_value(&typed).unwrap(), expected);

        let message = json!({"message": flat()});
        assert_eq!(GrantDocument::from_value(&message).unwrap(), expected);
    }

    #[test]
    fn test_schema_violations() {
        let cases = [
            json!({"operation": "llm_inference", "parameters": {}}),
            json!({"grantee": "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed", "operation": "x", "parameters": {}}),
            json!({"grantee": GRANTEE, "operation": "", "parameters": {}}),
            json!({"grantee": GRANTEE, "operation": "x", "parameters": []}),
            json!({"grantee": GRANTEE, "operation": "x", "parameters": {}, "expires": -1}),
            json!({"grantee": GRANTEE, "operation": "x", "parameters": {}, "expires": "soon"}),
            json!({"grantee": GRANTEE, "operation": "x", "parameters": {}, "files": [1, "2"]}),
            json!(["not", "an", "object"]),
        ];
        for case in cases {
            let err = GrantDocument::from_value(&case).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Validation, "case {}", case);
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let mut value = flat();
        value["extra"] = json!({"anything": true});
        assert!(GrantDocument::from_value(&value).is_ok());
    }

    #[test]
    fn test_authorize_order() {
        let grant = GrantDocument::from_value(&flat()).unwrap();
        let grantee = Address::parse(GRANTEE).unwrap();
        let stranger = Address::from_bytes([9u8; 20]);

        // Unsupported operation is reported even for the wrong requester.
        assert!(matches!(
            grant.authorize(&stranger, &["agent_task"], 0),
            Err(AuthorizationError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            grant.authorize(&stranger, &["llm_inference"], 0),
            Err(AuthorizationError::GranteeMismatch { .. })
        ));
        assert!(grant.authorize(&grantee, &["llm_inference"], 0).is_ok());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = 1_700_000_000u64;
        let grantee = Address::parse(GRANTEE).unwrap();
        let mut grant = GrantDocument::from_value(&flat()).unwrap();

        grant.expires = Some(now - 1);
        assert!(matches!(
            grant.authorize(&grantee, &["llm_inference"], now),
            Err(AuthorizationError::Expired { .. })
        ));

        grant.expires = Some(now);
        assert!(grant.authorize(&grantee, &["llm_inference"], now).is_err());

        grant.expires = Some(now + 1);
        assert!(grant.authorize(&grantee, &["llm_inference"], now).is_ok());

        grant.expires = None;
        assert!(grant.authorize(&grantee, &["llm_inference"], u64::MAX).is_ok());
    }

    #[test]
    fn test_to_json_reparses() {
        let mut grant = GrantDocument::from_value(&flat()).unwrap();
        grant.files = Some(vec![1654817]);
        let reparsed = GrantDocument::from_value(&grant.to_json()).unwrap();
        assert_eq!(reparsed, grant);
    }

    proptest::proptest! {
        #[test]
        fn prop_foreign_requester_always_rejected(
            grantee in proptest::array::uniform20(proptest::prelude::any::<u8>()),
            requester in proptest::array::uniform20(proptest::prelude::any::<u8>()),
            expires in proptest::option::of(0u64..u64::MAX),
        ) {
            proptest::prop_assume!(grantee != requester);
            let grant = GrantDocument {
                grantee: Address::from_bytes(grantee),
                operation: "llm_inference".into(),
                parameters: Map::new(),
                expires,
                files: None,
            };
            let mismatch = matches!(
                grant.authorize(&Address::from_bytes(requester), &["llm_inference"], 0),
                Err(AuthorizationError::GranteeMismatch { .. })
            );
            proptest::prop_assert!(mismatch);
        }
    }
}

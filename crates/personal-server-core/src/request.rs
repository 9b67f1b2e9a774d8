//! Signed operation requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::Address;
use crate::crypto::{recover_address, Keypair, RecoverableSignature};
use crate::error::{CoreError, Result};

/// A request as it arrives: the exact JSON text plus a signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    pub request_json: String,
    pub signature: String,
}

/// The decoded body of a [`SignedRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub permission_id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

impl OperationRequest {
    /// A request for `permission_id` with no caller-declared extras.
    pub fn new(permission_id: u64) -> Self {
        Self {
            permission_id,
            operation: None,
            parameters: None,
        }
    }

    /// Declare the operation the caller expects.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attach runtime parameters.
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

impl SignedRequest {
    /// Serialize and sign a request.
    pub fn sign(request: &OperationRequest, keypair: &Keypair) -> Result<Self> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| CoreError::InvalidRequest(e.to_string()))?;
        let signature = keypair.sign_message(request_json.as_bytes())?;
        Ok(Self {
            request_json,
            signature: signature.to_hex(),
        })
    }

    /// Decode the request body. Does not authenticate.
    pub fn decode(&self) -> Result<OperationRequest> {
        let request: OperationRequest = serde_json::from_str(&self.request_json)
            .map_err(|e| CoreError::InvalidRequest(format!("malformed request: {}", e)))?;
        if request.permission_id == 0 {
            return Err(CoreError::InvalidRequest(
                "permission_id must be greater than zero".into(),
            ));
        }
        if let Some(op) = &request.operation {
            if op.trim().is_empty() {
                return Err(CoreError::InvalidRequest("operation must not be empty".into()));
            }
        }
        Ok(request)
    }

    /// Recover the address that signed `request_json`.
    pub fn recover_signer(&self) -> Result<Address> {
        let signature = RecoverableSignature::from_hex(&self.signature)?;
        recover_address(self.request_json.as_bytes(), &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_sign_decode_recover() {
        let keypair = Keypair::generate();
        let mut params = Map::new();
        params.insert("temperature".into(), Value::from(0.2));
        let request = OperationRequest::new(8)
            .with_operation("llm_inference")
            .with_parameters(params);

        let signed = SignedRequest::sign(&request, &keypair).unwrap();
        assert_eq!(signed.decode().unwrap(), request);
        assert_eq!(signed.recover_signer().unwrap(), keypair.address());
    }

    #[test]
    fn test_zero_permission_rejected() {
        let keypair = Keypair::generate();
        let signed = SignedRequest::sign(&OperationRequest::new(0), &keypair).unwrap();
        assert_eq!(signed.decode().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_malformed_json_rejected() {
        let signed = SignedRequest {
            request_json: "{\"permission_id\": \"eight\"}".into(),
            signature: "0x00".into(),
        };
        assert_eq!(signed.decode().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_garbage_signature_is_authentication_error() {
        let signed = SignedRequest {
            request_json: "{\"permission_id\":8}".into(),
            signature: "0xdeadbeef".into(),
        };
        assert_eq!(
            signed.recover_signer().unwrap_err().kind(),
            ErrorKind::Authentication
        );
    }

    #[test]
    fn test_modified_body_changes_signer() {
        let keypair = Keypair::generate();
        let mut signed = SignedRequest::sign(&OperationRequest::new(8), &keypair).unwrap();
        signed.request_json = "{\"permission_id\":9}".into();
        match signed.recover_signer() {
            Ok(addr) => assert_ne!(addr, keypair.address()),
            Err(e) => assert_eq!(e.kind(), ErrorKind::Authentication),
        }
    }
}

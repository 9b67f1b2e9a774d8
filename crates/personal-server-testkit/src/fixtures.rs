//! Test fixtures and helpers.
//!
//! [`Scenario`] sets up a complete world: a server key deriver, a chain
//! with one active permission, a published grant, and one encrypted file
//! whose key is wrapped to the server address derived for its owner.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use personal_server_chain::RegistryFile;
use personal_server_core::{
    Address, GrantDocument, Keypair, OperationRequest, PermissionRecord, SignedRequest,
};
use personal_server_crypto::{seal_payload, wrap_key, KeyDeriver};

use crate::chain::MockChain;
use crate::content::MemoryContent;

/// Well-known development mnemonic.
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

pub const SCENARIO_PERMISSION_ID: u64 = 8;
pub const SCENARIO_FILE_ID: u64 = 1654817;
pub const SCENARIO_OPERATION: &str = "llm_inference";
pub const SCENARIO_GRANTOR: &str = "0xD867a8b5E4c1f3D2b6A7c9e8F0a1B2c3D4e5F6a7";
pub const SCENARIO_PLAINTEXT: &[u8] = b"{\"messages\":[{\"role\":\"user\",\"text\":\"hello from my export\"}]}";

/// A deterministic signer. Different `index` values give different keys.
pub fn signer(index: u8) -> Keypair {
    let mut secret = [0x11u8; 32];
    secret[31] = index;
    Keypair::from_secret(&secret).unwrap()
}

/// A deriver over [`TEST_MNEMONIC`].
pub fn test_deriver() -> KeyDeriver {
    KeyDeriver::new(TEST_MNEMONIC, "english").unwrap()
}

pub fn grant_uri(permission_id: u64) -> String {
    format!("ipfs://bafkreigrant{}", permission_id)
}

pub fn file_uri(file_id: u64) -> String {
    format!("ipfs://bafkreifile{}", file_id)
}

/// The symmetric passphrase a fixture file is sealed with.
pub fn file_passphrase(file_id: u64) -> Vec<u8> {
    format!("0x{:064x}", file_id.wrapping_mul(0x9e37_79b9_7f4a_7c15)).into_bytes()
}

/// Seal `plaintext` under `passphrase` and wrap the passphrase to the
/// server address derived for `owner`.
///
/// Returns the container and the hex-encoded wrapped key.
pub fn encrypt_for_owner(
    deriver: &KeyDeriver,
    owner: &Address,
    plaintext: &[u8],
    passphrase: &[u8],
) -> (Vec<u8>, String) {
    let server = deriver.derive(owner).unwrap();
    let container = seal_payload(plaintext, passphrase).unwrap();
    let wrapped = wrap_key(passphrase, &server.public_key).unwrap();
    (container, format!("0x{}", hex::encode(wrapped)))
}

/// A grant for `grantee` with the scenario operation and a prompt parameter.
pub fn default_grant(grantee: Address) -> GrantDocument {
    let mut parameters = Map::new();
    parameters.insert("prompt".into(), json!("Summarize: {{data}}"));
    GrantDocument {
        grantee,
        operation: SCENARIO_OPERATION.into(),
        parameters,
        expires: None,
        files: None,
    }
}

/// A complete permission/grant/file world.
pub struct Scenario {
    pub deriver: Arc<KeyDeriver>,
    pub chain: Arc<MockChain>,
    pub content: Arc<MemoryContent>,
    /// The data owner who issued the permission.
    pub grantor: Address,
    /// The application the grant names.
    pub application: Keypair,
    pub permission_id: u64,
    pub grant: GrantDocument,
}

impl Scenario {
    /// Permission 8 from the scenario grantor, granting `llm_inference` on
    /// file 1654817 to `signer(1)`.
    pub fn new() -> Self {
        let grantor = Address::parse(SCENARIO_GRANTOR).unwrap();
        let application = signer(1);
        let grant = default_grant(application.address());

        let scenario = Self {
            deriver: Arc::new(test_deriver()),
            chain: Arc::new(MockChain::new()),
            content: Arc::new(MemoryContent::new()),
            grantor,
            application,
            permission_id: SCENARIO_PERMISSION_ID,
            grant,
        };

        scenario.chain.put_permission(PermissionRecord {
            id: SCENARIO_PERMISSION_ID,
            grantor,
            nonce: 1,
            grant_uri: grant_uri(SCENARIO_PERMISSION_ID),
            grantor_signature: vec![0x5a; 65],
            is_active: true,
            file_ids: Default::default(),
        });
        scenario.publish_grant_json(scenario.grant.to_json());
        scenario.add_file(SCENARIO_FILE_ID, SCENARIO_PLAINTEXT);
        scenario
    }

    /// Replace the grant and republish it.
    pub fn set_grant(&mut self, grant: GrantDocument) {
        self.publish_grant_json(grant.to_json());
        self.grant = grant;
    }

    /// Publish arbitrary JSON at the grant URI.
    pub fn publish_grant_json(&self, value: Value) {
        self.content
            .insert(grant_uri(self.permission_id), value.to_string().into_bytes());
    }

    /// Register an encrypted file owned by the grantor and list it on the
    /// permission record.
    pub fn add_file(&self, file_id: u64, plaintext: &[u8]) {
        self.add_file_for(file_id, self.grantor, plaintext);
        self.update_permission(|record| {
            record.file_ids.insert(file_id);
        });
    }

    /// Register an encrypted file without touching the permission record.
    pub fn add_file_for(&self, file_id: u64, owner: Address, plaintext: &[u8]) {
        let (container, wrapped) =
            encrypt_for_owner(&self.deriver, &owner, plaintext, &file_passphrase(file_id));
        self.content.insert(file_uri(file_id), container);
        self.chain.put_file(RegistryFile {
            id: file_id,
            owner,
            url: file_uri(file_id),
            added_at_block: 1_000_000 + file_id,
        });
        self.chain
            .put_file_key(file_id, self.server_address(&owner), wrapped);
    }

    /// Edit the on-chain permission record.
    pub fn update_permission(&self, edit: impl FnOnce(&mut PermissionRecord)) {
        let mut record = self.chain.permission(self.permission_id).unwrap();
        edit(&mut record);
        self.chain.put_permission(record);
    }

    /// The server address derived for `owner`.
    pub fn server_address(&self, owner: &Address) -> Address {
        self.deriver.derive(owner).unwrap().address
    }

    /// Sign `request` as the scenario application.
    pub fn sign(&self, request: &OperationRequest) -> SignedRequest {
        SignedRequest::sign(request, &self.application).unwrap()
    }

    /// A signed request for the scenario permission declaring its operation.
    pub fn request(&self) -> SignedRequest {
        self.sign(&OperationRequest::new(self.permission_id).with_operation(SCENARIO_OPERATION))
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

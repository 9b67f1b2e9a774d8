//! Permission resolution against the mock chain and in-memory content.

use personal_server_chain::ChainReader;
use personal_server_core::{Address, AuthorizationError, ErrorKind, GrantDocument};
use personal_server_perms::{FileAuthority, PermissionResolver, PermsError, ResolverConfig};
use personal_server_testkit::{
    file_uri, generators, grant_uri, signer, Scenario, SCENARIO_FILE_ID, SCENARIO_GRANTOR,
    SCENARIO_PERMISSION_ID,
};
use proptest::prelude::*;
use serde_json::json;

const NOW: u64 = 1_750_000_000;

fn resolver(scenario: &Scenario) -> PermissionResolver {
    resolver_with(scenario, ResolverConfig::default())
}

fn resolver_with(scenario: &Scenario, config: ResolverConfig) -> PermissionResolver {
    PermissionResolver::new(
        ChainReader::new(scenario.chain.clone(), Address::ZERO, Address::ZERO),
        scenario.content.clone(),
        scenario.deriver.clone(),
        config,
    )
}

#[tokio::test]
async fn test_scenario_resolves_to_file_records() {
    let scenario = Scenario::new();
    let resolver = resolver(&scenario);
    let requester = scenario.application.address();

    let resolved = resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap();
    assert_eq!(resolved.record.grantor, Address::parse(SCENARIO_GRANTOR).unwrap());
    assert_eq!(resolved.grant.operation, "llm_inference");
    assert_eq!(resolved.file_ids, vec![SCENARIO_FILE_ID]);

    let files = resolver.resolve_files(&resolved).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_id, SCENARIO_FILE_ID);
    assert_eq!(files[0].owner, scenario.grantor);
    assert_eq!(files[0].content_uri, file_uri(SCENARIO_FILE_ID));
    assert!(!files[0].wrapped_key.is_empty());
}

#[tokio::test]
async fn test_mismatched_requester_rejected_before_any_file_access() {
    let scenario = Scenario::new();
    let resolver = resolver(&scenario);
    let stranger = signer(9).address();

    let err = resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &stranger, NOW)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermsError::Unauthorized(AuthorizationError::GranteeMismatch { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert_eq!(scenario.content.fetched(), vec![grant_uri(SCENARIO_PERMISSION_ID)]);
    assert_eq!(scenario.chain.call_count("files"), 0);
    assert_eq!(scenario.chain.call_count("filePermissions"), 0);
}

#[tokio::test]
async fn test_expiry_boundary() {
    let mut scenario = Scenario::new();
    let requester = scenario.application.address();

    let mut grant = scenario.grant.clone();
    grant.expires = Some(NOW + 1);
    scenario.set_grant(grant.clone());
    assert!(resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .is_ok());

    grant.expires = Some(NOW - 1);
    scenario.set_grant(grant.clone());
    let err = resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermsError::Unauthorized(AuthorizationError::Expired { .. })
    ));

    grant.expires = Some(NOW);
    scenario.set_grant(grant);
    assert!(resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .is_err());
}

#[tokio::test]
async fn test_unsupported_operation_checked_before_grantee() {
    let mut scenario = Scenario::new();
    let mut grant = scenario.grant.clone();
    grant.operation = "agent_task".into();
    scenario.set_grant(grant);

    // Even a foreign requester sees the operation failure first.
    let err = resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &signer(9).address(), NOW)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermsError::Unauthorized(AuthorizationError::UnsupportedOperation(ref op)) if op == "agent_task"
    ));

    let config = ResolverConfig::default().with_supported_operations(["llm_inference", "agent_task"]);
    assert!(resolver_with(&scenario, config)
        .resolve_at(SCENARIO_PERMISSION_ID, &scenario.application.address(), NOW)
        .await
        .is_ok());
}

#[tokio::test]
async fn test_missing_and_reverted_permission_is_not_found() {
    let scenario = Scenario::new();
    let resolver = resolver(&scenario);
    let requester = scenario.application.address();

    let err = resolver.resolve_at(404, &requester, NOW).await.unwrap_err();
    assert!(matches!(err, PermsError::PermissionNotFound(404)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    scenario.chain.set_reverting(true);
    let err = resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_inactive_permission_is_unauthorized() {
    let scenario = Scenario::new();
    scenario.update_permission(|record| record.is_active = false);

    let err = resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &scenario.application.address(), NOW)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermsError::Unauthorized(AuthorizationError::PermissionInactive(8))
    ));
    assert!(scenario.content.fetched().is_empty());
}

#[tokio::test]
async fn test_grant_shapes_and_schema_errors() {
    let scenario = Scenario::new();
    let resolver = resolver(&scenario);
    let requester = scenario.application.address();

    scenario.publish_grant_json(json!({
        "typedData": { "message": scenario.grant.to_json() },
        "signature": "0x00",
    }));
    assert!(resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .is_ok());

    scenario.publish_grant_json(json!({
        "grantee": requester.to_checksum(),
        "operation": "llm_inference",
    }));
    let err = resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap_err();
    assert!(matches!(err, PermsError::Grant(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    scenario.content.remove(&grant_uri(SCENARIO_PERMISSION_ID));
    let err = resolver
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_grant_file_list_must_be_covered_on_chain() {
    let mut scenario = Scenario::new();
    let requester = scenario.application.address();
    let mut grant = scenario.grant.clone();
    grant.files = Some(vec![SCENARIO_FILE_ID, 77]);
    scenario.set_grant(grant);

    let err = resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PermsError::Unauthorized(AuthorizationError::FileNotPermitted(77))
    ));
}

#[tokio::test]
async fn test_grant_authority_narrows_to_listed_files() {
    let mut scenario = Scenario::new();
    scenario.add_file(2, b"second file");
    let mut grant = scenario.grant.clone();
    grant.files = Some(vec![2]);
    scenario.set_grant(grant);

    let config = ResolverConfig::default().with_file_authority(FileAuthority::Grant);
    let resolved = resolver_with(&scenario, config)
        .resolve_at(SCENARIO_PERMISSION_ID, &scenario.application.address(), NOW)
        .await
        .unwrap();
    assert_eq!(resolved.file_ids, vec![2]);

    let resolved = resolver(&scenario)
        .resolve_at(SCENARIO_PERMISSION_ID, &scenario.application.address(), NOW)
        .await
        .unwrap();
    assert_eq!(resolved.file_ids, vec![2, SCENARIO_FILE_ID]);
}

#[tokio::test]
async fn test_file_without_granted_key() {
    let scenario = Scenario::new();
    // Registered, but the key is wrapped to the server address of a
    // different owner.
    let other_owner = signer(5).address();
    scenario.add_file_for(3, other_owner, b"x");
    scenario
        .chain
        .put_file(personal_server_chain::RegistryFile {
            id: 3,
            owner: scenario.grantor,
            url: file_uri(3),
            added_at_block: 1,
        });

    let err = resolver(&scenario).file_record(3).await.unwrap_err();
    assert!(matches!(err, PermsError::KeyNotGranted { file_id: 3, .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = resolver(&scenario).file_record(999).await.unwrap_err();
    assert!(matches!(err, PermsError::FileNotFound(999)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_foreign_requester_never_resolves(grantee in generators::address(), requester in generators::address()) {
        prop_assume!(grantee != requester);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut scenario = Scenario::new();
        let mut grant: GrantDocument = scenario.grant.clone();
        grant.grantee = grantee;
        scenario.set_grant(grant);

        let result = runtime.block_on(resolver(&scenario).resolve_at(SCENARIO_PERMISSION_ID, &requester, NOW));
        prop_assert!(
            matches!(
                result,
                Err(PermsError::Unauthorized(AuthorizationError::GranteeMismatch { .. }))
            ),
            "foreign requester was not rejected as a grantee mismatch"
        );
    }
}

use contract_model::crypto::{generate_keypair, sign};
use contract_model::{Clause, Contract, Party, Signature};
use serde_json::json;

fn two_party_contract() -> Contract {
    let parties = vec![
        Party { id: "provider-1".into(), name: "Dr. Rivera".into(), kind: "provider".into(), metadata: json!({}) },
        Party { id: "patient-1".into(), name: "J. Patient".into(), kind: "patient".into(), metadata: json!({}) },
    ];
    let clauses = vec![Clause {
        id: "c1".into(),
        title: "Data sharing".into(),
        content: "Provider may share records with patient's insurer.".into(),
        clause_type: "data_sharing".into(),
        metadata: json!({}),
    }];
    Contract::new("Care coordination".into(), "desc".into(), clauses, parties, "admin".into(), None, json!({}), vec![])
        .unwrap()
}

#[test]
fn full_signature_round_trip_across_two_independent_keys() {
    let contract = two_party_contract();

    let (provider_pk, provider_sk) = generate_keypair();
    let (patient_pk, patient_sk) = generate_keypair();

    let provider_msg = Signature::signing_message(&contract.id, &contract.content_hash, "provider-1", "provider");
    let provider_sig = Signature {
        signer_id: "provider-1".into(),
        signer_type: "provider".into(),
        signature: sign(&provider_sk, provider_msg.as_bytes()).unwrap(),
        public_key: provider_pk,
        timestamp: chrono::Utc::now(),
        metadata: json!({}),
    };
    assert!(contract.verify_and_stage_signature(&provider_sig).is_ok());

    let patient_msg = Signature::signing_message(&contract.id, &contract.content_hash, "patient-1", "patient");
    let patient_sig = Signature {
        signer_id: "patient-1".into(),
        signer_type: "patient".into(),
        signature: sign(&patient_sk, patient_msg.as_bytes()).unwrap(),
        public_key: patient_pk,
        timestamp: chrono::Utc::now(),
        metadata: json!({}),
    };
    assert!(contract.verify_and_stage_signature(&patient_sig).is_ok());

    let mut signed = contract;
    signed.signatures.push(provider_sig);
    signed.signatures.push(patient_sig);
    assert!(signed.is_fully_signed());
}

#[test]
fn a_signature_from_the_wrong_key_fails_verification() {
    let contract = two_party_contract();
    let (provider_pk, _provider_sk) = generate_keypair();
    let (_other_pk, other_sk) = generate_keypair();

    let msg = Signature::signing_message(&contract.id, &contract.content_hash, "provider-1", "provider");
    let bad_sig = Signature {
        signer_id: "provider-1".into(),
        signer_type: "provider".into(),
        signature: sign(&other_sk, msg.as_bytes()).unwrap(),
        public_key: provider_pk,
        timestamp: chrono::Utc::now(),
        metadata: json!({}),
    };
    assert!(contract.verify_and_stage_signature(&bad_sig).is_err());
}

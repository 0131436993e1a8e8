//! Ed25519 signing primitives: `ed25519-dalek` v2 with base64-encoded
//! keys and signatures.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

use crate::error::ContractModelError;

/// Generate a fresh Ed25519 keypair, returning `(public_key_b64, private_key_b64)`.
pub fn generate_keypair() -> (String, String) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    (
        B64.encode(verifying_key.to_bytes()),
        B64.encode(signing_key.to_bytes()),
    )
}

/// Sign `msg` with a base64-encoded Ed25519 private key, returning a
/// base64-encoded signature.
pub fn sign(priv_b64: &str, msg: &[u8]) -> Result<String, ContractModelError> {
    let bytes = B64
        .decode(priv_b64)
        .map_err(|e| ContractModelError::CryptoDecode(e.to_string()))?;
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ContractModelError::CryptoDecode("private key must be 32 bytes".into()))?;
    let signing_key = SigningKey::from_bytes(&key_bytes);
    let sig: Signature = signing_key.sign(msg);
    Ok(B64.encode(sig.to_bytes()))
}

/// Verify `sig_b64` over `msg` under the base64-encoded public key.
///
/// Never panics or propagates an error: any decode or signature failure is
/// reported as `false`.
pub fn verify(pub_b64: &str, msg: &[u8], sig_b64: &str) -> bool {
    let Ok(pub_bytes) = B64.decode(pub_b64) else {
        return false;
    };
    let Ok(pub_bytes): Result<[u8; 32], _> = pub_bytes.try_into() else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&pub_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = B64.decode(sig_b64) else {
        return false;
    };
    let Ok(sig_bytes): Result<[u8; 64], _> = sig_bytes.try_into() else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(msg, &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_sign_verify() {
        let (pk, sk) = generate_keypair();
        let msg = b"contract:hash:signer:provider";
        let sig = sign(&sk, msg).unwrap();
        assert!(verify(&pk, msg, &sig));
    }

    #[test]
    fn tampered_message_fails() {
        let (pk, sk) = generate_keypair();
        let sig = sign(&sk, b"hello").unwrap();
        assert!(!verify(&pk, b"hellp", &sig));
    }

    #[test]
    fn tampered_signature_fails() {
        let (pk, sk) = generate_keypair();
        let mut sig = sign(&sk, b"hello").unwrap();
        sig.replace_range(0..1, if sig.starts_with('A') { "B" } else { "A" });
        assert!(!verify(&pk, b"hello", &sig));
    }

    #[test]
    fn garbage_inputs_never_panic() {
        assert!(!verify("not-base64!!", b"x", "also-not-base64"));
        assert!(!verify("", b"x", ""));
    }
}

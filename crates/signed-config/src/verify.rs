//! Payload signature verification.
//!
//! ECDSA over P-256 with SHA-256. Public keys arrive base64-encoded either as
//! a raw SEC1 point (X9.63, what mobile key stores export) or as SPKI DER.
//! Signatures are base64 of ASN.1 DER (X9.62) or of the fixed 64-byte `r || s`
//! form.
//!
//! Every failure mode collapses to `false`: a bad key, a bad encoding and a
//! tampered payload are equally untrusted.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

/// Verification primitive used by the config cache.
pub trait SignatureVerifier: Send + Sync {
    /// Check `signature` (base64) over `message` with `public_key` (base64).
    fn verify(&self, signature: &str, message: &[u8], public_key: &str) -> bool;
}

/// ECDSA P-256 / SHA-256 verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaP256Verifier;

impl SignatureVerifier for EcdsaP256Verifier {
    fn verify(&self, signature: &str, message: &[u8], public_key: &str) -> bool {
        verify_signature(signature, message, public_key)
    }
}

/// Verify a base64 detached signature over `message`.
pub fn verify_signature(signature_b64: &str, message: &[u8], public_key_b64: &str) -> bool {
    let Some(key) = decode_verifying_key(public_key_b64) else {
        return false;
    };
    let Some(signature) = decode_signature(signature_b64) else {
        return false;
    };

    key.verify(message, &signature).is_ok()
}

fn decode_verifying_key(b64: &str) -> Option<VerifyingKey> {
    let bytes = BASE64.decode(b64.trim()).ok()?;

    VerifyingKey::from_sec1_bytes(&bytes)
        .ok()
        .or_else(|| VerifyingKey::from_public_key_der(&bytes).ok())
}

fn decode_signature(b64: &str) -> Option<Signature> {
    let bytes = BASE64.decode(b64.trim()).ok()?;

    Signature::from_der(&bytes)
        .or_else(|_| Signature::from_slice(&bytes))
        .ok()
}

#[cfg(test)]
pub(crate) mod test_keys {
    //! Key material helpers shared by the crate's tests.

    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};

    pub(crate) struct TestKey {
        signing_key: SigningKey,
    }

    impl TestKey {
        pub(crate) fn generate() -> Self {
            Self {
                signing_key: SigningKey::random(&mut rand::rngs::OsRng),
            }
        }

        /// Base64 uncompressed SEC1 point.
        pub(crate) fn public_key_b64(&self) -> String {
            let point = self.signing_key.verifying_key().to_encoded_point(false);
            BASE64.encode(point.as_bytes())
        }

        /// Base64 DER signature.
        pub(crate) fn sign_b64(&self, message: &[u8]) -> String {
            let signature: Signature = self.signing_key.sign(message);
            BASE64.encode(signature.to_der().as_bytes())
        }

        pub(crate) fn sign_raw(&self, message: &[u8]) -> Vec<u8> {
            let signature: Signature = self.signing_key.sign(message);
            signature.to_der().as_bytes().to_vec()
        }

        pub(crate) fn signing_key(&self) -> &SigningKey {
            &self.signing_key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_keys::TestKey;
    use super::*;
    use p256::ecdsa::signature::Signer;
    use p256::pkcs8::EncodePublicKey;
    use proptest::prelude::*;

    const MESSAGE: &[u8] = br#"{"body":{"foo":"bar"},"keyId":"K1"}"#;

    #[test]
    fn test_valid_signature() {
        let key = TestKey::generate();
        let sig = key.sign_b64(MESSAGE);
        assert!(verify_signature(&sig, MESSAGE, &key.public_key_b64()));
        assert!(EcdsaP256Verifier.verify(&sig, MESSAGE, &key.public_key_b64()));
    }

    #[test]
    fn test_wrong_key() {
        let key = TestKey::generate();
        let other = TestKey::generate();
        let sig = key.sign_b64(MESSAGE);
        assert!(!verify_signature(&sig, MESSAGE, &other.public_key_b64()));
    }

    #[test]
    fn test_spki_key_and_fixed_size_signature() {
        let key = TestKey::generate();
        let spki = key
            .signing_key()
            .verifying_key()
            .to_public_key_der()
            .unwrap();
        let spki_b64 = BASE64.encode(spki.as_bytes());

        let signature: Signature = key.signing_key().sign(MESSAGE);
        let fixed_b64 = BASE64.encode(signature.to_bytes());

        assert!(verify_signature(&fixed_b64, MESSAGE, &spki_b64));
    }

    #[test]
    fn test_garbage_inputs_are_false() {
        let key = TestKey::generate();
        let sig = key.sign_b64(MESSAGE);

        assert!(!verify_signature("not base64!!", MESSAGE, &key.public_key_b64()));
        assert!(!verify_signature(&sig, MESSAGE, "not base64!!"));
        assert!(!verify_signature(&sig, MESSAGE, &BASE64.encode([4u8; 65])));
        assert!(!verify_signature("", MESSAGE, &key.public_key_b64()));
        assert!(!verify_signature(&BASE64.encode([0u8; 64]), MESSAGE, &key.public_key_b64()));
    }

    #[test]
    fn test_trailing_newline_changes_message() {
        let key = TestKey::generate();
        let sig = key.sign_b64(MESSAGE);
        let mut with_newline = MESSAGE.to_vec();
        with_newline.push(b'\n');
        assert!(!verify_signature(&sig, &with_newline, &key.public_key_b64()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_flipped_message_byte_fails(
            message in proptest::collection::vec(any::<u8>(), 1..256),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let key = TestKey::generate();
            let sig = key.sign_b64(&message);
            prop_assert!(verify_signature(&sig, &message, &key.public_key_b64()));

            let mut tampered = message.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= mask;
            prop_assert!(!verify_signature(&sig, &tampered, &key.public_key_b64()));
        }

        #[test]
        fn prop_flipped_signature_byte_fails(
            message in proptest::collection::vec(any::<u8>(), 0..256),
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let key = TestKey::generate();
            let mut sig = key.sign_raw(&message);
            let i = index.index(sig.len());
            sig[i] ^= mask;
            prop_assert!(!verify_signature(&BASE64.encode(&sig), &message, &key.public_key_b64()));
        }
    }
}

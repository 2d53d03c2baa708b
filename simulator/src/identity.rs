//! Device credentials: key generation and request signing.
//!
//! Keys are Ed25519, stored as PKCS#8 (private) and SPKI (public) PEM so the
//! backend can read the public key straight out of an auth request.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use models::device::KeyMaterial;
use rand::rngs::OsRng;

pub fn generate_keypair() -> Result<KeyMaterial> {
    let signing_key = SigningKey::generate(&mut OsRng);

    let private_key = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|err| anyhow!("Failed to encode private key: {err}"))?;
    let public_key = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| anyhow!("Failed to encode public key: {err}"))?;

    Ok(KeyMaterial {
        private_key: private_key.to_string(),
        public_key,
    })
}

/// Signs `payload` and returns the base64 encoded signature.
pub fn sign(keys: &KeyMaterial, payload: &[u8]) -> Result<String> {
    let signing_key = SigningKey::from_pkcs8_pem(&keys.private_key)
        .map_err(|err| anyhow!("Failed to load private key: {err}"))?;
    let signature = signing_key.sign(payload);
    Ok(STANDARD.encode(signature.to_bytes()))
}

pub fn verify(public_key_pem: &str, payload: &[u8], signature_b64: &str) -> Result<bool> {
    let verifying_key = VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|err| anyhow!("Failed to load public key: {err}"))?;
    let raw = STANDARD
        .decode(signature_b64)
        .context("Signature is not valid base64")?;
    let signature = Signature::from_slice(&raw).context("Signature has the wrong length")?;
    Ok(verifying_key.verify(payload, &signature).is_ok())
}

//! Secure key & certificate storage.
//!
//! A [`SecureKeyStore`] is process-wide and keyed by fabric id. It generates
//! the fabric's operational key pair, keeps the certificate chain issued for
//! it, and performs ECDSA P-256 / SHA-256 signatures on request. The private
//! key is never handed out: callers receive an `Arc<dyn KeypairSigner>`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::CryptoError;

/// Signing capability bound to one fabric key pair.
pub trait KeypairSigner: Send + Sync {
    /// Uncompressed SEC1 public key (65 bytes).
    fn public_key(&self) -> Vec<u8>;

    /// ECDSA over SHA-256. Returns the raw `r || s` signature (64 bytes).
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// DER certificates making up a fabric's chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
    pub root_certificate: Vec<u8>,
    pub intermediate_certificate: Option<Vec<u8>>,
    /// The controller's own operational certificate, once issued.
    pub operational_certificate: Option<Vec<u8>>,
}

/// Storage backend for fabric keys and certificates.
///
/// Implementations must be `Send + Sync`; internal synchronization is the
/// implementation's responsibility.
pub trait SecureKeyStore: Send + Sync + 'static {
    /// Generate a fresh key pair for the fabric and return its public key.
    fn generate_keypair(&self, fabric_id: u64) -> Result<Vec<u8>, CryptoError>;

    /// Signing handle for the fabric's key pair.
    fn signer(&self, fabric_id: u64) -> Result<Arc<dyn KeypairSigner>, CryptoError>;

    fn store_certificate_chain(
        &self,
        fabric_id: u64,
        chain: CertificateChain,
    ) -> Result<(), CryptoError>;

    fn certificate_chain(&self, fabric_id: u64) -> Result<CertificateChain, CryptoError>;
}

/// Verify a raw `r || s` signature against an uncompressed SEC1 public key.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

struct P256Signer {
    key: SigningKey,
}

impl KeypairSigner for P256Signer {
    fn public_key(&self) -> Vec<u8> {
        VerifyingKey::from(&self.key)
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let signature: Signature = self
            .key
            .try_sign(message)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// In-memory key store for development and testing.
///
/// Keys live in process memory and are lost on restart. A platform build
/// would back this trait with a hardware keystore.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<u64, Arc<P256Signer>>>,
    chains: RwLock<HashMap<u64, CertificateChain>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureKeyStore for MemoryKeyStore {
    fn generate_keypair(&self, fabric_id: u64) -> Result<Vec<u8>, CryptoError> {
        let mut keys = self
            .keys
            .write()
            .map_err(|e| CryptoError::Lock(e.to_string()))?;
        if keys.contains_key(&fabric_id) {
            return Err(CryptoError::KeyAlreadyExists(fabric_id));
        }
        let signer = P256Signer {
            key: SigningKey::random(&mut rand::rngs::OsRng),
        };
        let public_key = signer.public_key();
        keys.insert(fabric_id, Arc::new(signer));
        Ok(public_key)
    }

    fn signer(&self, fabric_id: u64) -> Result<Arc<dyn KeypairSigner>, CryptoError> {
        let keys = self
            .keys
            .read()
            .map_err(|e| CryptoError::Lock(e.to_string()))?;
        let signer: Arc<dyn KeypairSigner> = keys
            .get(&fabric_id)
            .cloned()
            .ok_or(CryptoError::KeyNotFound(fabric_id))?;
        Ok(signer)
    }

    fn store_certificate_chain(
        &self,
        fabric_id: u64,
        chain: CertificateChain,
    ) -> Result<(), CryptoError> {
        self.chains
            .write()
            .map_err(|e| CryptoError::Lock(e.to_string()))?
            .insert(fabric_id, chain);
        Ok(())
    }

    fn certificate_chain(&self, fabric_id: u64) -> Result<CertificateChain, CryptoError> {
        self.chains
            .read()
            .map_err(|e| CryptoError::Lock(e.to_string()))?
            .get(&fabric_id)
            .cloned()
            .ok_or(CryptoError::ChainNotFound(fabric_id))
    }
}

//! Fabric key material for Matter commissioning.
//!
//! - [`SecureKeyStore`] holds per-fabric signing keys and certificate chains.
//!   Private keys never leave the store; callers only get a [`KeypairSigner`].
//! - [`pem`] wraps and unwraps PEM armor around DER payloads.
//! - [`CategoryId`] builds the 64-bit ACL subject for a fabric category.

mod category;
mod error;
mod keystore;
pub mod pem;

pub use category::{CategoryId, CATEGORY_PREFIX};
pub use error::CryptoError;
pub use keystore::{verify_signature, CertificateChain, KeypairSigner, MemoryKeyStore, SecureKeyStore};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("No key material for fabric {0:#x}")]
    KeyNotFound(u64),
    #[error("No certificate chain for fabric {0:#x}")]
    ChainNotFound(u64),
    #[error("Key material already exists for fabric {0:#x}")]
    KeyAlreadyExists(u64),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Malformed PEM: {0}")]
    MalformedPem(String),
    #[error("Unexpected PEM label: expected {expected}, found {found}")]
    UnexpectedPemLabel { expected: String, found: String },
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid category id code: {0}")]
    InvalidCategoryId(String),

    #[error("Key store lock error: {0}")]
    Lock(String),
}

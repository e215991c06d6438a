/// Errors originating from the credential service layer.
///
/// String payloads carry the server's description. Callers should treat
/// them as diagnostic text, not match on their content.
#[derive(Debug, thiserror::Error)]
pub enum CredentialServiceError {
    #[error("Credential service transport error: {0}")]
    Transport(String),
    #[error("Credential service rejected the request: {0}")]
    Rejected(String),
    #[error("Malformed credential service response: {0}")]
    MalformedResponse(String),
    #[error("Unknown request id: {0}")]
    UnknownRequest(String),

    #[error("JSON processing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Crypto(#[from] fabric_crypto::CryptoError),
}

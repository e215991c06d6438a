//! PEM armor for DER payloads (certificates and signing requests).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::CryptoError;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CSR_LABEL: &str = "CERTIFICATE REQUEST";

const LINE_WIDTH: usize = 64;

/// Wrap DER bytes in PEM armor with the given label.
pub fn encode(label: &str, der: &[u8]) -> String {
    let body = BASE64.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in body.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Strip the armor of the first PEM block and return `(label, der)`.
pub fn decode(pem: &str) -> Result<(String, Vec<u8>), CryptoError> {
    let begin = pem
        .find("-----BEGIN ")
        .ok_or_else(|| CryptoError::MalformedPem("missing BEGIN line".to_string()))?;
    let rest = &pem[begin + "-----BEGIN ".len()..];
    let label_end = rest
        .find("-----")
        .ok_or_else(|| CryptoError::MalformedPem("unterminated BEGIN line".to_string()))?;
    let label = rest[..label_end].to_string();
    let rest = &rest[label_end + "-----".len()..];

    let end_marker = format!("-----END {label}-----");
    let body_end = rest
        .find(&end_marker)
        .ok_or_else(|| CryptoError::MalformedPem(format!("missing END line for {label}")))?;

    let body: String = rest[..body_end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.is_empty() {
        return Err(CryptoError::MalformedPem("empty body".to_string()));
    }
    let der = BASE64.decode(body)?;
    Ok((label, der))
}

/// Strip the armor and check the label matches.
pub fn decode_expecting(pem: &str, expected: &str) -> Result<Vec<u8>, CryptoError> {
    let (label, der) = decode(pem)?;
    if label != expected {
        return Err(CryptoError::UnexpectedPemLabel {
            expected: expected.to_string(),
            found: label,
        });
    }
    Ok(der)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_wraps_lines() {
        let der = vec![0xABu8; 100];
        let pem = encode(CSR_LABEL, &der);
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----\n"));
        assert!(pem.ends_with("-----END CERTIFICATE REQUEST-----\n"));
        for line in pem.lines() {
            assert!(line.len() <= LINE_WIDTH || line.starts_with("-----"));
        }
        assert_eq!(decode_expecting(&pem, CSR_LABEL).unwrap(), der);
    }

    #[test]
    fn test_decode_tolerates_crlf() {
        let pem = "-----BEGIN CERTIFICATE-----\r\nAQID\r\nBAU=\r\n-----END CERTIFICATE-----\r\n";
        assert_eq!(
            decode_expecting(pem, CERTIFICATE_LABEL).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn test_decode_rejects_wrong_label_and_garbage() {
        let pem = encode(CSR_LABEL, &[1, 2, 3]);
        assert!(matches!(
            decode_expecting(&pem, CERTIFICATE_LABEL),
            Err(CryptoError::UnexpectedPemLabel { .. })
        ));
        assert!(matches!(decode("no armor"), Err(CryptoError::MalformedPem(_))));
        assert!(matches!(
            decode("-----BEGIN CERTIFICATE-----\n!!!!\n-----END CERTIFICATE-----"),
            Err(CryptoError::Base64(_))
        ));
        assert!(matches!(
            decode("-----BEGIN CERTIFICATE-----\nAQID\n"),
            Err(CryptoError::MalformedPem(_))
        ));
    }
}

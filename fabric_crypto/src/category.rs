//! Fabric category identifiers used as ACL subjects.

use std::fmt::Display;

use crate::CryptoError;

/// Fixed prefix that places a subject in the CASE authenticated tag range.
pub const CATEGORY_PREFIX: &str = "FFFFFFFD";

/// A category id such as `FFFFFFFD00010001`.
///
/// The code is the 8 hex digit privilege code handed out by the cloud
/// service; together with [`CATEGORY_PREFIX`] it forms a 64-bit subject id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CategoryId(u64);

impl CategoryId {
    /// Build a category id from its 8 hex digit code.
    pub fn from_code(code: &str) -> Result<Self, CryptoError> {
        let code = code.trim();
        if code.len() != 8 || !code.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CryptoError::InvalidCategoryId(code.to_string()));
        }
        let subject = u64::from_str_radix(&format!("{CATEGORY_PREFIX}{code}"), 16)
            .map_err(|_| CryptoError::InvalidCategoryId(code.to_string()))?;
        Ok(Self(subject))
    }

    /// Wrap an already formed subject id. The upper 32 bits must carry the prefix.
    pub fn from_subject(subject: u64) -> Result<Self, CryptoError> {
        if subject >> 32 != 0xFFFF_FFFD {
            return Err(CryptoError::InvalidCategoryId(format!("{subject:016X}")));
        }
        Ok(Self(subject))
    }

    /// The 64-bit ACL subject.
    pub fn subject(&self) -> u64 {
        self.0
    }

    /// The lower 32 bits (identifier and version).
    pub fn code(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

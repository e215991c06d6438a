//! Decoded TLV values as exchanged with the cluster primitive layer.
//!
//! The primitive layer owns the byte-level TLV codec; the pipeline only sees
//! the decoded element tree and walks it with the accessors below.

use std::fmt::Display;

/// Context tag inside a structure.
pub type Tag = u8;

#[derive(Clone, Debug, PartialEq)]
pub enum TlvValue {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Utf8(String),
    Bytes(Vec<u8>),
    Struct(Vec<(Tag, TlvValue)>),
    List(Vec<TlvValue>),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TlvError {
    #[error("Expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Missing field with tag {0}")]
    MissingField(Tag),
    #[error("Value {value} out of range for {target}")]
    OutOfRange { value: u64, target: &'static str },
}

impl TlvValue {
    pub fn kind(&self) -> &'static str {
        match self {
            TlvValue::Null => "null",
            TlvValue::Bool(_) => "bool",
            TlvValue::UInt(_) => "uint",
            TlvValue::Int(_) => "int",
            TlvValue::Utf8(_) => "utf8",
            TlvValue::Bytes(_) => "bytes",
            TlvValue::Struct(_) => "struct",
            TlvValue::List(_) => "list",
        }
    }

    fn unexpected(&self, expected: &'static str) -> TlvError {
        TlvError::UnexpectedType {
            expected,
            found: self.kind(),
        }
    }

    pub fn as_u64(&self) -> Result<u64, TlvError> {
        match self {
            TlvValue::UInt(v) => Ok(*v),
            TlvValue::Int(v) if *v >= 0 => Ok(*v as u64),
            other => Err(other.unexpected("uint")),
        }
    }

    pub fn as_u32(&self) -> Result<u32, TlvError> {
        let v = self.as_u64()?;
        u32::try_from(v).map_err(|_| TlvError::OutOfRange {
            value: v,
            target: "u32",
        })
    }

    pub fn as_u16(&self) -> Result<u16, TlvError> {
        let v = self.as_u64()?;
        u16::try_from(v).map_err(|_| TlvError::OutOfRange {
            value: v,
            target: "u16",
        })
    }

    pub fn as_u8(&self) -> Result<u8, TlvError> {
        let v = self.as_u64()?;
        u8::try_from(v).map_err(|_| TlvError::OutOfRange {
            value: v,
            target: "u8",
        })
    }

    pub fn as_str(&self) -> Result<&str, TlvError> {
        match self {
            TlvValue::Utf8(s) => Ok(s),
            other => Err(other.unexpected("utf8")),
        }
    }

    pub fn as_list(&self) -> Result<&[TlvValue], TlvError> {
        match self {
            TlvValue::List(items) => Ok(items),
            other => Err(other.unexpected("list")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TlvValue::Null)
    }

    /// Look up a context-tagged field of a structure.
    pub fn field(&self, tag: Tag) -> Result<Option<&TlvValue>, TlvError> {
        match self {
            TlvValue::Struct(fields) => Ok(fields.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)),
            other => Err(other.unexpected("struct")),
        }
    }

    /// Like [`field`](Self::field) but the field must be present.
    pub fn required(&self, tag: Tag) -> Result<&TlvValue, TlvError> {
        self.field(tag)?.ok_or(TlvError::MissingField(tag))
    }

    /// Decode a list of unsigned integers.
    pub fn as_u64_list(&self) -> Result<Vec<u64>, TlvError> {
        self.as_list()?.iter().map(TlvValue::as_u64).collect()
    }

    pub fn empty_struct() -> Self {
        TlvValue::Struct(Vec::new())
    }
}

impl Display for TlvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlvValue::Null => write!(f, "null"),
            TlvValue::Bool(v) => write!(f, "{v}"),
            TlvValue::UInt(v) => write!(f, "{v}"),
            TlvValue::Int(v) => write!(f, "{v}"),
            TlvValue::Utf8(v) => write!(f, "{v:?}"),
            TlvValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            TlvValue::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (tag, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{tag}: {value}")?;
                }
                write!(f, "}}")
            }
            TlvValue::List(items) => {
                write!(f, "[")?;
                for (i, value) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access_and_range_checks() {
        let value = TlvValue::Struct(vec![
            (0, TlvValue::UInt(300)),
            (1, TlvValue::Utf8("plug".to_string())),
        ]);
        assert_eq!(value.required(0).unwrap().as_u16().unwrap(), 300);
        assert!(matches!(
            value.required(0).unwrap().as_u8(),
            Err(TlvError::OutOfRange { value: 300, .. })
        ));
        assert_eq!(value.required(1).unwrap().as_str().unwrap(), "plug");
        assert_eq!(value.field(2).unwrap(), None);
        assert_eq!(value.required(2), Err(TlvError::MissingField(2)));
        assert!(TlvValue::UInt(1).field(0).is_err());
    }

    #[test]
    fn test_display() {
        let value = TlvValue::List(vec![
            TlvValue::UInt(1),
            TlvValue::Struct(vec![(0, TlvValue::Bytes(vec![0xAB]))]),
        ]);
        assert_eq!(value.to_string(), "[1, {0: 0xab}]");
    }
}

use std::cmp::Ordering;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::rc::Rc;


/// The storage class of a [`SqlValue`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SqlType {
    /// The `NULL` value.
    Null,
    /// A 64 bit signed integer.
    Long,
    /// A 64 bit floating point number.
    Double,
    /// A UTF-8 string.
    String,
    /// An opaque binary blob.
    Bytes,
}

impl SqlType {
    /// Retrieve the SQL name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Long => "BIG INT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Bytes => "BYTES",
        }
    }
}


/// A single value as exchanged with the SQL engine.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// The `NULL` value.
    Null,
    /// A 64 bit signed integer.
    Long(i64),
    /// A 64 bit floating point number.
    Double(f64),
    /// A UTF-8 string.
    String(Rc<str>),
    /// An opaque binary blob.
    Bytes(Rc<[u8]>),
}

impl SqlValue {
    /// Retrieve the storage class of this value.
    pub fn sql_type(&self) -> SqlType {
        match self {
            Self::Null => SqlType::Null,
            Self::Long(..) => SqlType::Long,
            Self::Double(..) => SqlType::Double,
            Self::String(..) => SqlType::String,
            Self::Bytes(..) => SqlType::Bytes,
        }
    }

    /// Check whether this value is `NULL`.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Retrieve the value as an integer, if it is one.
    #[inline]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// Retrieve the value as a double, converting integers.
    #[inline]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Long(value) => Some(*value as f64),
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    /// Retrieve the value as a string slice, if it is a string.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Compare two values the way SQLite orders them: `NULL` sorts
    /// before numbers, numbers before strings and strings before blobs.
    /// Integers and doubles compare numerically.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        fn class(value: &SqlValue) -> u8 {
            match value {
                SqlValue::Null => 0,
                SqlValue::Long(..) | SqlValue::Double(..) => 1,
                SqlValue::String(..) => 2,
                SqlValue::Bytes(..) => 3,
            }
        }

        match (self, other) {
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Long(..) | Self::Double(..), Self::Long(..) | Self::Double(..)) => {
                // SANITY: Both values are numeric, as just checked.
                let a = self.as_double().unwrap_or_default();
                let b = other.as_double().unwrap_or_default();
                a.total_cmp(&b)
            }
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            _ => class(self).cmp(&class(other)),
        }
    }
}

impl Display for SqlValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => f.write_str("<null>"),
            Self::Long(value) => write!(f, "{value}"),
            Self::Double(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::Bytes(..) => f.write_str("<bytes>"),
        }
    }
}

impl From<i64> for SqlValue {
    #[inline]
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<u32> for SqlValue {
    #[inline]
    fn from(value: u32) -> Self {
        Self::Long(i64::from(value))
    }
}

/// Unsigned 64 bit values (addresses, offsets) are stored with their
/// bit pattern reinterpreted as signed, matching how trace tables expose
/// them.
impl From<u64> for SqlValue {
    #[inline]
    fn from(value: u64) -> Self {
        Self::Long(value as i64)
    }
}

impl From<f64> for SqlValue {
    #[inline]
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for SqlValue {
    #[inline]
    fn from(value: &str) -> Self {
        Self::String(Rc::from(value))
    }
}

impl From<String> for SqlValue {
    #[inline]
    fn from(value: String) -> Self {
        Self::String(Rc::from(value))
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

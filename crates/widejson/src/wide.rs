use num_bigint::BigInt;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// An arbitrary-precision integer that serializes as a bare JSON number.
///
/// Deserializes from integer tokens that fit into 64 bits, or from strings of
/// digits (which is what [`WideJson::parse`](crate::WideJson::parse) turns
/// declared fields into). Floating-point tokens are rejected rather than
/// silently truncated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WideInt(BigInt);
impl WideInt {
    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }
}
impl From<BigInt> for WideInt {
    fn from(value: BigInt) -> Self {
        Self(value)
    }
}
impl From<i64> for WideInt {
    fn from(value: i64) -> Self {
        Self(BigInt::from(value))
    }
}
impl From<u64> for WideInt {
    fn from(value: u64) -> Self {
        Self(BigInt::from(value))
    }
}
impl From<i128> for WideInt {
    fn from(value: i128) -> Self {
        Self(BigInt::from(value))
    }
}
impl TryFrom<&WideInt> for i64 {
    type Error = Error;
    fn try_from(value: &WideInt) -> Result<Self, Self::Error> {
        i64::try_from(&value.0).map_err(|_| Error::from(ErrorKind::OutOfRange(value.to_string())))
    }
}
impl FromStr for WideInt {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<BigInt>().map(Self).map_err(|_| Error::from(ErrorKind::Syntax))
    }
}
impl Display for WideInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for WideInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // A raw value is copied into the output verbatim by serde_json, which
        // is the only way to write a number it can't represent itself.
        let raw = RawValue::from_string(self.0.to_string()).map_err(ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

struct WideIntVisitor;
impl Visitor<'_> for WideIntVisitor {
    type Value = WideInt;

    fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("an integer, or a string of decimal digits")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(WideInt::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(WideInt::from(v))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Self::Value, E> {
        Ok(WideInt::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse::<BigInt>()
            .map(WideInt)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}
impl<'de> Deserialize<'de> for WideInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(WideIntVisitor)
    }
}

//! Transaction amounts.
//!
//! An amount is any JSON number and is carried exactly as written: `10` stays
//! an integer and `2.5` stays a float, so both hash the way every other node
//! spells them. Sign and range are not checked.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Amount(Repr);

// Negative integers only ever land in `NegInt`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
enum Repr {
    PosInt(u64),
    NegInt(i64),
    Float(f64),
}

impl Amount {
    pub fn is_integer(&self) -> bool {
        !matches!(self.0, Repr::Float(_))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(Repr::PosInt(value))
    }
}

impl From<u32> for Amount {
    fn from(value: u32) -> Self {
        Self::from(u64::from(value))
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        match u64::try_from(value) {
            Ok(value) => Self(Repr::PosInt(value)),
            Err(_) => Self(Repr::NegInt(value)),
        }
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value))
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self(Repr::Float(value))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Repr::PosInt(v) => write!(f, "{v}"),
            Repr::NegInt(v) => write!(f, "{v}"),
            Repr::Float(v) => write!(f, "{v:?}"),
        }
    }
}

// JSON gets a bare number. Binary formats such as bincode cannot describe
// "some number", so they get the tagged form.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !serializer.is_human_readable() {
            return self.0.serialize(serializer);
        }
        match self.0 {
            Repr::PosInt(v) => serializer.serialize_u64(v),
            Repr::NegInt(v) => serializer.serialize_i64(v),
            Repr::Float(v) => serializer.serialize_f64(v),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            Repr::deserialize(deserializer).map(Amount)
        }
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
        Ok(Amount::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
        Ok(Amount::from(value))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Amount, E> {
        Ok(Amount::from(value))
    }
}

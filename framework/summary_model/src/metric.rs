use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The marker written in place of a value that could not be measured.
pub const NOT_AVAILABLE: &str = "N/A";

/// A measured value, or an explicit marker that it was not measured.
///
/// Unavailable data is never substituted with zero. Serializes as the bare value or as the string
/// [NOT_AVAILABLE].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric<T> {
    Value(T),
    NotAvailable,
}

impl<T> Metric<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Metric::Value(v) => Some(v),
            Metric::NotAvailable => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metric<U> {
        match self {
            Metric::Value(v) => Metric::Value(f(v)),
            Metric::NotAvailable => Metric::NotAvailable,
        }
    }
}

impl<T> From<Option<T>> for Metric<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Metric::NotAvailable, Metric::Value)
    }
}

impl<T: fmt::Display> fmt::Display for Metric<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Value(v) => v.fmt(f),
            Metric::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl<T: Serialize> Serialize for Metric<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Value(v) => v.serialize(serializer),
            Metric::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Metric<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Value(T),
            Marker(String),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Value(v) => Ok(Metric::Value(v)),
            Repr::Marker(marker) if marker == NOT_AVAILABLE => Ok(Metric::NotAvailable),
            Repr::Marker(other) => Err(serde::de::Error::custom(format!(
                "expected a value or \"{NOT_AVAILABLE}\", got \"{other}\""
            ))),
        }
    }
}

//! Device events and their property store

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

/// Event parsing errors
#[derive(Error, Debug)]
pub enum EventError {
    #[error("line {line}: expected KEY=VALUE, got `{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("invalid event JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Read access to the properties of a device event
pub trait DeviceEvent {
    /// Look up a single property
    fn property(&self, name: &str) -> Option<&str>;

    /// All properties, in the order they were recorded
    fn properties(&self) -> Vec<(&str, &str)>;
}

/// Ordered property store for a kernel uevent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uevent {
    properties: Vec<(String, String)>,
}

impl Uevent {
    /// Create an event with no properties
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from name/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut event = Self::new();
        for (name, value) in pairs {
            event.insert(name, value);
        }
        event
    }

    /// Parse the kernel `KEY=VALUE` line format (as found in `/sys/.../uevent`)
    pub fn parse_uevent(text: &str) -> Result<Self, EventError> {
        let mut event = Self::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (name, value) = line.split_once('=').ok_or_else(|| EventError::MalformedLine {
                line: idx + 1,
                text: line.to_string(),
            })?;
            event.insert(name, value);
        }

        Ok(event)
    }

    /// Parse a flat JSON object of string values
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Set a property, replacing an existing value in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Check if the event has no properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// Keys are taken in document order
impl<'de> Deserialize<'de> for Uevent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct UeventVisitor;

        impl<'de> Visitor<'de> for UeventVisitor {
            type Value = Uevent;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of property names to string values")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut event = Uevent::new();
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    event.insert(name, value);
                }
                Ok(event)
            }
        }

        deserializer.deserialize_map(UeventVisitor)
    }
}

impl DeviceEvent for Uevent {
    fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn properties(&self) -> Vec<(&str, &str)> {
        self.properties
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
            .collect()
    }
}

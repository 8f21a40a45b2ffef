use serde::{Deserialize, Serialize};

use super::property::Value;

/// Anything that can seed one row of a [`System`](crate::System).
pub trait AtomRecord {
    fn atype(&self) -> i64;
    fn pos(&self) -> [f64; 3];
    /// Extra named properties, in the order they should be registered.
    fn properties(&self) -> Box<dyn Iterator<Item = (&str, &Value)> + '_>;
}

/// Standalone atom: type, position and any number of extra properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub atype: i64,
    pub pos: [f64; 3],
    #[serde(default)]
    pub properties: Vec<(String, Value)>,
}

impl Atom {
    pub fn new(atype: i64, pos: [f64; 3]) -> Self {
        Self {
            atype,
            pos,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_property(name, value);
        self
    }

    /// Inserts or replaces a property, keeping first-insertion order.
    pub fn set_property(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.properties.push((name.to_string(), value)),
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl AtomRecord for Atom {
    fn atype(&self) -> i64 {
        self.atype
    }

    fn pos(&self) -> [f64; 3] {
        self.pos
    }

    fn properties(&self) -> Box<dyn Iterator<Item = (&str, &Value)> + '_> {
        Box::new(self.properties.iter().map(|(n, v)| (n.as_str(), v)))
    }
}

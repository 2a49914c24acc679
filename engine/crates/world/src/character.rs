use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::PlayerId;

/// Durable character document.
///
/// `extensions` holds plugin-owned data keyed by plugin name. Values stay
/// undecoded until the owning plugin asks for its concrete type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub credential: String,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

impl Character {
    pub fn new(name: impl Into<String>, credential: impl Into<String>, max_hp: i32) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
            hp: max_hp,
            max_hp,
            extensions: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        PlayerId::new(&self.name)
    }

    pub fn has_extension(&self, key: &str) -> bool {
        self.extensions.contains_key(key)
    }

    /// Decode a plugin's data. `Ok(None)` when the plugin has not stored anything.
    pub fn extension<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.extensions
            .get(key)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    pub fn set_extension<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), serde_json::Error> {
        let encoded = serde_json::to_value(value)?;
        self.extensions.insert(key.to_string(), encoded);
        Ok(())
    }

    /// Prompt text, e.g. `[42/50HP] > `.
    pub fn prompt(&self) -> String {
        format!("[{}/{}HP] > ", self.hp, self.max_hp)
    }
}

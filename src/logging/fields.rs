//! Caller-supplied key/value annotations.

use serde::Serialize;
use serde_json::{Map, Value};

/// Substituted for values that cannot be serialized.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// An open mapping of field names to JSON values.
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Map<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<V: Serialize>(mut self, key: impl Into<String>, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing any previous value for the key.
    ///
    /// A value whose `Serialize` impl fails is stored as [`UNSERIALIZABLE`].
    pub fn insert<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        let value = serde_json::to_value(value)
            .unwrap_or_else(|_| Value::String(UNSERIALIZABLE.to_string()));
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every entry into `target`, overwriting existing keys.
    pub(crate) fn merge_into(&self, target: &mut Map<String, Value>) {
        for (k, v) in &self.0 {
            target.insert(k.clone(), v.clone());
        }
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Serialize> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// Render a field value as a plain string.
///
/// Strings are taken verbatim; everything else uses its JSON text.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build [`Fields`] from `key => value` pairs.
///
/// ```
/// use service_telemetry::fields;
///
/// let f = fields! { "user_id" => 42, "path" => "/work" };
/// assert_eq!(f.len(), 2);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::logging::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut fields = $crate::logging::Fields::new();
        $( fields.insert($key, $value); )+
        fields
    }};
}

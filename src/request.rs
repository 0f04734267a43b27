//! Render inputs: where the template comes from and what to fill it with.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// The PDF template to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Downloaded once, at the start of the request.
    Url(String),
    /// Template bytes supplied by the caller.
    Bytes(Vec<u8>),
}

impl TemplateSource {
    /// Short description for logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            TemplateSource::Url(url) => format!("'{}'", url),
            TemplateSource::Bytes(b) => format!("inline payload ({} bytes)", b.len()),
        }
    }
}

/// Placeholder values for one request, in insertion order.
///
/// Keys are unique: inserting an existing key replaces its value and keeps
/// its original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    entries: Vec<(String, String)>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Builder-style [`PropertySet::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertySet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = PropertySet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl Serialize for PropertySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Everything one render needs.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: TemplateSource,
    pub properties: PropertySet,
}

impl RenderRequest {
    pub fn new(source: TemplateSource, properties: PropertySet) -> Self {
        Self { source, properties }
    }
}

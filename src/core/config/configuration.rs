use crate::core::error::{FrameworkError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One configuration section: a name plus an ordered list of key/value pairs.
///
/// Values are kept as text and converted on access, so a module decides the
/// type of each key when it reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    name: String,
    file_path: Option<PathBuf>,
    entries: Vec<(String, String)>,
}

impl Configuration {
    /// Create an empty section
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            file_path: None,
            entries: Vec::new(),
        }
    }

    /// Create an empty section that remembers the file it was read from
    pub fn with_file(name: &str, file_path: Option<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            file_path,
            entries: Vec::new(),
        }
    }

    /// Section name (the module type for module sections, empty for the header)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Check whether a key is set
    pub fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Number of keys in this section
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the raw key/value pairs in file order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw text of a key, quotes included
    pub fn text(&self, key: &str) -> Result<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| FrameworkError::MissingKey {
                section: self.name.clone(),
                key: key.to_string(),
            })
    }

    /// Read a key and convert it to `T`
    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.text(key)?;
        self.parse_value(key, unquote(text))
    }

    /// Read a key, falling back to `default` when the key is not set
    pub fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        if self.has(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// Read a list value; elements are separated by whitespace or commas,
    /// quoted elements are kept together
    pub fn get_array<T>(&self, key: &str) -> Result<Vec<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        let text = self.text(key)?;
        split_array(text)
            .into_iter()
            .map(|element| self.parse_value(key, &element))
            .collect()
    }

    /// Read a path; relative paths are resolved against the directory of the
    /// file this section came from
    pub fn get_path(&self, key: &str) -> Result<PathBuf> {
        let raw: String = self.get(key)?;
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            return Ok(path);
        }
        match self.file_path.as_ref().and_then(|file| file.parent()) {
            Some(dir) => Ok(dir.join(path)),
            None => Ok(path),
        }
    }

    /// Set a key, replacing an existing value
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Set a key only when it has no value yet
    pub fn set_default(&mut self, key: &str, value: impl ToString) {
        if !self.has(key) {
            self.entries.push((key.to_string(), value.to_string()));
        }
    }

    /// Copy over all keys of `other` that are not set here
    pub fn merge(&mut self, other: &Configuration) {
        for (key, value) in &other.entries {
            self.set_default(key, value);
        }
    }

    /// Error reporting that the value of `key` is not acceptable
    pub fn invalid_value(&self, key: &str, reason: impl Into<String>) -> FrameworkError {
        FrameworkError::InvalidValue {
            section: self.name.clone(),
            key: key.to_string(),
            value: self.text(key).unwrap_or_default().to_string(),
            reason: reason.into(),
        }
    }

    fn parse_value<T>(&self, key: &str, text: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        text.parse::<T>().map_err(|e| FrameworkError::InvalidValue {
            section: self.name.clone(),
            key: key.to_string(),
            value: text.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Strip one pair of matching surrounding quotes
fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn split_array(text: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch.is_whitespace() || ch == ',' => {
                if !current.is_empty() {
                    elements.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }
    if !current.is_empty() {
        elements.push(current);
    }
    elements
}

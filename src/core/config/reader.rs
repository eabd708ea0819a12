use super::configuration::Configuration;
use crate::core::error::{FrameworkError, Result};
use log::trace;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Parser for the sectioned `key = value` configuration format.
///
/// ```text
/// # global settings
/// number_of_events = 10
///
/// [DepositionGenerator]
/// mean_charges = 40
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigReader {
    sections: Vec<Configuration>,
}

impl ConfigReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = Self::new();
        reader.add(std::io::BufReader::new(file), Some(path.to_path_buf()))?;
        Ok(reader)
    }

    /// Parse a configuration from a string (sections have no file path)
    pub fn from_text(text: &str) -> Result<Self> {
        let mut reader = Self::new();
        reader.add(text.as_bytes(), None)?;
        Ok(reader)
    }

    /// Parse a stream and append its sections
    pub fn add<R: BufRead>(&mut self, stream: R, file_path: Option<PathBuf>) -> Result<()> {
        let file_name = file_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        trace!("Parsing configuration file '{}'", file_name);

        let parse_error = |line: usize| FrameworkError::ConfigParse {
            file: file_name.clone(),
            line,
        };

        let mut current = Configuration::with_file("", file_path.clone());
        for (index, line) in stream.lines().enumerate() {
            let line_number = index + 1;
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name_len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                let (name, remain) = rest.split_at(name_len);
                let remain = remain.strip_prefix(']').ok_or_else(|| parse_error(line_number))?;
                let remain = remain.trim();
                if !(remain.is_empty() || remain.starts_with('#')) {
                    return Err(parse_error(line_number));
                }

                // empty unnamed sections are dropped
                if !current.name().is_empty() || !current.is_empty() {
                    self.sections.push(current);
                }
                current = Configuration::with_file(name, file_path.clone());
            } else if line.starts_with(|c: char| c.is_ascii_alphabetic()) {
                let (key, value) = line.split_once('=').ok_or_else(|| parse_error(line_number))?;
                let key = key.trim();
                let value = strip_comment(value).trim();

                let valid_key = key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid_key || value.is_empty() {
                    return Err(parse_error(line_number));
                }
                current.set(key, value);
            } else {
                return Err(parse_error(line_number));
            }
        }
        self.sections.push(current);
        Ok(())
    }

    /// All sections in file order, including unnamed header sections
    pub fn configurations(&self) -> &[Configuration] {
        &self.sections
    }

    /// Sections with the given name (case-insensitive), in file order
    pub fn configurations_named(&self, name: &str) -> Vec<&Configuration> {
        self.sections
            .iter()
            .filter(|c| c.name().eq_ignore_ascii_case(name))
            .collect()
    }

    pub fn has_configuration(&self, name: &str) -> bool {
        self.sections.iter().any(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// All unnamed sections merged into one; the first value of a key wins
    pub fn header(&self) -> Configuration {
        let mut header = Configuration::with_file(
            "",
            self.sections
                .first()
                .and_then(|c| c.file_path())
                .map(Path::to_path_buf),
        );
        for section in self.sections.iter().filter(|c| c.name().is_empty()) {
            header.merge(section);
        }
        header
    }

    /// Named sections only, in file order
    pub fn module_sections(&self) -> impl Iterator<Item = &Configuration> {
        self.sections.iter().filter(|c| !c.name().is_empty())
    }
}

/// Cut a trailing `#` comment that is not inside quotes
fn strip_comment(value: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, ch) in value.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == '#' => return &value[..i],
            None => {}
        }
    }
    value
}

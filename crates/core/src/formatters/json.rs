use crate::Result;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs;
use std::path::Path;

/// Configuration for JSON output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonConfig {
    /// Pretty print JSON output
    pub pretty: bool,
    /// Indentation width when pretty printing
    pub indent: usize,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self { pretty: true, indent: 4 }
    }
}

/// Serialise `value` as JSON. Non-ASCII text is written as-is.
pub fn to_json<T: Serialize + ?Sized>(value: &T, config: &JsonConfig) -> Result<String> {
    if !config.pretty {
        return Ok(serde_json::to_string(value)?);
    }

    let indent = " ".repeat(config.indent);
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
    value.serialize(&mut ser)?;
    buf.push(b'\n');

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Serialise `value` with the default config and replace the file at `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    JsonFormatter::default().write(path, value)
}

/// JSON formatter with configurable options
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    config: JsonConfig,
}

impl JsonFormatter {
    pub fn new(config: JsonConfig) -> Self {
        Self { config }
    }

    pub fn convert<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        to_json(value, &self.config)
    }

    /// Replaces the file at `path`, creating missing parent directories.
    pub fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let text = self.convert(value)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }
}

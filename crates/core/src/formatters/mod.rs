pub mod json;

pub use json::{JsonConfig, JsonFormatter, to_json, write_json};

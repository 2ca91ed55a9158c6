//! Builder for config files used in integration tests.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

pub struct ConfigBuilder {
    fields: Map<String, Value>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut fields = Map::new();
        fields.insert("version".to_string(), json!("1.0"));
        Self { fields }
    }

    pub fn version(self, version: &str) -> Self {
        self.set("version", json!(version))
    }

    pub fn inbox(self, path: &str) -> Self {
        self.set("inbox", json!(path))
    }

    pub fn outbox(self, path: &str) -> Self {
        self.set("outbox", json!(path))
    }

    pub fn failed(self, path: &str) -> Self {
        self.set("failed", json!(path))
    }

    pub fn state_dir(self, path: &str) -> Self {
        self.set("state_dir", json!(path))
    }

    pub fn poll_interval_ms(self, ms: u64) -> Self {
        self.set("poll_interval_ms", json!(ms))
    }

    pub fn max_error_len(self, len: usize) -> Self {
        self.set("max_error_len", json!(len))
    }

    pub fn build_json(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.fields.clone()))
            .expect("Failed to encode config")
    }

    fn set(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

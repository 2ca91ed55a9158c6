//! Test harness for isolated agent runs.
//!
//! Every harness owns a temporary directory laid out the way the agent
//! expects (`inbox/`, `outbox/`, `failed/`, `state/`) and a config pointing
//! at it with a short poll interval.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use assert_fs::TempDir;

use intake::worker::Tick;
use intake::{Agent, Config, TransformRegistry};

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config::default_in(temp_dir.path());
        config.poll_interval_ms = 10;
        config
            .ensure_directories()
            .expect("Failed to create layout");

        Self { temp_dir, config }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn open_agent(&self) -> Agent {
        Agent::open(self.config.clone()).expect("Failed to open agent")
    }

    pub fn open_agent_with(&self, registry: TransformRegistry) -> Agent {
        Agent::with_registry(self.config.clone(), registry).expect("Failed to open agent")
    }

    /// Writes a file into the inbox.
    pub fn drop_file(&self, filename: &str, content: &str) -> PathBuf {
        let child = self.temp_dir.child("inbox").child(filename);
        child.write_str(content).expect("Failed to write inbox file");
        child.path().to_path_buf()
    }

    pub fn drop_bytes(&self, filename: &str, content: &[u8]) -> PathBuf {
        let child = self.temp_dir.child("inbox").child(filename);
        child
            .write_binary(content)
            .expect("Failed to write inbox file");
        child.path().to_path_buf()
    }

    /// Runs `cycles` ticks and returns what each did.
    pub fn tick(&self, agent: &mut Agent, cycles: usize) -> Vec<Tick> {
        (0..cycles)
            .map(|_| agent.tick().expect("Cycle failed"))
            .collect()
    }

    pub fn inbox_names(&self) -> Vec<String> {
        list_names(&self.config.inbox)
    }

    pub fn outbox_names(&self) -> Vec<String> {
        list_names(&self.config.outbox)
    }

    pub fn failed_names(&self) -> Vec<String> {
        list_names(&self.config.failed)
    }

    pub fn read_outbox(&self, filename: &str) -> String {
        std::fs::read_to_string(self.config.outbox.join(filename))
            .expect("Failed to read outbox file")
    }

    /// Reads the report written for the source `filename`.
    pub fn read_report(&self, filename: &str) -> serde_json::Value {
        let bytes = std::fs::read(self.config.outbox.join(format!("{}.report.json", filename)))
            .expect("Failed to read report");
        serde_json::from_slice(&bytes).expect("Report is not JSON")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

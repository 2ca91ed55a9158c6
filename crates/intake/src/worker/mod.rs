pub mod agent;
pub mod job;
pub mod processor;
pub mod scanner;
pub mod watcher;

pub use agent::{Agent, Tick};
pub use job::{JobOutcome, JobReport, Report};
pub use processor::Worker;
pub use scanner::{Candidate, InboxScanner};
pub use watcher::{ScanSummary, Watcher};

pub mod progress;
pub mod tracker;

pub use tracker::{MonitorSettings, ProgressMonitor};

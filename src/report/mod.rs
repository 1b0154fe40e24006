//! Report sinks: JSON files on disk and console rendering

pub mod console;
pub mod writer;

pub use writer::ReportWriter;

//! Structured progress reporting.
//!
//! The driver emits events through a sink instead of printing from inside
//! the polling loop, so console output, logging, and tests can each
//! subscribe independently.

use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::pipeline::StageState;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A stage entered a new state.
    StageState { stage: String, state: StageState },
    /// Images registered from the dataset directory.
    Ingested { count: usize },
    /// A manifest annotation was applied to a sample.
    AnnotationApplied { stage: String, sample: String },
    /// A manifest entry had no ingested counterpart and was skipped.
    AnnotationSkipped { stage: String, sample: String },
    /// Emitted between polls while an operation runs.
    TrainingTick {
        stage: String,
        description: String,
        eta: Option<Duration>,
    },
    /// A region mask was applied to a sample.
    MaskApplied { sample: String },
    /// A mask file matched no eligible sample.
    MaskUnmatched { file: String },
    /// The engine rejected a mask; the batch continues.
    MaskFailed { sample: String, message: String },
    /// The runtime workspace was written.
    Exported { path: PathBuf, bytes: u64 },
}

pub trait ProgressSink {
    fn on_event(&self, event: &ProgressEvent);
}

/// Prints progress to stdout, matching the cadence of the original
/// console driver (one line per poll with description and ETA).
pub struct ConsoleSink {
    pub verbose: bool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressSink for ConsoleSink {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::StageState { stage, state } => {
                if self.verbose {
                    println!("[{stage}] {state}");
                }
            }
            ProgressEvent::Ingested { count } => {
                println!("Ingested {count} images");
            }
            ProgressEvent::AnnotationApplied { stage, sample } => {
                if self.verbose {
                    println!("[{stage}] annotated {sample}");
                }
            }
            ProgressEvent::AnnotationSkipped { stage, sample } => {
                println!("[{stage}] no sample for manifest entry '{sample}', skipped");
            }
            ProgressEvent::TrainingTick {
                stage,
                description,
                eta,
            } => match eta {
                Some(eta) => println!("[{stage}] {description} {}s", eta.as_secs()),
                None => println!("[{stage}] {description}"),
            },
            ProgressEvent::MaskApplied { sample } => {
                println!("Add region: {sample}");
            }
            ProgressEvent::MaskUnmatched { file } => {
                if self.verbose {
                    println!("No match for mask file {file}");
                }
            }
            ProgressEvent::MaskFailed { sample, message } => {
                println!("Mask failed for {sample}: {message}");
            }
            ProgressEvent::Exported { path, bytes } => {
                println!("Exported runtime workspace ({bytes} bytes) to {}", path.display());
            }
        }
    }
}

/// Forwards every event over a channel. Receivers can be a UI thread or
/// a test collecting the event stream.
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelSink {
    fn on_event(&self, event: &ProgressEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.sender.send(event.clone());
    }
}

/// Discards all events.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: &ProgressEvent) {}
}

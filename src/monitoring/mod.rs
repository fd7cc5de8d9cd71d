//! Monitoring Module
//!
//! Timing of the steps of a run.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, StepSpan, TimelineEvent};

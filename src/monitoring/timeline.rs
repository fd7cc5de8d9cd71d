//! Execution Timeline
//!
//! Records when each step of a run starts and finishes and renders the
//! result as an ASCII Gantt chart, one row per step in execution order.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// What happened to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Started,
    Completed,
    Failed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Step folder name
    pub step: String,
    pub event_type: EventType,
    /// Wall-clock time of the event
    pub at: DateTime<Local>,
    /// Offset from the start of the timeline
    pub offset: Duration,
}

/// Timing of one step derived from its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpan {
    pub step: String,
    pub start: Duration,
    /// `None` while the step is still running
    pub end: Option<Duration>,
    pub failed: bool,
}

impl StepSpan {
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_sub(self.start))
    }
}

/// Start and finish events of the steps of one run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    started: Instant,
    started_at: DateTime<Local>,
}

/// Width of the chart area in characters.
const CHART_WIDTH: usize = 50;

/// Width of the step name column.
const NAME_WIDTH: usize = 18;

impl ExecutionTimeline {
    /// Creates a timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            started: Instant::now(),
            started_at: Local::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            step: step.into(),
            event_type,
            at: Local::now(),
            offset: self.started.elapsed(),
        });
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Wall-clock start of the timeline.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Per-step spans in the order steps were started.
    pub fn spans(&self) -> Vec<StepSpan> {
        let mut spans: Vec<StepSpan> = Vec::new();
        for event in &self.events {
            match event.event_type {
                EventType::Started => spans.push(StepSpan {
                    step: event.step.clone(),
                    start: event.offset,
                    end: None,
                    failed: false,
                }),
                EventType::Completed | EventType::Failed => {
                    if let Some(span) = spans
                        .iter_mut()
                        .rev()
                        .find(|s| s.step == event.step && s.end.is_none())
                    {
                        span.end = Some(event.offset);
                        span.failed = event.event_type == EventType::Failed;
                    }
                }
            }
        }
        spans
    }

    /// Renders an ASCII Gantt chart. Failed steps are drawn with `x`.
    pub fn gantt_chart(&self) -> String {
        let mut output = format!(
            "\nExecution Timeline (started {}):\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        );

        let total = self.elapsed().as_millis().max(1);
        let scale = CHART_WIDTH as f64 / total as f64;

        for span in self.spans() {
            let Some(duration) = span.duration() else {
                continue;
            };
            let start = span.start.as_millis();
            let offset = (start as f64 * scale) as usize;
            let width = ((duration.as_millis() as f64 * scale) as usize).max(1);
            let mark = if span.failed { "x" } else { "#" };

            output.push_str(&format!(
                "{} |{}{}| ({} ms)\n",
                fit(&span.step, NAME_WIDTH),
                " ".repeat(offset),
                mark.repeat(width),
                duration.as_millis()
            ));
        }

        output.push_str(&format!("\nTotal: {} ms\n", self.elapsed().as_millis()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Pads or shortens a name to exactly `width` characters.
fn fit(name: &str, width: usize) -> String {
    if name.chars().count() <= width {
        format!("{:width$}", name, width = width)
    } else {
        let head: String = name.chars().take(width - 3).collect();
        format!("{}...", head)
    }
}

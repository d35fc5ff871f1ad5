//! Metric declarations for the companion server.
//!
//! Metrics are declared as [`Metric`] constants so names and descriptions
//! live in one place. Nothing is recorded unless the embedding program
//! installs a `metrics` recorder.
//!
//! ```rust
//! use rrpi_server::metrics::{metric_defs, MetricKind};
//!
//! assert_eq!(metric_defs::COMMANDS.kind, MetricKind::Counter);
//! metrics::counter!(metric_defs::COMMANDS.name, "opcode" => "spi_xfer").increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "rrpi.session.commands").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement (optional).
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All metric definitions for the server.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label carrying the command name.
    pub const OPCODE_LABELS: &[&str] = &["opcode"];

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Connections accepted.
    pub const SESSIONS_ACCEPTED: Metric = Metric::counter("rrpi.sessions.accepted")
        .with_description("Client connections accepted")
        .with_unit(Unit::Count);

    /// Sessions currently running.
    pub const SESSIONS_ACTIVE: Metric = Metric::gauge("rrpi.sessions.active")
        .with_description("Client sessions currently running")
        .with_unit(Unit::Count);

    /// Sessions closed because the stream lost framing.
    pub const SESSIONS_DESYNCHRONIZED: Metric = Metric::counter("rrpi.sessions.desynchronized")
        .with_description("Sessions closed after an unknown or reserved opcode")
        .with_unit(Unit::Count);

    // ========================================================================
    // Commands
    // ========================================================================

    /// Commands executed.
    pub const COMMANDS: Metric = Metric::counter("rrpi.commands")
        .with_description("Commands decoded and dispatched")
        .with_unit(Unit::Count)
        .with_labels(OPCODE_LABELS);

    /// Commands whose handler failed.
    pub const COMMAND_ERRORS: Metric = Metric::counter("rrpi.commands.errors")
        .with_description("Commands whose handler failed; a filler reply was sent")
        .with_unit(Unit::Count)
        .with_labels(OPCODE_LABELS);

    /// Frames dropped for an invalid payload.
    pub const MALFORMED_FRAMES: Metric = Metric::counter("rrpi.frames.malformed")
        .with_description("Frames dropped because the payload was invalid")
        .with_unit(Unit::Count);

    /// Handler execution time.
    pub const COMMAND_DURATION: Metric = Metric::histogram("rrpi.commands.duration")
        .with_description("Time spent executing a command")
        .with_unit(Unit::Seconds)
        .with_labels(OPCODE_LABELS);

    // ========================================================================
    // Traffic
    // ========================================================================

    /// Bytes read from clients.
    pub const BYTES_RECEIVED: Metric = Metric::counter("rrpi.bytes.received")
        .with_description("Bytes read from client sockets")
        .with_unit(Unit::Bytes);

    /// Bytes written to clients.
    pub const BYTES_SENT: Metric = Metric::counter("rrpi.bytes.sent")
        .with_description("Reply bytes written to client sockets")
        .with_unit(Unit::Bytes);

    /// All defined metrics.
    pub const ALL: &[&Metric] = &[
        &SESSIONS_ACCEPTED,
        &SESSIONS_ACTIVE,
        &SESSIONS_DESYNCHRONIZED,
        &COMMANDS,
        &COMMAND_ERRORS,
        &MALFORMED_FRAMES,
        &COMMAND_DURATION,
        &BYTES_RECEIVED,
        &BYTES_SENT,
    ];
}

/// Describe every metric to the installed recorder. Call once at startup.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let names: HashSet<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }

    #[test]
    fn test_opcode_labelled_metrics() {
        assert_eq!(metric_defs::COMMANDS.labels, &["opcode"]);
        assert_eq!(metric_defs::COMMAND_DURATION.kind, MetricKind::Histogram);
    }
}

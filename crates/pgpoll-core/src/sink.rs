//! Observation sinks.
//!
//! A sink receives every observation a pass produces. The engine never looks
//! at what the sink does with it: there is no return value, acknowledgement
//! or backpressure.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use chrono::Utc;
use tracing::warn;

/// Tag set of an observation, ordered by key.
pub type Tags = BTreeMap<String, String>;

/// Numeric metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(i) => write!(f, "{}i", i),
            MetricValue::Float(x) => write!(f, "{}", x),
        }
    }
}

/// A single metric data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub metric: String,
    pub value: MetricValue,
    pub tags: Tags,
}

impl Observation {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Receives observations.
pub trait Sink {
    fn add(&mut self, metric: &str, value: MetricValue, tags: &Tags);
}

impl Sink for Vec<Observation> {
    fn add(&mut self, metric: &str, value: MetricValue, tags: &Tags) {
        self.push(Observation {
            metric: metric.to_string(),
            value,
            tags: tags.clone(),
        });
    }
}

/// Writes one line per observation:
///
/// ```text
/// postgresql_xact_commit,db=app,server=host\=db1 value=42i 1700000000000000000
/// ```
///
/// Metric names have `,` and spaces escaped with a backslash; tag keys and
/// values additionally escape `=`. Non-finite floats have no line form and
/// are dropped with a warning, as are observations whose write fails.
pub struct LineSink<W: Write> {
    writer: W,
    prefix: String,
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            prefix: String::new(),
        }
    }

    /// Prepends `prefix` and `_` to every metric name.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn format_line(&self, metric: &str, value: MetricValue, tags: &Tags, timestamp: i64) -> String {
        let mut line = String::new();
        if !self.prefix.is_empty() {
            line.push_str(&escape(&self.prefix, MEASUREMENT_SPECIAL));
            line.push('_');
        }
        line.push_str(&escape(metric, MEASUREMENT_SPECIAL));
        for (key, val) in tags {
            line.push(',');
            line.push_str(&escape(key, TAG_SPECIAL));
            line.push('=');
            line.push_str(&escape(val, TAG_SPECIAL));
        }
        line.push_str(&format!(" value={} {}", value, timestamp));
        line
    }
}

impl<W: Write> Sink for LineSink<W> {
    fn add(&mut self, metric: &str, value: MetricValue, tags: &Tags) {
        if let MetricValue::Float(x) = value
            && !x.is_finite()
        {
            warn!(metric = %metric, value = %x, "dropping non-finite observation");
            return;
        }
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let line = self.format_line(metric, value, tags, timestamp);
        if let Err(e) = writeln!(self.writer, "{}", line) {
            warn!(metric = %metric, error = %e, "failed to write observation");
        }
    }
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const TAG_SPECIAL: &[char] = &[',', '=', ' '];

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

//! Training telemetry parser.
//!
//! The trainer prints free-form text on stdout. Lines shaped like
//! `iter: 1000, loss: 0.0234` carry progress; everything else is plain
//! log output. Parsing is total: a line that does not fit the shape is
//! simply not progress, never an error.

use serde::{Deserialize, Serialize};

/// Marker identifying the iteration field.
const ITERATION_MARKER: &str = "iter";

/// Marker identifying the loss field.
const LOSS_MARKER: &str = "loss";

/// Separator between fields on a progress line.
const FIELD_DELIMITER: char = ',';

/// Separator between a field label and its value.
const VALUE_DELIMITER: char = ':';

/// One progress sample extracted from a trainer output line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    pub iteration: u64,
    pub loss: f64,
}

/// Extract iteration and loss from a trainer output line.
///
/// Returns `None` unless the line contains both markers and every field
/// carrying a marker has a parsable value after its first `:`. When a
/// marker appears in several fields the last one wins.
pub fn parse_progress_line(line: &str) -> Option<TrainingProgress> {
    if !line.contains(ITERATION_MARKER) || !line.contains(LOSS_MARKER) {
        return None;
    }

    let mut iteration = None;
    let mut loss = None;

    for part in line.split(FIELD_DELIMITER).map(str::trim) {
        if part.contains(ITERATION_MARKER) {
            iteration = Some(field_value(part)?.parse::<u64>().ok()?);
        } else if part.contains(LOSS_MARKER) {
            let value = field_value(part)?.parse::<f64>().ok()?;
            if !value.is_finite() {
                return None;
            }
            loss = Some(value);
        }
    }

    Some(TrainingProgress {
        iteration: iteration?,
        loss: loss?,
    })
}

/// Text following the first `:` of a field, trimmed.
fn field_value(part: &str) -> Option<&str> {
    part.split_once(VALUE_DELIMITER).map(|(_, value)| value.trim())
}

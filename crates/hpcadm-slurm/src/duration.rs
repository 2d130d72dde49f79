//! Parsing of SLURM accounting duration strings.

use crate::Result;
use hpcadm_core::Error;

/// Parses a SLURM duration (`DD-HH:MM:SS`, `HH:MM:SS`, or `MM:SS`, with
/// optional fractional seconds) into whole seconds, rounding the
/// fractional part.
///
/// # Errors
///
/// Returns [`Error::ParseError`] for anything that does not match the
/// accounting duration formats.
pub fn parse_duration(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let malformed = || Error::ParseError(format!("invalid SLURM duration: {text:?}"));

    let (days, clock) = match trimmed.split_once('-') {
        Some((days, clock)) => (days.parse::<u64>().map_err(|_| malformed())?, clock),
        None => (0, trimmed),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match fields.as_slice() {
        [hours, minutes, seconds] => (
            hours.parse::<u64>().map_err(|_| malformed())?,
            minutes.parse::<u64>().map_err(|_| malformed())?,
            parse_seconds(seconds).ok_or_else(malformed)?,
        ),
        [minutes, seconds] if days == 0 => (
            0,
            minutes.parse::<u64>().map_err(|_| malformed())?,
            parse_seconds(seconds).ok_or_else(malformed)?,
        ),
        _ => return Err(malformed()),
    };

    Ok(days * 86_400 + hours * 3_600 + minutes * 60 + seconds)
}

fn parse_seconds(field: &str) -> Option<u64> {
    if field.is_empty() {
        return None;
    }
    let value = field.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.round() as u64)
}

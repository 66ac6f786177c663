//! Event formatting for the terminal.

use recogniser_core::{EngineEvent, Offset, TunedPitch, TuningAccuracy};

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

/// Offsets within this many cents are shown without a sign.
const OFFSET_DISPLAY_THRESHOLD_CENTS: f32 = 1.0;

fn accuracy_label(accuracy: TuningAccuracy) -> &'static str {
    match accuracy {
        TuningAccuracy::InTune => "in tune",
        TuningAccuracy::Close => "close",
        TuningAccuracy::Off => "off",
    }
}

/// Offset as a signed percentage, or `0.00%` when negligible.
pub fn format_offset(offset: Offset) -> String {
    if offset.cents.abs() <= OFFSET_DISPLAY_THRESHOLD_CENTS {
        return "0.00%".to_string();
    }
    let prefix = if offset.percentage > 0.0 { "+" } else { "-" };
    format!("{}{:.2}%", prefix, offset.percentage.abs())
}

fn format_pitch(pitch: &TunedPitch) -> String {
    format!(
        "{:<4} {:>8.2} Hz  {:>8}  {:+6.1} cents  ({})",
        pitch.note.to_string(),
        pitch.frequency(),
        format_offset(pitch.offset),
        pitch.offset.cents,
        accuracy_label(pitch.accuracy()),
    )
}

/// Renders one event as a single line.
pub fn format_event(event: &EngineEvent, format: Format) -> String {
    match format {
        Format::Json => serde_json::to_string(event).unwrap_or_else(|err| {
            format!("{{\"event\":\"serialization_failed\",\"message\":\"{err}\"}}")
        }),
        Format::Text => match event {
            EngineEvent::PitchDetected(pitch) => format_pitch(pitch),
            EngineEvent::BelowThreshold { level_db } => {
                format!("--   below level threshold ({level_db:.1} dBFS)")
            }
            EngineEvent::EngineError { kind } => format!("error: {kind}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recogniser_core::{CaptureError, Note, Offset, PitchEstimate};

    fn pitch(frequency: f32, cents: f32) -> EngineEvent {
        EngineEvent::PitchDetected(TunedPitch {
            estimate: PitchEstimate {
                frequency,
                clarity: 0.98,
            },
            note: Note::A4,
            offset: Offset::from_cents(cents),
            level_db: -12.0,
        })
    }

    #[test]
    fn small_offsets_are_unsigned() {
        assert_eq!(format_offset(Offset::from_cents(0.4)), "0.00%");
        // One cent is two percent of the half-semitone span.
        assert_eq!(format_offset(Offset::from_cents(-1.0)), "0.00%");
        assert_eq!(format_offset(Offset::from_cents(1.5)), "+3.00%");
        assert_eq!(format_offset(Offset::from_cents(-15.0)), "-30.00%");
    }

    #[test]
    fn text_pitch_line_shows_note_frequency_and_offset() {
        let line = format_event(&pitch(442.0, 7.85), Format::Text);
        assert!(line.starts_with("A4"), "{line}");
        assert!(line.contains("442.00 Hz"), "{line}");
        assert!(line.contains("+15.70%"), "{line}");
        assert!(line.contains("(close)"), "{line}");
    }

    #[test]
    fn json_lines_are_tagged() {
        let line = format_event(&pitch(440.0, 0.0), Format::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "pitch_detected");
        assert_eq!(value["note"], "A4");
    }

    #[test]
    fn errors_and_quiet_windows_have_text_forms() {
        let error = EngineEvent::EngineError {
            kind: CaptureError::StreamFailed("gone".into()),
        };
        assert_eq!(format_event(&error, Format::Text), "error: audio stream failed: gone");

        let quiet = EngineEvent::BelowThreshold { level_db: -48.26 };
        assert!(format_event(&quiet, Format::Text).contains("-48.3 dBFS"));
    }
}

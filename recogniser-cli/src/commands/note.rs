//! Nearest-note lookup.

use anyhow::Result;
use clap::Args;
use recogniser_core::NoteMapper;

#[derive(Args)]
pub struct NoteArgs {
    /// Frequency in Hz
    #[arg(value_name = "FREQ")]
    frequency: f32,

    /// Frequency of A4 in Hz
    #[arg(long, default_value_t = 440.0)]
    reference: f32,
}

pub fn run(args: NoteArgs) -> Result<()> {
    println!("{}", describe(args.frequency, args.reference)?);
    Ok(())
}

fn describe(frequency: f32, reference: f32) -> Result<String> {
    let mapper = NoteMapper::new(reference)?;
    let (note, offset) = mapper.map(frequency)?;
    Ok(format!(
        "{} ({:.2} Hz): {:+.1} cents, ideal {:.2} Hz",
        note,
        frequency,
        offset.cents,
        mapper.frequency_of(note)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_nearest_note() {
        let line = describe(442.0, 440.0).unwrap();
        assert_eq!(line, "A4 (442.00 Hz): +7.9 cents, ideal 440.00 Hz");
    }

    #[test]
    fn rejects_invalid_frequency() {
        assert!(describe(-1.0, 440.0).is_err());
        assert!(describe(440.0, 0.0).is_err());
    }
}

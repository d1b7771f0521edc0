//! RTTM speaker-turn parsing
//!
//! `SPEAKER <file> <chan> <onset> <duration> <NA> <NA> <label> <NA> <NA>`

use super::SpeakerTurn;
use crate::error::DiarizationError;

/// Parse `SPEAKER` records; blank lines, `;;` comments and other record
/// types are skipped.
pub fn parse_rttm(text: &str) -> Result<Vec<SpeakerTurn>, DiarizationError> {
    let mut turns = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.first() {
            Some(&"SPEAKER") => {}
            _ => continue,
        }

        if fields.len() < 8 {
            return Err(DiarizationError::Rttm {
                line: line_no,
                reason: format!("expected at least 8 fields, got {}", fields.len()),
            });
        }

        let number = |field: &str, what: &str| -> Result<f64, DiarizationError> {
            field
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| DiarizationError::Rttm {
                    line: line_no,
                    reason: format!("bad {} {:?}", what, field),
                })
        };

        let start = number(fields[3], "onset")?;
        let duration = number(fields[4], "duration")?;

        turns.push(SpeakerTurn {
            start,
            end: start + duration,
            label: fields[7].to_string(),
        });
    }

    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_speaker_lines() {
        let text = "\
;; generated by pyannote
SPEAKER raw_audio 1 0.500 2.250 <NA> <NA> SPEAKER_00 <NA> <NA>

SPEAKER raw_audio 1 3.000 1.000 <NA> <NA> SPEAKER_01 <NA> <NA>
SPKR-INFO raw_audio 1 <NA> <NA> <NA> unknown SPEAKER_00 <NA> <NA>
";
        let turns = parse_rttm(text).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].label, "SPEAKER_00");
        assert!((turns[0].start - 0.5).abs() < 1e-9);
        assert!((turns[0].end - 2.75).abs() < 1e-9);
        assert_eq!(turns[1].label, "SPEAKER_01");
    }

    #[test]
    fn test_short_line_is_error() {
        let err = parse_rttm("SPEAKER raw 1 0.0 1.0").unwrap_err();
        assert!(matches!(err, DiarizationError::Rttm { line: 1, .. }));
    }

    #[test]
    fn test_negative_duration_is_error() {
        let err = parse_rttm("SPEAKER raw 1 0.0 -1.0 <NA> <NA> A <NA> <NA>").unwrap_err();
        assert!(matches!(
            err,
            DiarizationError::Rttm { reason, .. } if reason.contains("duration")
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_rttm("").unwrap().is_empty());
    }
}

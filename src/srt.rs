use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})(\s*-->\s*)(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})(.*)$")
        .expect("static regex")
});

pub fn parse_timestamp(hh: &str, mm: &str, ss: &str, ms: &str) -> Option<f64> {
    let hh: u64 = hh.parse().ok()?;
    let mm: u64 = mm.parse().ok()?;
    let ss: u64 = ss.parse().ok()?;
    // "5" after the comma means 500ms.
    let ms: u64 = format!("{:0<3}", ms).parse().ok()?;
    Some((hh * 3600 + mm * 60 + ss) as f64 + ms as f64 / 1000.0)
}

/// `HH:MM:SS,mmm`, rounded to the nearest millisecond.
pub fn seconds_to_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

fn rescale_timing_line(caps: &Captures<'_>, factor: f64) -> Option<String> {
    let start = parse_timestamp(&caps[2], &caps[3], &caps[4], &caps[5])?;
    let end = parse_timestamp(&caps[7], &caps[8], &caps[9], &caps[10])?;
    Some(format!(
        "{}{}{}{}{}",
        &caps[1],
        seconds_to_srt_time(start / factor),
        &caps[6],
        seconds_to_srt_time(end / factor),
        &caps[11]
    ))
}

/// Rewrite every cue timing so the subtitles line up with a video played
/// `factor` times faster. Cue numbers and text are kept as they are.
pub fn rescale_srt(input: &str, factor: f64) -> String {
    let mut output = String::with_capacity(input.len());
    for line in input.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let ending = &line[trimmed.len()..];
        let rewritten = TIMING_LINE
            .captures(trimmed)
            .and_then(|caps| rescale_timing_line(&caps, factor));
        match rewritten {
            Some(text) => output.push_str(&text),
            None => output.push_str(trimmed),
        }
        output.push_str(ending);
    }
    output
}

pub async fn adjust_srt_for_speed(input_srt: &Path, output_srt: &Path, factor: f64) -> Result<()> {
    if !(factor > 0.0) || !factor.is_finite() {
        anyhow::bail!("Invalid speed factor {}", factor);
    }

    let input = fs::read_to_string(input_srt)
        .await
        .with_context(|| format!("read srt: {}", input_srt.display()))?;

    let output = if factor == 1.0 {
        input
    } else {
        rescale_srt(&input, factor)
    };

    let mut out = fs::File::create(output_srt)
        .await
        .with_context(|| format!("create srt output: {}", output_srt.display()))?;
    out.write_all(output.as_bytes()).await?;
    out.flush().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n2\n00:01:30,000 --> 00:01:31,200\nsecond cue\n";

    #[test]
    fn formats_srt_time() {
        assert_eq!(seconds_to_srt_time(0.0), "00:00:00,000");
        assert_eq!(seconds_to_srt_time(3725.042), "01:02:05,042");
        assert_eq!(seconds_to_srt_time(59.9996), "00:01:00,000");
        assert_eq!(seconds_to_srt_time(-1.0), "00:00:00,000");
    }

    #[test]
    fn parses_short_millisecond_fields() {
        assert_eq!(parse_timestamp("00", "00", "01", "5"), Some(1.5));
        assert_eq!(parse_timestamp("01", "00", "00", "000"), Some(3600.0));
        assert_eq!(parse_timestamp("xx", "00", "00", "000"), None);
    }

    #[test]
    fn doubling_speed_halves_every_timestamp() {
        let out = rescale_srt(SAMPLE, 2.0);
        assert_eq!(
            out,
            "1\n00:00:00,500 --> 00:00:01,250\nHello there\n\n2\n00:00:45,000 --> 00:00:45,600\nsecond cue\n"
        );
    }

    #[test]
    fn keeps_crlf_line_endings_and_plain_text() {
        let input = "1\r\n00:00:03,000 --> 00:00:06,000\r\n10:00 is not a timing\r\n";
        let out = rescale_srt(input, 1.5);
        assert_eq!(
            out,
            "1\r\n00:00:02,000 --> 00:00:04,000\r\n10:00 is not a timing\r\n"
        );
    }

    #[tokio::test]
    async fn unit_factor_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("gene_audio.srt");
        let output = dir.path().join("subtitles.srt");
        std::fs::write(&input, SAMPLE).unwrap();

        adjust_srt_for_speed(&input, &output, 1.0).await.unwrap();
        assert_eq!(std::fs::read_to_string(&output).unwrap(), SAMPLE);
    }

    #[tokio::test]
    async fn rejects_bad_factor() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("gene_audio.srt");
        std::fs::write(&input, SAMPLE).unwrap();
        assert!(
            adjust_srt_for_speed(&input, &dir.path().join("out.srt"), 0.0)
                .await
                .is_err()
        );
    }
}

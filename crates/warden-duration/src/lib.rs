//! Duration parsing and human-readable formatting for warden.
//!
//! Action run history and executor results report elapsed time in a compact
//! `XdYhZmNs` form rather than `humantime`'s verbose `"2m 5s"` output, so this
//! crate provides that formatter alongside the flexible (seconds-or-string)
//! parsing used by action YAML and the process config file.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Format a duration the way action run history and executor results do:
/// non-zero day/hour/minute/second fields concatenated, largest unit first.
/// A zero (or sub-second) duration formats as `"0s"`.
pub fn format_run_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d"));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if seconds > 0 || out.is_empty() {
        out.push_str(&format!("{seconds}s"));
    }
    out
}

/// Parse a free-form duration string (`"5s"`, `"2m"`, `"1h30m"`, plain seconds
/// like `"600"`) into a [`Duration`]. Accepts both humantime's unit syntax and
/// bare integers, since action YAML historically writes `timeout: 600`.
pub fn parse_flexible_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    let trimmed = s.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(trimmed)
}

/// serde helper: deserialize a duration from either a bare integer (seconds)
/// or a humantime string, mirroring [`parse_flexible_duration`].
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Seconds(u64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Repr::Text(text) => parse_flexible_duration(&text).map_err(serde::de::Error::custom),
    }
}

/// serde helper: serialize a duration as whole seconds, matching the YAML
/// action file convention (`timeout: 600`).
pub fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(d.as_secs())
}

#[cfg(test)]
mod tests {
    use proptest::proptest;

    use super::*;

    #[test]
    fn zero_duration_formats_as_0s() {
        assert_eq!(format_run_duration(Duration::from_secs(0)), "0s");
    }

    #[test]
    fn formats_all_nonzero_fields() {
        let d = Duration::from_secs(2 * 86_400 + 3 * 3_600 + 4 * 60 + 5);
        assert_eq!(format_run_duration(d), "2d3h4m5s");
    }

    #[test]
    fn omits_zero_fields() {
        assert_eq!(format_run_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_run_duration(Duration::from_secs(3_600)), "1h");
    }

    #[test]
    fn seconds_shown_when_sub_minute_or_zero() {
        assert_eq!(format_run_duration(Duration::from_millis(750)), "0s");
        assert_eq!(format_run_duration(Duration::from_secs(9)), "9s");
    }

    #[test]
    fn parses_bare_seconds_and_humantime() {
        assert_eq!(
            parse_flexible_duration("600").unwrap(),
            Duration::from_secs(600)
        );
        assert_eq!(
            parse_flexible_duration("10m").unwrap(),
            Duration::from_secs(600)
        );
        assert!(parse_flexible_duration("not-a-duration").is_err());
    }

    #[test]
    fn deserialize_accepts_int_or_string() {
        let from_int: Duration = serde_json::from_str::<WrapDuration>(r#"{"timeout":600}"#)
            .unwrap()
            .timeout;
        let from_str: Duration = serde_json::from_str::<WrapDuration>(r#"{"timeout":"10m"}"#)
            .unwrap()
            .timeout;
        assert_eq!(from_int, Duration::from_secs(600));
        assert_eq!(from_str, Duration::from_secs(600));
    }

    #[derive(serde::Deserialize)]
    struct WrapDuration {
        #[serde(deserialize_with = "deserialize_duration")]
        timeout: Duration,
    }

    proptest! {
        #[test]
        fn format_never_panics(secs in 0u64..10_000_000) {
            let _ = format_run_duration(Duration::from_secs(secs));
        }

        #[test]
        fn format_always_ends_in_seconds_suffix(secs in 0u64..10_000_000) {
            let out = format_run_duration(Duration::from_secs(secs));
            prop_assert!(out.ends_with('s'));
        }
    }
}

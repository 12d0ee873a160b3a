//! Download filename templates.

use chrono::{DateTime, SecondsFormat, Utc};

pub const DEFAULT_TEMPLATE: &str = "convertino_%name%";

/// Expands `%date%`, `%name%` and `%extension%` in `template`.
///
/// `name` is the source basename without extension and `extension` the
/// original extension without the dot. The output format is not appended.
pub fn render(template: &str, name: &str, extension: &str, now: DateTime<Utc>) -> String {
    template
        .replace("%date%", &now.to_rfc3339_opts(SecondsFormat::Millis, true))
        .replace("%name%", name)
        .replace("%extension%", extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 5).unwrap()
    }

    #[test]
    fn test_default_template() {
        assert_eq!(render(DEFAULT_TEMPLATE, "holiday", "jpg", noon()), "convertino_holiday");
    }

    #[test]
    fn test_all_tokens() {
        assert_eq!(
            render("%name%-%extension%-%date%", "song", "flac", noon()),
            "song-flac-2024-03-09T12:30:05.000Z"
        );
    }

    #[test]
    fn test_repeated_and_unknown_tokens() {
        assert_eq!(render("%name%_%name%_%size%", "a", "b", noon()), "a_a_%size%");
        assert_eq!(render("fixed", "a", "b", noon()), "fixed");
    }
}

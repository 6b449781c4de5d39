use chrono::{DateTime, FixedOffset, Local};

/// Strip a user-supplied base name down to a filesystem-safe form.
///
/// Keeps alphanumerics plus `-`, `_`, `+` and `.`, drops everything else,
/// then trims leading/trailing dots. An empty result becomes `image`.
pub fn sanitize_base(name: &str) -> String {
    let safe: String = name
        .chars()
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '+' | '.'))
        .collect();
    let trimmed = safe.trim_matches('.');
    if trimmed.is_empty() {
        "image".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format a capture filename for the current local time.
///
/// Shape: `image_{base}_pc{DDMMYY}T{HH:MM:SS}{±HH}.jpg`, with `:`
/// replaced by `-` when targeting Windows (NTFS forbids `:`).
pub fn capture_filename(user_base: &str) -> String {
    capture_filename_at(user_base, Local::now().fixed_offset(), cfg!(windows))
}

pub fn capture_filename_at(
    user_base: &str,
    now: DateTime<FixedOffset>,
    for_windows: bool,
) -> String {
    let date_part = now.format("%d%m%y").to_string();
    let mut time_part = now.format("%H:%M:%S").to_string();

    // Timezone label is the UTC offset in whole hours, e.g. "+02" or "-05".
    let offset_secs = now.offset().local_minus_utc();
    let sign = if offset_secs >= 0 { '+' } else { '-' };
    let hours = offset_secs.unsigned_abs() / 3600;
    let tz_label = format!("{sign}{hours:02}");

    if for_windows {
        time_part = time_part.replace(':', "-");
    }

    let base = sanitize_base(user_base);
    format!("image_{base}_pc{date_part}T{time_part}{tz_label}.jpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now(offset_hours: i32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(offset_hours * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 8, 30, 14, 5, 9)
            .unwrap()
    }

    #[test]
    fn sanitize_keeps_safe_charset() {
        assert_eq!(sanitize_base("hello-world_1+2.x"), "hello-world_1+2.x");
        assert_eq!(sanitize_base("a b/c\\d:e*f"), "abcdef");
    }

    #[test]
    fn sanitize_trims_dots_and_defaults() {
        assert_eq!(sanitize_base("..name.."), "name");
        assert_eq!(sanitize_base("..."), "image");
        assert_eq!(sanitize_base(""), "image");
        assert_eq!(sanitize_base("///"), "image");
    }

    #[test]
    fn filename_unix_shape() {
        let name = capture_filename_at("front door", fixed_now(2), false);
        assert_eq!(name, "image_frontdoor_pc300826T14:05:09+02.jpg");
    }

    #[test]
    fn filename_windows_replaces_colons() {
        let name = capture_filename_at("desk", fixed_now(2), true);
        assert_eq!(name, "image_desk_pc300826T14-05-09+02.jpg");
    }

    #[test]
    fn negative_offset_label() {
        let name = capture_filename_at("x", fixed_now(-5), false);
        assert!(name.ends_with("-05.jpg"), "{name}");
    }

    #[test]
    fn blank_base_falls_back() {
        let name = capture_filename_at("   ", fixed_now(0), false);
        assert!(name.starts_with("image_image_pc"), "{name}");
    }
}

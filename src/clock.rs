#![forbid(unsafe_code)]

use std::sync::OnceLock;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::config::parse_duration;
use crate::error::TaskminderError;

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Captures the local UTC offset. Must run before the async runtime starts
/// threads, otherwise the platform lookup is refused and UTC is used.
pub fn init_local_offset() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
}

#[must_use]
pub fn local_offset() -> UtcOffset {
    LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC)
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM` (local time) or `+<duration>`
/// relative to `now`.
pub fn parse_due(input: &str, now: OffsetDateTime) -> Result<OffsetDateTime, TaskminderError> {
    let s = input.trim();
    let invalid = || TaskminderError::InvalidDueTime(input.to_owned());

    if let Some(rel) = s.strip_prefix('+') {
        let d = parse_duration(rel).map_err(|_| invalid())?;
        let d = time::Duration::try_from(d).map_err(|_| invalid())?;
        return now.checked_add(d).ok_or_else(invalid);
    }

    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(dt);
    }

    let normalized = s.replacen('T', " ", 1);
    let local = PrimitiveDateTime::parse(
        &normalized,
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
    )
    .map_err(|_| invalid())?;
    Ok(local.assume_offset(local_offset()))
}

#[must_use]
pub fn format_local(dt: OffsetDateTime) -> String {
    dt.to_offset(local_offset())
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| "unknown".to_owned())
}

#[must_use]
pub fn format_rfc3339(dt: OffsetDateTime) -> String {
    dt.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_owned())
}

/// `in 2h 5m`, `3d ago` style distance from `now`.
#[must_use]
pub fn relative(dt: OffsetDateTime, now: OffsetDateTime) -> String {
    let diff = dt - now;
    let text = format_duration(diff.abs());
    if diff.is_negative() {
        format!("{text} ago")
    } else {
        format!("in {text}")
    }
}

#[must_use]
pub fn format_duration(d: time::Duration) -> String {
    if d < time::Duration::minutes(1) {
        return format!("{}s", d.whole_seconds());
    }
    if d < time::Duration::hours(1) {
        return format!("{}m", d.whole_minutes());
    }
    if d < time::Duration::days(1) {
        let hours = d.whole_hours();
        let minutes = (d - time::Duration::hours(hours)).whole_minutes();
        return format!("{hours}h {minutes}m");
    }
    let days = d.whole_days();
    let hours = (d - time::Duration::days(days)).whole_hours();
    format!("{days}d {hours}h")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_supported_due_formats() {
        let now = datetime!(2026-03-01 12:00 UTC);
        assert_eq!(
            parse_due("+90m", now).unwrap(),
            datetime!(2026-03-01 13:30 UTC)
        );
        assert_eq!(
            parse_due("2026-03-02T08:15:00Z", now).unwrap(),
            datetime!(2026-03-02 08:15 UTC)
        );
        // Tests never initialise the local offset, so local means UTC here.
        assert_eq!(
            parse_due("2026-03-02 08:15", now).unwrap(),
            datetime!(2026-03-02 08:15 UTC)
        );
        assert!(matches!(
            parse_due("tomorrow", now),
            Err(TaskminderError::InvalidDueTime(_))
        ));
    }

    #[test]
    fn huge_relative_due_times_are_rejected() {
        let now = datetime!(2026-03-01 12:00 UTC);
        for input in ["+999999999999999999m", "+999999999999999999h", "+99999999999d"] {
            assert!(
                matches!(parse_due(input, now), Err(TaskminderError::InvalidDueTime(_))),
                "{input}"
            );
        }
    }

    #[test]
    fn relative_reads_naturally() {
        let now = datetime!(2026-03-01 12:00 UTC);
        assert_eq!(relative(datetime!(2026-03-01 14:05 UTC), now), "in 2h 5m");
        assert_eq!(relative(datetime!(2026-02-27 11:00 UTC), now), "2d 1h ago");
        assert_eq!(relative(now, now), "in 0s");
    }
}

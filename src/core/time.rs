use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// Whole seconds from `start` to `end`, clamped into `[0, i32::MAX]`.
pub(crate) fn elapsed_seconds(start: PrimitiveDateTime, end: PrimitiveDateTime) -> i32 {
    let seconds = (end - start).whole_seconds();
    seconds.clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Duration, Time};

    fn at(hour: u8, minute: u8, second: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::March, 2).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, minute, second).unwrap())
    }

    #[test]
    fn format_primitive_outputs_utc_z() {
        assert_eq!(format_primitive(at(10, 20, 30)), "2025-03-02T10:20:30Z");
    }

    #[test]
    fn elapsed_seconds_counts_whole_seconds() {
        let start = at(9, 0, 0);
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(95_900)), 95);
    }

    #[test]
    fn elapsed_seconds_never_negative() {
        assert_eq!(elapsed_seconds(at(9, 0, 10), at(9, 0, 0)), 0);
    }
}

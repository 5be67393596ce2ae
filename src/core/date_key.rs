use chrono::{DateTime, Local, NaiveDate};

/// Local calendar date of `at`.
pub fn local_date(at: &DateTime<Local>) -> NaiveDate {
    at.date_naive()
}

/// Whether two instants fall on the same local calendar day. Time of day is ignored.
pub fn is_same_day(a: &DateTime<Local>, b: &DateTime<Local>) -> bool {
    local_date(a) == local_date(b)
}

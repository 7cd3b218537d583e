use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// The three filename date conventions a `LogdirStream` understands, tried
/// in order; first match wins. See spec.md §4.1's pattern table.
///
/// `YYYYMMDD` requires `YYYY >= 1900` so that it doesn't collide with
/// `MMDDYYYY` — an 8-digit prefix starting with e.g. `19` or `20` is read as
/// pattern 1, everything else falls through to pattern 2. This mirrors the
/// original's docstring warning that the two 8-digit forms are ambiguous by
/// construction and relies on the year-range guard to disambiguate the
/// common case.
fn year_month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})").unwrap())
}

fn month_day_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})(\d{4})").unwrap())
}

fn two_digit_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})-(\d{2})-(\d{2})").unwrap())
}

/// Try to parse a calendar date from the prefix of a file's basename.
///
/// Returns `None` if none of the three patterns match, or if a pattern
/// matched but the captured numbers don't form a valid calendar date (for
/// example a `MMDDYYYY` fallback where `MM` turns out to be `18`). Per
/// spec.md §9's open question, this crate treats such cases as
/// warn-and-skip rather than fatal, since they're indistinguishable from an
/// innocuous filename that merely happens to start with eight digits.
pub fn date_from_basename(basename: &str) -> Option<NaiveDate> {
    if let Some(caps) = year_month_day_re().captures(basename) {
        let year: i32 = caps[1].parse().ok()?;
        if year >= 1900 {
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }

    if let Some(caps) = month_day_year_re().captures(basename) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = two_digit_year_re().captures(basename) {
        let year: i32 = 2000 + caps[1].parse::<i32>().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_1900_boundary_is_pattern_one() {
        let d = date_from_basename("19000101foo.csv").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
    }

    #[test]
    fn eight_digit_below_1900_falls_through_to_month_day_year() {
        let d = date_from_basename("01012023foo.csv").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    }

    #[test]
    fn two_digit_year_dashed_form() {
        let d = date_from_basename("23-01-01foo.csv").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
    }

    #[test]
    fn invalid_date_from_ambiguous_prefix_is_none() {
        // 18991231 -> year 1899 < 1900, falls through to MMDDYYYY as
        // month=18, day=99, year=1231, which is not a valid date.
        assert_eq!(date_from_basename("18991231foo.csv"), None);
    }

    #[test]
    fn unmatched_basename_is_none() {
        assert_eq!(date_from_basename("readme.txt"), None);
    }

    #[test]
    fn year_2020_is_pattern_one_not_month_day_year() {
        let d = date_from_basename("20201231.csv").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
    }
}

//! Jalali (Persian solar) calendar support.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::locale::normalize_text;

pub const MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

static DATE_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    let months = MONTHS.join("|");
    Regex::new(&format!(r"([0-9]{{1,2}})\s+({months})\s+([0-9]{{4}})"))
        .expect("valid jalali date pattern")
});

/// 1-based month number for a Persian month name.
pub fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u32 + 1)
}

fn is_leap_year(jy: i32) -> bool {
    // 33-year arithmetic cycle; matches the astronomical calendar for 1178-1633.
    matches!(jy.rem_euclid(33), 1 | 5 | 9 | 13 | 17 | 22 | 26 | 30)
}

fn days_in_month(jy: i32, jm: u32) -> u32 {
    match jm {
        1..=6 => 31,
        7..=11 => 30,
        12 if is_leap_year(jy) => 30,
        _ => 29,
    }
}

/// Converts a Jalali date to the proleptic Gregorian calendar.
pub fn to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&jm) || jd == 0 || jd > days_in_month(jy, jm) {
        return None;
    }

    let jy = i64::from(jy) + 1595;
    let jm = i64::from(jm);
    let jd = i64::from(jd);

    let mut days = -355_668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + jd;
    days += if jm < 7 {
        (jm - 1) * 31
    } else {
        (jm - 7) * 30 + 186
    };

    let mut gy = 400 * (days / 146_097);
    days %= 146_097;
    if days > 36_524 {
        days -= 1;
        gy += 100 * (days / 36_524);
        days %= 36_524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1_461);
    days %= 1_461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let ordinal = u32::try_from(days + 1).ok()?;
    NaiveDate::from_yo_opt(i32::try_from(gy).ok()?, ordinal)
}

/// Finds the last `<day> <month name> <year>` fragment in free text and
/// converts it to a Gregorian date.
pub fn find_trailing_date(text: &str) -> Option<NaiveDate> {
    let normalized = normalize_text(text);
    let caps = DATE_FRAGMENT.captures_iter(&normalized).last()?;

    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;

    to_gregorian(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nowruz_boundaries() {
        assert_eq!(to_gregorian(1403, 1, 1), Some(date(2024, 3, 20)));
        assert_eq!(to_gregorian(1402, 1, 1), Some(date(2023, 3, 21)));
        assert_eq!(to_gregorian(1402, 12, 29), Some(date(2024, 3, 19)));
    }

    #[test]
    fn mid_year_dates() {
        assert_eq!(to_gregorian(1403, 1, 15), Some(date(2024, 4, 3)));
        assert_eq!(to_gregorian(1403, 1, 16), Some(date(2024, 4, 4)));
        assert_eq!(to_gregorian(1399, 7, 1), Some(date(2020, 9, 22)));
        assert_eq!(to_gregorian(1403, 10, 11), Some(date(2024, 12, 31)));
    }

    #[test]
    fn leap_esfand() {
        assert_eq!(to_gregorian(1403, 12, 30), Some(date(2025, 3, 20)));
        assert_eq!(to_gregorian(1402, 12, 30), None);
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(to_gregorian(1403, 13, 1), None);
        assert_eq!(to_gregorian(1403, 7, 31), None);
        assert_eq!(to_gregorian(1403, 1, 0), None);
    }

    #[test]
    fn extracts_trailing_fragment() {
        let text = "آپارتمان ۱۲۰ متری در ونک - ۱ فروردین ۱۴۰۲ تا ۱۶ فروردین ۱۴۰۳";
        assert_eq!(find_trailing_date(text), Some(date(2024, 4, 4)));
        assert_eq!(find_trailing_date("بدون تاریخ"), None);
    }
}

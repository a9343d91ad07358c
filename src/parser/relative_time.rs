//! "Published N units ago" phrases.

use chrono::Duration;

use super::locale::{is_count_token, normalize_text, parse_count};

const AGO: &str = "پیش";
const HALF: &str = "نیم";

/// Estimate used for relative phrases without a recognizable unit,
/// e.g. `لحظاتی پیش` ("moments ago").
pub const VAGUE_ESTIMATE_MS: i64 = 5 * 60 * 1_000;

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

fn unit_ms(word: &str) -> Option<i64> {
    let ms = match word {
        "ثانیه" => SECOND_MS,
        "دقیقه" => MINUTE_MS,
        "ربع" => 15 * MINUTE_MS,
        "ساعت" => HOUR_MS,
        "روز" => DAY_MS,
        "هفته" => 7 * DAY_MS,
        "ماه" => 30 * DAY_MS,
        "سال" => 365 * DAY_MS,
        _ => return None,
    };
    Some(ms)
}

/// Converts a subtitle such as `۳ ساعت پیش در تهران` to how long ago the ad
/// was published. Returns `None` when the text is not a relative phrase.
pub fn parse_relative_age(text: &str) -> Option<Duration> {
    let text = normalize_text(text);

    if text.contains("پریروز") {
        return Some(Duration::milliseconds(2 * DAY_MS));
    }
    if text.contains("دیروز") {
        return Some(Duration::milliseconds(DAY_MS));
    }

    let (before, _) = text.split_once(AGO)?;
    let words: Vec<&str> = before.split_whitespace().collect();

    let Some(unit_index) = words.iter().position(|w| unit_ms(w).is_some()) else {
        return Some(Duration::milliseconds(VAGUE_ESTIMATE_MS));
    };
    let unit = unit_ms(words[unit_index])?;

    // Only the run of count tokens directly before the unit is the count.
    let before_unit = &words[..unit_index];
    let count_start = before_unit
        .iter()
        .rposition(|w| !is_count_token(w))
        .map_or(0, |i| i + 1);
    let count_words = &before_unit[count_start..];
    let ms = if before_unit.last() == Some(&HALF) {
        unit / 2
    } else {
        let count = parse_count(&count_words.join(" ")).unwrap_or(1);
        count.checked_mul(unit)?
    };

    Some(Duration::milliseconds(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(text: &str) -> Option<i64> {
        parse_relative_age(text).map(|d| d.num_milliseconds())
    }

    #[test]
    fn digit_counts() {
        assert_eq!(ms("۳ ساعت پیش در تهران، ونک"), Some(3 * HOUR_MS));
        assert_eq!(ms("۲۰ دقیقه پیش"), Some(20 * MINUTE_MS));
        assert_eq!(ms("۲ هفته پیش"), Some(14 * DAY_MS));
    }

    #[test]
    fn word_counts() {
        assert_eq!(ms("یک ساعت پیش"), Some(HOUR_MS));
        assert_eq!(ms("سه روز پیش در مشهد"), Some(3 * DAY_MS));
        assert_eq!(ms("بیست و پنج دقیقه پیش"), Some(25 * MINUTE_MS));
    }

    #[test]
    fn earlier_numbers_in_the_subtitle_are_ignored() {
        assert_eq!(ms("آگهی ۲ خوابه، ۳ ساعت پیش"), Some(3 * HOUR_MS));
        assert_eq!(ms("ویلا ۲ طبقه بیست و پنج دقیقه پیش"), Some(25 * MINUTE_MS));
        assert_eq!(ms("۱۲۰ متری، ساعت پیش"), Some(HOUR_MS));
    }

    #[test]
    fn idiomatic_units() {
        assert_eq!(ms("ربع ساعت پیش"), Some(15 * MINUTE_MS));
        assert_eq!(ms("نیم ساعت پیش"), Some(30 * MINUTE_MS));
        assert_eq!(ms("دیروز در تهران"), Some(DAY_MS));
        assert_eq!(ms("۲ ماه پیش"), Some(60 * DAY_MS));
        assert_eq!(ms("۱ سال پیش"), Some(365 * DAY_MS));
    }

    #[test]
    fn vague_phrases_use_estimate() {
        assert_eq!(ms("لحظاتی پیش در تهران"), Some(VAGUE_ESTIMATE_MS));
        assert_eq!(ms("دقایقی پیش"), Some(VAGUE_ESTIMATE_MS));
    }

    #[test]
    fn non_relative_text() {
        assert_eq!(ms("فوری در تهران"), None);
        assert_eq!(ms(""), None);
    }
}

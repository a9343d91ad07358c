//! Persian text normalization and number extraction.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("valid number pattern"));

const THOUSANDS_SEPARATORS: [char; 3] = ['٬', ',', '،'];
const ZWNJ: char = '\u{200c}';

/// Maps Persian and Arabic-Indic digits to ASCII and the Arabic decimal
/// separator to `.`. Thousands separators are dropped when they sit between
/// two digits; elsewhere they are kept as punctuation.
pub fn normalize_digits(input: &str) -> String {
    let chars: Vec<char> = input.chars().map(ascii_digit).collect();
    let mut out = String::with_capacity(input.len());

    for (i, &c) in chars.iter().enumerate() {
        if THOUSANDS_SEPARATORS.contains(&c) {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if prev_digit && next_digit {
                continue;
            }
        }
        out.push(c);
    }

    out
}

fn ascii_digit(c: char) -> char {
    match c {
        '۰'..='۹' => char::from(b'0' + (c as u32 - '۰' as u32) as u8),
        '٠'..='٩' => char::from(b'0' + (c as u32 - '٠' as u32) as u8),
        '٫' => '.',
        _ => c,
    }
}

/// Full normalization used before any matching: digits, Arabic letter
/// variants, zero-width joiners and the ezafe hamza.
pub fn normalize_text(input: &str) -> String {
    let text: String = normalize_digits(input)
        .chars()
        .filter_map(|c| match c {
            'ي' | 'ى' => Some('ی'),
            'ك' => Some('ک'),
            'ۀ' => Some('ه'),
            '\u{0654}' => None,
            ZWNJ => Some(' '),
            _ => Some(c),
        })
        .collect();

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All ASCII numeric tokens in the normalized text.
pub fn numeric_tokens(input: &str) -> Vec<Decimal> {
    let text = normalize_digits(input);
    NUMBER
        .find_iter(&text)
        .filter_map(|m| Decimal::from_str(m.as_str()).ok())
        .collect()
}

/// First number in the text, if any.
pub fn parse_decimal(input: &str) -> Option<Decimal> {
    numeric_tokens(input).into_iter().next()
}

pub fn parse_integer(input: &str) -> Option<i64> {
    parse_decimal(input).and_then(|d| i64::try_from(d.trunc()).ok())
}

/// Parses a monetary or area amount, honouring trailing magnitude words
/// (`هزار`, `میلیون`, `میلیارد`) that follow the number.
pub fn parse_amount(input: &str) -> Option<Decimal> {
    let text = normalize_text(input);
    let m = NUMBER.find(&text)?;
    let base = Decimal::from_str(m.as_str()).ok()?;
    let rest = &text[m.end()..];
    let multiplier = rest
        .split_whitespace()
        .next()
        .and_then(magnitude)
        .unwrap_or(Decimal::ONE);
    base.checked_mul(multiplier)
}

fn magnitude(word: &str) -> Option<Decimal> {
    match word {
        "هزار" => Some(Decimal::from(1_000)),
        "میلیون" => Some(Decimal::from(1_000_000)),
        "میلیارد" => Some(Decimal::from(1_000_000_000)),
        _ => None,
    }
}

fn word_value(word: &str) -> Option<i64> {
    let value = match word {
        "یک" | "یه" => 1,
        "دو" => 2,
        "سه" => 3,
        "چهار" => 4,
        "پنج" => 5,
        "شش" | "شیش" => 6,
        "هفت" => 7,
        "هشت" => 8,
        "نه" => 9,
        "ده" => 10,
        "یازده" => 11,
        "دوازده" => 12,
        "سیزده" => 13,
        "چهارده" => 14,
        "پانزده" | "پونزده" => 15,
        "شانزده" => 16,
        "هفده" => 17,
        "هجده" | "هیجده" => 18,
        "نوزده" => 19,
        "بیست" => 20,
        "سی" => 30,
        "چهل" => 40,
        "پنجاه" => 50,
        "شصت" => 60,
        "هفتاد" => 70,
        "هشتاد" => 80,
        "نود" => 90,
        "صد" | "یکصد" => 100,
        "دویست" => 200,
        "سیصد" => 300,
        "چهارصد" => 400,
        "پانصد" => 500,
        "ششصد" => 600,
        "هفتصد" => 700,
        "هشتصد" => 800,
        "نهصد" => 900,
        _ => return None,
    };
    Some(value)
}

/// True for a token that can be part of a count: digits, a number word or
/// the `و` joining number words.
pub fn is_count_token(word: &str) -> bool {
    word == "و"
        || word == "هزار"
        || word_value(word).is_some()
        || (!word.is_empty() && normalize_digits(word).chars().all(|c| c.is_ascii_digit()))
}

/// Reads a number spelled out in Persian words, e.g. `بیست و سه` → 23.
/// Returns `None` when no number word is present.
pub fn parse_number_words(input: &str) -> Option<i64> {
    let text = normalize_text(input);
    let mut total = 0i64;
    let mut current = 0i64;
    let mut seen = false;

    for word in text.split_whitespace() {
        if word == "و" {
            continue;
        }
        if word == "هزار" {
            total += current.max(1) * 1_000;
            current = 0;
            seen = true;
        } else if let Some(v) = word_value(word) {
            current += v;
            seen = true;
        }
    }

    seen.then_some(total + current)
}

/// A count expressed either with digits or with number words.
pub fn parse_count(input: &str) -> Option<i64> {
    parse_integer(input).or_else(|| parse_number_words(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persian_digits_and_separators() {
        assert_eq!(normalize_digits("۴٬۵۰۰٬۰۰۰"), "4500000");
        assert_eq!(normalize_digits("٣٫٥"), "3.5");
        assert_eq!(normalize_digits("تهران، ونک"), "تهران، ونک");
    }

    #[test]
    fn parses_prices_with_units() {
        assert_eq!(
            parse_amount("۴٬۵۰۰٬۰۰۰٬۰۰۰ تومان"),
            Some(Decimal::from(4_500_000_000i64))
        );
        assert_eq!(parse_amount("۱٫۵ میلیارد تومان"), Some(Decimal::from(1_500_000_000i64)));
        assert_eq!(parse_amount("توافقی"), None);
    }

    #[test]
    fn parses_decimal_areas() {
        assert_eq!(parse_decimal("۸۵٫۵ متر"), Some(Decimal::from_str("85.5").unwrap()));
        assert_eq!(parse_integer("۱۲۰"), Some(120));
        assert_eq!(parse_integer("قبل از ۱۳۷۰"), Some(1370));
    }

    #[test]
    fn number_words() {
        assert_eq!(parse_number_words("سه"), Some(3));
        assert_eq!(parse_number_words("بیست و سه"), Some(23));
        assert_eq!(parse_number_words("صد و پنج"), Some(105));
        assert_eq!(parse_number_words("دو هزار و ده"), Some(2010));
        assert_eq!(parse_number_words("لحظاتی"), None);
    }

    #[test]
    fn count_prefers_digits() {
        assert_eq!(parse_count("۳ ساعت"), Some(3));
        assert_eq!(parse_count("یک ساعت"), Some(1));
    }

    #[test]
    fn normalizes_arabic_letters_and_ezafe() {
        assert_eq!(normalize_text("اجارهٔ  ماهانه"), "اجاره ماهانه");
        assert_eq!(normalize_text("كمد ديواري"), "کمد دیواری");
    }
}

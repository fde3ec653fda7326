//! Version ordering and compatibility checks for catalog version strings
//!
//! Catalog versions are free-form ("1.0b1", "2.3.0-beta", "10.0.1pre") and
//! the compatibility bounds declared for them may be `"*"`. The ordering
//! implemented here is intentionally not semver: alphabetic runs become
//! negative segments so that pre-release suffixes sort below the release.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Bound value meaning "no limit on this side"
pub const UNBOUNDED: &str = "*";

/// Everything that is neither a digit nor a dot
static NON_NUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.]+").expect("valid non-numeric pattern"));

/// Characters that are not ASCII letters or digits
static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid non-alphanumeric pattern"));

/// Zero segments in front of a trailing pre-release marker (`1.0.0b` -> `1.b`)
static PRERELEASE_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\.0+)*(\.-[0-9]+)(\.[0-9]+)?\.*$").expect("valid pre-release pattern")
});

const UTF16_SPAN: i32 = 65_536;

/// Check whether a target major version lies within `[min, max]`
///
/// Only the leading integer of each bound is considered, so `"78.0a1"` and
/// `"78.*"` both act as 78. `"*"` leaves that side open; a bound without a
/// leading integer rejects the target.
pub fn is_compatible(target: u32, min: &str, max: &str) -> bool {
    let target = i64::from(target);
    let min_ok =
        min == UNBOUNDED || leading_integer(first_segment(min)).is_some_and(|m| m <= target);
    let max_ok =
        max == UNBOUNDED || leading_integer(first_segment(max)).is_some_and(|m| m >= target);
    min_ok && max_ok
}

/// Compare two catalog version strings
pub fn compare_ver(a: &str, b: &str) -> Ordering {
    match (a == UNBOUNDED, b == UNBOUNDED) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let a = segments(a);
    let b = segments(b);
    let len = a.len().max(b.len());

    (0..len)
        .map(|i| {
            let left = a.get(i).copied().unwrap_or(0);
            let right = b.get(i).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Major version of a release string like `"128.3.0esr"`
///
/// Returns `None` for an unparsable or zero major.
pub fn major_of(version: &str) -> Option<u32> {
    first_segment(version)
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|major| *major > 0)
}

fn first_segment(version: &str) -> &str {
    version.split('.').next().unwrap_or_default()
}

/// Leading integer of a string, ignoring leading whitespace and trailing garbage
fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (negative, rest) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// Split a version into comparable integer segments
fn segments(version: &str) -> Vec<i32> {
    let marked = NON_NUMERIC_RUN.replace_all(version, |caps: &Captures| {
        let alphanumeric = NON_ALPHANUMERIC_RUN.replace(&caps[0], "");
        match alphanumeric.to_lowercase().encode_utf16().next() {
            Some(unit) => format!(".{}.", i32::from(unit) - UTF16_SPAN),
            None => "..".to_string(),
        }
    });
    let trimmed = PRERELEASE_TAIL.replace(&marked, "${1}${2}");

    trimmed.split('.').map(to_int32).collect()
}

/// Integer conversion with the wrapping and truncation rules of `~~value`
fn to_int32(segment: &str) -> i32 {
    const TWO_32: f64 = 4_294_967_296.0;
    const TWO_31: f64 = 2_147_483_648.0;

    let number = segment.parse::<f64>().unwrap_or(0.0);
    if !number.is_finite() {
        return 0;
    }
    let wrapped = number.trunc().rem_euclid(TWO_32);
    if wrapped >= TWO_31 {
        (wrapped - TWO_32) as i32
    } else {
        wrapped as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2.0", "10.0", Ordering::Less)] // numeric, not lexical
    #[case("10.0", "9.9", Ordering::Greater)]
    #[case("1.0b1", "1.0", Ordering::Less)] // pre-release below release
    #[case("1.0a1", "1.0b1", Ordering::Less)]
    #[case("1.0.0b1", "1.0b1", Ordering::Equal)] // zero padding in front of a suffix
    #[case("1.0", "1.0.0", Ordering::Equal)] // shorter side padded with 0
    #[case("1.0", "1.0.1", Ordering::Less)]
    #[case("1.0-beta", "1.0b", Ordering::Equal)] // only the first letter counts
    #[case("1.0B2", "1.0b2", Ordering::Equal)] // case-insensitive marker
    #[case("3.2.1", "3.2.1", Ordering::Equal)]
    #[case("2.0-1", "2.0.0.1", Ordering::Equal)] // separator run without letters
    #[case("*", "5.0", Ordering::Greater)]
    #[case("5.0", "*", Ordering::Less)]
    #[case("*", "*", Ordering::Equal)]
    fn compare_ver_returns_expected_ordering(
        #[case] a: &str,
        #[case] b: &str,
        #[case] expected: Ordering,
    ) {
        assert_eq!(compare_ver(a, b), expected);
    }

    #[test]
    fn compare_ver_is_antisymmetric_for_mixed_suffixes() {
        let versions = ["1.0", "1.0b1", "1.0.1", "1.0a", "1.0pre", "1.0.0.0", "0.9z"];
        for a in versions {
            for b in versions {
                assert_eq!(compare_ver(a, b), compare_ver(b, a).reverse(), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn segments_replace_letters_by_negative_code_points() {
        assert_eq!(segments("1.0b1"), vec![1, 98 - 65_536, 1]);
        assert_eq!(segments("2.5"), vec![2, 5]);
    }

    #[test]
    fn to_int32_wraps_like_javascript() {
        assert_eq!(to_int32(""), 0);
        assert_eq!(to_int32("42"), 42);
        assert_eq!(to_int32("-65438"), -65_438);
        assert_eq!(to_int32("4294967297"), 1);
        assert_eq!(to_int32("2147483648"), -2_147_483_648);
    }

    #[rstest]
    #[case(91, "78", "102", true)]
    #[case(91, "92", "*", false)]
    #[case(91, "*", "*", true)]
    #[case(91, "91.0a1", "91.*", true)]
    #[case(128, "115.0", "127.*", false)]
    #[case(60, "", "*", false)] // bound without leading integer
    #[case(68, "60", "68", true)]
    fn is_compatible_compares_leading_integer(
        #[case] target: u32,
        #[case] min: &str,
        #[case] max: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(is_compatible(target, min, max), expected);
    }

    #[rstest]
    #[case("128.3.0esr", Some(128))]
    #[case("115", Some(115))]
    #[case("", None)]
    #[case("0.1", None)]
    #[case("beta", None)]
    fn major_of_returns_leading_component(#[case] version: &str, #[case] expected: Option<u32>) {
        assert_eq!(major_of(version), expected);
    }
}

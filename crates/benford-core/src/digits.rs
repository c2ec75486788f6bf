//! First-significant-digit tabulation for Benford's Law analysis.
//!
//! Everything here is pure: page text goes in, a [`DigitHistogram`] comes out.
//! Progress reporting and persistence live in [`crate::worker`].

use std::fmt::Write as _;

use serde::Serialize;

use crate::CoreError;

/// Counts of leading significant digits 1..=9.
///
/// Digit 0 has no bucket: it can never be a leading significant digit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigitHistogram {
    counts: [u64; 9],
}

impl DigitHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the bucket for `digit`. Digits outside 1..=9 are ignored.
    pub fn record(&mut self, digit: u8) {
        if (1..=9).contains(&digit) {
            self.counts[usize::from(digit - 1)] += 1;
        }
    }

    /// Count for `digit`; always 0 for digits outside 1..=9.
    pub fn count(&self, digit: u8) -> u64 {
        if (1..=9).contains(&digit) {
            self.counts[usize::from(digit - 1)]
        } else {
            0
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn merge(&mut self, other: &DigitHistogram) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            *mine += theirs;
        }
    }

    /// `(digit, count)` pairs in ascending digit order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u64)> + '_ {
        (1u8..=9).zip(self.counts.iter().copied())
    }
}

/// Remove ASCII punctuation (`!"#$%&'()*+,-/:;<=>?@[\]^_`{|}~`) from a token.
///
/// The decimal point is kept, so `"4,021"` becomes `"4021"` while `"40.21"`
/// stays non-numeric and is skipped. Letters and non-ASCII characters are kept
/// as well: `"12kg"` is not a number.
pub fn strip_punctuation(token: &str) -> String {
    token
        .chars()
        .filter(|&c| c == '.' || !c.is_ascii_punctuation())
        .collect()
}

/// Leading significant digit of a token, if the token is numeric.
///
/// The token qualifies when, after punctuation is stripped, it is non-empty and
/// made only of ASCII decimal digits. Leading zeros are skipped; an all-zero
/// token has no significant digit.
pub fn leading_digit(token: &str) -> Option<u8> {
    let stripped = strip_punctuation(token);
    if stripped.is_empty() || !stripped.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stripped.bytes().find(|&b| b != b'0').map(|b| b - b'0')
}

/// Tally the leading digits of every numeric token on one page.
pub fn tally_page(text: &str) -> DigitHistogram {
    let mut histogram = DigitHistogram::new();
    for digit in text.split_whitespace().filter_map(leading_digit) {
        histogram.record(digit);
    }
    histogram
}

/// Tally a whole document, one page at a time.
pub fn tally_pages<'a>(pages: impl IntoIterator<Item = &'a str>) -> DigitHistogram {
    let mut histogram = DigitHistogram::new();
    for page in pages {
        histogram.merge(&tally_page(page));
    }
    histogram
}

/// The flat text report written as the results artifact of a benford job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenfordReport {
    pub pages: usize,
    pub histogram: DigitHistogram,
}

impl BenfordReport {
    pub fn new(pages: usize, histogram: DigitHistogram) -> Self {
        Self { pages, histogram }
    }

    /// Render as `"<n> pages"`, a literal `"0 0"` line, then `"<digit> <count>"`
    /// for digits 1..=9.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(64);
        let _ = writeln!(out, "{} pages", self.pages);
        out.push_str("0 0\n");
        for (digit, count) in self.histogram.iter() {
            let _ = writeln!(out, "{} {}", digit, count);
        }
        out
    }

    /// Parse a rendered report back into its page count and histogram.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let malformed = |what: &str| CoreError::MalformedReport(what.to_string());
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let pages = lines
            .next()
            .and_then(|l| l.strip_suffix(" pages"))
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| malformed("missing page count line"))?;

        if lines.next() != Some("0 0") {
            return Err(malformed("missing \"0 0\" line"));
        }

        let mut histogram = DigitHistogram::new();
        for expected in 1u8..=9 {
            let line = lines
                .next()
                .ok_or_else(|| malformed(&format!("missing line for digit {}", expected)))?;
            let (digit, count) = line
                .split_once(' ')
                .ok_or_else(|| malformed(&format!("bad digit line '{}'", line)))?;
            if digit.parse::<u8>().ok() != Some(expected) {
                return Err(malformed(&format!(
                    "expected digit {}, found '{}'",
                    expected, digit
                )));
            }
            let count: u64 = count
                .parse()
                .map_err(|_| malformed(&format!("bad count '{}'", count)))?;
            histogram.counts[usize::from(expected - 1)] = count;
        }

        Ok(Self { pages, histogram })
    }

    /// Share of each digit in the histogram, paired with Benford's expected share
    /// `log10(1 + 1/d)`.
    pub fn distribution(&self) -> Vec<(u8, f64, f64)> {
        let total = self.histogram.total();
        self.histogram
            .iter()
            .map(|(digit, count)| {
                let observed = if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                };
                let expected = (1.0 + 1.0 / f64::from(digit)).log10();
                (digit, observed, expected)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_is_removed_but_letters_kept() {
        assert_eq!(strip_punctuation("4,021"), "4021");
        assert_eq!(strip_punctuation("(512),"), "512");
        assert_eq!(strip_punctuation("$1.50"), "1.50");
        assert_eq!(strip_punctuation("12kg"), "12kg");
    }

    #[test]
    fn leading_zeros_are_not_significant() {
        assert_eq!(leading_digit("0042"), Some(4));
        assert_eq!(leading_digit("7"), Some(7));
        assert_eq!(leading_digit("000"), None);
        assert_eq!(leading_digit("0"), None);
    }

    #[test]
    fn non_numeric_tokens_do_not_qualify() {
        assert_eq!(leading_digit("units"), None);
        assert_eq!(leading_digit("3rd"), None);
        assert_eq!(leading_digit("1e5"), None);
        assert_eq!(leading_digit("..."), None);
        assert_eq!(leading_digit(""), None);
        // Arabic-Indic digits are numeric in Unicode but not decimal ASCII.
        assert_eq!(leading_digit("\u{0664}\u{0662}"), None);
    }

    #[test]
    fn separators_are_dropped_but_decimals_are_skipped() {
        assert_eq!(leading_digit("4,021"), Some(4));
        assert_eq!(leading_digit("-17"), Some(1));
        assert_eq!(leading_digit("40.21"), None);
        assert_eq!(leading_digit("0.05"), None);
        assert_eq!(leading_digit("99."), None);
    }

    #[test]
    fn scenario_page_counts_three_tokens() {
        let h = tally_page("Revenue was 4021 and costs 512, with 99 units.");
        assert_eq!(h.count(4), 1);
        assert_eq!(h.count(5), 1);
        assert_eq!(h.count(9), 1);
        assert_eq!(h.total(), 3);
        for d in [1, 2, 3, 6, 7, 8] {
            assert_eq!(h.count(d), 0, "digit {}", d);
        }
    }

    #[test]
    fn all_zero_tokens_leave_histogram_unchanged() {
        let h = tally_page("000 0 00.0");
        assert_eq!(h, DigitHistogram::new());
    }

    #[test]
    fn total_matches_qualifying_tokens() {
        let text = "1 22 333 abc 0 0x1F 0050 9.9 a1 77%";
        let qualifying = text
            .split_whitespace()
            .filter(|t| leading_digit(t).is_some())
            .count() as u64;
        assert_eq!(tally_page(text).total(), qualifying);
        assert_eq!(qualifying, 5);
    }

    #[test]
    fn pages_accumulate_into_one_histogram() {
        let h = tally_pages(["1 2 3", "1 1", "", "9"]);
        assert_eq!(h.count(1), 3);
        assert_eq!(h.count(2), 1);
        assert_eq!(h.count(3), 1);
        assert_eq!(h.count(9), 1);
        assert_eq!(h.total(), 6);
    }

    #[test]
    fn record_ignores_out_of_range_digits() {
        let mut h = DigitHistogram::new();
        h.record(0);
        h.record(10);
        assert_eq!(h.total(), 0);
        assert_eq!(h.count(0), 0);
    }

    #[test]
    fn report_renders_fixed_layout() {
        let report = BenfordReport::new(
            1,
            tally_page("Revenue was 4021 and costs 512, with 99 units."),
        );
        assert_eq!(
            report.render(),
            "1 pages\n0 0\n1 0\n2 0\n3 0\n4 1\n5 1\n6 0\n7 0\n8 0\n9 1\n"
        );
    }

    #[test]
    fn report_parses_rendered_text() {
        let report = BenfordReport::new(3, tally_pages(["11 2", "300 45"]));
        let parsed = BenfordReport::parse(&report.render()).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn report_parse_rejects_missing_zero_line() {
        let err = BenfordReport::parse("1 pages\n1 0\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedReport(_)));
    }

    #[test]
    fn distribution_expected_shares_follow_benford() {
        let report = BenfordReport::new(1, DigitHistogram::new());
        let dist = report.distribution();
        assert_eq!(dist.len(), 9);
        assert!((dist[0].2 - 0.30103).abs() < 1e-4);
        assert!((dist[8].2 - 0.04576).abs() < 1e-4);
        assert!(dist.iter().all(|(_, observed, _)| *observed == 0.0));
    }
}

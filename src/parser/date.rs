//! Date header normalization.
//!
//! A permissive chrono-based parse is tried first. When it fails, an
//! ordered table of repair rules, each matching one malformed shape seen
//! from real mail servers, rewrites the input (or parses it with an explicit
//! template) and the permissive parse is retried once.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::{HeaderError, Result};

const HMS: &str = r"[0-9]{1,2}:[0-9]{1,2}:[0-9]{1,2}";
const OFFSET: &str = r"[-|+][0-9]{4}";

const FORMATS: [&str; 9] = [
    "%d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S",
    "%b %d %H:%M:%S %Y",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Outcome of a repair rule.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Repair {
    /// Retry the permissive parse on this text.
    Rewrite(String),
    /// The rule parsed the date itself.
    Parsed(DateTime<Utc>),
}

struct RepairRule {
    name: &'static str,
    patterns: Vec<Regex>,
    apply: fn(&str) -> Result<Repair>,
}

impl RepairRule {
    fn new(name: &'static str, patterns: &[String], apply: fn(&str) -> Result<Repair>) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i)(?:{p})+$")).expect("valid date pattern"))
            .collect();
        Self {
            name,
            patterns,
            apply,
        }
    }

    fn matches(&self, input: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(input))
    }
}

/// Evaluated top to bottom; the first matching rule wins.
static REPAIR_RULES: Lazy<Vec<RepairRule>> = Lazy::new(|| {
    let localized = format!(r"[A-Z]{{2,3}}\., [0-9]{{1,2}} [A-Z]{{2,3}}\. [0-9]{{4}} {HMS} {OFFSET}");
    vec![
        RepairRule::new(
            "dotted-stamp",
            &[r"[0-9]{4}\.[0-9]{1,2}\.[0-9]{1,2}-[0-9]{1,2}\.[0-9]{1,2}.[0-9]{1,2}".to_string()],
            |s| parse_template(s, "%Y.%m.%d-%H.%M.%S").map(Repair::Parsed),
        ),
        RepairRule::new(
            "duplicated-stamp",
            &[format!(
                r"[0-9]{{2}} [A-Z]{{3}} [0-9]{{4}} {HMS} [+-][0-9]{{1,4}} {HMS} [+-][0-9]{{1,4}}"
            )],
            |s| {
                let mut parts: Vec<&str> = s.split(' ').collect();
                parts.truncate(parts.len().saturating_sub(2));
                Ok(Repair::Rewrite(parts.join(" ")))
            },
        ),
        RepairRule::new(
            "unknown-weekday",
            &[format!(r"[A-Z]{{2,4}}, [0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS} {OFFSET}")],
            |s| parse_template(after_first_comma(s).trim(), "%d %b %Y %H:%M:%S %z").map(Repair::Parsed),
        ),
        RepairRule::new(
            "bare-ut",
            &[
                format!(r"[0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS} UT"),
                format!(r"[A-Z]{{2,3}}, [0-9]{{1,2}} [A-Z]{{2,3}} ([0-9]{{2}}|[0-9]{{4}}) {HMS} UT"),
            ],
            |s| Ok(Repair::Rewrite(format!("{s}C"))),
        ),
        RepairRule::new(
            "duplicated-comma",
            &[format!(r"[A-Z]{{2,3}}, [0-9]{{1,2}}, [A-Z]{{2,3}} [0-9]{{4}} {HMS} {OFFSET}")],
            |s| Ok(Repair::Rewrite(s.replace(',', ""))),
        ),
        RepairRule::new(
            "localized-with-zone-name",
            &[format!(
                r"({localized} \([A-Z]{{3,4}}\))(/({localized} \([A-Z]{{3,4}}\))+)?"
            )],
            |s| {
                let first = after_first_comma(s.split('/').next().unwrap_or(s)).trim();
                let without_zone = first.rsplit_once(' ').map_or(first, |(head, _)| head);
                parse_localized(without_zone.trim()).map(Repair::Parsed)
            },
        ),
        RepairRule::new(
            "localized-pair",
            &[format!(r"({localized})/({localized})")],
            |s| {
                let first = after_first_comma(s.split('/').next().unwrap_or(s)).trim();
                parse_localized(first).map(Repair::Parsed)
            },
        ),
        RepairRule::new(
            "trailing-comment",
            &[
                format!(r"[A-Z]{{2,3}}, [0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS} \+[0-9]{{2,4}} \(\+[0-9]{{1,2}}\)"),
                format!(r"[A-Z]{{2,3}}[,| ,] [0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS}.*"),
                format!(r"[A-Z]{{2,3}}, [0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS} {OFFSET} \(.*\)"),
                format!(r"[A-Z]{{2,3}},  [0-9]{{1,2}} [A-Z]{{2,3}} [0-9]{{4}} {HMS} {OFFSET} \(.*\)"),
                r"[0-9]{1,2} [A-Z]{2,3} [0-9]{2,4} [0-9]{2}:[0-9]{2}:[0-9]{2} [A-Z]{2} -[0-9]{2}:[0-9]{2} \([A-Z]{2,3} -[0-9]{2}:[0-9]{2}\)".to_string(),
            ],
            |s| Ok(Repair::Rewrite(strip_comment(s))),
        ),
    ]
});

/// `UT -03:00` style zone left over once a comment is removed.
static NAMED_OFFSET_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s[A-Z]{2,3}\s([+-][0-9]{2}):([0-9]{2})$").expect("valid regex"));

/// Localized month abbreviations that chrono's `%b` does not know
/// (German, Dutch, French, Spanish, Italian, Portuguese).
const LOCALIZED_MONTHS: [(&str, &str); 19] = [
    ("ene", "Jan"),
    ("gen", "Jan"),
    ("fev", "Feb"),
    ("mrz", "Mar"),
    ("mrt", "Mar"),
    ("avr", "Apr"),
    ("abr", "Apr"),
    ("mai", "May"),
    ("mei", "May"),
    ("mag", "May"),
    ("giu", "Jun"),
    ("lug", "Jul"),
    ("ago", "Aug"),
    ("set", "Sep"),
    ("okt", "Oct"),
    ("ott", "Oct"),
    ("out", "Oct"),
    ("dez", "Dec"),
    ("dic", "Dec"),
];

fn after_first_comma(s: &str) -> &str {
    s.split_once(',').map_or(s, |(_, rest)| rest)
}

fn strip_comment(s: &str) -> String {
    let head = s.split('(').next().unwrap_or(s).trim();
    NAMED_OFFSET_TAIL.replace(head, " ${1}${2}").into_owned()
}

/// Parse `15 Feb. 2022 06:52:44 +0100`, translating a localized month.
fn parse_localized(s: &str) -> Result<DateTime<Utc>> {
    let mut tokens: Vec<String> = s.split(' ').map(str::to_string).collect();
    if let Some(month) = tokens.get_mut(1) {
        let bare = month.trim_end_matches('.').to_lowercase();
        let english = LOCALIZED_MONTHS
            .iter()
            .find(|(local, _)| *local == bare)
            .map_or_else(|| title_case(&bare), |(_, en)| (*en).to_string());
        *month = format!("{english}.");
    }
    parse_template(&tokens.join(" "), "%d %b. %Y %H:%M:%S %z")
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Parse with one explicit chrono format; inputs without an offset are UTC.
fn parse_template(s: &str, fmt: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, fmt)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|_| HeaderError::date(s))
}

/// Parse a date header value, repairing known malformations.
///
/// ```
/// use mailhdr::parser::date::parse_date;
///
/// let dt = parse_date("04 Jan 2018 10:12:47 UT").unwrap();
/// assert_eq!(dt.to_rfc3339(), "2018-01-04T10:12:47+00:00");
/// ```
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let mut date = raw.replace("+0580", "+0530").trim().to_string();
    if date.contains("&nbsp;") {
        date = date.replace("&nbsp;", " ");
    }
    if date.contains(" UT ") {
        date = date.replace(" UT ", " UTC ");
    }

    if let Some(dt) = parse_permissive(&date) {
        return Ok(dt);
    }

    if let Some(rule) = REPAIR_RULES.iter().find(|rule| rule.matches(&date)) {
        debug!(rule = rule.name, date = %date, "Applying date repair rule");
        let repaired = (rule.apply)(&date).map_err(|_| HeaderError::date(raw))?;
        match repaired {
            Repair::Parsed(dt) => return Ok(dt),
            Repair::Rewrite(rewritten) => {
                if let Some(dt) = parse_permissive(&rewritten) {
                    return Ok(dt);
                }
                date = rewritten;
            }
        }
    }

    if date.chars().any(|c| c.is_ascii_digit()) {
        if let Some(dt) = mail_parser_date(&date) {
            trace!(date = %date, "Date parsed by mail-parser");
            return Ok(dt);
        }
    }

    Err(HeaderError::date(raw))
}

type Strategy = fn(&str) -> Option<DateTime<Utc>>;

/// Tried in order by [`parse_permissive`], each against every candidate
/// spelling of the input.
const STRATEGIES: [(&str, Strategy); 5] = [
    ("rfc2822", rfc2822),
    ("rfc3339", rfc3339),
    ("format-table", format_table),
    ("date-only", date_only),
    ("named-zone", named_zone),
];

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Zone abbreviations chrono's `%z` cannot read.
const NAMED_ZONES: [(&str, &str); 14] = [
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("GMT", "+0000"),
    ("UTC", "+0000"),
    ("UT", "+0000"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("JST", "+0900"),
];

/// `16-JUL-2025`: IMAP internal-date month.
static DASHED_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)-(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)-").expect("valid regex")
});

/// Parse a well-formed (or nearly well-formed) date without repair rules.
///
/// Inputs without an offset are taken as UTC.
pub fn parse_permissive(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    let no_weekday = strip_day_of_week(trimmed);
    let undashed = normalize_imap_date(&no_weekday);
    let mut candidates = vec![trimmed.to_string()];
    for candidate in [no_weekday, undashed] {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }

    STRATEGIES.iter().find_map(|(name, parse)| {
        let dt = candidates.iter().find_map(|c| parse(c.as_str()))?;
        trace!(strategy = *name, "Date parsed");
        Some(dt)
    })
}

fn rfc2822(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s).ok().map(|d| d.with_timezone(&Utc))
}

fn rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

fn format_table(s: &str) -> Option<DateTime<Utc>> {
    FORMATS.iter().find_map(|fmt| parse_template(s, fmt).ok())
}

fn date_only(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|day| Utc.from_utc_datetime(&day.and_time(chrono::NaiveTime::MIN)))
}

fn named_zone(s: &str) -> Option<DateTime<Utc>> {
    let (head, offset) = NAMED_ZONES.iter().find_map(|(name, offset)| {
        s.strip_suffix(name)
            .filter(|head| head.ends_with(' '))
            .map(|head| (head, offset))
    })?;
    let replaced = format!("{head}{offset}");
    FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&replaced, fmt).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// `mail-parser`'s lenient RFC 5322 date parser, fed a one-line message.
fn mail_parser_date(input: &str) -> Option<DateTime<Utc>> {
    let message = format!("Date: {input}\n\n");
    let parsed = mail_parser::MessageParser::default().parse(message.as_bytes())?;
    let stamp = parsed.date()?.to_rfc3339();
    rfc3339(&stamp)
}

/// `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    DASHED_MONTH
        .replacen(s, 1, |caps: &regex::Captures<'_>| {
            format!(" {} ", title_case(&caps[1].to_lowercase()))
        })
        .into_owned()
}

/// Strip a leading English weekday (`"Thu, "` or `"Thu "`).
fn strip_day_of_week(s: &str) -> String {
    WEEKDAYS
        .iter()
        .find_map(|day| {
            let rest = s.strip_prefix(day)?;
            rest.strip_prefix(',').or_else(|| rest.strip_prefix(' '))
        })
        .map_or_else(|| s.to_string(), |rest| rest.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn utc(input: &str) -> DateTime<Utc> {
        parse_date(input).unwrap_or_else(|e| panic!("{input}: {e}"))
    }

    fn hms(dt: DateTime<Utc>) -> (u32, u32, u32) {
        (dt.hour(), dt.minute(), dt.second())
    }

    #[test]
    fn test_rfc2822() {
        let dt = utc("Thu, 17 Jul 2025 10:30:00 +0200");
        assert_eq!(dt.to_rfc3339(), "2025-07-17T08:30:00+00:00");
    }

    #[test]
    fn test_without_day_of_week() {
        assert_eq!(hms(utc("17 Jul 2025 10:30:00 +0000")), (10, 30, 0));
    }

    #[test]
    fn test_named_tz() {
        assert_eq!(hms(utc("Thu, 17 Jul 2025 10:30:00 EST")), (15, 30, 0));
    }

    #[test]
    fn test_iso8601() {
        assert_eq!(hms(utc("2025-07-17T10:30:00+00:00")), (10, 30, 0));
    }

    #[test]
    fn test_imap_style() {
        let dt = utc("16-JUL-2025 03:01:03 +0000");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2025, 7, 16));
    }

    #[test]
    fn test_date_only() {
        let dt = utc("2001-02-03");
        assert_eq!(dt.to_rfc3339(), "2001-02-03T00:00:00+00:00");
    }

    #[test]
    fn test_short_offset_comment() {
        assert_eq!(hms(utc("Thu, 8 Nov 2018 08:54:58 -0200 (-02)")), (10, 54, 58));
    }

    #[test]
    fn test_bare_ut() {
        assert_eq!(hms(utc("04 Jan 2018 10:12:47 UT")), (10, 12, 47));
    }

    #[test]
    fn test_invalid_0580_offset() {
        assert_eq!(hms(utc("Sat, 31 Aug 2013 20:08:23 +0580")), (14, 38, 23));
    }

    #[test]
    fn test_windows_double_timezone() {
        assert_eq!(hms(utc("Mon, 20 Nov 2017 20:31:31 +0800 (GMT+8:00)")), (12, 31, 31));
    }

    #[test]
    fn test_server_commentary() {
        assert_eq!(hms(utc("Thu, 31 May 2018 18:15:00 +0800 (added by)")), (10, 15, 0));
    }

    #[test]
    fn test_dotted_stamp() {
        let dt = utc("2019.04.05-11.22.33");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2019, 4, 5));
        assert_eq!(hms(dt), (11, 22, 33));
    }

    #[test]
    fn test_localized_with_zone_name() {
        let input = "Di., 15 Feb. 2022 06:52:44 +0100 (MEZ)/Di., 15 Feb. 2022 06:52:44 +0100 (MEZ)";
        assert_eq!(hms(utc(input)), (5, 52, 44));
        let dt = utc("Mi., 23 Mai. 2025 09:48:37 +0200 (MESZ)");
        assert_eq!((dt.month(), dt.day()), (5, 23));
        assert_eq!(hms(dt), (7, 48, 37));

        let cases = [
            ("lu., 12 dic. 2022 06:27:14 +0100 (CET)", (2022, 12, 12)),
            ("lun., 16 ene. 2023 06:27:14 +0100 (CET)", (2023, 1, 16)),
            ("lun., 16 gen. 2023 06:27:14 +0100 (CET)", (2023, 1, 16)),
            ("ven., 15 set. 2023 06:27:14 +0100 (CET)", (2023, 9, 15)),
            ("di., 15 mrt. 2022 06:27:14 +0100 (CET)", (2022, 3, 15)),
            ("ven., 15 avr. 2022 06:27:14 +0100 (CET)", (2022, 4, 15)),
            ("qua., 12 out. 2022 06:27:14 +0100 (CET)", (2022, 10, 12)),
        ];
        for (input, ymd) in cases {
            let dt = utc(input);
            assert_eq!((dt.year(), dt.month(), dt.day()), ymd, "{input}");
            assert_eq!(hms(dt), (5, 27, 14), "{input}");
        }
    }

    #[test]
    fn test_failed_repair_reports_raw_input() {
        let raw = "lu., 12 xyz. 2022 06:27:14 +0100 (CET)";
        match parse_date(raw) {
            Err(HeaderError::DateParse { input }) => assert_eq!(input, raw),
            other => panic!("expected DateParse, got {other:?}"),
        }
    }

    #[test]
    fn test_localized_pair() {
        let input = "fr., 25 nov. 2022 06:27:14 +0100/fr., 25 nov. 2022 06:27:14 +0100";
        assert_eq!(hms(utc(input)), (5, 27, 14));
    }

    #[test]
    fn test_duplicated_stamp() {
        assert_eq!(hms(utc("10 Jan 2020 10:00:00 +0100 09:00:00 +0000")), (9, 0, 0));
    }

    #[test]
    fn test_duplicated_comma() {
        assert_eq!(hms(utc("Thu, 8, Nov 2018 08:54:58 -0200")), (10, 54, 58));
    }

    #[test]
    fn test_unknown_weekday() {
        assert_eq!(hms(utc("Sab, 31 Aug 2013 20:08:23 +0200")), (18, 8, 23));
    }

    #[test]
    fn test_named_offset_with_comment() {
        assert_eq!(hms(utc("Fri, 03 Jan 2020 10:00:00 UT -03:00 (ART -03:00)")), (13, 0, 0));
    }

    #[test]
    fn test_nbsp() {
        assert_eq!(hms(utc("Thu,&nbsp;17 Jul 2025 10:30:00 +0000")), (10, 30, 0));
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(
            parse_date("definitely not a date"),
            Err(HeaderError::DateParse { .. })
        ));
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_rule_order() {
        assert!(REPAIR_RULES[0].matches("2019.04.05-11.22.33"));
        assert!(!REPAIR_RULES[0].matches("Thu, 8 Nov 2018 08:54:58 -0200 (-02)"));
        let last = REPAIR_RULES.last().map(|r| r.name);
        assert_eq!(last, Some("trailing-comment"));
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("10:00:00 UT -03:00 (ART -03:00)"), "10:00:00 -0300");
        assert_eq!(strip_comment("10:00:00 +0800 (x)"), "10:00:00 +0800");
    }
}

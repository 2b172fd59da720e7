use {
    chrono::{
        format::{ParseError, ParseResult},
        naive::{NaiveDate, NaiveDateTime, NaiveTime},
        offset::{FixedOffset, Utc},
        DateTime,
    },
    lazy_static::lazy_static,
    regex::Regex,
    std::str::FromStr,
};

lazy_static! {
    /// ISO 8601 basic format as used by `x-amz-date`: `YYYYMMDD'T'HHMMSS'Z'`. No separators, no fractional
    /// seconds, UTC only.
    static ref AMZ_DATE_REGEX: Regex = Regex::new(
        r"(?x)^
        (?P<year>\d{4})
        (?P<month>0[1-9]|1[0-2])
        (?P<day>0[1-9]|[12][0-9]|3[01])
        T
        (?P<hour>[01][0-9]|2[0-3])
        (?P<minute>[0-5][0-9])
        (?P<second>[0-5][0-9])
        Z$").unwrap();

    static ref INVALID: ParseError = DateTime::<FixedOffset>::from_str("").unwrap_err();
}

/// Parsing of the two timestamp forms a signed S3 request may carry.
pub(crate) trait ParseRequestDate: Sized {
    /// Parse an `x-amz-date` value.
    fn parse_from_amz_date(s: &str) -> ParseResult<Self>;

    /// Parse an HTTP `Date` value (RFC 1123 / RFC 2822).
    fn parse_from_http_date(s: &str) -> ParseResult<Self>;
}

impl ParseRequestDate for DateTime<Utc> {
    fn parse_from_amz_date(s: &str) -> ParseResult<Self> {
        let Some(cap) = AMZ_DATE_REGEX.captures(s) else {
            return Err(*INVALID);
        };

        // The regex only admits ASCII digits in each group.
        let field = |name: &str| -> ParseResult<u32> {
            cap.name(name).and_then(|m| u32::from_str(m.as_str()).ok()).ok_or(*INVALID)
        };

        let year = field("year")? as i32;
        let naive_date = NaiveDate::from_ymd_opt(year, field("month")?, field("day")?).ok_or(*INVALID)?;
        let naive_time = NaiveTime::from_hms_opt(field("hour")?, field("minute")?, field("second")?).ok_or(*INVALID)?;

        Ok(DateTime::from_naive_utc_and_offset(NaiveDateTime::new(naive_date, naive_time), Utc))
    }

    fn parse_from_http_date(s: &str) -> ParseResult<Self> {
        // RFC 2822 parsing accepts the RFC 1123 `GMT` form HTTP clients send.
        let dt = DateTime::parse_from_rfc2822(s.trim())?;
        Ok(dt.with_timezone(&Utc))
    }
}

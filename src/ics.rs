use chrono::{
    DateTime, Duration, Local, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use thiserror::Error;
use tracing::debug;

/// Maximum content-line length before folding, in octets.
const FOLD_LIMIT: usize = 75;

#[derive(Debug, Error)]
pub enum IcsError {
    #[error("invalid content line: {0}")]
    InvalidLine(String),
    #[error("unbalanced BEGIN/END for {0}")]
    Unbalanced(String),
    #[error("no calendar component found")]
    MissingCalendar,
    #[error("invalid date value: {0}")]
    InvalidDate(String),
    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),
}

/// A DUE/DTSTART-style value. Bare dates are promoted to local midnight so
/// comparisons are always well-defined, but keep their date-ness so they
/// serialize back as VALUE=DATE.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateValue {
    pub dt: DateTime<Local>,
    pub date_only: bool,
}

impl DateValue {
    pub fn from_date(date: NaiveDate) -> Self {
        DateValue {
            dt: local_from_naive(date.and_time(NaiveTime::MIN)),
            date_only: true,
        }
    }

    pub fn from_datetime(dt: DateTime<Local>) -> Self {
        DateValue {
            dt,
            date_only: false,
        }
    }

    pub fn timestamp(&self) -> i64 {
        self.dt.timestamp()
    }

    pub fn from_timestamp(ts: i64, date_only: bool) -> Option<Self> {
        let dt = Local.timestamp_opt(ts, 0).single()?;
        Some(DateValue { dt, date_only })
    }
}

/// Resolve a naive local time, picking the earlier side of a DST fold.
pub(crate) fn local_from_naive(ndt: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&ndt) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(dt, _) => dt,
        // The time falls inside a DST gap; treat it as UTC.
        LocalResult::None => Local.from_utc_datetime(&ndt),
    }
}

/// One property line: `NAME;PARAM=V:value`.
///
/// The value is kept in its raw (escaped) form so unrecognized properties
/// survive a parse/serialize round trip untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl Property {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Property {
            name: name.to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params
            .push((key.to_ascii_uppercase(), value.to_string()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn parse(line: &str) -> Result<Self, IcsError> {
        let colon = find_unquoted(line, ':')
            .ok_or_else(|| IcsError::InvalidLine(line.to_string()))?;
        let value = line[colon + 1..].to_string();
        let mut head = split_unquoted(&line[..colon], ';').into_iter();
        let name = head
            .next()
            .map(|n| n.trim().to_ascii_uppercase())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IcsError::InvalidLine(line.to_string()))?;

        let params = head
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.trim().to_ascii_uppercase(), v.to_string()),
                None => (p.trim().to_ascii_uppercase(), String::new()),
            })
            .collect();

        Ok(Property {
            name,
            params,
            value,
        })
    }

    fn write(&self, out: &mut String) {
        let mut line = self.name.clone();
        for (key, value) in &self.params {
            line.push(';');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line.push(':');
        line.push_str(&self.value);
        fold_into(out, &line);
    }
}

/// A calendar component (VCALENDAR, VTODO, ...) holding property lines and
/// nested components in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Component {
    pub fn new(name: &str) -> Self {
        Component {
            name: name.to_ascii_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn prop(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn props<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Property> {
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn prop_value(&self, name: &str) -> Option<&str> {
        self.prop(name).map(|p| p.value.as_str())
    }

    /// Drop every instance of a property. Setting a field always clears the
    /// old value node first; absent values are never written back.
    pub fn remove_prop(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    pub fn push_prop(&mut self, prop: Property) {
        self.properties.push(prop);
    }

    pub fn subcomponents<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Component> {
        self.components
            .iter()
            .filter(move |c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn to_ics(&self) -> String {
        let mut out = String::new();
        self.write(&mut out);
        out
    }

    fn write(&self, out: &mut String) {
        fold_into(out, &format!("BEGIN:{}", self.name));
        for prop in &self.properties {
            prop.write(out);
        }
        for comp in &self.components {
            comp.write(out);
        }
        fold_into(out, &format!("END:{}", self.name));
    }
}

/// Create an empty calendar wrapper for newly written files.
pub fn new_calendar() -> Component {
    let mut cal = Component::new("VCALENDAR");
    cal.push_prop(Property::new("VERSION", "2.0"));
    cal.push_prop(Property::new("PRODID", "-//tdo//EN"));
    cal
}

/// Parse an iCalendar document into its top-level component.
pub fn parse(text: &str) -> Result<Component, IcsError> {
    let mut stack: Vec<Component> = Vec::new();
    let mut root: Option<Component> = None;

    for line in unfold(text) {
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_prefix("BEGIN:") {
            stack.push(Component::new(name.trim()));
        } else if let Some(name) = line.strip_prefix("END:") {
            let comp = stack
                .pop()
                .ok_or_else(|| IcsError::Unbalanced(name.trim().to_string()))?;
            if !comp.name.eq_ignore_ascii_case(name.trim()) {
                return Err(IcsError::Unbalanced(name.trim().to_string()));
            }
            match stack.last_mut() {
                Some(parent) => parent.components.push(comp),
                None if root.is_none() => root = Some(comp),
                // Trailing top-level components are not valid; keep the first.
                None => return Err(IcsError::Unbalanced(comp.name)),
            }
        } else {
            let prop = Property::parse(&line)?;
            stack
                .last_mut()
                .ok_or_else(|| IcsError::InvalidLine(line.clone()))?
                .push_prop(prop);
        }
    }

    if let Some(open) = stack.pop() {
        return Err(IcsError::Unbalanced(open.name));
    }
    root.ok_or(IcsError::MissingCalendar)
}

/// Undo RFC 5545 line folding; accepts CRLF or LF endings.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = line.strip_prefix(' ').or_else(|| line.strip_prefix('\t')) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(line.to_string());
    }
    lines
}

fn fold_into(out: &mut String, line: &str) {
    let mut rest = line;
    let mut budget = FOLD_LIMIT;
    while rest.len() > budget {
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        budget = FOLD_LIMIT - 1;
    }
    out.push_str(rest);
    out.push_str("\r\n");
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Escape a TEXT value per RFC 5545 §3.3.11.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

pub fn unescape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a TEXT list value (e.g. CATEGORIES) on unescaped commas.
pub fn split_text_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push('\\');
                    current.push(next);
                }
            }
            ',' => {
                items.push(unescape_text(current.trim()));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(unescape_text(current.trim()));
    }
    items
}

pub fn join_text_list(items: &[String]) -> String {
    items
        .iter()
        .map(|i| escape_text(i))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build a DUE/DTSTART property, writing datetimes in UTC and dates with
/// VALUE=DATE.
pub fn date_property(name: &str, value: &DateValue) -> Property {
    if value.date_only {
        Property::new(name, value.dt.date_naive().format("%Y%m%d").to_string())
            .with_param("VALUE", "DATE")
    } else {
        Property::new(
            name,
            value
                .dt
                .with_timezone(&Utc)
                .format("%Y%m%dT%H%M%SZ")
                .to_string(),
        )
    }
}

/// Build a datetime-only property (DTSTAMP, CREATED, COMPLETED, ...).
pub fn datetime_property(name: &str, dt: &DateTime<Local>) -> Property {
    Property::new(
        name,
        dt.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ").to_string(),
    )
}

pub fn parse_date_prop(prop: &Property) -> Result<DateValue, IcsError> {
    let force_date = prop
        .param("VALUE")
        .map(|v| v.eq_ignore_ascii_case("DATE"))
        .unwrap_or(false);
    if prop.param("TZID").is_some() {
        // Without a tz database the named zone cannot be resolved; treat the
        // wall time as local.
        debug!(name = %prop.name, "TZID parameter ignored, assuming local time");
    }
    parse_date_value(prop.value.trim(), force_date)
}

/// Parse a datetime property, promoting a bare date to local midnight.
pub fn parse_datetime_prop(prop: &Property) -> Result<DateTime<Local>, IcsError> {
    Ok(parse_date_prop(prop)?.dt)
}

fn parse_date_value(raw: &str, force_date: bool) -> Result<DateValue, IcsError> {
    if force_date || (raw.len() == 8 && !raw.contains('T')) {
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map_err(|_| IcsError::InvalidDate(raw.to_string()))?;
        return Ok(DateValue::from_date(date));
    }
    if let Some(stripped) = raw.strip_suffix('Z') {
        let ndt = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
            .map_err(|_| IcsError::InvalidDate(raw.to_string()))?;
        return Ok(DateValue {
            dt: ndt.and_utc().with_timezone(&Local),
            date_only: false,
        });
    }
    let ndt = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .map_err(|_| IcsError::InvalidDate(raw.to_string()))?;
    Ok(DateValue {
        dt: local_from_naive(ndt),
        date_only: false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// The slice of RRULE this tool understands: enough to shift a completed
/// recurring todo one period forward. The raw rule text is carried through
/// files verbatim; this type is only built when advancing.
#[derive(Debug, Clone, PartialEq)]
pub struct Rrule {
    pub freq: Frequency,
    pub interval: u32,
    pub until: Option<DateValue>,
    pub count: Option<u32>,
}

impl Rrule {
    pub fn parse(rule: &str) -> Result<Self, IcsError> {
        let mut freq = None;
        let mut interval = 1u32;
        let mut until = None;
        let mut count = None;

        for part in rule.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| IcsError::InvalidRule(rule.to_string()))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match value.to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        _ => return Err(IcsError::InvalidRule(rule.to_string())),
                    });
                }
                "INTERVAL" => {
                    interval = value
                        .parse::<u32>()
                        .ok()
                        .filter(|i| *i > 0)
                        .ok_or_else(|| IcsError::InvalidRule(rule.to_string()))?;
                }
                "UNTIL" => {
                    until = Some(parse_date_value(value, value.len() == 8)?);
                }
                "COUNT" => {
                    count = value.parse::<u32>().ok();
                }
                // BYDAY and friends are preserved in the raw rule but do not
                // affect single-step advancement.
                _ => {}
            }
        }

        Ok(Rrule {
            freq: freq.ok_or_else(|| IcsError::InvalidRule(rule.to_string()))?,
            interval,
            until,
            count,
        })
    }

    /// The next occurrence after `value`, or None when the rule is exhausted.
    pub fn advance(&self, value: DateValue) -> Option<DateValue> {
        let next = match self.freq {
            Frequency::Daily => value.dt + Duration::days(i64::from(self.interval)),
            Frequency::Weekly => value.dt + Duration::days(7 * i64::from(self.interval)),
            Frequency::Monthly => value.dt.checked_add_months(Months::new(self.interval))?,
            Frequency::Yearly => value
                .dt
                .checked_add_months(Months::new(12 * self.interval))?,
        };
        if let Some(until) = &self.until {
            if next > until.dt {
                return None;
            }
        }
        Some(DateValue {
            dt: next,
            date_only: value.date_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SIMPLE: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:abc\r\nSUMMARY:do the thing\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";

    #[test]
    fn parses_a_minimal_calendar() {
        let cal = parse(SIMPLE).unwrap();
        assert_eq!(cal.name, "VCALENDAR");
        let todo = cal.subcomponents("VTODO").next().unwrap();
        assert_eq!(todo.prop_value("UID"), Some("abc"));
        assert_eq!(todo.prop_value("SUMMARY"), Some("do the thing"));
    }

    #[test]
    fn accepts_lf_endings_and_folded_lines() {
        let text = "BEGIN:VCALENDAR\nBEGIN:VTODO\nSUMMARY:a long\n  summary\nEND:VTODO\nEND:VCALENDAR\n";
        let cal = parse(text).unwrap();
        let todo = cal.subcomponents("VTODO").next().unwrap();
        assert_eq!(todo.prop_value("SUMMARY"), Some("a long summary"));
    }

    #[test]
    fn property_params_survive_quoting() {
        let prop = Property::parse("ATTENDEE;CN=\"Smith; Jane\";ROLE=CHAIR:mailto:x@y").unwrap();
        assert_eq!(prop.name, "ATTENDEE");
        assert_eq!(prop.param("CN"), Some("\"Smith; Jane\""));
        assert_eq!(prop.value, "mailto:x@y");
    }

    #[test]
    fn unknown_properties_round_trip() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nX-APPLE-SORT-ORDER:42\r\nSUMMARY:x\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        let cal = parse(text).unwrap();
        let out = cal.to_ics();
        let reparsed = parse(&out).unwrap();
        let todo = reparsed.subcomponents("VTODO").next().unwrap();
        assert_eq!(todo.prop_value("X-APPLE-SORT-ORDER"), Some("42"));
    }

    #[test]
    fn long_lines_fold_and_unfold() {
        let summary = "x".repeat(300);
        let mut todo = Component::new("VTODO");
        todo.push_prop(Property::new("SUMMARY", summary.clone()));
        let out = todo.to_ics();
        assert!(out.lines().all(|l| l.len() <= FOLD_LIMIT));
        let reparsed = parse(&out).unwrap();
        assert_eq!(reparsed.prop_value("SUMMARY"), Some(summary.as_str()));
    }

    #[test]
    fn unbalanced_component_is_an_error() {
        assert!(parse("BEGIN:VCALENDAR\r\nBEGIN:VTODO\r\nEND:VCALENDAR\r\n").is_err());
    }

    #[test]
    fn text_escaping_round_trips() {
        let original = "semi; comma, back\\slash\nnewline";
        assert_eq!(unescape_text(&escape_text(original)), original);
    }

    #[test]
    fn category_lists_split_on_unescaped_commas() {
        let items = split_text_list("home,errands\\, urgent,work");
        assert_eq!(items, vec!["home", "errands, urgent", "work"]);
    }

    #[test]
    fn parses_date_and_datetime_values() {
        let date = Property::new("DUE", "20240301").with_param("VALUE", "DATE");
        let parsed = parse_date_prop(&date).unwrap();
        assert!(parsed.date_only);
        assert_eq!(parsed.dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let utc = Property::new("DUE", "20240301T120000Z");
        let parsed = parse_date_prop(&utc).unwrap();
        assert!(!parsed.date_only);
        assert_eq!(parsed.dt.with_timezone(&Utc).format("%H%M").to_string(), "1200");
    }

    #[test]
    fn serialized_dates_keep_their_dateness() {
        let value = DateValue::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let prop = date_property("DUE", &value);
        assert_eq!(prop.param("VALUE"), Some("DATE"));
        assert_eq!(prop.value, "20240301");
        assert_eq!(parse_date_prop(&prop).unwrap(), value);
    }

    #[test]
    fn daily_rule_advances_one_day() {
        let rule = Rrule::parse("FREQ=DAILY").unwrap();
        let start = DateValue::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let next = rule.advance(start).unwrap();
        assert_eq!(next.dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(next.date_only);
    }

    #[test]
    fn interval_and_monthly_rules() {
        let rule = Rrule::parse("FREQ=WEEKLY;INTERVAL=2").unwrap();
        let start = DateValue::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let next = rule.advance(start).unwrap();
        assert_eq!(next.dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());

        let rule = Rrule::parse("FREQ=MONTHLY").unwrap();
        let next = rule.advance(start).unwrap();
        assert_eq!(next.dt.date_naive(), NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
    }

    #[test]
    fn until_bound_exhausts_the_rule() {
        let rule = Rrule::parse("FREQ=DAILY;UNTIL=20240302").unwrap();
        let start = DateValue::from_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(rule.advance(start).is_some());
        let late = DateValue::from_date(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert!(rule.advance(late).is_none());
    }

    #[test]
    fn rule_without_freq_is_invalid() {
        assert!(Rrule::parse("INTERVAL=2").is_err());
        assert!(Rrule::parse("FREQ=HOURLY").is_err());
    }
}

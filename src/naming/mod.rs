//! Meeting metadata extraction and artifact naming conventions.
//!
//! Meeting titles on the source listing carry the committee name, the
//! session type, and usually a time range. Delivered files follow the
//! `YYYYMMDD-<TYPE>-<COMMITTEE>-<START>-<END>` convention and archive
//! uploads are grouped under a committee/date hierarchy.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use tracing::warn;

/// Known committee names and shorthands, matched against lowercased
/// titles. Longest-prefix wins is not needed; first hit is fine because
/// the shorthand entries are unambiguous.
const COMMITTEE_ACRONYMS: &[(&str, &str)] = &[
    ("house appropriations", "HAFC"),
    ("hafc", "HAFC"),
    ("house education", "HEC"),
    ("hec", "HEC"),
    ("house judiciary", "HJC"),
    ("hjc", "HJC"),
    ("house taxation", "HTRC"),
    ("htrc", "HTRC"),
    ("senate conservation", "SCONC"),
    ("sconc", "SCONC"),
    ("senate education", "SEC"),
    ("senate finance", "SFC"),
    ("sfc", "SFC"),
    ("senate judiciary", "SJC"),
    ("sjc", "SJC"),
    ("senate rules", "SRC"),
    ("src", "SRC"),
    ("legislative council", "ALC"),
    ("alc", "ALC"),
    ("courts corrections", "CCJ"),
    ("ccj", "CCJ"),
    ("indian affairs", "IAC"),
    ("iac", "IAC"),
    ("legislative education study", "LESC"),
    ("lesc", "LESC"),
    ("legislative finance", "LFC"),
    ("lfc", "LFC"),
    ("legislative health and human services", "LHHS"),
    ("lhhs", "LHHS"),
    ("military and veterans", "MVAC"),
    ("mvac", "MVAC"),
    ("radioactive and hazardous materials", "RHMC"),
    ("rhmc", "RHMC"),
    ("revenue stabilization", "RSTP"),
    ("rstp", "RSTP"),
    ("science technology", "STTC"),
    ("sttc", "STTC"),
    ("water and natural resources", "WNR"),
    ("water natural resources", "WNR"),
    ("wnr", "WNR"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Interim,
    House,
    Senate,
}

impl SessionType {
    /// Filename component for this session type.
    pub fn prefix(&self) -> &'static str {
        match self {
            SessionType::Interim => "IC",
            SessionType::House => "HOUSE",
            SessionType::Senate => "SENATE",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Naming metadata for one meeting, derived entirely from its title and
/// date.
#[derive(Debug, Clone)]
pub struct MeetingMeta {
    pub committee: String,
    pub session_type: SessionType,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub base_name: String,
}

impl MeetingMeta {
    pub fn from_title(title: &str, meeting_start: NaiveDateTime) -> Self {
        let session_type = detect_session_type(title);
        let committee = extract_committee_acronym(title);
        let (start_time, end_time) = extract_time_range(title, meeting_start);
        let date = meeting_start.date();

        let base_name = format!(
            "{}-{}-{}-{}-{}",
            date.format("%Y%m%d"),
            session_type.prefix(),
            committee,
            start_time,
            end_time
        );

        Self {
            committee,
            session_type,
            date,
            start_time,
            end_time,
            base_name,
        }
    }

    /// Archive hierarchy for this meeting's rendered files.
    ///
    /// Interim: `Interim/<committee>/<yyyy-mm-dd>/captions`
    /// Session: `Session/<HOUSE|SENATE>/<committee>/<yyyy-mm-dd>/captions`
    pub fn archive_subpath(&self) -> String {
        let date = self.date.format("%Y-%m-%d");
        match self.session_type {
            SessionType::Interim => format!("Interim/{}/{}/captions", self.committee, date),
            _ => format!(
                "Session/{}/{}/{}/captions",
                self.session_type.prefix(),
                self.committee,
                date
            ),
        }
    }

    /// Manifest location next to the captions folder.
    pub fn manifest_subpath(&self) -> String {
        let date = self.date.format("%Y-%m-%d");
        match self.session_type {
            SessionType::Interim => {
                format!("Interim/{}/{}/manifests/manifest.json", self.committee, date)
            }
            _ => format!(
                "Session/{}/{}/{}/manifests/manifest.json",
                self.session_type.prefix(),
                self.committee,
                date
            ),
        }
    }

    pub fn date_display(&self) -> String {
        self.date.format("%B %d, %Y").to_string()
    }

    pub fn time_display(&self) -> String {
        format!("{} - {}", self.start_time, self.end_time)
    }
}

pub fn detect_session_type(title: &str) -> SessionType {
    let normalized = title.to_lowercase().replace(" - ", " ").replace('-', " ");

    if normalized.contains("interim") || normalized.starts_with("ic ") {
        return SessionType::Interim;
    }
    if normalized.contains("house") {
        return SessionType::House;
    }
    if normalized.contains("senate") {
        return SessionType::Senate;
    }

    warn!("Could not determine session type for '{title}', defaulting to interim");
    SessionType::Interim
}

pub fn extract_committee_acronym(title: &str) -> String {
    let normalized = title.to_lowercase().replace(" - ", " ").replace('-', " ");

    for (name, acronym) in COMMITTEE_ACRONYMS {
        if normalized.contains(name) {
            return acronym.to_string();
        }
    }

    // An uppercase token that is itself a known acronym.
    let token_pattern = Regex::new(r"\b([A-Z]{2,5})\b").expect("acronym pattern");
    if let Some(captures) = token_pattern.captures(title) {
        let token = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if COMMITTEE_ACRONYMS.iter().any(|(_, a)| *a == token) {
            return token.to_string();
        }
    }

    // Build one from capitalized title words as a last resort.
    let initials: String = title
        .split_whitespace()
        .filter(|w| w.len() > 2 && w.chars().next().is_some_and(|c| c.is_uppercase()))
        .take(3)
        .filter_map(|w| w.chars().next())
        .collect();

    if initials.is_empty() {
        warn!("Could not extract committee from '{title}'");
        "UNKNOWN".to_string()
    } else {
        initials
    }
}

/// Start/end times in `837AM` shape, from the title's time range when it
/// has one, else inferred from the meeting start with a two-hour default
/// duration.
pub fn extract_time_range(title: &str, meeting_start: NaiveDateTime) -> (String, String) {
    let pattern =
        Regex::new(r"(?i)(\d{1,2})[:\s]?(\d{2})\s*(AM|PM)\s*-\s*(\d{1,2})[:\s]?(\d{2})\s*(AM|PM)")
            .expect("time range pattern");

    if let Some(c) = pattern.captures(title) {
        let start = format!("{}{}{}", &c[1], &c[2], c[3].to_uppercase());
        let end = format!("{}{}{}", &c[4], &c[5], c[6].to_uppercase());
        return (start, end);
    }

    let start = compact_time(meeting_start);
    let end = compact_time(meeting_start.with_hour((meeting_start.hour() + 2) % 24).unwrap_or(meeting_start));
    (start, end)
}

fn compact_time(at: NaiveDateTime) -> String {
    let formatted = at.format("%I%M%p").to_string();
    formatted.trim_start_matches('0').to_string()
}

/// Parse the meeting date and start time from entry text like
/// `House - Appropriations... 1:34 PM-5:35 PM\nMon, Jan 12, 2026`.
pub fn parse_meeting_datetime(entry_text: &str) -> Option<NaiveDateTime> {
    let date_pattern =
        Regex::new(r"(?i)(Mon|Tue|Wed|Thu|Fri|Sat|Sun),?\s+(\w+)\s+(\d{1,2}),?\s+(\d{4})")
            .expect("date pattern");
    let time_pattern = Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*(AM|PM)").expect("time pattern");

    let date_captures = date_pattern.captures(entry_text)?;
    let month = month_number(&date_captures[2])?;
    let day: u32 = date_captures[3].parse().ok()?;
    let year: i32 = date_captures[4].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    // Default start when the text carries no time.
    let (mut hour, mut minute) = (9u32, 0u32);
    if let Some(t) = time_pattern.captures(entry_text) {
        hour = t[1].parse().ok()?;
        minute = t[2].parse().ok()?;
        let pm = t[3].eq_ignore_ascii_case("pm");
        if pm && hour < 12 {
            hour += 12;
        } else if !pm && hour == 12 {
            hour = 0;
        }
    }

    date.and_hms_opt(hour, minute, 0)
}

fn month_number(name: &str) -> Option<u32> {
    let key = name.to_lowercase();
    let key = key.get(0..3)?;
    const MONTHS: &[(&str, u32)] = &[
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
    ];
    MONTHS.iter().find(|(n, _)| *n == key).map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn interim_title_builds_interim_base_name() {
        let meta = MeetingMeta::from_title(
            "IC - Legislative Finance (Room 307) 8:37 AM - 11:53 AM",
            dt(2026, 11, 20, 8, 37),
        );

        assert_eq!(meta.committee, "LFC");
        assert_eq!(meta.session_type, SessionType::Interim);
        assert_eq!(meta.base_name, "20261120-IC-LFC-837AM-1153AM");
        assert_eq!(meta.archive_subpath(), "Interim/LFC/2026-11-20/captions");
    }

    #[test]
    fn house_title_uses_session_hierarchy() {
        let meta = MeetingMeta::from_title(
            "HAFC - House Appropriations and Finance Committee 1:00 PM - 3:00 PM",
            dt(2026, 10, 1, 13, 0),
        );

        assert_eq!(meta.committee, "HAFC");
        assert_eq!(meta.session_type, SessionType::House);
        assert_eq!(
            meta.archive_subpath(),
            "Session/HOUSE/HAFC/2026-10-01/captions"
        );
        assert_eq!(
            meta.manifest_subpath(),
            "Session/HOUSE/HAFC/2026-10-01/manifests/manifest.json"
        );
    }

    #[test]
    fn missing_time_range_is_inferred_from_start() {
        let meta = MeetingMeta::from_title("Senate Judiciary Committee Meeting", dt(2026, 10, 1, 14, 16));

        assert_eq!(meta.session_type, SessionType::Senate);
        assert_eq!(meta.committee, "SJC");
        assert_eq!(meta.start_time, "216PM");
        assert_eq!(meta.end_time, "416PM");
    }

    #[test]
    fn unknown_committee_falls_back_to_initials() {
        let acronym = extract_committee_acronym("Special Working Group on Broadband");
        assert_eq!(acronym, "SWG");
    }

    #[test]
    fn entry_text_datetime_parses_date_and_time() {
        let parsed = parse_meeting_datetime(
            "House - Appropriations and Finance 1:34 PM-5:35 PM\nMon, Jan 12, 2026",
        )
        .unwrap();

        assert_eq!(parsed, dt(2026, 1, 12, 13, 34));
    }

    #[test]
    fn entry_text_without_time_defaults_to_nine() {
        let parsed = parse_meeting_datetime("Interim - Water meeting\nWed, Dec 9, 2026").unwrap();
        assert_eq!(parsed, dt(2026, 12, 9, 9, 0));
    }

    #[test]
    fn unparseable_entry_text_is_none() {
        assert!(parse_meeting_datetime("no date here").is_none());
    }
}

//! Best-effort parsing of course display names.
//!
//! Course names are free text typed by institutions. Typical shapes:
//!
//! - `Cálculo I (MAT101) - Sección 2 - 2024 - 1`
//! - `Databases (CS340) - 2023 - 2`
//! - `Physics (PHY1) - Lab A - 2024 - Fall`
//! - `[ONLINE] Course: Ethics (PHI200)`
//!
//! Parsing never fails. Unknown shapes fall back to the raw name with the
//! current year and first semester.

use std::sync::OnceLock;

use chrono::Datelike;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const PREFIXES: &[&str] = &[
    "Course:",
    "Curso:",
    "Class:",
    "Clase:",
    "[ONLINE]",
    "[PRESENCIAL]",
    "[HYBRID]",
];

/// Earliest accepted course year.
const MIN_YEAR: i32 = 2008;

/// Structured view of a course name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCourse {
    pub subject: String,
    pub code: Option<String>,
    pub section: Option<String>,
    pub year: i32,
    pub semester: u8,
    /// 0.0 to 1.0, higher for more specific matches.
    pub confidence: f32,
    /// Name of the pattern that matched.
    pub pattern: String,
}

impl ParsedCourse {
    /// `Subject (CODE) Section`, used as the course folder name.
    pub fn display_name(&self) -> String {
        let mut name = self.subject.clone();
        if let Some(code) = &self.code {
            name.push_str(&format!(" ({})", code));
        }
        if let Some(section) = &self.section {
            name.push(' ');
            name.push_str(section);
        }
        name
    }

    pub fn semester_folder(&self) -> String {
        format!("{} Semester", self.semester)
    }
}

#[derive(Clone, Copy)]
enum Shape {
    Full,
    NoSection,
    SemesterName,
    NoYear,
    AltSeparators,
    YearSemesterEnd,
    CodeOnly,
}

struct Pattern {
    name: &'static str,
    shape: Shape,
    confidence: f32,
    regex: Regex,
}

fn patterns() -> &'static [Pattern] {
    static PATTERNS: OnceLock<Vec<Pattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let defs: [(&str, Shape, f32, &str); 7] = [
            (
                "standard_full",
                Shape::Full,
                0.95,
                r"^(.+?)\s*\(([^)]+)\)\s*-\s*(.+?)\s*-\s*(\d{4})\s*-\s*(\d)$",
            ),
            (
                "no_section",
                Shape::NoSection,
                0.9,
                r"^(.+?)\s*\(([^)]+)\)\s*-\s*(\d{4})\s*-\s*(\d)$",
            ),
            (
                "semester_name",
                Shape::SemesterName,
                0.85,
                r"(?i)^(.+?)\s*\(([^)]+)\)\s*-\s*(?:(.+?)\s*-\s*)?(\d{4})\s*-\s*(spring|fall|autumn|summer|winter|primavera|otoño|verano|invierno)$",
            ),
            (
                "no_year",
                Shape::NoYear,
                0.8,
                r"^(.+?)\s*\(([^)]+)\)\s*-\s*(.+?)\s*-\s*([1-4])$",
            ),
            (
                "alternative_separators",
                Shape::AltSeparators,
                0.75,
                r"^(.+?)\s*\(([^)]+)\)\s*[|;]\s*(.+?)\s*[|;]\s*(\d{4})\s*[|;]\s*(\d)$",
            ),
            (
                "year_semester_end",
                Shape::YearSemesterEnd,
                0.7,
                r"^(.+?)\s*-\s*(\d{4})\s*-\s*([1-4])$",
            ),
            (
                "subject_code_only",
                Shape::CodeOnly,
                0.6,
                r"^(.+?)\s*\(([^)]+)\)\s*(.*)$",
            ),
        ];

        defs.into_iter()
            .map(|(name, shape, confidence, re)| Pattern {
                name,
                shape,
                confidence,
                regex: Regex::new(re).expect("course pattern is a valid regex"),
            })
            .collect()
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(20\d{2})\b").expect("year pattern is a valid regex"))
}

fn semester_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([1-4])\b").expect("semester pattern is a valid regex"))
}

fn code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)").expect("code pattern is a valid regex"))
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}

fn semester_from_name(name: &str) -> u8 {
    match name.to_lowercase().as_str() {
        "spring" | "primavera" => 1,
        "fall" | "autumn" | "otoño" => 2,
        "summer" | "verano" => 3,
        "winter" | "invierno" => 4,
        _ => 1,
    }
}

fn valid_year(year: i32) -> i32 {
    let now = current_year();
    if (MIN_YEAR..=now + 5).contains(&year) {
        year
    } else {
        now
    }
}

fn valid_semester(semester: u8) -> u8 {
    if (1..=4).contains(&semester) {
        semester
    } else {
        1
    }
}

fn strip_prefixes(name: &str) -> &str {
    let mut rest = name.trim();
    loop {
        let before = rest;
        for prefix in PREFIXES {
            if rest.len() >= prefix.len()
                && rest.is_char_boundary(prefix.len())
                && rest[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                rest = rest[prefix.len()..].trim_start();
            }
        }
        if rest == before {
            return rest;
        }
    }
}

/// Title-case a subject written entirely in upper case.
fn normalize_subject(subject: &str) -> String {
    let subject = subject.trim().trim_end_matches('-').trim();
    let has_letters = subject.chars().any(|c| c.is_alphabetic());
    if !has_letters || subject.chars().any(|c| c.is_lowercase()) {
        return subject.to_string();
    }

    subject
        .split(' ')
        .map(|word| {
            // Roman numerals stay upper case.
            if word.chars().all(|c| matches!(c, 'I' | 'V' | 'X')) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn group<'a>(caps: &'a Captures<'_>, i: usize) -> Option<&'a str> {
    caps.get(i).map(|m| m.as_str())
}

fn parse_num<T: std::str::FromStr>(s: Option<&str>) -> Option<T> {
    s.and_then(|s| s.trim().parse().ok())
}

/// Parse a course display name.
pub fn parse_course_name(raw: &str) -> ParsedCourse {
    let name = strip_prefixes(raw);

    for pattern in patterns() {
        let Some(caps) = pattern.regex.captures(name) else {
            continue;
        };

        let (subject, code, section, year, semester) = match pattern.shape {
            Shape::Full | Shape::AltSeparators => (
                group(&caps, 1),
                group(&caps, 2),
                group(&caps, 3),
                parse_num(group(&caps, 4)),
                parse_num(group(&caps, 5)),
            ),
            Shape::NoSection => (
                group(&caps, 1),
                group(&caps, 2),
                None,
                parse_num(group(&caps, 3)),
                parse_num(group(&caps, 4)),
            ),
            Shape::SemesterName => (
                group(&caps, 1),
                group(&caps, 2),
                group(&caps, 3),
                parse_num(group(&caps, 4)),
                group(&caps, 5).map(semester_from_name),
            ),
            Shape::NoYear => (
                group(&caps, 1),
                group(&caps, 2),
                group(&caps, 3),
                None,
                parse_num(group(&caps, 4)),
            ),
            Shape::YearSemesterEnd => (
                group(&caps, 1),
                None,
                None,
                parse_num(group(&caps, 2)),
                parse_num(group(&caps, 3)),
            ),
            Shape::CodeOnly => {
                let rest = group(&caps, 3).unwrap_or_default();
                let section = rest
                    .trim()
                    .trim_start_matches('-')
                    .split('-')
                    .map(str::trim)
                    .find(|part| !part.is_empty() && year_regex().find(part).is_none());
                (
                    group(&caps, 1),
                    group(&caps, 2),
                    section,
                    year_regex()
                        .captures(rest)
                        .and_then(|c| parse_num(group(&c, 1))),
                    semester_regex()
                        .captures(&year_regex().replace_all(rest, ""))
                        .and_then(|c| parse_num(group(&c, 1))),
                )
            }
        };

        let subject = normalize_subject(subject.unwrap_or_default());
        if subject.is_empty() {
            continue;
        }

        return ParsedCourse {
            subject,
            code: non_empty(code).map(|c| c.to_uppercase()),
            section: non_empty(section),
            year: valid_year(year.unwrap_or_else(current_year)),
            semester: valid_semester(semester.unwrap_or(1)),
            confidence: pattern.confidence,
            pattern: pattern.name.to_string(),
        };
    }

    fallback(raw, name)
}

fn fallback(raw: &str, name: &str) -> ParsedCourse {
    let code = code_regex()
        .captures(name)
        .and_then(|c| non_empty(group(&c, 1)))
        .map(|c| c.to_uppercase());

    let year = year_regex()
        .captures(name)
        .and_then(|c| parse_num(group(&c, 1)))
        .unwrap_or_else(current_year);

    let without_year = year_regex().replace_all(name, "");
    let semester = semester_regex()
        .captures(&without_year)
        .and_then(|c| parse_num(group(&c, 1)))
        .unwrap_or(1);

    let subject = if name.trim().is_empty() {
        raw.trim().to_string()
    } else {
        name.trim().to_string()
    };

    ParsedCourse {
        subject,
        code,
        section: None,
        year: valid_year(year),
        semester: valid_semester(semester),
        confidence: 0.3,
        pattern: "fallback".to_string(),
    }
}

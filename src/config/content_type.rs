//! Content type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A category of course content, each handled by its own downloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Announcements,
    Assignments,
    Discussions,
    Files,
    Modules,
    Grades,
    People,
    Quizzes,
}

impl ContentType {
    /// All content types in processing order.
    pub const ALL: [ContentType; 8] = [
        ContentType::Announcements,
        ContentType::Assignments,
        ContentType::Discussions,
        ContentType::Files,
        ContentType::Modules,
        ContentType::Quizzes,
        ContentType::Grades,
        ContentType::People,
    ];

    /// Stable key used for folders, config toggles and progress keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Announcements => "announcements",
            ContentType::Assignments => "assignments",
            ContentType::Discussions => "discussions",
            ContentType::Files => "files",
            ContentType::Modules => "modules",
            ContentType::Grades => "grades",
            ContentType::People => "people",
            ContentType::Quizzes => "quizzes",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "announcements" => Ok(ContentType::Announcements),
            "assignments" => Ok(ContentType::Assignments),
            "discussions" => Ok(ContentType::Discussions),
            "files" => Ok(ContentType::Files),
            "modules" => Ok(ContentType::Modules),
            "grades" => Ok(ContentType::Grades),
            "people" => Ok(ContentType::People),
            "quizzes" => Ok(ContentType::Quizzes),
            _ => Err(format!("Unknown content type: {}", s)),
        }
    }
}

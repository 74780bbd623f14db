//! Course identity and folder resolution.

pub mod parser;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::api::types::Course;
use crate::fs::naming::sanitize_path_component;

pub use parser::{parse_course_name, ParsedCourse};

/// A course together with its parsed name and resolved folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseInfo {
    pub id: String,
    pub name: String,
    pub course_code: Option<String>,
    pub parsed: ParsedCourse,
    /// Relative to the downloads root: `{year}/{N} Semester/{course folder}`.
    pub folder_path: PathBuf,
}

impl CourseInfo {
    pub fn from_course(course: &Course) -> Self {
        let raw_name = if course.name.trim().is_empty() {
            course
                .course_code
                .clone()
                .unwrap_or_else(|| format!("course_{}", course.id))
        } else {
            course.name.clone()
        };

        let parsed = parse_course_name(&raw_name);

        let mut folder = parsed.display_name();
        if folder.trim().is_empty() {
            folder = raw_name.clone();
        }
        if folder.trim().is_empty() {
            folder = format!("course_{}", course.id);
        }

        let folder_path = PathBuf::from(parsed.year.to_string())
            .join(parsed.semester_folder())
            .join(sanitize_path_component(&folder));

        Self {
            id: course.id.clone(),
            name: raw_name,
            course_code: course.course_code.clone(),
            parsed,
            folder_path,
        }
    }
}

/// Sort courses by year, semester and subject.
pub fn sort_courses(courses: &mut [CourseInfo]) {
    courses.sort_by(|a, b| {
        (a.parsed.year, a.parsed.semester)
            .cmp(&(b.parsed.year, b.parsed.semester))
            .then_with(|| a.parsed.subject.cmp(&b.parsed.subject))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(id: &str, name: &str) -> Course {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            course_code: None,
            workflow_state: None,
            start_at: None,
            term: None,
        }
    }

    #[test]
    fn test_folder_path_layout() {
        let info = CourseInfo::from_course(&course("1", "Databases (CS340) - Sec: 1 - 2023 - 2"));
        assert_eq!(
            info.folder_path,
            PathBuf::from("2023/2 Semester/Databases (CS340) Sec- 1")
        );
    }

    #[test]
    fn test_empty_name_still_has_folder() {
        let info = CourseInfo::from_course(&course("99", "   "));
        assert_eq!(info.name, "course_99");
        assert!(info.folder_path.ends_with("course_99"));
    }

    #[test]
    fn test_sort_courses() {
        let mut courses = vec![
            CourseInfo::from_course(&course("1", "Zoology (Z1) - 2024 - 1")),
            CourseInfo::from_course(&course("2", "Algebra (A1) - 2024 - 1")),
            CourseInfo::from_course(&course("3", "History (H1) - 2023 - 2")),
        ];
        sort_courses(&mut courses);
        let ids: Vec<_> = courses.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }
}

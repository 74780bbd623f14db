//! Canvas API response types.
//!
//! Canvas returns numeric identifiers; some proxies and SIS integrations return
//! strings. Identifiers are normalised to `String` at deserialization.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Str(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Num(n) => n.to_string(),
            RawId::Str(s) => s,
        }
    }
}

fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(String::from))
}

fn id_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<RawId>>::deserialize(d)?
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect())
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Enrollment term.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Term {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub end_at: Option<String>,
}

/// A course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub term: Option<Term>,
}

/// A Canvas user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub sortable_name: Option<String>,
    #[serde(default)]
    pub login_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A file attached to a discussion topic or announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, rename = "content-type")]
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.filename.clone())
            .unwrap_or_else(|| format!("attachment_{}", self.id))
    }
}

/// Author block embedded in discussion topics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscussionAuthor {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A discussion topic. Announcements are discussion topics too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionTopic {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub delayed_post_at: Option<String>,
    #[serde(default)]
    pub last_reply_at: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub author: Option<DiscussionAuthor>,
    #[serde(default)]
    pub discussion_type: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub discussion_subentry_count: u32,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<Attachment>,
}

impl DiscussionTopic {
    pub fn author_name(&self) -> Option<String> {
        self.author
            .as_ref()
            .and_then(|a| a.display_name.clone())
            .or_else(|| self.user_name.clone())
    }
}

/// The current user's submission for an assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default, deserialize_with = "opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub graded_at: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
    #[serde(default)]
    pub late: bool,
    #[serde(default)]
    pub missing: bool,
}

/// An assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub unlock_at: Option<String>,
    #[serde(default)]
    pub lock_at: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub grading_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub submission_types: Vec<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub submission: Option<Submission>,
}

/// A course file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileObject {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, rename = "content-type")]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub locked_for_user: bool,
}

impl FileObject {
    pub fn name(&self) -> &str {
        if !self.display_name.is_empty() {
            &self.display_name
        } else if !self.filename.is_empty() {
            &self.filename
        } else {
            &self.id
        }
    }
}

/// A course folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub parent_folder_id: Option<String>,
}

/// An item inside a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleItem {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub module_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub indent: u32,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub item_type: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub content_id: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
}

/// A course module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub unlock_at: Option<String>,
    #[serde(default)]
    pub require_sequential_progress: bool,
    #[serde(default, deserialize_with = "id_list")]
    pub prerequisite_module_ids: Vec<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub items_count: Option<u32>,
    /// Absent when the module has too many items to inline.
    #[serde(default)]
    pub items: Option<Vec<ModuleItem>>,
}

/// A classic quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quiz_type: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default)]
    pub allowed_attempts: Option<i32>,
    #[serde(default)]
    pub question_count: Option<u32>,
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub unlock_at: Option<String>,
    #[serde(default)]
    pub lock_at: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// A course enrollment (one person in one role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(deserialize_with = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_id")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    pub course_section_id: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub enrollment_type: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub enrollment_state: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

//! Domain and wire types for the Lamad learning API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL for the Lamad HTTP API
    pub base_url: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

pub type CourseId = String;
pub type ChapterId = String;
pub type LessonId = String;
pub type UserId = String;

// ============================================================================
// Domain entities
// ============================================================================

/// Course difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// A course. Chapter membership is tracked by the entity store's relation
/// index, never embedded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub price: f64,
    /// Total course duration in minutes
    pub duration_minutes: u32,
    pub level: CourseLevel,
    pub category_id: String,
}

/// A chapter within a course. `order` defines its stable position.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub course_id: CourseId,
    pub name: String,
    pub order: u32,
}

/// Lesson content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
    Quiz,
    Video,
    Code,
    Reading,
}

/// Kind-specific lesson payload. Absent in chapter listings; populated by a
/// by-id lesson fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum LessonContent {
    Reading {
        /// Markdown body
        body: String,
    },
    Video {
        url: String,
        duration_secs: u32,
    },
    Quiz {
        questions: Vec<QuizQuestion>,
    },
    Code {
        starter_code: String,
        language: String,
    },
}

/// A single quiz question with its choices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub prompt: String,
    pub choices: Vec<String>,
    pub correct_index: u32,
}

/// A lesson within a chapter.
///
/// `is_completed` is a derived overlay refreshed from [`Progress`] records;
/// the wire never carries it, and the store preserves it across upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub chapter_id: ChapterId,
    pub title: String,
    pub kind: LessonKind,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<LessonContent>,
    #[serde(skip)]
    pub is_completed: bool,
}

/// One enrollment record per (user, course) pair.
/// Presence implies access to that course's lessons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub enrolled_at: DateTime<Utc>,
}

/// Per-lesson progress status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    Completed,
}

/// One progress record per (user, lesson) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub user_id: UserId,
    pub lesson_id: LessonId,
    pub status: ProgressStatus,
}

/// Unsaved code-editor content for a lesson, independent of any submission.
/// Ephemeral; lives only in the entity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCodeDraft {
    pub lesson_id: LessonId,
    pub code: String,
}

// ============================================================================
// Auth wire types
// ============================================================================

/// Request body for POST /auth/login
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Response from POST /auth/login
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
}

/// Response from POST /auth/renew
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewResponse {
    pub token: String,
}

// ============================================================================
// Write request bodies
// ============================================================================

/// Request body for POST /enrollments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollRequest {
    pub course_id: CourseId,
}

/// Request body for POST /progress
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub lesson_id: LessonId,
    pub status: ProgressStatus,
}

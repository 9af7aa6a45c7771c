//! Normalized entity store
//!
//! One canonical record per entity ID, with relations tracked as ID indices
//! (course → chapter IDs, chapter → lesson IDs, user → enrolled course IDs)
//! rather than embedded copies. Two independent fetches that return the same
//! lesson converge to a single record, so a completion flag set through one
//! view is visible through every other.
//!
//! The store is synchronous and side-effect-free: it never performs network
//! I/O. Population is always driven by the layer above (the navigation
//! controller or an app-level sync routine) pushing fetched records in.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tracing::debug;

use crate::types::{
    Chapter, ChapterId, Course, CourseId, Enrollment, Lesson, LessonId, Progress, ProgressStatus,
    UserCodeDraft, UserId,
};

/// In-memory normalized cache of Lamad domain entities
#[derive(Debug, Default)]
pub struct EntityStore {
    courses: DashMap<CourseId, Course>,
    chapters: DashMap<ChapterId, Chapter>,
    lessons: DashMap<LessonId, Lesson>,

    /// course → chapter IDs, sorted by `Chapter.order`
    course_chapters: DashMap<CourseId, Vec<ChapterId>>,
    /// chapter → lesson IDs, sorted by `Lesson.order`. Entry presence does
    /// NOT imply the chapter's full listing was fetched; see
    /// `loaded_chapters`.
    chapter_lessons: DashMap<ChapterId, Vec<LessonId>>,
    /// Chapters whose full lesson listing has been applied (possibly empty)
    loaded_chapters: DashSet<ChapterId>,

    enrollments: DashMap<(UserId, CourseId), Enrollment>,
    /// user → enrolled course IDs
    user_courses: DashMap<UserId, Vec<CourseId>>,

    /// (user, lesson) → progress record
    progress: DashMap<(UserId, LessonId), Progress>,

    /// Unsaved editor content, keyed by lesson
    drafts: DashMap<LessonId, String>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Courses ====================

    pub fn upsert_course(&self, course: Course) {
        self.courses.insert(course.id.clone(), course);
    }

    pub fn upsert_courses(&self, courses: Vec<Course>) {
        for course in courses {
            self.upsert_course(course);
        }
    }

    pub fn course(&self, id: &str) -> Option<Course> {
        self.courses.get(id).map(|c| c.clone())
    }

    /// Chapter IDs of a course, ascending by `Chapter.order`
    pub fn course_chapters(&self, course_id: &str) -> Vec<ChapterId> {
        self.course_chapters
            .get(course_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    pub fn remove_course(&self, id: &str) {
        self.courses.remove(id);
        self.course_chapters.remove(id);
        self.enrollments.retain(|(_, course_id), _| course_id != id);
        for mut ids in self.user_courses.iter_mut() {
            ids.retain(|cid| cid != id);
        }
    }

    // ==================== Chapters ====================

    /// Insert or merge a chapter and index it under its course,
    /// re-sorting the course's chapter list by `order`.
    pub fn upsert_chapter(&self, chapter: Chapter) {
        let id = chapter.id.clone();
        let course_id = chapter.course_id.clone();
        self.chapters.insert(id.clone(), chapter);

        let mut ids = self.course_chapters.entry(course_id).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        let chapters = &self.chapters;
        ids.sort_by_key(|cid| chapters.get(cid).map(|c| c.order).unwrap_or(u32::MAX));
    }

    pub fn upsert_chapters(&self, chapters: Vec<Chapter>) {
        for chapter in chapters {
            self.upsert_chapter(chapter);
        }
    }

    pub fn chapter(&self, id: &str) -> Option<Chapter> {
        self.chapters.get(id).map(|c| c.clone())
    }

    pub fn remove_chapter(&self, id: &str) {
        if let Some((_, chapter)) = self.chapters.remove(id) {
            if let Some(mut ids) = self.course_chapters.get_mut(&chapter.course_id) {
                ids.retain(|cid| cid != id);
            }
        }
        self.chapter_lessons.remove(id);
        self.loaded_chapters.remove(id);
    }

    // ==================== Lessons ====================

    /// Insert or merge a lesson and index it under its chapter.
    ///
    /// Merge is last-write-wins per present field: `content` is never
    /// downgraded back to `None` by a later summary fetch, and the
    /// `is_completed` overlay survives wire upserts (the wire never
    /// carries it).
    pub fn upsert_lesson(&self, lesson: Lesson) {
        let id = lesson.id.clone();
        let chapter_id = lesson.chapter_id.clone();

        match self.lessons.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get_mut();
                let mut merged = lesson;
                if merged.content.is_none() {
                    merged.content = current.content.take();
                }
                merged.is_completed = current.is_completed;
                *current = merged;
            }
            Entry::Vacant(entry) => {
                let is_completed = self.lesson_completed_by_progress(&id);
                entry.insert(Lesson {
                    is_completed,
                    ..lesson
                });
            }
        }

        let mut ids = self.chapter_lessons.entry(chapter_id).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
        let lessons = &self.lessons;
        ids.sort_by_key(|lid| lessons.get(lid).map(|l| l.order).unwrap_or(u32::MAX));
    }

    /// Apply a chapter's full lesson listing and mark the chapter loaded,
    /// even when the listing is empty.
    pub fn set_chapter_lessons(&self, chapter_id: &str, lessons: Vec<Lesson>) {
        debug!(chapter_id, count = lessons.len(), "applying chapter lesson listing");
        self.chapter_lessons
            .entry(chapter_id.to_string())
            .or_default();
        for lesson in lessons {
            self.upsert_lesson(lesson);
        }
        self.loaded_chapters.insert(chapter_id.to_string());
    }

    pub fn lesson(&self, id: &str) -> Option<Lesson> {
        self.lessons.get(id).map(|l| l.clone())
    }

    /// Lesson IDs of a chapter, ascending by `Lesson.order`
    pub fn chapter_lessons(&self, chapter_id: &str) -> Vec<LessonId> {
        self.chapter_lessons
            .get(chapter_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// True once the chapter's full lesson listing has been applied
    pub fn chapter_loaded(&self, chapter_id: &str) -> bool {
        self.loaded_chapters.contains(chapter_id)
    }

    pub fn remove_lesson(&self, id: &str) {
        if let Some((_, lesson)) = self.lessons.remove(id) {
            if let Some(mut ids) = self.chapter_lessons.get_mut(&lesson.chapter_id) {
                ids.retain(|lid| lid != id);
            }
        }
        self.drafts.remove(id);
    }

    // ==================== Enrollments ====================

    pub fn upsert_enrollment(&self, enrollment: Enrollment) {
        let user_id = enrollment.user_id.clone();
        let course_id = enrollment.course_id.clone();
        self.enrollments
            .insert((user_id.clone(), course_id.clone()), enrollment);

        let mut ids = self.user_courses.entry(user_id).or_default();
        if !ids.contains(&course_id) {
            ids.push(course_id);
        }
    }

    pub fn upsert_enrollments(&self, enrollments: Vec<Enrollment>) {
        for enrollment in enrollments {
            self.upsert_enrollment(enrollment);
        }
    }

    /// Course IDs the user is enrolled in
    pub fn enrolled_courses(&self, user_id: &str) -> Vec<CourseId> {
        self.user_courses
            .get(user_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Enrollment presence implies access to the course's lessons
    pub fn is_enrolled(&self, user_id: &str, course_id: &str) -> bool {
        self.enrollments
            .contains_key(&(user_id.to_string(), course_id.to_string()))
    }

    // ==================== Progress ====================

    /// Apply a progress record and refresh the owning lesson's
    /// `is_completed` overlay if that lesson is loaded.
    pub fn upsert_progress(&self, progress: Progress) {
        let lesson_id = progress.lesson_id.clone();
        let completed = progress.status == ProgressStatus::Completed;
        self.progress
            .insert((progress.user_id.clone(), lesson_id.clone()), progress);

        if let Some(mut lesson) = self.lessons.get_mut(&lesson_id) {
            lesson.is_completed = completed;
        }
    }

    pub fn upsert_progresses(&self, records: Vec<Progress>) {
        for record in records {
            self.upsert_progress(record);
        }
    }

    pub fn progress(&self, user_id: &str, lesson_id: &str) -> Option<Progress> {
        self.progress
            .get(&(user_id.to_string(), lesson_id.to_string()))
            .map(|p| p.clone())
    }

    /// Set the completion state for (user, lesson) and return the previous
    /// status, so an optimistic write can be rolled back.
    pub fn set_completed(&self, user_id: &str, lesson_id: &str, completed: bool) -> ProgressStatus {
        let previous = self
            .progress(user_id, lesson_id)
            .map(|p| p.status)
            .unwrap_or(ProgressStatus::NotStarted);

        self.upsert_progress(Progress {
            user_id: user_id.to_string(),
            lesson_id: lesson_id.to_string(),
            status: if completed {
                ProgressStatus::Completed
            } else {
                ProgressStatus::NotStarted
            },
        });

        previous
    }

    fn lesson_completed_by_progress(&self, lesson_id: &str) -> bool {
        self.progress
            .iter()
            .any(|p| p.key().1 == lesson_id && p.status == ProgressStatus::Completed)
    }

    // ==================== Code drafts ====================

    /// Stash unsaved editor content for a lesson
    pub fn set_code_draft(&self, lesson_id: &str, code: &str) {
        self.drafts.insert(lesson_id.to_string(), code.to_string());
    }

    pub fn code_draft(&self, lesson_id: &str) -> Option<UserCodeDraft> {
        self.drafts.get(lesson_id).map(|code| UserCodeDraft {
            lesson_id: lesson_id.to_string(),
            code: code.clone(),
        })
    }

    pub fn clear_code_draft(&self, lesson_id: &str) {
        self.drafts.remove(lesson_id);
    }

    // ==================== Lifecycle ====================

    /// Drop every cached entity, index, and draft
    pub fn clear(&self) {
        self.courses.clear();
        self.chapters.clear();
        self.lessons.clear();
        self.course_chapters.clear();
        self.chapter_lessons.clear();
        self.loaded_chapters.clear();
        self.enrollments.clear();
        self.user_courses.clear();
        self.progress.clear();
        self.drafts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LessonContent, LessonKind};

    fn chapter(id: &str, course_id: &str, order: u32) -> Chapter {
        Chapter {
            id: id.to_string(),
            course_id: course_id.to_string(),
            name: format!("Chapter {}", id),
            order,
        }
    }

    fn lesson(id: &str, chapter_id: &str, order: u32) -> Lesson {
        Lesson {
            id: id.to_string(),
            chapter_id: chapter_id.to_string(),
            title: format!("Lesson {}", id),
            kind: LessonKind::Reading,
            order,
            content: None,
            is_completed: false,
        }
    }

    #[test]
    fn test_chapter_index_sorted_by_order() {
        let store = EntityStore::new();
        store.upsert_chapter(chapter("ch3", "c1", 3));
        store.upsert_chapter(chapter("ch1", "c1", 1));
        store.upsert_chapter(chapter("ch2", "c1", 2));

        assert_eq!(store.course_chapters("c1"), vec!["ch1", "ch2", "ch3"]);
    }

    #[test]
    fn test_lesson_index_resorts_on_upsert() {
        let store = EntityStore::new();
        store.set_chapter_lessons("ch1", vec![lesson("l2", "ch1", 2), lesson("l1", "ch1", 1)]);
        assert_eq!(store.chapter_lessons("ch1"), vec!["l1", "l2"]);

        // A later arrival slots into position, no duplicate on re-upsert
        store.upsert_lesson(lesson("l0", "ch1", 0));
        store.upsert_lesson(lesson("l1", "ch1", 1));
        assert_eq!(store.chapter_lessons("ch1"), vec!["l0", "l1", "l2"]);
    }

    #[test]
    fn test_merge_preserves_content_and_overlay() {
        let store = EntityStore::new();

        // Detail fetch first: content present
        let mut detailed = lesson("l1", "ch1", 1);
        detailed.content = Some(LessonContent::Reading {
            body: "# Intro".to_string(),
        });
        store.upsert_lesson(detailed);
        store.set_completed("u1", "l1", true);

        // Summary re-fetch (no content) must not erase either
        store.upsert_lesson(lesson("l1", "ch1", 1));

        let merged = store.lesson("l1").unwrap();
        assert!(merged.content.is_some());
        assert!(merged.is_completed);
    }

    #[test]
    fn test_normalization_single_record_across_views() {
        let store = EntityStore::new();
        store.set_chapter_lessons("ch1", vec![lesson("l1", "ch1", 1)]);

        // Same lesson fetched again by ID
        store.upsert_lesson(lesson("l1", "ch1", 1));
        assert_eq!(store.chapter_lessons("ch1").len(), 1);

        // Completion set through the progress path is visible via the
        // by-id view: there is only one record.
        store.set_completed("u1", "l1", true);
        assert!(store.lesson("l1").unwrap().is_completed);
    }

    #[test]
    fn test_progress_overlay_applies_to_later_insert() {
        let store = EntityStore::new();
        store.upsert_progress(Progress {
            user_id: "u1".into(),
            lesson_id: "l1".into(),
            status: ProgressStatus::Completed,
        });

        // Lesson arrives after the progress record
        store.upsert_lesson(lesson("l1", "ch1", 1));
        assert!(store.lesson("l1").unwrap().is_completed);
    }

    #[test]
    fn test_empty_listing_marks_chapter_loaded() {
        let store = EntityStore::new();
        assert!(!store.chapter_loaded("ch1"));

        store.set_chapter_lessons("ch1", vec![]);
        assert!(store.chapter_loaded("ch1"));
        assert!(store.chapter_lessons("ch1").is_empty());
    }

    #[test]
    fn test_single_lesson_upsert_does_not_mark_loaded() {
        let store = EntityStore::new();
        store.upsert_lesson(lesson("l1", "ch1", 1));

        // A direct-link fetch indexes the lesson but the chapter's full
        // listing is still pending.
        assert_eq!(store.chapter_lessons("ch1"), vec!["l1"]);
        assert!(!store.chapter_loaded("ch1"));
    }

    #[test]
    fn test_remove_strips_relation_indices() {
        let store = EntityStore::new();
        store.upsert_chapter(chapter("ch1", "c1", 1));
        store.upsert_chapter(chapter("ch2", "c1", 2));
        store.set_chapter_lessons("ch1", vec![lesson("l1", "ch1", 1), lesson("l2", "ch1", 2)]);

        store.remove_lesson("l1");
        assert_eq!(store.chapter_lessons("ch1"), vec!["l2"]);

        store.remove_chapter("ch1");
        assert_eq!(store.course_chapters("c1"), vec!["ch2"]);
        assert!(!store.chapter_loaded("ch1"));
    }

    #[test]
    fn test_remove_course_strips_enrollment_index() {
        let store = EntityStore::new();
        store.upsert_enrollment(Enrollment {
            user_id: "u1".into(),
            course_id: "c1".into(),
            enrolled_at: chrono::Utc::now(),
        });
        store.upsert_enrollment(Enrollment {
            user_id: "u1".into(),
            course_id: "c2".into(),
            enrolled_at: chrono::Utc::now(),
        });

        store.remove_course("c1");
        assert_eq!(store.enrolled_courses("u1"), vec!["c2"]);
        assert!(!store.is_enrolled("u1", "c1"));
        assert!(store.is_enrolled("u1", "c2"));
    }

    #[test]
    fn test_enrollment_dedup_per_pair() {
        let store = EntityStore::new();
        let enrollment = Enrollment {
            user_id: "u1".into(),
            course_id: "c1".into(),
            enrolled_at: chrono::Utc::now(),
        };
        store.upsert_enrollment(enrollment.clone());
        store.upsert_enrollment(enrollment);

        assert_eq!(store.enrolled_courses("u1"), vec!["c1"]);
        assert!(store.is_enrolled("u1", "c1"));
        assert!(!store.is_enrolled("u1", "c2"));
    }

    #[test]
    fn test_code_drafts_are_ephemeral_per_lesson() {
        let store = EntityStore::new();
        store.set_code_draft("l1", "fn main() {}");

        let draft = store.code_draft("l1").unwrap();
        assert_eq!(draft.code, "fn main() {}");

        store.clear_code_draft("l1");
        assert!(store.code_draft("l1").is_none());
    }

    #[test]
    fn test_clear_empties_everything() {
        let store = EntityStore::new();
        store.upsert_chapter(chapter("ch1", "c1", 1));
        store.set_chapter_lessons("ch1", vec![lesson("l1", "ch1", 1)]);
        store.set_code_draft("l1", "code");

        store.clear();
        assert!(store.chapter("ch1").is_none());
        assert!(store.lesson("l1").is_none());
        assert!(store.course_chapters("c1").is_empty());
        assert!(!store.chapter_loaded("ch1"));
        assert!(store.code_draft("l1").is_none());
    }
}

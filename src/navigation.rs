//! Lesson navigation controller
//!
//! Owns the "current lesson" pointer and the set of expanded chapters, and
//! drives lazy loading of chapter lesson listings through the gateway.
//! Traversal is deterministic over the `(chapter.order, lesson.order)` tuple
//! space; stepping into a chapter that has not been loaded yet triggers its
//! load first rather than silently skipping it.
//!
//! Chapter loads are single-flight: a second expand of a chapter already
//! loading attaches to the same pending fetch. A load superseded by a newer
//! one still applies its response to the store (upserts are idempotent
//! merges) but produces no navigation side effect.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::LamadApi;
use crate::error::{ApiError, Result};
use crate::store::EntityStore;
use crate::transport::Transport;
use crate::types::{ChapterId, Lesson, LessonId, ProgressStatus, UserId};

/// Outcome of one chapter-load attempt, shared by attached expanders
type LoadOutcome = std::result::Result<(), ApiError>;

struct PendingLoad {
    chapter_id: ChapterId,
    done: watch::Receiver<Option<LoadOutcome>>,
}

#[derive(Default)]
struct NavState {
    current_lesson: Option<LessonId>,
    expanded: HashSet<ChapterId>,
    /// Single-flight slot for the most recent chapter load
    pending_load: Option<PendingLoad>,
    /// Bumped on every selection or step; an await that resumes to find a
    /// newer sequence discards its navigation side effect
    select_seq: u64,
}

enum Direction {
    Forward,
    Backward,
}

/// Stateful navigator over a user's lessons
pub struct LessonNavigator<T: Transport> {
    api: Arc<LamadApi<T>>,
    store: Arc<EntityStore>,
    user_id: UserId,
    state: Mutex<NavState>,
}

impl<T: Transport> LessonNavigator<T> {
    pub fn new(api: Arc<LamadApi<T>>, store: Arc<EntityStore>, user_id: impl Into<UserId>) -> Self {
        Self {
            api,
            store,
            user_id: user_id.into(),
            state: Mutex::new(NavState::default()),
        }
    }

    /// The entity store backing this navigator
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The API client this navigator fetches through
    pub fn api(&self) -> &Arc<LamadApi<T>> {
        &self.api
    }

    // ==================== Read accessors ====================

    /// Currently selected lesson, if any
    pub fn current_lesson(&self) -> Option<LessonId> {
        self.lock_state().current_lesson.clone()
    }

    /// Chapters the user has expanded
    pub fn expanded_chapters(&self) -> HashSet<ChapterId> {
        self.lock_state().expanded.clone()
    }

    pub fn is_expanded(&self, chapter_id: &str) -> bool {
        self.lock_state().expanded.contains(chapter_id)
    }

    // ==================== Chapter expansion ====================

    /// Expand a chapter, lazily fetching its lesson listing on first expand.
    /// Concurrent expands of the same chapter share one fetch.
    pub async fn expand_chapter(&self, chapter_id: &str) -> Result<()> {
        self.lock_state().expanded.insert(chapter_id.to_string());
        self.ensure_chapter_loaded(chapter_id).await?;
        Ok(())
    }

    /// Collapse a chapter. Loaded lesson data stays cached.
    pub fn collapse_chapter(&self, chapter_id: &str) {
        self.lock_state().expanded.remove(chapter_id);
    }

    // ==================== Lesson selection ====================

    /// Select a lesson as current, implicitly expanding and loading its
    /// owning chapter. Unknown lesson IDs (direct links) are fetched by ID
    /// first. Returns the selected lesson, or `None` when a newer selection
    /// superseded this one while its chapter was loading.
    pub async fn select_lesson(&self, lesson_id: &str) -> Result<Option<Lesson>> {
        let seq = self.bump_seq();

        let lesson = match self.store.lesson(lesson_id) {
            Some(lesson) => lesson,
            None => {
                debug!(lesson_id, "selecting unknown lesson, fetching by id");
                let fetched = self.api.get_lesson(lesson_id).await?;
                self.store.upsert_lesson(fetched.clone());
                self.store.lesson(lesson_id).unwrap_or(fetched)
            }
        };

        self.lock_state().expanded.insert(lesson.chapter_id.clone());
        self.ensure_chapter_loaded(&lesson.chapter_id).await?;

        {
            let mut state = self.lock_state();
            if state.select_seq != seq {
                debug!(lesson_id, "selection superseded, discarding");
                return Ok(None);
            }
            state.current_lesson = Some(lesson_id.to_string());
        }
        Ok(self.store.lesson(lesson_id))
    }

    /// Advance to the next lesson in `(chapter.order, lesson.order)` order,
    /// loading the adjacent chapter if needed. Returns `None` (and leaves
    /// the current pointer untouched) at the last lesson overall.
    pub async fn next_lesson(&self) -> Result<Option<LessonId>> {
        self.step(Direction::Forward).await
    }

    /// Step back to the previous lesson. Returns `None` at the first lesson
    /// overall; never wraps around.
    pub async fn previous_lesson(&self) -> Result<Option<LessonId>> {
        self.step(Direction::Backward).await
    }

    async fn step(&self, direction: Direction) -> Result<Option<LessonId>> {
        let (seq, current_id) = {
            let mut state = self.lock_state();
            state.select_seq += 1;
            (state.select_seq, state.current_lesson.clone())
        };
        let Some(current_id) = current_id else {
            return Ok(None);
        };
        let Some(current) = self.store.lesson(&current_id) else {
            return Ok(None);
        };
        let Some(chapter) = self.store.chapter(&current.chapter_id) else {
            return Ok(None);
        };

        // Adjacent lesson within the current chapter
        let siblings = self.store.chapter_lessons(&current.chapter_id);
        if let Some(pos) = siblings.iter().position(|id| *id == current_id) {
            let adjacent = match direction {
                Direction::Forward => siblings.get(pos + 1),
                Direction::Backward => pos.checked_sub(1).and_then(|p| siblings.get(p)),
            };
            if let Some(lesson_id) = adjacent {
                return Ok(self.commit_step(seq, lesson_id));
            }
        }

        // Cross the chapter boundary: walk the course's chapters in order,
        // loading each candidate before deciding (no silent skip of an
        // unloaded chapter), passing over loaded-but-empty ones.
        let chapter_ids = self.store.course_chapters(&chapter.course_id);
        let Some(mut idx) = chapter_ids.iter().position(|id| *id == chapter.id) else {
            return Ok(None);
        };
        loop {
            let adjacent_id = match direction {
                Direction::Forward => {
                    idx += 1;
                    match chapter_ids.get(idx) {
                        Some(id) => id.clone(),
                        None => return Ok(None),
                    }
                }
                Direction::Backward => {
                    if idx == 0 {
                        return Ok(None);
                    }
                    idx -= 1;
                    chapter_ids[idx].clone()
                }
            };

            let still_current = self.ensure_chapter_loaded(&adjacent_id).await?;
            let lessons = self.store.chapter_lessons(&adjacent_id);
            let candidate = match direction {
                Direction::Forward => lessons.first(),
                Direction::Backward => lessons.last(),
            };
            if let Some(lesson_id) = candidate {
                if !still_current {
                    // A newer load replaced ours while we waited.
                    return Ok(None);
                }
                return Ok(self.commit_step(seq, lesson_id));
            }
            // Loaded and empty: keep walking.
        }
    }

    /// Apply a step's result unless a newer selection happened meanwhile
    fn commit_step(&self, seq: u64, lesson_id: &str) -> Option<LessonId> {
        let chapter_id = self.store.lesson(lesson_id).map(|l| l.chapter_id);

        let mut state = self.lock_state();
        if state.select_seq != seq {
            debug!(lesson_id, "step superseded, discarding");
            return None;
        }
        state.current_lesson = Some(lesson_id.to_string());
        if let Some(chapter_id) = chapter_id {
            state.expanded.insert(chapter_id);
        }
        Some(lesson_id.to_string())
    }

    // ==================== Completion ====================

    /// Mark a lesson completed: the overlay flips immediately, the server
    /// write follows, and a failed write rolls the overlay back before the
    /// error is surfaced.
    pub async fn mark_completed(&self, lesson_id: &str) -> Result<()> {
        let previous = self.store.set_completed(&self.user_id, lesson_id, true);

        match self
            .api
            .submit_progress(lesson_id, ProgressStatus::Completed)
            .await
        {
            Ok(confirmed) => {
                self.store.upsert_progress(confirmed);
                debug!(lesson_id, "lesson completion confirmed");
                Ok(())
            }
            Err(e) => {
                warn!(lesson_id, error = %e, "completion write failed, rolling back");
                self.store.set_completed(
                    &self.user_id,
                    lesson_id,
                    previous == ProgressStatus::Completed,
                );
                Err(e)
            }
        }
    }

    // ==================== Internals ====================

    /// Make sure a chapter's lesson listing is in the store, sharing one
    /// in-flight fetch per chapter. Returns whether this chapter is still
    /// the most recently requested load, which gates navigation side
    /// effects; the fetched data itself is always applied.
    async fn ensure_chapter_loaded(&self, chapter_id: &str) -> Result<bool> {
        if !self.store.chapter_loaded(chapter_id) {
            enum Role {
                Leader(watch::Sender<Option<LoadOutcome>>),
                Follower(watch::Receiver<Option<LoadOutcome>>),
            }

            let role = {
                let mut state = self.lock_state();
                match &state.pending_load {
                    Some(pending) if pending.chapter_id == chapter_id => {
                        Role::Follower(pending.done.clone())
                    }
                    _ => {
                        let (tx, rx) = watch::channel(None);
                        state.pending_load = Some(PendingLoad {
                            chapter_id: chapter_id.to_string(),
                            done: rx,
                        });
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    debug!(chapter_id, "loading chapter lessons");
                    let outcome: LoadOutcome =
                        match self.api.list_chapter_lessons(chapter_id).await {
                            Ok(lessons) => {
                                self.store.set_chapter_lessons(chapter_id, lessons);
                                Ok(())
                            }
                            Err(e) => {
                                warn!(chapter_id, error = %e, "chapter load failed");
                                Err(e)
                            }
                        };

                    {
                        let mut state = self.lock_state();
                        let ours = state
                            .pending_load
                            .as_ref()
                            .is_some_and(|p| p.chapter_id == chapter_id);
                        if ours {
                            state.pending_load = None;
                        }
                    }
                    let _ = tx.send(Some(outcome.clone()));
                    outcome?;
                }
                Role::Follower(mut rx) => loop {
                    let resolved = rx.borrow_and_update().clone();
                    if let Some(outcome) = resolved {
                        outcome?;
                        break;
                    }
                    if rx.changed().await.is_err() {
                        return Err(ApiError::Network("chapter load interrupted".into()));
                    }
                },
            }
        }

        let state = self.lock_state();
        Ok(state
            .pending_load
            .as_ref()
            .map_or(true, |p| p.chapter_id == chapter_id))
    }

    fn bump_seq(&self) -> u64 {
        let mut state = self.lock_state();
        state.select_seq += 1;
        state.select_seq
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, NavState> {
        self.state.lock().expect("navigation state lock poisoned")
    }
}

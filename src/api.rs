//! Typed endpoint surface over the authenticated gateway
//!
//! One method per REST endpoint, returning domain records. This layer does
//! not touch the entity store; callers decide what to cache.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::Result;
use crate::gateway::Gateway;
use crate::session::SessionHolder;
use crate::transport::{ApiResponse, RequestSpec, Transport};
use crate::types::{
    Chapter, Course, EnrollRequest, Enrollment, Lesson, LoginRequest, LoginResponse, Progress,
    ProgressRequest, ProgressStatus, UserId,
};

/// Typed client for the Lamad learning API
pub struct LamadApi<T: Transport> {
    gateway: Gateway<T>,
}

impl<T: Transport> LamadApi<T> {
    /// Create an API client over the given transport and session
    pub fn new(transport: T, session: Arc<SessionHolder>) -> Self {
        Self {
            gateway: Gateway::new(transport, session),
        }
    }

    /// The underlying gateway
    pub fn gateway(&self) -> &Gateway<T> {
        &self.gateway
    }

    /// Session holder this client authenticates with
    pub fn session(&self) -> &Arc<SessionHolder> {
        self.gateway.session()
    }

    // ==================== Auth ====================

    /// Authenticate, store the access credential in the session, and return
    /// the acting user's ID. Goes around the renewal path: a 401 here means
    /// bad credentials, not an expired session.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<UserId> {
        let body = serde_json::to_value(LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        })?;
        let response = self
            .gateway
            .execute_raw(&RequestSpec::post("/auth/login", body))
            .await?;
        let login: LoginResponse = decode(response)?;

        self.session().set_credential(Some(login.token));
        info!(user_id = %login.user_id, "logged in");
        Ok(login.user_id)
    }

    /// Drop the local session. The renewal secret lives out-of-band and is
    /// not this core's to revoke.
    pub fn logout(&self) {
        self.session().clear();
        info!("logged out");
    }

    // ==================== Courses ====================

    pub async fn list_courses(&self) -> Result<Vec<Course>> {
        let response = self.gateway.execute(&RequestSpec::get("/courses")).await?;
        decode(response)
    }

    pub async fn get_course(&self, id: &str) -> Result<Course> {
        let path = format!("/courses/{}", urlencoding::encode(id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    pub async fn list_chapters(&self, course_id: &str) -> Result<Vec<Chapter>> {
        let path = format!("/courses/{}/chapters", urlencoding::encode(course_id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    // ==================== Lessons ====================

    /// Full lesson listing for a chapter (summaries, no content payloads)
    pub async fn list_chapter_lessons(&self, chapter_id: &str) -> Result<Vec<Lesson>> {
        let path = format!("/chapters/{}/lessons", urlencoding::encode(chapter_id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    /// Single lesson with its kind-specific content payload
    pub async fn get_lesson(&self, id: &str) -> Result<Lesson> {
        let path = format!("/lessons/{}", urlencoding::encode(id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    // ==================== Enrollments ====================

    pub async fn enroll(&self, course_id: &str) -> Result<Enrollment> {
        let body = serde_json::to_value(EnrollRequest {
            course_id: course_id.to_string(),
        })?;
        let response = self
            .gateway
            .execute(&RequestSpec::post("/enrollments", body))
            .await?;
        decode(response)
    }

    pub async fn list_enrollments(&self, user_id: &str) -> Result<Vec<Enrollment>> {
        let path = format!("/users/{}/enrollments", urlencoding::encode(user_id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    // ==================== Progress ====================

    pub async fn list_progress(&self, user_id: &str) -> Result<Vec<Progress>> {
        let path = format!("/users/{}/progress", urlencoding::encode(user_id));
        let response = self.gateway.execute(&RequestSpec::get(path)).await?;
        decode(response)
    }

    /// Record a progress status for a lesson. The server derives the acting
    /// user from the credential.
    pub async fn submit_progress(
        &self,
        lesson_id: &str,
        status: ProgressStatus,
    ) -> Result<Progress> {
        let body = serde_json::to_value(ProgressRequest {
            lesson_id: lesson_id.to_string(),
            status,
        })?;
        let response = self
            .gateway
            .execute(&RequestSpec::post("/progress", body))
            .await?;
        decode(response)
    }
}

fn decode<D: DeserializeOwned>(response: ApiResponse) -> Result<D> {
    Ok(serde_json::from_value(response.body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;
    use crate::transport::Method;
    use crate::types::{LessonContent, LessonKind};
    use serde_json::json;

    fn api(transport: StubTransport) -> LamadApi<StubTransport> {
        LamadApi::new(transport, Arc::new(SessionHolder::new()))
    }

    #[tokio::test]
    async fn test_login_stores_credential() {
        let transport = StubTransport::new();
        transport.route(
            Method::Post,
            "/auth/login",
            json!({ "token": "tok_1", "userId": "u1" }),
        );
        let api = api(transport);

        let user_id = api.login("alice@example.com", "hunter2").await.unwrap();
        assert_eq!(user_id, "u1");
        assert_eq!(api.session().credential().as_deref(), Some("tok_1"));

        api.logout();
        assert!(api.session().credential().is_none());
    }

    #[tokio::test]
    async fn test_get_lesson_decodes_tagged_content() {
        let transport = StubTransport::new();
        transport.route(
            Method::Get,
            "/lessons/l1",
            json!({
                "id": "l1",
                "chapterId": "ch1",
                "title": "Hello Rust",
                "kind": "code",
                "order": 1,
                "content": {
                    "type": "code",
                    "starterCode": "fn main() {}",
                    "language": "rust"
                }
            }),
        );
        let api = api(transport);

        let lesson = api.get_lesson("l1").await.unwrap();
        assert_eq!(lesson.kind, LessonKind::Code);
        assert!(matches!(
            lesson.content,
            Some(LessonContent::Code { ref language, .. }) if language == "rust"
        ));
        // Overlay is never taken from the wire
        assert!(!lesson.is_completed);
    }

    #[tokio::test]
    async fn test_submit_progress_roundtrip() {
        let transport = StubTransport::new();
        transport.route(
            Method::Post,
            "/progress",
            json!({ "userId": "u1", "lessonId": "l1", "status": "completed" }),
        );
        let api = api(transport);

        let progress = api
            .submit_progress("l1", ProgressStatus::Completed)
            .await
            .unwrap();
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(
            api.gateway().transport().calls_for(Method::Post, "/progress"),
            1
        );
    }
}

//! Client-side sync core for Lamad learning paths
//!
//! Mediates every call to the Lamad backend, keeps a normalized in-memory
//! cache of courses, chapters, lessons, enrollments, and progress, and
//! drives the stateful "current lesson" experience over lazily-loaded
//! chapters.
//!
//! - **SessionHolder**: in-memory access credential, injectable per instance
//! - **Gateway**: attaches the credential to every request and coordinates a
//!   single-flight renewal shared by all concurrent authorization failures
//! - **EntityStore**: one canonical record per entity ID, relations as ID
//!   indices, idempotent merges
//! - **LessonNavigator**: current-lesson pointer, chapter expansion with
//!   single-flight lazy loads, cross-chapter previous/next traversal, and
//!   optimistic completion with rollback
//!
//! # Example
//!
//! ```rust,no_run
//! use lamad_client::{ApiConfig, EntityStore, HttpTransport, LamadApi, LessonNavigator, SessionHolder};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(SessionHolder::new());
//! let transport = HttpTransport::new(ApiConfig {
//!     base_url: "https://lamad.elohim.host/api".into(),
//!     ..Default::default()
//! })?;
//! let api = Arc::new(LamadApi::new(transport, session));
//!
//! let user_id = api.login("alice@example.com", "secret").await?;
//!
//! let store = Arc::new(EntityStore::new());
//! let nav = LessonNavigator::new(api, store, user_id);
//!
//! nav.expand_chapter("ch_intro").await?;
//! nav.select_lesson("l_hello").await?;
//! nav.mark_completed("l_hello").await?;
//! let _next = nav.next_lesson().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod gateway;
pub mod navigation;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;

// Re-export main types
pub use api::LamadApi;
pub use error::{ApiError, Result};
pub use gateway::Gateway;
pub use navigation::LessonNavigator;
pub use session::SessionHolder;
pub use store::EntityStore;
pub use transport::{ApiResponse, HttpTransport, Method, RequestSpec, Transport};
pub use types::*;

//! Authenticated request gateway
//!
//! Every outbound API call goes through [`Gateway::execute`], which attaches
//! the current session credential and resolves authorization failures by
//! coordinating a single-flight credential renewal: the first caller to
//! observe a 401 performs the renewal, every concurrent 401 attaches to the
//! same pending outcome, and all of them retry once with whatever credential
//! the one renewal produced. This keeps N concurrent expiries from issuing N
//! renewal calls and racing the server-side refresh-token rotation.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ApiError, Result};
use crate::session::SessionHolder;
use crate::transport::{ApiResponse, RequestSpec, Transport};

/// Outcome of one renewal attempt, shared by all attached callers
type RenewalOutcome = std::result::Result<String, ApiError>;

/// Authenticated gateway over a [`Transport`]
pub struct Gateway<T: Transport> {
    transport: T,
    session: Arc<SessionHolder>,
    /// Single-flight slot: `Some` while a renewal is in flight. Followers
    /// clone the receiver and await the outcome instead of renewing again.
    renewal: Mutex<Option<watch::Receiver<Option<RenewalOutcome>>>>,
}

impl<T: Transport> Gateway<T> {
    /// Create a gateway over the given transport and session
    pub fn new(transport: T, session: Arc<SessionHolder>) -> Self {
        Self {
            transport,
            session,
            renewal: Mutex::new(None),
        }
    }

    /// Session holder this gateway authenticates with
    pub fn session(&self) -> &Arc<SessionHolder> {
        &self.session
    }

    /// Transport access for test assertions
    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute a request with the current credential, renewing it once on
    /// an authorization failure.
    ///
    /// Transport failures and non-auth error statuses pass through without
    /// any retry; retry policy for those belongs to the caller.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let credential = self.session.credential();
        let response = self.transport.send(spec, credential.as_deref()).await?;

        if response.status != 401 {
            return classify(response);
        }

        debug!(method = %spec.method, path = %spec.path, "authorization failed, renewing credential");
        let renewed = self.renewed_credential().await?;

        let retried = self.transport.send(spec, Some(&renewed)).await?;
        if retried.status == 401 {
            // Renewed credential rejected too; nothing further to try.
            return Err(ApiError::Unauthorized);
        }
        classify(retried)
    }

    /// Execute without the renewal path. Used for login, where a 401 means
    /// bad credentials rather than an expired session.
    pub async fn execute_raw(&self, spec: &RequestSpec) -> Result<ApiResponse> {
        let credential = self.session.credential();
        let response = self.transport.send(spec, credential.as_deref()).await?;
        if response.status == 401 {
            return Err(ApiError::Unauthorized);
        }
        classify(response)
    }

    /// Resolve to a fresh credential, performing or attaching to the single
    /// in-flight renewal.
    async fn renewed_credential(&self) -> Result<String> {
        let (leader_tx, mut rx) = {
            let mut slot = self.renewal.lock().await;
            match slot.as_ref() {
                Some(rx) => (None, rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    self.session.set_renewal_in_flight(true);
                    (Some(tx), rx)
                }
            }
        };

        let Some(tx) = leader_tx else {
            // A renewal is already in flight; await its outcome.
            loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    return Err(ApiError::Unauthorized);
                }
            }
        };

        let outcome: RenewalOutcome = match self.transport.renew().await {
            Ok(token) => {
                self.session.set_credential(Some(token.clone()));
                info!("credential renewal succeeded");
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "credential renewal failed, clearing session");
                self.session.clear();
                Err(ApiError::Unauthorized)
            }
        };

        {
            let mut slot = self.renewal.lock().await;
            *slot = None;
        }
        self.session.set_renewal_in_flight(false);

        // Waiters hold receiver clones taken before the slot was cleared.
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }
}

/// Map a terminal response onto the error taxonomy
fn classify(response: ApiResponse) -> Result<ApiResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let message = response
        .body
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    match response.status {
        404 => Err(ApiError::NotFound(message)),
        409 => Err(ApiError::Conflict(message)),
        status => Err(ApiError::Server { status, message }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;
    use crate::transport::Method;
    use serde_json::json;

    fn gateway(transport: StubTransport) -> Arc<Gateway<StubTransport>> {
        Arc::new(Gateway::new(transport, Arc::new(SessionHolder::new())))
    }

    #[tokio::test]
    async fn test_success_passthrough() {
        let transport = StubTransport::new();
        transport.route(Method::Get, "/courses", json!([]));
        let gw = gateway(transport);

        let response = gw.execute(&RequestSpec::get("/courses")).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_single_flight_renewal() {
        let transport = StubTransport::new();
        transport.route(Method::Get, "/courses", json!([]));
        transport.require_auth("fresh");
        transport.renew_succeeds_with("fresh");
        transport.renew_delay(30);
        let gw = gateway(transport);
        gw.session().set_credential(Some("stale".into()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                gw.execute(&RequestSpec::get("/courses")).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        // One renewal for four concurrent 401s; each call retried once.
        assert_eq!(gw.transport.renew_count(), 1);
        assert_eq!(gw.transport.calls_for(Method::Get, "/courses"), 8);
        assert_eq!(gw.session().credential().as_deref(), Some("fresh"));
        assert!(!gw.session().renewal_in_flight());
    }

    #[tokio::test]
    async fn test_renewal_failure_clears_session() {
        let transport = StubTransport::new();
        transport.route(Method::Get, "/courses", json!([]));
        transport.require_auth("fresh");
        transport.renew_fails();
        transport.renew_delay(30);
        let gw = gateway(transport);
        gw.session().set_credential(Some("stale".into()));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                gw.execute(&RequestSpec::get("/courses")).await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(ApiError::Unauthorized)));
        }

        assert_eq!(gw.transport.renew_count(), 1);
        assert!(gw.session().credential().is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let transport = StubTransport::new();
        transport.fail_with_status(Method::Get, "/courses", 500, "boom");
        let gw = gateway(transport);

        let result = gw.execute(&RequestSpec::get("/courses")).await;
        assert!(matches!(result, Err(ApiError::Server { status: 500, .. })));
        assert_eq!(gw.transport.calls_for(Method::Get, "/courses"), 1);
        assert_eq!(gw.transport.renew_count(), 0);
    }

    #[tokio::test]
    async fn test_network_error_is_not_retried() {
        let transport = StubTransport::new();
        transport.fail_with_network_error(Method::Get, "/courses");
        let gw = gateway(transport);

        let result = gw.execute(&RequestSpec::get("/courses")).await;
        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(gw.transport.calls_for(Method::Get, "/courses"), 1);
    }

    #[tokio::test]
    async fn test_conflict_and_not_found_mapping() {
        let transport = StubTransport::new();
        transport.fail_with_status(Method::Post, "/progress", 409, "already completed");
        let gw = gateway(transport);

        let conflict = gw
            .execute(&RequestSpec::post("/progress", json!({})))
            .await;
        assert!(matches!(conflict, Err(ApiError::Conflict(_))));

        let missing = gw.execute(&RequestSpec::get("/lessons/nope")).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_raw_execute_skips_renewal() {
        let transport = StubTransport::new();
        transport.require_auth("fresh");
        transport.renew_succeeds_with("fresh");
        let gw = gateway(transport);

        let result = gw.execute_raw(&RequestSpec::get("/courses")).await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(gw.transport.renew_count(), 0);
    }
}

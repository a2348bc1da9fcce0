//! Per-segment credential and session state machine.
//!
//! ```text
//!                    open() ok
//!  Unauthenticated ───────────► Authenticating ──────────► Authenticated
//!        ▲                            │                         │
//!        │          open() failed     │                         │ renew() rejected
//!        ├────────────────────────────┘                         │ shutdown()
//!        └──────────────────────────────────────────────────────┘
//! ```
//!
//! A segment without an authenticated session still serves public market
//! data; only private streams need a token.

use std::collections::BTreeMap;
use std::sync::Arc;

use feed_core::Segment;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::SessionEndpoint;
use crate::credentials::{CredentialPrompt, CredentialSource, KeyPair};
use crate::error::AuthError;
use crate::event::{SessionEvent, SessionEventSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

/// Snapshot of one segment's session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub segment: Segment,
    pub state: AuthState,
    pub token: Option<String>,
}

impl Session {
    fn unauthenticated(segment: Segment) -> Self {
        Self {
            segment,
            state: AuthState::Unauthenticated,
            token: None,
        }
    }

    fn reset(&mut self) {
        self.state = AuthState::Unauthenticated;
        self.token = None;
    }
}

/// Result of [`CredentialLifecycle::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// At least one segment holds a session token.
    Authenticated(Vec<Segment>),
    /// Continuing with public data only.
    Unauthenticated,
    /// No credentials and the prompt declined unauthenticated mode.
    Declined,
}

struct State {
    keys: Option<KeyPair>,
    sessions: BTreeMap<Segment, Session>,
}

/// Owns the key pair and one session per segment.
///
/// Network calls go through the segment's [`SessionEndpoint`]. The state lock
/// is never held across one of those calls.
pub struct CredentialLifecycle {
    endpoints: BTreeMap<Segment, Arc<dyn SessionEndpoint>>,
    state: Mutex<State>,
    events: Option<SessionEventSender>,
}

impl CredentialLifecycle {
    /// One session per endpoint, all starting unauthenticated.
    pub fn new(endpoints: Vec<Arc<dyn SessionEndpoint>>) -> Self {
        let endpoints: BTreeMap<Segment, Arc<dyn SessionEndpoint>> =
            endpoints.into_iter().map(|e| (e.segment(), e)).collect();
        let sessions = endpoints
            .keys()
            .map(|&segment| (segment, Session::unauthenticated(segment)))
            .collect();
        Self {
            endpoints,
            state: Mutex::new(State { keys: None, sessions }),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: SessionEventSender) -> Self {
        self.events = Some(tx);
        self
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Authenticate every segment.
    ///
    /// Key pair resolution order: `supplied`, then `source`, then the
    /// prompt's decision to go on without one. A refused key pair resets the
    /// segments to `Unauthenticated` and asks the prompt for a replacement
    /// until one works or the prompt gives up.
    pub async fn authenticate(
        &self,
        supplied: Option<KeyPair>,
        source: &dyn CredentialSource,
        prompt: &dyn CredentialPrompt,
    ) -> AuthOutcome {
        let mut keys = supplied.or_else(|| source.load());

        loop {
            let Some(pair) = keys.take() else {
                if prompt.continue_unauthenticated() {
                    info!("[auth] continuing unauthenticated, public streams only");
                    self.fall_back("no credentials").await;
                    return AuthOutcome::Unauthenticated;
                }
                return AuthOutcome::Declined;
            };

            match self.open_sessions(&pair).await {
                Ok(segments) => {
                    self.state.lock().await.keys = Some(pair);
                    return AuthOutcome::Authenticated(segments);
                }
                Err(e) => {
                    warn!("[auth] key pair not accepted: {e}");
                    keys = prompt.request_credentials(&e);
                    if keys.is_none() {
                        self.state.lock().await.keys = None;
                        return AuthOutcome::Unauthenticated;
                    }
                }
            }
        }
    }

    /// Open a session on every segment with `keys`. Segments that fail stay
    /// unauthenticated; the call fails only when none succeeds.
    async fn open_sessions(&self, keys: &KeyPair) -> Result<Vec<Segment>, AuthError> {
        let mut opened = Vec::new();
        let mut last_error = None;

        for (&segment, endpoint) in &self.endpoints {
            self.set_state(segment, AuthState::Authenticating, None).await;
            debug!("[auth] {segment} authenticating");

            match endpoint.open(keys).await {
                Ok(token) => {
                    self.set_state(segment, AuthState::Authenticated, Some(token))
                        .await;
                    info!("[auth] {segment} authenticated");
                    self.emit(SessionEvent::Authenticated { segment });
                    opened.push(segment);
                }
                Err(e) => {
                    self.set_state(segment, AuthState::Unauthenticated, None)
                        .await;
                    warn!("[auth] {segment} authentication failed: {e}");
                    self.emit(SessionEvent::Unauthenticated {
                        segment,
                        reason: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        match (opened.is_empty(), last_error) {
            (false, _) => Ok(opened),
            (true, Some(e)) => Err(e),
            (true, None) => Err(AuthError::Transport("no session endpoints configured".into())),
        }
    }

    async fn fall_back(&self, reason: &str) {
        let mut state = self.state.lock().await;
        state.keys = None;
        for (segment, session) in state.sessions.iter_mut() {
            session.reset();
            self.emit(SessionEvent::Unauthenticated {
                segment: *segment,
                reason: reason.to_owned(),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Renewal
    // -----------------------------------------------------------------------

    /// Extend `segment`'s session before it expires. Returns the token to use
    /// from now on, which may differ from the previous one.
    ///
    /// A rejection drops the segment to `Unauthenticated`. Transport errors
    /// leave the session untouched and are returned as-is.
    pub async fn renew(&self, segment: Segment) -> Result<String, AuthError> {
        let (endpoint, keys, token) = {
            let state = self.state.lock().await;
            let session = state.sessions.get(&segment);
            match (self.endpoints.get(&segment), &state.keys, session) {
                (
                    Some(endpoint),
                    Some(keys),
                    Some(Session {
                        state: AuthState::Authenticated,
                        token: Some(token),
                        ..
                    }),
                ) => (Arc::clone(endpoint), keys.clone(), token.clone()),
                _ => return Err(AuthError::NotAuthenticated(segment)),
            }
        };

        match endpoint.renew(&keys, &token).await {
            Ok(renewed) => {
                let token_changed = renewed != token;
                self.set_state(segment, AuthState::Authenticated, Some(renewed.clone()))
                    .await;
                debug!("[auth] {segment} session renewed (token changed: {token_changed})");
                self.emit(SessionEvent::TokenRenewed { segment, token_changed });
                Ok(renewed)
            }
            Err(e) if e.is_rejected() => {
                warn!("[auth] {segment} renewal rejected, dropping to unauthenticated: {e}");
                self.set_state(segment, AuthState::Unauthenticated, None)
                    .await;
                self.emit(SessionEvent::RenewalFailed {
                    segment,
                    error: e.clone(),
                });
                self.emit(SessionEvent::Unauthenticated {
                    segment,
                    reason: e.to_string(),
                });
                Err(e)
            }
            Err(e) => {
                warn!("[auth] {segment} renewal failed: {e}");
                self.emit(SessionEvent::RenewalFailed {
                    segment,
                    error: e.clone(),
                });
                Err(e)
            }
        }
    }

    /// Renew every authenticated segment.
    pub async fn renew_all(&self) -> Vec<(Segment, Result<String, AuthError>)> {
        let mut results = Vec::new();
        for segment in self.authenticated_segments().await {
            results.push((segment, self.renew(segment).await));
        }
        results
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close every open session token. Best effort: failures are logged and
    /// the session is dropped locally either way.
    pub async fn shutdown(&self) {
        let (keys, open) = {
            let mut state = self.state.lock().await;
            let keys = state.keys.take();
            let open: Vec<(Segment, String)> = state
                .sessions
                .iter_mut()
                .filter_map(|(segment, session)| {
                    let token = session.token.take();
                    session.reset();
                    token.map(|t| (*segment, t))
                })
                .collect();
            (keys, open)
        };

        let Some(keys) = keys else {
            return;
        };

        for (segment, token) in open {
            let Some(endpoint) = self.endpoints.get(&segment) else {
                continue;
            };
            match endpoint.close(&keys, &token).await {
                Ok(()) => info!("[auth] {segment} session closed"),
                Err(e) => warn!("[auth] {segment} session close failed: {e}"),
            }
            self.emit(SessionEvent::Closed { segment });
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn state(&self, segment: Segment) -> AuthState {
        self.state
            .lock()
            .await
            .sessions
            .get(&segment)
            .map_or(AuthState::Unauthenticated, |s| s.state)
    }

    pub async fn is_authenticated(&self, segment: Segment) -> bool {
        self.state(segment).await == AuthState::Authenticated
    }

    /// Current session token, if the segment is authenticated.
    pub async fn session_token(&self, segment: Segment) -> Option<String> {
        self.state
            .lock()
            .await
            .sessions
            .get(&segment)
            .and_then(|s| s.token.clone())
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.state.lock().await.sessions.values().cloned().collect()
    }

    pub async fn authenticated_segments(&self) -> Vec<Segment> {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.state == AuthState::Authenticated)
            .map(|s| s.segment)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn set_state(&self, segment: Segment, auth: AuthState, token: Option<String>) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.sessions.get_mut(&segment) {
            session.state = auth;
            session.token = token;
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::credentials::StaticCredentials;

    /// Accepts one key pair; renewal and close outcomes are scripted.
    struct MockEndpoint {
        segment: Segment,
        valid_api_key: &'static str,
        renew_result: StdMutex<Option<Result<String, AuthError>>>,
        closed: AtomicUsize,
    }

    impl MockEndpoint {
        fn new(segment: Segment) -> Arc<Self> {
            Arc::new(Self {
                segment,
                valid_api_key: "good",
                renew_result: StdMutex::new(None),
                closed: AtomicUsize::new(0),
            })
        }

        fn script_renewal(&self, result: Result<String, AuthError>) {
            *self.renew_result.lock().unwrap() = Some(result);
        }
    }

    #[async_trait]
    impl SessionEndpoint for MockEndpoint {
        fn segment(&self) -> Segment {
            self.segment
        }

        async fn open(&self, keys: &KeyPair) -> Result<String, AuthError> {
            if keys.api_key == self.valid_api_key {
                Ok(format!("{}-token-1", self.segment))
            } else {
                Err(AuthError::Rejected {
                    code: Some(-2015),
                    msg: "Invalid API-key, IP, or permissions for action.".into(),
                })
            }
        }

        async fn renew(&self, _keys: &KeyPair, token: &str) -> Result<String, AuthError> {
            self.renew_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(token.to_owned()))
        }

        async fn close(&self, _keys: &KeyPair, _token: &str) -> Result<(), AuthError> {
            self.closed.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Records how often it was asked and hands out a scripted key pair.
    struct ScriptedPrompt {
        continue_without_keys: bool,
        replacement: StdMutex<Option<KeyPair>>,
        asked: AtomicUsize,
    }

    impl ScriptedPrompt {
        fn new(continue_without_keys: bool, replacement: Option<KeyPair>) -> Self {
            Self {
                continue_without_keys,
                replacement: StdMutex::new(replacement),
                asked: AtomicUsize::new(0),
            }
        }
    }

    impl CredentialPrompt for ScriptedPrompt {
        fn continue_unauthenticated(&self) -> bool {
            self.continue_without_keys
        }

        fn request_credentials(&self, _error: &AuthError) -> Option<KeyPair> {
            self.asked.fetch_add(1, Ordering::Relaxed);
            self.replacement.lock().unwrap().take()
        }
    }

    fn lifecycle(endpoints: &[Arc<MockEndpoint>]) -> CredentialLifecycle {
        CredentialLifecycle::new(
            endpoints
                .iter()
                .map(|e| Arc::clone(e) as Arc<dyn SessionEndpoint>)
                .collect(),
        )
    }

    fn none() -> StaticCredentials {
        StaticCredentials(None)
    }

    #[tokio::test]
    async fn valid_keys_authenticate_every_segment() {
        let spot = MockEndpoint::new(Segment::Spot);
        let um = MockEndpoint::new(Segment::Um);
        let lc = lifecycle(&[spot, um]);
        let prompt = ScriptedPrompt::new(true, None);

        let outcome = lc
            .authenticate(Some(KeyPair::new("good", "s")), &none(), &prompt)
            .await;

        assert_eq!(outcome, AuthOutcome::Authenticated(vec![Segment::Spot, Segment::Um]));
        assert!(lc.is_authenticated(Segment::Spot).await);
        assert_eq!(lc.session_token(Segment::Um).await.as_deref(), Some("um-token-1"));
    }

    #[tokio::test]
    async fn invalid_keys_fall_back_to_unauthenticated() {
        let spot = MockEndpoint::new(Segment::Spot);
        let lc = lifecycle(&[spot]);
        let prompt = ScriptedPrompt::new(true, None);

        let outcome = lc
            .authenticate(Some(KeyPair::new("bad", "s")), &none(), &prompt)
            .await;

        assert_eq!(outcome, AuthOutcome::Unauthenticated);
        assert_eq!(lc.state(Segment::Spot).await, AuthState::Unauthenticated);
        assert_eq!(lc.session_token(Segment::Spot).await, None);
        assert_eq!(prompt.asked.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn rejected_keys_retry_with_replacement() {
        let spot = MockEndpoint::new(Segment::Spot);
        let lc = lifecycle(&[spot]);
        let prompt = ScriptedPrompt::new(true, Some(KeyPair::new("good", "s")));

        let outcome = lc
            .authenticate(Some(KeyPair::new("bad", "s")), &none(), &prompt)
            .await;

        assert_eq!(outcome, AuthOutcome::Authenticated(vec![Segment::Spot]));
        assert_eq!(prompt.asked.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn source_consulted_when_nothing_supplied() {
        let lc = lifecycle(&[MockEndpoint::new(Segment::Um)]);
        let source = StaticCredentials(Some(KeyPair::new("good", "s")));
        let outcome = lc
            .authenticate(None, &source, &ScriptedPrompt::new(false, None))
            .await;
        assert_eq!(outcome, AuthOutcome::Authenticated(vec![Segment::Um]));
    }

    #[tokio::test]
    async fn no_keys_asks_before_going_public() {
        let lc = lifecycle(&[MockEndpoint::new(Segment::Spot)]);
        assert_eq!(
            lc.authenticate(None, &none(), &ScriptedPrompt::new(true, None)).await,
            AuthOutcome::Unauthenticated
        );
        assert_eq!(
            lc.authenticate(None, &none(), &ScriptedPrompt::new(false, None)).await,
            AuthOutcome::Declined
        );
    }

    #[tokio::test]
    async fn renewal_may_issue_a_new_token() {
        let um = MockEndpoint::new(Segment::Um);
        let lc = lifecycle(&[Arc::clone(&um)]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let lc = lc.with_events(tx);
        lc.authenticate(Some(KeyPair::new("good", "s")), &none(), &ScriptedPrompt::new(true, None))
            .await;
        assert_eq!(rx.recv().await, Some(SessionEvent::Authenticated { segment: Segment::Um }));

        um.script_renewal(Ok("um-token-2".into()));
        assert_eq!(lc.renew(Segment::Um).await.unwrap(), "um-token-2");
        assert_eq!(lc.session_token(Segment::Um).await.as_deref(), Some("um-token-2"));
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::TokenRenewed { segment: Segment::Um, token_changed: true })
        );
    }

    #[tokio::test]
    async fn transport_failure_on_renewal_keeps_session() {
        let spot = MockEndpoint::new(Segment::Spot);
        let lc = lifecycle(&[Arc::clone(&spot)]);
        lc.authenticate(Some(KeyPair::new("good", "s")), &none(), &ScriptedPrompt::new(true, None))
            .await;

        spot.script_renewal(Err(AuthError::Transport("connection reset".into())));
        let err = lc.renew(Segment::Spot).await.unwrap_err();
        assert!(err.is_transport());
        assert!(lc.is_authenticated(Segment::Spot).await);
        assert_eq!(lc.session_token(Segment::Spot).await.as_deref(), Some("spot-token-1"));
    }

    #[tokio::test]
    async fn rejected_renewal_drops_session() {
        let spot = MockEndpoint::new(Segment::Spot);
        let lc = lifecycle(&[Arc::clone(&spot)]);
        lc.authenticate(Some(KeyPair::new("good", "s")), &none(), &ScriptedPrompt::new(true, None))
            .await;

        spot.script_renewal(Err(AuthError::Rejected {
            code: Some(-1125),
            msg: "This listenKey does not exist.".into(),
        }));
        assert!(lc.renew(Segment::Spot).await.unwrap_err().is_rejected());
        assert_eq!(lc.state(Segment::Spot).await, AuthState::Unauthenticated);
        assert_eq!(lc.session_token(Segment::Spot).await, None);
    }

    #[tokio::test]
    async fn renew_requires_a_session() {
        let lc = lifecycle(&[MockEndpoint::new(Segment::Spot)]);
        assert_eq!(
            lc.renew(Segment::Spot).await,
            Err(AuthError::NotAuthenticated(Segment::Spot))
        );
        assert!(lc.renew_all().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_closes_tokens() {
        let spot = MockEndpoint::new(Segment::Spot);
        let um = MockEndpoint::new(Segment::Um);
        let lc = lifecycle(&[Arc::clone(&spot), Arc::clone(&um)]);
        lc.authenticate(Some(KeyPair::new("good", "s")), &none(), &ScriptedPrompt::new(true, None))
            .await;

        lc.shutdown().await;
        assert_eq!(spot.closed.load(Ordering::Relaxed), 1);
        assert_eq!(um.closed.load(Ordering::Relaxed), 1);
        assert!(lc.authenticated_segments().await.is_empty());

        // second call has nothing left to close
        lc.shutdown().await;
        assert_eq!(spot.closed.load(Ordering::Relaxed), 1);
    }
}

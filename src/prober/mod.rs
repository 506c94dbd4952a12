//! Core functionality for bounded active probing.
//!
//! A probe run takes one target and an ordered list of
//! [`ProbeCandidate`]s (stream path plus optional credential) and tries every
//! candidate, with at most `max_concurrency` attempts in flight at once.
//! Every attempt gets its own timeout, failures are recorded and never
//! retried, and the whole run can be abandoned through a
//! [`CancellationToken`].
//!
//! The "best" result is the first successful candidate in the *input* order,
//! not the first one to finish, so repeated runs agree with each other.
pub mod candidates;
mod rtsp;

pub use candidates::{CandidateStrategy, Credential, ProbeCandidate, DEFAULT_RTSP_PATHS};
pub use rtsp::RtspConnector;

use futures::future::{join_all, BoxFuture};
use log::{debug, info, warn};
use serde_derive::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io;
use tokio::sync::Semaphore;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Default number of attempts allowed in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

const CANCELLED: &str = "cancelled";
const SAFE_MODE_REASON: &str = "safe mode is enabled; active probing is disabled";

/// What a connector learned from one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub reason: String,
    pub server: Option<String>,
    pub codecs: Vec<String>,
}

impl ProbeResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Performs the network call for a single candidate.
///
/// The prober wraps every call in its own timeout and cancellation, so
/// implementations only need to do the protocol exchange.
pub trait ProbeConnector {
    fn probe<'a>(
        &'a self,
        target: SocketAddr,
        candidate: &'a ProbeCandidate,
    ) -> BoxFuture<'a, io::Result<ProbeResponse>>;
}

/// Shared policy switch that disables active probing.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct SafeMode(Arc<AtomicBool>);

impl SafeMode {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeAttempt {
    /// Position in the candidate list.
    pub index: usize,
    pub uri: String,
    pub path: String,
    /// Username tried, if any. Passwords never leave the candidate.
    pub username: Option<String>,
    pub success: bool,
    pub status: Option<u16>,
    pub server: Option<String>,
    pub codecs: Vec<String>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeAttempt {
    fn pending(index: usize, target: SocketAddr, candidate: &ProbeCandidate) -> Self {
        Self {
            index,
            uri: candidate.uri(target),
            path: candidate.path.clone(),
            username: candidate.credential.as_ref().map(|c| c.username.clone()),
            success: false,
            status: None,
            server: None,
            codecs: Vec::new(),
            latency_ms: None,
            error: None,
        }
    }

    fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// How a probe run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// Every attempt ran to success, failure or timeout.
    Completed,
    /// The caller abandoned the run; unfinished attempts are marked cancelled.
    Cancelled,
    /// Policy refused the run before any attempt started.
    Refused { reason: String },
}

/// Everything a probe run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeSummary {
    pub target: SocketAddr,
    /// Attempts in candidate order.
    pub attempts: Vec<ProbeAttempt>,
    /// URI of the first successful candidate in candidate order.
    pub best_uri: Option<String>,
    pub outcome: ProbeOutcome,
}

impl ProbeSummary {
    fn refused(target: SocketAddr, reason: &str) -> Self {
        Self {
            target,
            attempts: Vec::new(),
            best_uri: None,
            outcome: ProbeOutcome::Refused {
                reason: reason.to_owned(),
            },
        }
    }

    fn from_attempts(target: SocketAddr, mut attempts: Vec<ProbeAttempt>, outcome: ProbeOutcome) -> Self {
        attempts.sort_by_key(|a| a.index);
        let best_uri = attempts.iter().find(|a| a.success).map(|a| a.uri.clone());
        Self {
            target,
            attempts,
            best_uri,
            outcome,
        }
    }

    pub fn total(&self) -> usize {
        self.attempts.len()
    }

    pub fn succeeded(&self) -> usize {
        self.attempts.iter().filter(|a| a.success).count()
    }

    pub fn best(&self) -> Option<&ProbeAttempt> {
        self.attempts.iter().find(|a| a.success)
    }

    pub const fn is_refused(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Refused { .. })
    }

    /// Human summary such as `2 of 5 paths succeeded`.
    pub fn describe(&self) -> String {
        match &self.outcome {
            ProbeOutcome::Refused { reason } => format!("Probe refused: {reason}"),
            ProbeOutcome::Cancelled => format!(
                "{} of {} paths succeeded (cancelled)",
                self.succeeded(),
                self.total()
            ),
            ProbeOutcome::Completed => {
                format!("{} of {} paths succeeded", self.succeeded(), self.total())
            }
        }
    }
}

/// The bounded prober.
#[derive(Debug)]
pub struct Prober<C> {
    connector: C,
    max_concurrency: usize,
    timeout: Duration,
    safe_mode: SafeMode,
}

impl<C: ProbeConnector> Prober<C> {
    /// A `max_concurrency` of zero is treated as one.
    pub fn new(connector: C, max_concurrency: usize, timeout: Duration, safe_mode: SafeMode) -> Self {
        Self {
            connector,
            max_concurrency: max_concurrency.max(1),
            timeout,
            safe_mode,
        }
    }

    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Probes `candidates` on `target` with the configured concurrency cap.
    pub async fn probe(
        &self,
        target: SocketAddr,
        candidates: &[ProbeCandidate],
        cancel: &CancellationToken,
    ) -> ProbeSummary {
        self.probe_with(target, candidates, self.max_concurrency, cancel)
            .await
    }

    /// Probes `candidates` on `target` with an explicit concurrency cap.
    ///
    /// Returns once every attempt has finished or been abandoned through
    /// `cancel`. Safe mode is checked once, up front.
    pub async fn probe_with(
        &self,
        target: SocketAddr,
        candidates: &[ProbeCandidate],
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> ProbeSummary {
        if self.safe_mode.is_enabled() {
            warn!(
                "Refusing to probe {target}: {SAFE_MODE_REASON} ({} candidate(s) skipped)",
                candidates.len()
            );
            return ProbeSummary::refused(target, SAFE_MODE_REASON);
        }

        let gate = Semaphore::new(max_concurrency.max(1));
        debug!(
            "Start probing {target}\nCandidates {}\nMax concurrency {}\nTimeout {:?}",
            candidates.len(),
            max_concurrency.max(1),
            self.timeout
        );

        let attempts = join_all(
            candidates
                .iter()
                .enumerate()
                .map(|(index, candidate)| self.attempt(&gate, target, index, candidate, cancel)),
        )
        .await;

        let outcome = if attempts.iter().any(|a| a.error.as_deref() == Some(CANCELLED)) {
            ProbeOutcome::Cancelled
        } else {
            ProbeOutcome::Completed
        };
        let summary = ProbeSummary::from_attempts(target, attempts, outcome);
        info!(
            "{target}: {} (best: {})",
            summary.describe(),
            summary.best_uri.as_deref().unwrap_or("none")
        );
        summary
    }

    /// Runs one candidate behind the admission gate.
    ///
    /// The permit is held by a guard for the duration of the network call and
    /// released on every exit path, including timeout and cancellation.
    async fn attempt(
        &self,
        gate: &Semaphore,
        target: SocketAddr,
        index: usize,
        candidate: &ProbeCandidate,
        cancel: &CancellationToken,
    ) -> ProbeAttempt {
        let mut attempt = ProbeAttempt::pending(index, target, candidate);

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return attempt.failed(CANCELLED),
            permit = gate.acquire() => permit,
        };
        let Ok(_permit) = permit else {
            return attempt.failed("admission gate closed");
        };

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = time::timeout(self.timeout, self.connector.probe(target, candidate)) => Some(result),
        };
        attempt.latency_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        match result {
            None => attempt.failed(CANCELLED),
            Some(Err(_)) => {
                debug!("{} timed out", attempt.uri);
                attempt.failed(format!("timed out after {} ms", self.timeout.as_millis()))
            }
            Some(Ok(Err(e))) => {
                debug!("{} failed: {e}", attempt.uri);
                attempt.failed(e.to_string())
            }
            Some(Ok(Ok(response))) => {
                attempt.success = response.is_success();
                attempt.status = Some(response.status);
                attempt.server = response.server;
                attempt.codecs = response.codecs;
                if !attempt.success {
                    debug!("{} answered {} {}", attempt.uri, response.status, response.reason);
                    attempt.error = Some(format!("RTSP {} {}", response.status, response.reason));
                }
                attempt
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    /// Connector scripted per path: `/ok*` succeeds, `/deny*` answers 401,
    /// anything else fails to connect. Paths in `slow` take five seconds.
    /// `trip` is cancelled just before each answer is returned.
    #[derive(Default)]
    struct Scripted {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        slow: HashSet<String>,
        trip: Option<CancellationToken>,
    }

    impl ProbeConnector for Scripted {
        fn probe<'a>(
            &'a self,
            _target: SocketAddr,
            candidate: &'a ProbeCandidate,
        ) -> BoxFuture<'a, io::Result<ProbeResponse>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let delay = if self.slow.contains(&candidate.path) { 5_000 } else { 20 };
                time::sleep(Duration::from_millis(delay)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                if let Some(token) = &self.trip {
                    token.cancel();
                }

                if candidate.path.starts_with("/ok") {
                    Ok(ProbeResponse {
                        status: 200,
                        reason: "OK".to_owned(),
                        server: Some("TestCam".to_owned()),
                        codecs: vec!["H264".to_owned()],
                    })
                } else if candidate.path.starts_with("/deny") {
                    Ok(ProbeResponse {
                        status: 401,
                        reason: "Unauthorized".to_owned(),
                        server: None,
                        codecs: vec![],
                    })
                } else {
                    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
                }
            })
        }
    }

    fn target() -> SocketAddr {
        "192.0.2.10:554".parse().unwrap()
    }

    fn candidates(paths: &[&str]) -> Vec<ProbeCandidate> {
        paths.iter().map(|p| ProbeCandidate::new(p, None)).collect()
    }

    #[tokio::test]
    async fn records_every_attempt_in_candidate_order() {
        let prober = Prober::new(Scripted::default(), 2, Duration::from_secs(1), SafeMode::default());
        let list = candidates(&["/nope", "/ok1", "/deny", "/ok2", "/gone"]);

        let summary = prober.probe(target(), &list, &CancellationToken::new()).await;

        assert_eq!(summary.outcome, ProbeOutcome::Completed);
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.best_uri.as_deref(), Some("rtsp://192.0.2.10:554/ok1"));
        assert_eq!(summary.describe(), "2 of 5 paths succeeded");
        assert_eq!(
            summary.attempts.iter().map(|a| a.index).collect::<Vec<_>>(),
            [0, 1, 2, 3, 4]
        );
        assert_eq!(summary.attempts[2].error.as_deref(), Some("RTSP 401 Unauthorized"));
        assert_eq!(summary.attempts[1].codecs, ["H264"]);
    }

    #[tokio::test]
    async fn gate_caps_concurrent_attempts() {
        let prober = Prober::new(Scripted::default(), 3, Duration::from_secs(1), SafeMode::default());
        let paths = (0..12).map(|i| format!("/ok{i}")).collect::<Vec<_>>();
        let list = paths.iter().map(|p| ProbeCandidate::new(p, None)).collect::<Vec<_>>();

        prober.probe(target(), &list, &CancellationToken::new()).await;

        assert_eq!(prober.connector.calls.load(Ordering::SeqCst), 12);
        assert!(prober.connector.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(prober.connector.active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn safe_mode_refuses_before_any_attempt() {
        let safe_mode = SafeMode::new(true);
        let prober = Prober::new(Scripted::default(), 4, Duration::from_secs(1), safe_mode.clone());

        let summary = prober
            .probe(target(), &candidates(&["/ok"]), &CancellationToken::new())
            .await;

        assert!(summary.is_refused());
        assert!(summary.attempts.is_empty());
        assert_eq!(summary.best_uri, None);
        assert_eq!(prober.connector.calls.load(Ordering::SeqCst), 0);

        safe_mode.set(false);
        let summary = prober
            .probe(target(), &candidates(&["/ok"]), &CancellationToken::new())
            .await;
        assert_eq!(summary.succeeded(), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_release_the_gate() {
        let connector = Scripted {
            slow: ["/ok-slow".to_owned()].into_iter().collect(),
            ..Scripted::default()
        };
        let prober = Prober::new(connector, 1, Duration::from_millis(100), SafeMode::default());

        let summary = prober
            .probe(target(), &candidates(&["/ok-slow", "/ok-fast"]), &CancellationToken::new())
            .await;

        assert!(summary.attempts[0].error.as_deref().unwrap().contains("timed out"));
        assert!(summary.attempts[1].success);
        assert_eq!(summary.best_uri.as_deref(), Some("rtsp://192.0.2.10:554/ok-fast"));
    }

    #[tokio::test]
    async fn cancellation_abandons_in_flight_and_queued_attempts() {
        let connector = Scripted {
            slow: ["/ok-a", "/ok-b", "/ok-c"].iter().map(|&p| p.to_owned()).collect(),
            ..Scripted::default()
        };
        let prober = Prober::new(connector, 1, Duration::from_secs(30), SafeMode::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let summary = time::timeout(
            Duration::from_secs(2),
            prober.probe(target(), &candidates(&["/ok-a", "/ok-b", "/ok-c"]), &cancel),
        )
        .await
        .expect("cancellation should end the run promptly");

        assert_eq!(summary.outcome, ProbeOutcome::Cancelled);
        assert_eq!(summary.succeeded(), 0);
        assert!(summary
            .attempts
            .iter()
            .all(|a| a.error.as_deref() == Some(CANCELLED)));
        assert_eq!(prober.connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_tripped_after_last_answer_still_completes() {
        let cancel = CancellationToken::new();
        let connector = Scripted {
            trip: Some(cancel.clone()),
            ..Scripted::default()
        };
        let prober = Prober::new(connector, 1, Duration::from_secs(1), SafeMode::default());

        let summary = prober.probe(target(), &candidates(&["/ok"]), &cancel).await;

        assert!(cancel.is_cancelled());
        assert_eq!(summary.outcome, ProbeOutcome::Completed);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.best_uri.as_deref(), Some("rtsp://192.0.2.10:554/ok"));
    }

    #[tokio::test]
    async fn zero_concurrency_is_clamped() {
        let prober = Prober::new(Scripted::default(), 0, Duration::from_secs(1), SafeMode::default());
        assert_eq!(prober.max_concurrency(), 1);
        let summary = prober
            .probe_with(target(), &candidates(&["/ok"]), 0, &CancellationToken::new())
            .await;
        assert_eq!(summary.succeeded(), 1);
    }
}

//! Status synchronizer: keeps the local profile in step with the system of
//! record and drives the redirect countdown.
//!
//! At most one status fetch per subject is in flight. A refresh that arrives
//! while one is pending attaches to it and receives the same result.

use crate::backend::VerificationBackend;
use crate::error::VerificationError;
use crate::scheduler::{self, TickControl, TimerHandle};
use crate::state_machine::VerificationStateMachine;
use ekyc_types::{SubjectId, VerificationParams, VerificationProfile};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

type ProfileFetch = Shared<BoxFuture<'static, Result<VerificationProfile, VerificationError>>>;

/// Why a refresh was requested. Logged only; every trigger is deduplicated
/// the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshTrigger {
    Mount,
    Focus,
    Manual,
    Poll,
}

pub struct StatusSynchronizer {
    backend: Arc<dyn VerificationBackend>,
    state: Arc<VerificationStateMachine>,
    in_flight: Mutex<HashMap<SubjectId, (u64, ProfileFetch)>>,
    next_ticket: AtomicU64,
    fetches_issued: AtomicU64,
}

impl StatusSynchronizer {
    pub fn new(backend: Arc<dyn VerificationBackend>, state: Arc<VerificationStateMachine>) -> Self {
        Self {
            backend,
            state,
            in_flight: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
            fetches_issued: AtomicU64::new(0),
        }
    }

    fn in_flight_map(&self) -> MutexGuard<'_, HashMap<SubjectId, (u64, ProfileFetch)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the subject's status, or join the fetch already in flight, and
    /// merge it into the local profile. Returns the merged local profile.
    pub async fn refresh(
        &self,
        subject: &SubjectId,
        trigger: RefreshTrigger,
    ) -> Result<VerificationProfile, VerificationError> {
        let (ticket, fetch) = {
            let mut in_flight = self.in_flight_map();
            match in_flight.get(subject) {
                Some((ticket, fetch)) => {
                    debug!(%subject, ?trigger, "joining in-flight status fetch");
                    (*ticket, fetch.clone())
                }
                None => {
                    let backend = self.backend.clone();
                    let target = subject.clone();
                    let fetch = async move { backend.fetch_status(&target).await }
                        .boxed()
                        .shared();
                    let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                    self.fetches_issued.fetch_add(1, Ordering::Relaxed);
                    debug!(%subject, ?trigger, "issuing status fetch");
                    in_flight.insert(subject.clone(), (ticket, fetch.clone()));
                    (ticket, fetch)
                }
            }
        };

        let result = fetch.await;

        {
            let mut in_flight = self.in_flight_map();
            if in_flight.get(subject).is_some_and(|(t, _)| *t == ticket) {
                in_flight.remove(subject);
            }
        }

        let remote = result.inspect_err(|e| {
            warn!(%subject, ?trigger, error = %e, "status fetch failed");
        })?;
        self.state.observe(subject, &remote);
        Ok(self.state.profile(subject))
    }

    /// Whether a status fetch for `subject` is currently pending.
    pub fn in_flight(&self, subject: &SubjectId) -> bool {
        self.in_flight_map().contains_key(subject)
    }

    /// Total fetches sent to the backend (joins not counted).
    pub fn fetches_issued(&self) -> u64 {
        self.fetches_issued.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> &Arc<VerificationStateMachine> {
        &self.state
    }
}

/// Timing for one [`SyncSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Seconds between reaching `FullyVerified` and the redirect.
    pub countdown_secs: u64,
    /// Background polling period; `None` disables polling.
    pub poll_interval: Option<Duration>,
}

impl SyncOptions {
    pub fn standard(params: &VerificationParams) -> Self {
        Self {
            countdown_secs: params.redirect_countdown_secs,
            poll_interval: poll_interval(params),
        }
    }

    /// The secondary flow with the longer countdown.
    pub fn legacy(params: &VerificationParams) -> Self {
        Self {
            countdown_secs: params.legacy_redirect_countdown_secs,
            poll_interval: poll_interval(params),
        }
    }
}

fn poll_interval(params: &VerificationParams) -> Option<Duration> {
    (params.status_poll_interval_secs > 0)
        .then(|| Duration::from_secs(params.status_poll_interval_secs))
}

type RedirectSlot = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

/// One UI context observing a subject's progress.
///
/// Owns its polling timer and redirect countdown. [`teardown`](Self::teardown)
/// or drop cancels both; the redirect callback runs at most once.
pub struct SyncSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    subject: SubjectId,
    sync: Arc<StatusSynchronizer>,
    options: SyncOptions,
    closed: AtomicBool,
    countdown_started: AtomicBool,
    redirected: Arc<AtomicBool>,
    countdown: Mutex<Option<TimerHandle>>,
    poller: Mutex<Option<TimerHandle>>,
    on_redirect: RedirectSlot,
}

impl SyncSession {
    pub fn new<F>(
        subject: SubjectId,
        sync: Arc<StatusSynchronizer>,
        options: SyncOptions,
        on_redirect: F,
    ) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            inner: Arc::new(SessionInner {
                subject,
                sync,
                options,
                closed: AtomicBool::new(false),
                countdown_started: AtomicBool::new(false),
                redirected: Arc::new(AtomicBool::new(false)),
                countdown: Mutex::new(None),
                poller: Mutex::new(None),
                on_redirect: Arc::new(Mutex::new(Some(Box::new(on_redirect)))),
            }),
        }
    }

    /// Refresh once and start background polling if the subject is not done.
    pub async fn mount(&self) -> Result<VerificationProfile, VerificationError> {
        let profile = SessionInner::refresh(&self.inner, RefreshTrigger::Mount).await?;
        if !profile.is_fully_verified() {
            self.start_polling();
        }
        Ok(profile)
    }

    /// Screen re-entry.
    pub async fn focus(&self) -> Result<VerificationProfile, VerificationError> {
        SessionInner::refresh(&self.inner, RefreshTrigger::Focus).await
    }

    pub async fn refresh(&self) -> Result<VerificationProfile, VerificationError> {
        SessionInner::refresh(&self.inner, RefreshTrigger::Manual).await
    }

    /// Seconds left before the redirect, while the countdown is running.
    pub fn countdown_remaining(&self) -> Option<u64> {
        lock(&self.inner.countdown)
            .as_ref()
            .filter(|t| !t.is_cancelled() && !t.is_finished())
            .map(TimerHandle::remaining)
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.inner.poller)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Whether the redirect callback has run.
    pub fn has_redirected(&self) -> bool {
        self.inner.redirected.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn subject(&self) -> &SubjectId {
        &self.inner.subject
    }

    /// Cancel every timer this session owns. Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    fn start_polling(&self) {
        let Some(period) = self.inner.options.poll_interval else {
            return;
        };
        let mut poller = lock(&self.inner.poller);
        if poller.as_ref().is_some_and(|t| !t.is_finished()) || self.is_closed() {
            return;
        }
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        *poller = Some(scheduler::start_repeating(period, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return TickControl::Stop;
                };
                match SessionInner::refresh(&inner, RefreshTrigger::Poll).await {
                    Ok(profile) if profile.is_fully_verified() => TickControl::Stop,
                    Ok(_) => TickControl::Continue,
                    Err(VerificationError::SessionClosed) => TickControl::Stop,
                    Err(e) => {
                        warn!(subject = %inner.subject, error = %e, "status poll failed; will retry");
                        TickControl::Continue
                    }
                }
            }
        }));
        debug!(subject = %self.inner.subject, ?period, "status polling started");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl SessionInner {
    async fn refresh(
        inner: &Arc<SessionInner>,
        trigger: RefreshTrigger,
    ) -> Result<VerificationProfile, VerificationError> {
        if inner.closed.load(Ordering::SeqCst) {
            return Err(VerificationError::SessionClosed);
        }
        let profile = inner.sync.refresh(&inner.subject, trigger).await?;
        // Torn down while the fetch was pending: start nothing.
        if inner.closed.load(Ordering::SeqCst) {
            return Err(VerificationError::SessionClosed);
        }
        inner.on_profile(&profile);
        Ok(profile)
    }

    fn on_profile(&self, profile: &VerificationProfile) {
        if profile.is_fully_verified() {
            if !self.countdown_started.swap(true, Ordering::SeqCst) {
                self.start_countdown();
            }
            return;
        }
        if let Some(timer) = lock(&self.countdown).take() {
            warn!(subject = %self.subject, stage = %profile.stage(), "profile no longer fully verified; redirect cancelled");
            timer.cancel();
        }
    }

    fn start_countdown(&self) {
        let slot = self.on_redirect.clone();
        let redirected = self.redirected.clone();
        let subject = self.subject.clone();
        let secs = self.options.countdown_secs;
        info!(%subject, secs, "fully verified; redirect countdown started");
        let timer = scheduler::start_countdown(secs, move || {
            let callback = lock(&slot).take();
            if let Some(callback) = callback {
                redirected.store(true, Ordering::SeqCst);
                info!(%subject, "redirecting");
                callback();
            }
        });
        *lock(&self.countdown) = Some(timer);
        if let Some(poller) = lock(&self.poller).take() {
            poller.cancel();
        }
    }

    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let countdown = lock(&self.countdown).take();
        let poller = lock(&self.poller).take();
        // Dropping the handles cancels the timers.
        drop((countdown, poller));
        lock(&self.on_redirect).take();
        debug!(subject = %self.subject, "sync session torn down");
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

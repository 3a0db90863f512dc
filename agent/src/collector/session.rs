//! Per-kind session state machine
//!
//! `Idle -> Running -> Stopped -> Running -> ...`. Control operations are
//! serialized by a mutex; producers never touch it and reach the running
//! store through the shared `ArcSwapOption` instead.

use super::recorder::SampleRecorder;
use super::store::SampleStore;
use super::symbols::{FrameResolver, SymbolCache};
use crate::calltree::{CallTree, TreeError};
use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use arc_swap::ArcSwapOption;
use flareprof_shared::types::events::{ProfilerKind, RawSample};
use flareprof_shared::types::status::SessionStatus;
use flareprof_shared::utils::time::file_timestamp;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
}

struct Session {
    state: SessionState,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    output_path: Option<String>,
    samples: Arc<SampleStore>,
    symbols: Arc<SymbolCache>,
}

/// Samples and symbols of one session, copied for a single export
#[derive(Debug)]
pub struct SessionSnapshot {
    pub kind: ProfilerKind,
    pub state: SessionState,
    pub samples: Vec<RawSample>,
    pub symbols: Arc<SymbolCache>,
}

impl SessionSnapshot {
    /// Aggregate the copied samples and check the conservation law.
    pub fn call_tree(&self) -> std::result::Result<CallTree, TreeError> {
        let tree = CallTree::build(&self.samples, &self.symbols)?;
        tree.validate()?;
        Ok(tree)
    }
}

/// A session as it was frozen by `stop`.
///
/// Holds the sealed store itself, so exports and persistence read exactly
/// the stopped samples even if a new session has started since.
#[derive(Debug)]
pub struct StoppedSession {
    pub kind: ProfilerKind,
    pub duration_ms: u64,
    pub output_path: Option<String>,
    samples: Arc<SampleStore>,
    symbols: Arc<SymbolCache>,
}

impl StoppedSession {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            kind: self.kind,
            state: SessionState::Stopped,
            samples: self.samples.snapshot(),
            symbols: self.symbols.clone(),
        }
    }

    pub fn samples(&self) -> usize {
        self.samples.len()
    }
}

/// Counters read by status and metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub samples: u64,
    pub dropped: u64,
}

pub struct SessionController {
    kind: ProfilerKind,
    profile_dir: PathBuf,
    max_samples: usize,
    resolver: Arc<dyn FrameResolver>,
    session: Mutex<Session>,
    active: Arc<ArcSwapOption<SampleStore>>,
}

impl SessionController {
    pub fn new(
        kind: ProfilerKind,
        config: &ProfilerConfig,
        resolver: Arc<dyn FrameResolver>,
    ) -> Self {
        let session = Session {
            state: SessionState::Idle,
            started_at: None,
            stopped_at: None,
            output_path: None,
            samples: Arc::new(SampleStore::with_capacity(0)),
            symbols: Arc::new(SymbolCache::new(resolver.clone())),
        };

        Self {
            kind,
            profile_dir: config.profile_dir.clone(),
            max_samples: config.max_samples,
            resolver,
            session: Mutex::new(session),
            active: Arc::new(ArcSwapOption::empty()),
        }
    }

    pub fn kind(&self) -> ProfilerKind {
        self.kind
    }

    /// Handle for the sampling mechanism feeding this session
    pub fn recorder(&self) -> SampleRecorder {
        SampleRecorder::new(self.kind, self.active.clone())
    }

    /// Begin a new session, discarding the samples of any previous one.
    pub fn start(&self) -> Result<String> {
        let mut session = self.lock();
        if session.state == SessionState::Running {
            return Err(ProfilerError::AlreadyRunning(self.kind));
        }

        let samples = Arc::new(SampleStore::with_capacity(self.max_samples));
        let output_path = self.output_path_for(SystemTime::now());

        *session = Session {
            state: SessionState::Running,
            started_at: Some(Instant::now()),
            stopped_at: None,
            output_path: Some(output_path.clone()),
            samples: samples.clone(),
            symbols: Arc::new(SymbolCache::new(self.resolver.clone())),
        };
        self.active.store(Some(samples));

        info!(kind = %self.kind, output_path = %output_path, "Profiler session started");
        Ok(output_path)
    }

    /// End the running session and return its duration in whole milliseconds.
    pub fn stop(&self) -> Result<u64> {
        self.finish().map(|stopped| stopped.duration_ms)
    }

    /// End the running session and hand back its sealed samples.
    pub fn finish(&self) -> Result<StoppedSession> {
        let mut session = self.lock();
        if session.state != SessionState::Running {
            return Err(ProfilerError::NotRunning(self.kind));
        }

        self.active.store(None);
        // Producers that loaded the store before the swap finish here.
        session.samples.seal();

        let stopped_at = Instant::now();
        let duration = session
            .started_at
            .map(|started| stopped_at.saturating_duration_since(started))
            .unwrap_or_default();
        session.state = SessionState::Stopped;
        session.stopped_at = Some(stopped_at);

        info!(
            kind = %self.kind,
            duration_ms = duration.as_millis() as u64,
            samples = session.samples.len(),
            dropped = session.samples.dropped(),
            "Profiler session stopped"
        );
        Ok(StoppedSession {
            kind: self.kind,
            duration_ms: duration.as_millis() as u64,
            output_path: session.output_path.clone(),
            samples: session.samples.clone(),
            symbols: session.symbols.clone(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn status(&self) -> SessionStatus {
        let session = self.lock();
        let duration_ms = match (session.state, session.started_at) {
            (SessionState::Idle, _) | (_, None) => None,
            (SessionState::Running, Some(started)) => Some(started.elapsed()),
            (SessionState::Stopped, Some(started)) => Some(
                session
                    .stopped_at
                    .map(|stopped| stopped.saturating_duration_since(started))
                    .unwrap_or(Duration::ZERO),
            ),
        };

        SessionStatus {
            running: session.state == SessionState::Running,
            duration_ms: duration_ms.map(|d| d.as_millis() as u64),
            output_path: session.output_path.clone(),
            samples: session.samples.len() as u64,
        }
    }

    pub fn counters(&self) -> SessionCounters {
        let session = self.lock();
        SessionCounters {
            samples: session.samples.len() as u64,
            dropped: session.samples.dropped(),
        }
    }

    pub fn output_path(&self) -> Option<String> {
        self.lock().output_path.clone()
    }

    /// Copy the current session for an export.
    ///
    /// The lock is held only while the store and cache handles are cloned.
    pub fn snapshot(&self) -> SessionSnapshot {
        let (state, samples, symbols) = {
            let session = self.lock();
            (session.state, session.samples.clone(), session.symbols.clone())
        };

        SessionSnapshot {
            kind: self.kind,
            state,
            samples: samples.snapshot(),
            symbols,
        }
    }

    fn output_path_for(&self, now: SystemTime) -> String {
        self.profile_dir
            .join(format!("{}-{}.folded", self.kind, file_timestamp(now)))
            .to_string_lossy()
            .into_owned()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish()
    }
}

//! Flareprof profiler core
//!
//! This library holds everything between the sampling hooks and the HTTP
//! surface: per-kind session control, lock-free sample storage, symbol
//! resolution, call tree aggregation and the JSON / SVG / collapsed exporters.

pub mod calltree;
pub mod collector;
pub mod config;
pub mod error;
pub mod output;
pub mod status;

pub use calltree::CallTree;
pub use collector::recorder::{RecordOutcome, SampleRecorder};
pub use collector::session::{
    SessionController, SessionCounters, SessionSnapshot, SessionState, StoppedSession,
};
pub use collector::symbols::{FrameResolver, ProcessResolver, ResolveError, SymbolTable};
pub use config::ProfilerConfig;
pub use error::ProfilerError;
pub use output::{OutputError, SvgOptions};

use collector::symbols::join_inlined;
use error::Result;
use flareprof_shared::types::events::ProfilerKind;
use flareprof_shared::types::profile::FlamegraphNode;
use flareprof_shared::types::status::StatusReport;
use flareprof_shared::utils::format_address;
use status::StatusReporter;
use std::sync::Arc;
use tracing::{debug, warn};

/// CPU and Heap profilers plus the exporters over them.
///
/// Built once and shared (`Arc<Profiler>`) between request handlers and
/// sampling hooks.
pub struct Profiler {
    config: ProfilerConfig,
    resolver: Arc<dyn FrameResolver>,
    cpu: SessionController,
    heap: SessionController,
}

impl Profiler {
    pub fn new(config: ProfilerConfig, resolver: Arc<dyn FrameResolver>) -> Self {
        let cpu = SessionController::new(ProfilerKind::Cpu, &config, resolver.clone());
        let heap = SessionController::new(ProfilerKind::Heap, &config, resolver.clone());
        Self {
            config,
            resolver,
            cpu,
            heap,
        }
    }

    /// Profiler resolving addresses of the current process
    pub fn for_current_process(config: ProfilerConfig) -> Self {
        Self::new(config, Arc::new(ProcessResolver))
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn session(&self, kind: ProfilerKind) -> &SessionController {
        match kind {
            ProfilerKind::Cpu => &self.cpu,
            ProfilerKind::Heap => &self.heap,
        }
    }

    pub fn recorder(&self, kind: ProfilerKind) -> SampleRecorder {
        self.session(kind).recorder()
    }

    /// Start a session and return its output path
    pub fn start(&self, kind: ProfilerKind) -> Result<String> {
        self.session(kind).start()
    }

    /// Stop a session and return its duration in milliseconds
    pub fn stop(&self, kind: ProfilerKind) -> Result<u64> {
        self.finish(kind).map(|stopped| stopped.duration_ms)
    }

    /// Stop a session and keep hold of its sealed samples.
    ///
    /// With `persist_on_stop` the collapsed stacks are written before this
    /// returns; a write failure is logged, not returned.
    pub fn finish(&self, kind: ProfilerKind) -> Result<StoppedSession> {
        let stopped = self.session(kind).finish()?;

        if self.config.persist_on_stop {
            if let Err(e) = self.persist(&stopped) {
                warn!(kind = %kind, "Failed to persist profile: {}", e);
            }
        }
        Ok(stopped)
    }

    /// Write the collapsed stacks of a stopped session to its output path
    pub fn persist(&self, stopped: &StoppedSession) -> Result<()> {
        let Some(path) = stopped.output_path.as_deref() else {
            return Ok(());
        };
        let tree = stopped.snapshot().call_tree()?;
        output::write_collapsed(&tree, path)?;
        Ok(())
    }

    pub fn status(&self) -> StatusReport {
        StatusReporter::new(&self.cpu, &self.heap).report()
    }

    /// Aggregate the current samples of `kind`.
    ///
    /// The tree is validated before it is returned; an invalid tree is an
    /// error, never a partial result.
    pub fn call_tree(&self, kind: ProfilerKind) -> Result<CallTree> {
        let snapshot = self.session(kind).snapshot();
        let tree = snapshot.call_tree()?;

        debug!(
            kind = %kind,
            samples = snapshot.samples.len(),
            nodes = tree.node_count(),
            total = tree.total(),
            "Call tree built"
        );
        Ok(tree)
    }

    /// JSON flamegraph document for `kind`
    pub fn flamegraph(&self, kind: ProfilerKind) -> Result<FlamegraphNode> {
        let tree = self.call_tree(kind)?;
        Ok(output::to_document(tree.root()))
    }

    /// JSON document of the subtree at `path` (frame names from the root),
    /// `None` when no such path was sampled
    pub fn flamegraph_focus(
        &self,
        kind: ProfilerKind,
        path: &[&str],
    ) -> Result<Option<FlamegraphNode>> {
        let tree = self.call_tree(kind)?;
        Ok(tree.find(path).map(output::to_document))
    }

    pub fn svg(&self, kind: ProfilerKind, options: &SvgOptions) -> Result<String> {
        let tree = self.call_tree(kind)?;
        Ok(output::render_svg(&tree, options))
    }

    pub fn collapsed(&self, kind: ProfilerKind) -> Result<String> {
        let tree = self.call_tree(kind)?;
        Ok(output::to_collapsed(&tree))
    }

    /// Symbol name for one address, hex when it cannot be resolved
    pub fn resolve_symbol(&self, address: u64) -> String {
        match self.resolver.resolve(address) {
            Ok(frames) if !frames.is_empty() => join_inlined(&frames),
            Ok(_) => format_address(address),
            Err(e) => {
                debug!("Falling back to raw address: {}", e);
                format_address(address)
            }
        }
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("config", &self.config)
            .field("cpu", &self.cpu)
            .field("heap", &self.heap)
            .finish()
    }
}

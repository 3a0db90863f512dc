//! Symbol resolution
//!
//! Resolves instruction pointers to function names, file names, and line numbers.
//! A single address can expand to several frames when the compiler inlined
//! calls into it.

use flareprof_shared::types::profile::ResolvedFrame;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no symbol for address {0:#x}")]
    NotFound(u64),
}

/// Maps an address to the frames executing at it.
///
/// Frames are returned innermost first: `[inlined_leaf, ..., containing_function]`.
pub trait FrameResolver: Send + Sync {
    fn resolve(&self, address: u64) -> Result<Vec<ResolvedFrame>, ResolveError>;
}

/// Resolves addresses of the running process through its own debug info.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessResolver;

impl FrameResolver for ProcessResolver {
    fn resolve(&self, address: u64) -> Result<Vec<ResolvedFrame>, ResolveError> {
        let mut frames = Vec::new();

        backtrace::resolve(address as usize as *mut std::ffi::c_void, |symbol| {
            let name = symbol
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|| flareprof_shared::utils::format_address(address));
            let file = symbol
                .filename()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            frames.push(ResolvedFrame::new(name, file, symbol.lineno().unwrap_or(0)));
        });

        if frames.is_empty() {
            return Err(ResolveError::NotFound(address));
        }
        Ok(frames)
    }
}

/// Fixed address table, used to replay recorded stacks and in tests
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: HashMap<u64, Vec<ResolvedFrame>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SymbolTable::insert`] for a plain function
    pub fn with_function(mut self, address: u64, name: impl Into<String>) -> Self {
        self.insert(address, ResolvedFrame::new(name, "", 0));
        self
    }

    pub fn insert(&mut self, address: u64, frame: ResolvedFrame) {
        self.entries.insert(address, vec![frame]);
    }

    /// Register an address covering inlined code, frames innermost first
    pub fn insert_inlined(&mut self, address: u64, frames: Vec<ResolvedFrame>) {
        self.entries.insert(address, frames);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FrameResolver for SymbolTable {
    fn resolve(&self, address: u64) -> Result<Vec<ResolvedFrame>, ResolveError> {
        self.entries
            .get(&address)
            .filter(|frames| !frames.is_empty())
            .cloned()
            .ok_or(ResolveError::NotFound(address))
    }
}

/// Memoizing front for a [`FrameResolver`].
///
/// Resolution never fails from the caller's point of view: unknown addresses
/// become a single frame named after the hex address.
pub struct SymbolCache {
    resolver: Arc<dyn FrameResolver>,
    /// Cache of resolved symbols: IP -> frames
    cache: RwLock<HashMap<u64, Arc<[ResolvedFrame]>>>,
}

impl SymbolCache {
    pub fn new(resolver: Arc<dyn FrameResolver>) -> Self {
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an instruction pointer to its frames, innermost first
    pub fn resolve(&self, address: u64) -> Arc<[ResolvedFrame]> {
        if let Some(frames) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
        {
            return frames.clone();
        }

        let frames: Arc<[ResolvedFrame]> = match self.resolver.resolve(address) {
            Ok(frames) if !frames.is_empty() => frames.into(),
            Ok(_) => vec![ResolvedFrame::unresolved(address)].into(),
            Err(e) => {
                debug!("Falling back to raw address: {}", e);
                vec![ResolvedFrame::unresolved(address)].into()
            }
        };

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address)
            .or_insert(frames)
            .clone()
    }

    /// Resolve a leaf-first stack, one entry per address
    pub fn resolve_stack(&self, addresses: &[u64]) -> Vec<Arc<[ResolvedFrame]>> {
        addresses.iter().map(|&ip| self.resolve(ip)).collect()
    }

    /// Get the cache size
    pub fn cache_size(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Join innermost-first frames into `outer--inner`
pub fn join_inlined(frames: &[ResolvedFrame]) -> String {
    frames
        .iter()
        .rev()
        .map(|frame| frame.name.as_str())
        .collect::<Vec<_>>()
        .join("--")
}

impl std::fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolCache")
            .field("cached", &self.cache_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl FrameResolver for CountingResolver {
        fn resolve(&self, address: u64) -> Result<Vec<ResolvedFrame>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ResolvedFrame::new(format!("fn_{:x}", address), "lib.rs", 10)])
        }
    }

    #[test]
    fn test_resolver_creation() {
        let cache = SymbolCache::new(Arc::new(SymbolTable::new()));
        assert_eq!(cache.cache_size(), 0);
    }

    #[test]
    fn test_unknown_address_falls_back_to_hex() {
        let cache = SymbolCache::new(Arc::new(SymbolTable::new()));
        let frames = cache.resolve(0x400000);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "0x400000");
        assert!(!frames[0].has_location());
    }

    #[test]
    fn test_cache() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let cache = SymbolCache::new(resolver.clone());

        // Resolve twice
        let _ = cache.resolve(0x400000);
        let _ = cache.resolve(0x400000);

        // Should be cached
        assert_eq!(cache.cache_size(), 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inlined_frames_are_joined() {
        let mut table = SymbolTable::new();
        table.insert_inlined(
            0x10,
            vec![
                ResolvedFrame::new("inner", "a.rs", 3),
                ResolvedFrame::new("outer", "a.rs", 9),
            ],
        );
        let cache = SymbolCache::new(Arc::new(table));

        assert_eq!(cache.resolve(0x10).len(), 2);
        assert_eq!(join_inlined(&cache.resolve(0x10)), "outer--inner");
        assert_eq!(join_inlined(&cache.resolve(0x20)), "0x20");
    }

    #[test]
    fn test_resolve_stack_keeps_order() {
        let table = SymbolTable::new()
            .with_function(0x1, "main")
            .with_function(0x2, "foo");
        let cache = SymbolCache::new(Arc::new(table));

        let stack = cache.resolve_stack(&[0x2, 0x1]);
        assert_eq!(stack[0][0].name, "foo");
        assert_eq!(stack[1][0].name, "main");
    }
}

//! HTTP surface: control API, flamegraph exports and admin endpoints

pub mod api;
pub mod http;

use crate::config::ServerConfig;
use flareprof_agent::Profiler;
use std::sync::Arc;

/// Shared by every request handler
#[derive(Debug)]
pub struct AppState {
    pub profiler: Arc<Profiler>,
    pub svg_width: u32,
    pub svg_frame_height: u32,
}

impl AppState {
    pub fn new(profiler: Arc<Profiler>, config: &ServerConfig) -> Self {
        Self {
            profiler,
            svg_width: config.svg_width,
            svg_frame_height: config.svg_frame_height,
        }
    }
}

//! Execution tracing (spec §4.6 "Tracing"), grounded on
//! `examples/original_source/src/vm/Trace.hpp`: a trace mode (off, IL-level,
//! or source-level), a source-file cache loaded lazily and only when a
//! source-level trace actually needs a line, and a sink that is told about
//! each frame entry and each executed instruction.
//!
//! Emission itself goes through `tracing` events, consistent with every
//! other crate in this workspace (`il_log`'s `Logger`); [`TraceSink`] is the
//! seam tests and the `ilc` CLI use to assert on or print what ran without
//! depending on a global subscriber.

use std::collections::HashMap;
use std::fs;

use il_core::SourceLoc;

/// How much detail a step should be traced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceMode {
    #[default]
    Off,
    /// One line per instruction: function, block, opcode.
    Il,
    /// Like `Il`, plus the BASIC source line the instruction's `.loc`
    /// points at, if any.
    Src,
}

/// Maps a `.loc` directive's numeric file id to a path, and lazily loads
/// file contents for `TraceMode::Src` (spec §6 "SourceManager").
#[derive(Default)]
pub struct SourceManager {
    paths: HashMap<u32, String>,
    cache: HashMap<u32, Vec<String>>,
}

impl SourceManager {
    pub fn new() -> SourceManager {
        SourceManager::default()
    }

    pub fn register_file(&mut self, id: u32, path: impl Into<String>) {
        self.paths.insert(id, path.into());
    }

    /// Returns the 1-indexed source line `loc` points at, loading and
    /// caching the file's contents on first use.
    pub fn line_at(&mut self, loc: SourceLoc) -> Option<&str> {
        if !self.cache.contains_key(&loc.file) {
            let path = self.paths.get(&loc.file)?;
            let lines = fs::read_to_string(path)
                .ok()
                .map(|s| s.lines().map(str::to_owned).collect())
                .unwrap_or_default();
            self.cache.insert(loc.file, lines);
        }
        self.cache
            .get(&loc.file)
            .and_then(|lines| lines.get(loc.line.saturating_sub(1) as usize))
            .map(String::as_str)
    }
}

pub struct TraceConfig {
    pub mode: TraceMode,
    pub source_manager: SourceManager,
}

impl TraceConfig {
    pub fn off() -> TraceConfig {
        TraceConfig { mode: TraceMode::Off, source_manager: SourceManager::new() }
    }

    pub fn new(mode: TraceMode, source_manager: SourceManager) -> TraceConfig {
        TraceConfig { mode, source_manager }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig::off()
    }
}

/// Called by the VM's step loop at two points: once when a frame is
/// prepared (pushed, with its arguments already in place) and once per
/// instruction executed (spec §4.6, mirroring `Trace.hpp`'s
/// `onFramePrepared`/`onStep`).
pub struct TraceSink {
    config: TraceConfig,
}

impl TraceSink {
    pub fn new(config: TraceConfig) -> TraceSink {
        TraceSink { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.mode != TraceMode::Off
    }

    pub fn on_frame_prepared(&mut self, function: &str, block: &str) {
        if self.config.mode == TraceMode::Off {
            return;
        }
        tracing::trace!(target: "il_vm::trace", function, block, "frame prepared");
    }

    pub fn on_step(&mut self, function: &str, block: &str, opcode: &str, loc: Option<SourceLoc>) {
        match self.config.mode {
            TraceMode::Off => {}
            TraceMode::Il => {
                tracing::trace!(target: "il_vm::trace", function, block, opcode, "step");
            }
            TraceMode::Src => {
                let src_line = loc.and_then(|l| self.config.source_manager.line_at(l)).map(str::to_owned);
                tracing::trace!(target: "il_vm::trace", function, block, opcode, src_line, "step");
            }
        }
    }
}

impl Default for TraceSink {
    fn default() -> Self {
        TraceSink::new(TraceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_mode_reports_disabled() {
        let sink = TraceSink::default();
        assert!(!sink.is_enabled());
    }

    #[test]
    fn il_mode_reports_enabled() {
        let sink = TraceSink::new(TraceConfig::new(TraceMode::Il, SourceManager::new()));
        assert!(sink.is_enabled());
    }
}

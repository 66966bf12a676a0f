#![cfg_attr(docsrs, feature(doc_cfg))]
//! Frame scoped logger for PSX GPU commands and GTE operations.
//!
//! The emulator feeds every GP0/GP1 command it dispatches into a [`GpuLogger`], along with
//! the GTE states it computes. The logger keeps only the commands of the current frame,
//! tracks read/write coverage in optional heatmaps, and can export the frame to disk
//! ([`export`]) or replay it against another GPU implementation.

pub mod export;
pub mod gpu;
pub mod gte;
pub mod heatmap;
mod host;
mod logger;
mod utils;
mod vram;

#[cfg(test)]
mod tests;

pub use export::{
    frame_log_json, read_frame_log, save_frame_log, save_frame_log_json, ExportError, FrameLog,
    FrameLogMetadata, FrameLogReader, LogEntry,
};
pub use gpu::{GpuCommand, GpuStats, Logged, Origin, PixelOp, Vertex};
pub use gte::{GteFetchContext, GteOperation, GteSnapshot, GteState};
pub use heatmap::{HeatmapBackend, HeatmapError, HeatmapTarget, SoftwareHeatmap};
pub use host::{EmulatorHost, ReplayTarget};
pub use logger::{CaptureFlags, EntryFlagsMut, GpuLogger};
pub use vram::{Vram, VRAM_HEIGHT, VRAM_WIDTH};

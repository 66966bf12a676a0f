//! GTE (cop2) state capture.
//!
//! Every GTE operation can be logged as a pair of register snapshots (before/after),
//! with the memory fetches that fed its input vertices. The most recent state is attached
//! to the next GPU command the logger receives.

use serde::Serialize;

use crate::logger::CaptureFlags;
use crate::utils::serialize_hex_u32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GteOperation {
    #[default]
    Unknown,
    Rtpt,
    Rtps,
    Nclip,
    Op,
    Dpcs,
    Intpl,
    Mvmva,
    Ncds,
    Cdp,
    Ncdt,
    Nccs,
    Cc,
    Ncs,
    Nct,
    Sqr,
    Dcpl,
    Dpct,
    Avsz3,
    Avsz4,
    Gpl,
    Gpf,
    Ncct,
}

impl GteOperation {
    /// Decode the operation from a cop2 command word, only bits 0-5 (the real command
    /// number) are used by the hardware.
    pub fn from_command_word(cmd: u32) -> Self {
        match cmd & 0x3F {
            0x01 => Self::Rtps,
            0x06 => Self::Nclip,
            0x0C => Self::Op,
            0x10 => Self::Dpcs,
            0x11 => Self::Intpl,
            0x12 => Self::Mvmva,
            0x13 => Self::Ncds,
            0x14 => Self::Cdp,
            0x16 => Self::Ncdt,
            0x1B => Self::Nccs,
            0x1C => Self::Cc,
            0x1E => Self::Ncs,
            0x20 => Self::Nct,
            0x28 => Self::Sqr,
            0x29 => Self::Dcpl,
            0x2A => Self::Dpct,
            0x2D => Self::Avsz3,
            0x2E => Self::Avsz4,
            0x30 => Self::Rtpt,
            0x3D => Self::Gpf,
            0x3E => Self::Gpl,
            0x3F => Self::Ncct,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Rtpt => "RTPT",
            Self::Rtps => "RTPS",
            Self::Nclip => "NCLIP",
            Self::Op => "OP",
            Self::Dpcs => "DPCS",
            Self::Intpl => "INTPL",
            Self::Mvmva => "MVMVA",
            Self::Ncds => "NCDS",
            Self::Cdp => "CDP",
            Self::Ncdt => "NCDT",
            Self::Nccs => "NCCS",
            Self::Cc => "CC",
            Self::Ncs => "NCS",
            Self::Nct => "NCT",
            Self::Sqr => "SQR",
            Self::Dcpl => "DCPL",
            Self::Dpct => "DPCT",
            Self::Avsz3 => "AVSZ3",
            Self::Avsz4 => "AVSZ4",
            Self::Gpl => "GPL",
            Self::Gpf => "GPF",
            Self::Ncct => "NCCT",
        }
    }
}

/// A load from memory into a GTE register, e.g. `lwc2 $vxy0, 8($a0)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GteFetchContext {
    #[serde(serialize_with = "serialize_hex_u32")]
    pub pc: u32,
    #[serde(serialize_with = "serialize_hex_u32")]
    pub address: u32,
    pub base_register: u32,
    #[serde(serialize_with = "serialize_hex_u32")]
    pub base_value: u32,
    pub offset: i16,
    pub target_register: u32,
    #[serde(serialize_with = "serialize_hex_u32")]
    pub value: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GteLogMetadata {
    #[serde(rename = "vertexFetches", skip_serializing_if = "Vec::is_empty")]
    pub vertex_fetches: Vec<GteFetchContext>,
}

/// The GTE registers at one point in time, with the commonly inspected ones
/// decoded out of the register files.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GteSnapshot {
    pub vertices: [[i16; 3]; 3],
    pub screen_coords: [[i16; 2]; 3],
    pub rotation_matrix: [[i16; 3]; 3],
    pub light_matrix: [[i16; 3]; 3],
    pub color_matrix: [[i16; 3]; 3],
    pub translation: [i32; 3],
    pub data_registers: [u32; 32],
    pub control_registers: [u32; 32],
    pub offset_x: i32,
    pub offset_y: i32,
    pub projection_plane_distance: i16,
    pub depth_queue_a: i16,
    pub depth_queue_b: i32,
    pub depth_scale_factor3: i16,
    pub depth_scale_factor4: i16,
}

impl GteSnapshot {
    /// Build a snapshot out of the raw cop2 data and control registers.
    pub fn from_registers(data: [u32; 32], ctrl: [u32; 32]) -> Self {
        let lsb = |v: u32| (v & 0xFFFF) as i16;
        let msb = |v: u32| ((v >> 16) & 0xFFFF) as i16;

        let mut vertices = [[0; 3]; 3];
        for (i, vertex) in vertices.iter_mut().enumerate() {
            let xy = data[i * 2];
            let z = data[i * 2 + 1];
            *vertex = [lsb(xy), msb(xy), lsb(z)];
        }

        let mut screen_coords = [[0; 2]; 3];
        for (i, coords) in screen_coords.iter_mut().enumerate() {
            let sxy = data[12 + i];
            *coords = [lsb(sxy), msb(sxy)];
        }

        // matrices are packed 2 elements per register, 5 registers each
        let matrix = |base: usize| {
            [
                [lsb(ctrl[base]), msb(ctrl[base]), lsb(ctrl[base + 1])],
                [msb(ctrl[base + 1]), lsb(ctrl[base + 2]), msb(ctrl[base + 2])],
                [lsb(ctrl[base + 3]), msb(ctrl[base + 3]), lsb(ctrl[base + 4])],
            ]
        };

        Self {
            vertices,
            screen_coords,
            rotation_matrix: matrix(0),
            light_matrix: matrix(8),
            color_matrix: matrix(16),
            translation: [ctrl[5] as i32, ctrl[6] as i32, ctrl[7] as i32],
            data_registers: data,
            control_registers: ctrl,
            offset_x: ctrl[24] as i32,
            offset_y: ctrl[25] as i32,
            projection_plane_distance: lsb(ctrl[26]),
            depth_queue_a: lsb(ctrl[27]),
            depth_queue_b: ctrl[28] as i32,
            depth_scale_factor3: lsb(ctrl[29]),
            depth_scale_factor4: lsb(ctrl[30]),
        }
    }
}

/// One logged GTE operation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct GteState {
    pub command: GteOperation,
    #[serde(serialize_with = "serialize_hex_u32")]
    pub pc: u32,
    pub input: GteSnapshot,
    pub output: GteSnapshot,
    #[serde(flatten)]
    pub metadata: GteLogMetadata,
}

/// Keeps the GTE states of the current frame.
#[derive(Debug, Default)]
pub(crate) struct GteTracker {
    last_frame: u64,
    frame_log: Vec<GteState>,
    last_state: Option<GteState>,
    pending_fetches: Vec<GteFetchContext>,
}

impl GteTracker {
    /// Drop everything recorded for an older frame.
    fn handle_frame_change(&mut self, frame: u64) {
        if self.last_frame != frame {
            self.reset(frame);
        }
    }

    pub(crate) fn reset(&mut self, frame: u64) {
        self.last_frame = frame;
        self.frame_log.clear();
        self.last_state = None;
        self.pending_fetches.clear();
    }

    pub(crate) fn record_state(&mut self, mut state: GteState, frame: u64, capture: CaptureFlags) {
        self.handle_frame_change(frame);

        let log_fetches = capture.contains(CaptureFlags::VERTEX_FETCHES);
        if log_fetches && !self.pending_fetches.is_empty() {
            state.metadata.vertex_fetches = std::mem::take(&mut self.pending_fetches);
        }
        self.pending_fetches.clear();

        if capture.intersects(CaptureFlags::GTE_STATES | CaptureFlags::VERTEX_FETCHES) {
            self.frame_log.push(state.clone());
        }
        self.last_state = Some(state);
    }

    pub(crate) fn record_vertex_fetch(
        &mut self,
        fetch: GteFetchContext,
        frame: u64,
        capture: CaptureFlags,
    ) {
        if !capture.contains(CaptureFlags::VERTEX_FETCHES) {
            return;
        }

        self.handle_frame_change(frame);
        self.pending_fetches.push(fetch);
    }

    #[cfg(test)]
    pub(crate) fn last_frame(&self) -> u64 {
        self.last_frame
    }

    pub(crate) fn last_state(&self) -> Option<&GteState> {
        self.last_state.as_ref()
    }

    pub(crate) fn frame_log(&self) -> &[GteState] {
        &self.frame_log
    }

    pub(crate) fn pending_fetches(&self) -> &[GteFetchContext] {
        &self.pending_fetches
    }
}

mod command;
mod geometry;

use std::{borrow::Cow, ops::AddAssign};

use serde::Serialize;

use crate::gte::GteState;

pub use command::{
    BlendFunction, BlitRamVram, BlitVramRam, BlitVramVram, BlitVramVramRaw, ColorDepth,
    DisplayMode, DmaDirection, FastFill, GpuCommand, HorizontalResolution, Primitive,
    PrimitiveKind, PrimitiveVertex, QueryType, Rect, TPage, TWindow, TexDepth,
    VerticalResolution, VideoMode,
};
pub use geometry::{add_line, add_rect, Vertex};
pub(crate) use geometry::triangle_area2;

/// Logged commands keep at most this many raw words, larger VRAM uploads are truncated.
pub const MAX_LOGGED_WORDS: usize = 1024;

/// Where did the GPU get the command from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// `GP0` write from the CPU
    #[default]
    DataWrite,
    /// `GP1` write from the CPU
    CtrlWrite,
    /// DMA channel 2 in block mode
    DirectDma,
    /// DMA channel 2 in linked list mode
    ChainDma,
    /// Issued by [`GpuLogger::replay`](crate::GpuLogger::replay)
    Replay,
}

/// The kind of VRAM access some geometry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOp {
    Read,
    Write,
}

/// Pixel/texel traffic and primitive counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuStats {
    pub triangles: u64,
    pub textured_triangles: u64,
    pub rectangles: u64,
    pub sprites: u64,
    pub pixel_writes: u64,
    pub pixel_reads: u64,
    pub texel_reads: u64,
}

impl AddAssign for GpuStats {
    fn add_assign(&mut self, rhs: Self) {
        self.triangles += rhs.triangles;
        self.textured_triangles += rhs.textured_triangles;
        self.rectangles += rhs.rectangles;
        self.sprites += rhs.sprites;
        self.pixel_writes += rhs.pixel_writes;
        self.pixel_reads += rhs.pixel_reads;
        self.texel_reads += rhs.texel_reads;
    }
}

/// A GPU command as it was seen by the logger.
///
/// The common fields are filled by the logger when the command is added, only the
/// `enabled` and `highlight` flags can be changed after that.
#[derive(Debug, Clone)]
pub struct Logged {
    pub command: GpuCommand,

    origin: Origin,
    frame: u64,
    pc: u32,
    source_addr: u32,
    length: u32,
    words: Vec<u32>,
    words_truncated: bool,
    gte_state: Option<GteState>,
    stats: GpuStats,

    enabled: bool,
    highlight: bool,
}

impl Logged {
    /// `words` are the raw words the command was built from, they can be empty, in which
    /// case the triggering value will be used.
    pub fn new(command: GpuCommand, words: Vec<u32>) -> Self {
        Self {
            command,
            origin: Origin::default(),
            frame: 0,
            pc: 0,
            source_addr: 0,
            length: 0,
            words,
            words_truncated: false,
            gte_state: None,
            stats: GpuStats::default(),
            enabled: true,
            highlight: false,
        }
    }

    pub(crate) fn finalize(
        &mut self,
        origin: Origin,
        value: u32,
        length: u32,
        gte_state: Option<GteState>,
        pc: u32,
        frame: u64,
    ) {
        self.origin = origin;
        self.length = length;
        self.source_addr = value;
        if self.words.is_empty() {
            self.words.push(value);
        }
        self.words_truncated = false;
        if self.words.len() > MAX_LOGGED_WORDS {
            self.words.truncate(MAX_LOGGED_WORDS);
            self.words.shrink_to_fit();
            self.words_truncated = true;
        }
        self.gte_state = gte_state;
        self.pc = pc;
        self.frame = frame;

        self.stats = GpuStats::default();
        self.command.cumulate_stats(&mut self.stats);
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn source_addr(&self) -> u32 {
        self.source_addr
    }

    /// Length in bytes of the transfer that carried the command.
    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// The words to send to the GPU to run the command again.
    ///
    /// These are the logged words, except for truncated VRAM uploads, which are rebuilt
    /// from their header and the texels kept in the decoded command.
    pub fn replay_words(&self) -> Cow<'_, [u32]> {
        match &self.command {
            GpuCommand::BlitRamVram(blit) if self.words_truncated && self.words.len() >= 3 => {
                let mut words = Vec::with_capacity(3 + (blit.data.len() + 1) / 2);
                words.extend_from_slice(&self.words[..3]);
                words.extend(blit.data.chunks(2).map(|pair| {
                    let high = pair.get(1).copied().unwrap_or(0);
                    pair[0] as u32 | (high as u32) << 16
                }));
                Cow::Owned(words)
            }
            _ => Cow::Borrowed(&self.words),
        }
    }

    /// `true` if the command had more than [`MAX_LOGGED_WORDS`] words and `words`
    /// doesn't have all of them.
    pub fn words_truncated(&self) -> bool {
        self.words_truncated
    }

    pub fn gte_state(&self) -> Option<&GteState> {
        self.gte_state.as_ref()
    }

    pub fn stats(&self) -> &GpuStats {
        &self.stats
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn highlight(&self) -> bool {
        self.highlight
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn set_highlight(&mut self, highlight: bool) {
        self.highlight = highlight;
    }

    pub fn get_vertices<F>(&self, add: &mut F, op: PixelOp)
    where
        F: FnMut(Vertex, Vertex, Vertex) + ?Sized,
    {
        self.command.get_vertices(add, op);
    }
}

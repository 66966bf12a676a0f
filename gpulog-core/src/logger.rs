use std::ops::Deref;

use crate::gpu::{GpuCommand, GpuStats, Logged, Origin, PrimitiveKind, TPage};
use crate::gte::{GteFetchContext, GteState, GteTracker};
use crate::heatmap::{HeatmapBackend, HeatmapTarget, Heatmaps};
use crate::host::{EmulatorHost, ReplayTarget};
use crate::vram::{Vram, VRAM_HEIGHT, VRAM_WIDTH};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CaptureFlags: u8 {
        const COMMANDS       = 0b0001;
        const GTE_STATES     = 0b0010;
        const VERTEX_FETCHES = 0b0100;
        const BREAK_ON_VSYNC = 0b1000;
    }
}

impl Default for CaptureFlags {
    fn default() -> Self {
        Self::COMMANDS | Self::GTE_STATES
    }
}

/// Mutable access to a logged command, only its `enabled` and `highlight` flags can be
/// changed.
pub struct EntryFlagsMut<'a> {
    logged: &'a mut Logged,
}

impl EntryFlagsMut<'_> {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.logged.set_enabled(enabled);
    }

    pub fn set_highlight(&mut self, highlight: bool) {
        self.logged.set_highlight(highlight);
    }
}

impl Deref for EntryFlagsMut<'_> {
    type Target = Logged;

    fn deref(&self) -> &Self::Target {
        self.logged
    }
}

/// Keeps the GPU commands and GTE operations of the current frame.
///
/// The emulator calls [`on_vsync`](Self::on_vsync) on every vertical blank, and feeds
/// the commands with [`add_gp0`](Self::add_gp0)/[`add_gp1`](Self::add_gp1). The first
/// command of a new frame drops the previous frame's commands and takes a new copy of
/// VRAM from the host, so the log always holds a single, replayable frame.
pub struct GpuLogger {
    capture: CaptureFlags,
    frame_counter: u64,
    list: Vec<Logged>,
    gte: GteTracker,

    vram: Option<Vram>,
    baseline_frame: Option<u64>,
    heatmaps: Option<Heatmaps>,

    /// textured rectangles use the texture page of the draw mode
    last_tpage: Option<TPage>,
}

impl Default for GpuLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuLogger {
    pub fn new() -> Self {
        Self {
            capture: CaptureFlags::default(),
            frame_counter: 0,
            list: Vec::new(),
            gte: GteTracker::default(),
            vram: None,
            baseline_frame: None,
            heatmaps: None,
            last_tpage: None,
        }
    }

    pub fn set_capture(&mut self, capture: CaptureFlags) {
        self.capture = capture;
    }

    pub fn capture(&self) -> CaptureFlags {
        self.capture
    }

    /// The current frame number, incremented on every vsync.
    pub fn frame(&self) -> u64 {
        self.frame_counter
    }

    pub fn on_vsync<H: EmulatorHost + ?Sized>(&mut self, host: &mut H) {
        self.frame_counter += 1;
        log::trace!("vsync, frame {}", self.frame_counter);

        if self.capture.contains(CaptureFlags::BREAK_ON_VSYNC) {
            log::info!("breaking on vsync, frame {}", self.frame_counter);
            host.pause();
        }
    }

    pub fn record_gte_state(&mut self, state: GteState) {
        if !self.capture.intersects(
            CaptureFlags::COMMANDS | CaptureFlags::GTE_STATES | CaptureFlags::VERTEX_FETCHES,
        ) {
            return;
        }
        self.gte.record_state(state, self.frame_counter, self.capture);
    }

    pub fn record_vertex_fetch(&mut self, fetch: GteFetchContext) {
        self.gte.record_vertex_fetch(fetch, self.frame_counter, self.capture);
    }

    /// Decode and log a complete GP0 command.
    ///
    /// `value` is the word that triggered the command, or the source address for DMA,
    /// and `length` the size in bytes of the transfer.
    pub fn add_gp0<H: EmulatorHost + ?Sized>(
        &mut self,
        host: &mut H,
        words: &[u32],
        origin: Origin,
        value: u32,
        length: u32,
    ) -> Option<usize> {
        if !self.capture.contains(CaptureFlags::COMMANDS) {
            return None;
        }

        let Some(command) = GpuCommand::from_gp0(words) else {
            log::trace!("not logging gp0 command {:08X?}", words.first());
            return None;
        };
        self.add(host, Logged::new(command, words.to_vec()), origin, value, length)
    }

    /// Decode and log a GP1 write.
    pub fn add_gp1<H: EmulatorHost + ?Sized>(&mut self, host: &mut H, data: u32) -> Option<usize> {
        if !self.capture.contains(CaptureFlags::COMMANDS) {
            return None;
        }

        let Some(command) = GpuCommand::from_gp1(data) else {
            log::trace!("not logging gp1 command {:08X}", data);
            return None;
        };
        self.add(host, Logged::new(command, vec![data]), Origin::CtrlWrite, data, 4)
    }

    /// Append a command to the log, returns its index, or `None` if command capture
    /// is disabled.
    pub fn add<H: EmulatorHost + ?Sized>(
        &mut self,
        host: &mut H,
        mut logged: Logged,
        origin: Origin,
        value: u32,
        length: u32,
    ) -> Option<usize> {
        if !self.capture.contains(CaptureFlags::COMMANDS) {
            return None;
        }

        let frame = self.frame_counter;

        // all entries share the same frame, so only the oldest ones can be stale
        let stale = self
            .list
            .iter()
            .position(|l| l.frame() == frame)
            .unwrap_or(self.list.len());
        if stale > 0 {
            self.list.drain(..stale);
        }
        if stale > 0 || self.baseline_frame != Some(frame) {
            self.start_frame(host, frame, stale);
        }

        self.track_draw_mode(&mut logged.command);

        let pc = host.program_counter();
        let gte_state = self.gte.last_state().cloned();
        logged.finalize(origin, value, length, gte_state, pc, frame);
        log::trace!(
            "logged {} ({:?}) at pc={:08X} frame={}",
            logged.command.name(),
            origin,
            pc,
            frame
        );

        if let Some(heatmaps) = self.heatmaps.as_mut() {
            heatmaps.emit(
                &logged,
                HeatmapTarget::WrittenHeatmap,
                HeatmapTarget::ReadHeatmap,
            );
        }

        self.list.push(logged);
        Some(self.list.len() - 1)
    }

    fn start_frame<H: EmulatorHost + ?Sized>(&mut self, host: &mut H, frame: u64, evicted: usize) {
        log::info!("logging frame {}, dropped {} old commands", frame, evicted);

        self.vram = host.acquire_vram();
        if self.vram.is_none() {
            log::warn!("no VRAM baseline for frame {}, replay will not restore memory", frame);
        }
        self.baseline_frame = Some(frame);

        // states recorded before the first command of the log are kept
        if evicted > 0 {
            self.gte.reset(frame);
        }

        if let Some(heatmaps) = self.heatmaps.as_mut() {
            for target in HeatmapTarget::ALL {
                heatmaps.clear(target);
            }
        }
    }

    fn track_draw_mode(&mut self, command: &mut GpuCommand) {
        match command {
            GpuCommand::TPage(tpage) => self.last_tpage = Some(*tpage),
            GpuCommand::CtrlReset => self.last_tpage = None,
            GpuCommand::Primitive(primitive) if primitive.textured => match primitive.kind {
                PrimitiveKind::Polygon => {
                    if primitive.tpage.is_some() {
                        self.last_tpage = primitive.tpage;
                    }
                }
                PrimitiveKind::Rectangle => {
                    if primitive.tpage.is_none() {
                        primitive.tpage = self.last_tpage;
                    }
                }
                PrimitiveKind::Line => {}
            },
            _ => {}
        }
    }

    /// Drop all the logged commands and GTE states.
    ///
    /// The next command will take a new VRAM baseline.
    pub fn clear(&mut self) {
        self.list.clear();
        self.gte.reset(self.frame_counter);
        self.vram = None;
        self.baseline_frame = None;

        if let Some(heatmaps) = self.heatmaps.as_mut() {
            for target in HeatmapTarget::ALL {
                heatmaps.clear(target);
            }
        }
    }

    /// Restore the frame's VRAM baseline into `target` and execute the enabled
    /// commands in order, followed by a vblank.
    pub fn replay<T: ReplayTarget + ?Sized>(&self, target: &mut T) {
        match &self.vram {
            Some(vram) => target.partial_update_vram(
                0,
                0,
                VRAM_WIDTH as u32,
                VRAM_HEIGHT as u32,
                vram.data(),
            ),
            None => log::warn!("replaying without VRAM baseline"),
        }

        let mut replayed = 0;
        for logged in self.list.iter().filter(|l| l.enabled()) {
            target.execute(logged);
            replayed += 1;
        }
        target.vblank(true);

        log::info!(
            "replayed {}/{} commands of frame {}",
            replayed,
            self.list.len(),
            self.frame_counter
        );
    }

    /// Redraw the highlight targets with the command at `index`, and unless `only`,
    /// all the commands with the `highlight` flag.
    pub fn highlight(&mut self, index: Option<usize>, only: bool) {
        let Some(heatmaps) = self.heatmaps.as_mut() else {
            return;
        };

        heatmaps.clear(HeatmapTarget::WrittenHighlight);
        heatmaps.clear(HeatmapTarget::ReadHighlight);

        if let Some(logged) = index.and_then(|i| self.list.get(i)) {
            heatmaps.emit(
                logged,
                HeatmapTarget::WrittenHighlight,
                HeatmapTarget::ReadHighlight,
            );
        }
        if only {
            return;
        }
        for (_, logged) in self
            .list
            .iter()
            .enumerate()
            .filter(|(i, l)| l.highlight() && Some(*i) != index)
        {
            heatmaps.emit(
                logged,
                HeatmapTarget::WrittenHighlight,
                HeatmapTarget::ReadHighlight,
            );
        }
    }

    /// Attach heatmap targets, returns `false` and keeps heatmaps disabled if the
    /// backend can't provide them.
    pub fn enable_heatmaps(&mut self, backend: Box<dyn HeatmapBackend>) -> bool {
        match Heatmaps::attach(backend) {
            Ok(mut heatmaps) => {
                for logged in &self.list {
                    heatmaps.emit(
                        logged,
                        HeatmapTarget::WrittenHeatmap,
                        HeatmapTarget::ReadHeatmap,
                    );
                }
                self.heatmaps = Some(heatmaps);
                true
            }
            Err(e) => {
                log::warn!("heatmaps disabled: {}", e);
                self.heatmaps = None;
                false
            }
        }
    }

    /// Detach the heatmaps and release the VRAM baseline, returns the heatmap backend
    /// if there was one.
    pub fn disable(&mut self) -> Option<Box<dyn HeatmapBackend>> {
        self.vram = None;
        self.baseline_frame = None;
        self.heatmaps.take().map(Heatmaps::into_backend)
    }

    pub fn heatmaps_enabled(&self) -> bool {
        self.heatmaps.is_some()
    }

    pub fn heatmap_backend(&self) -> Option<&dyn HeatmapBackend> {
        self.heatmaps.as_ref().map(|h| h.backend())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Logged> {
        self.list.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = EntryFlagsMut<'_>> {
        self.list.iter_mut().map(|logged| EntryFlagsMut { logged })
    }

    pub fn get(&self, index: usize) -> Option<&Logged> {
        self.list.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<EntryFlagsMut<'_>> {
        self.list.get_mut(index).map(|logged| EntryFlagsMut { logged })
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Sum of the statistics of all logged commands.
    pub fn stats(&self) -> GpuStats {
        self.list.iter().fold(GpuStats::default(), |mut acc, l| {
            acc += *l.stats();
            acc
        })
    }

    /// The GTE operations logged in the current frame.
    pub fn gte_frame_log(&self) -> &[GteState] {
        self.gte.frame_log()
    }

    pub fn last_gte_state(&self) -> Option<&GteState> {
        self.gte.last_state()
    }

    /// Vertex fetches not yet attached to a GTE operation.
    pub fn pending_vertex_fetches(&self) -> &[GteFetchContext] {
        self.gte.pending_fetches()
    }

    pub fn vram_baseline(&self) -> Option<&Vram> {
        self.vram.as_ref()
    }
}

impl<'a> IntoIterator for &'a GpuLogger {
    type Item = &'a Logged;
    type IntoIter = std::slice::Iter<'a, Logged>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

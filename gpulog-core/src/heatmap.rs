//! VRAM access heatmaps.
//!
//! Every logged command can draw the VRAM area it writes and reads into coverage
//! targets, so a frame viewer can show what parts of VRAM were touched. The drawing is
//! done by a [`HeatmapBackend`], usually the renderer of the emulator.
//! [`SoftwareHeatmap`] is a CPU implementation.

use std::{error::Error, fmt};

use crate::gpu::{triangle_area2, Logged, PixelOp, Vertex};
use crate::vram::{VRAM_HEIGHT, VRAM_WIDTH};

/// Texture units needed by a backend to render the heatmaps along the VRAM view.
pub const REQUIRED_TEXTURE_UNITS: u32 = 5;

/// Triangles are sent to the backend in batches of this many vertices.
const BATCH_VERTICES: usize = 3 * 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeatmapTarget {
    WrittenHeatmap,
    ReadHeatmap,
    WrittenHighlight,
    ReadHighlight,
}

impl HeatmapTarget {
    pub const ALL: [Self; 4] = [
        Self::WrittenHeatmap,
        Self::ReadHeatmap,
        Self::WrittenHighlight,
        Self::ReadHighlight,
    ];

    fn index(self) -> usize {
        match self {
            Self::WrittenHeatmap => 0,
            Self::ReadHeatmap => 1,
            Self::WrittenHighlight => 2,
            Self::ReadHighlight => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeatmapError {
    NotEnoughTextureUnits { available: u32, required: u32 },
    TargetCreation { target: HeatmapTarget, reason: String },
}

impl fmt::Display for HeatmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatmapError::NotEnoughTextureUnits {
                available,
                required,
            } => write!(
                f,
                "Not enough texture units, {} available, {} required",
                available, required
            ),
            HeatmapError::TargetCreation { target, reason } => {
                write!(f, "Could not create heatmap target {:?}: {}", target, reason)
            }
        }
    }
}

impl Error for HeatmapError {}

/// The drawing side of the heatmaps.
///
/// Targets are `1024x512`, one pixel per VRAM texel. Each drawn triangle sets the
/// coverage of the pixels whose center is inside it.
pub trait HeatmapBackend {
    fn texture_units(&self) -> u32;

    fn create_target(
        &mut self,
        target: HeatmapTarget,
        width: u32,
        height: u32,
    ) -> Result<(), HeatmapError>;

    fn clear(&mut self, target: HeatmapTarget);

    /// `vertices` is a list of triangles, 3 vertices each.
    fn draw_triangles(&mut self, target: HeatmapTarget, vertices: &[Vertex]);

    /// Read back the coverage of a pixel, `None` if the backend can't read back.
    fn coverage(&self, _target: HeatmapTarget, _x: u32, _y: u32) -> Option<f32> {
        None
    }
}

/// The heatmap targets attached to a logger, batches triangles before they reach the
/// backend.
pub(crate) struct Heatmaps {
    backend: Box<dyn HeatmapBackend>,
    batch: Vec<Vertex>,
    batch_target: Option<HeatmapTarget>,
}

impl Heatmaps {
    pub(crate) fn attach(mut backend: Box<dyn HeatmapBackend>) -> Result<Self, HeatmapError> {
        let available = backend.texture_units();
        if available < REQUIRED_TEXTURE_UNITS {
            return Err(HeatmapError::NotEnoughTextureUnits {
                available,
                required: REQUIRED_TEXTURE_UNITS,
            });
        }

        for target in HeatmapTarget::ALL {
            backend.create_target(target, VRAM_WIDTH as u32, VRAM_HEIGHT as u32)?;
            backend.clear(target);
        }

        Ok(Self {
            backend,
            batch: Vec::with_capacity(BATCH_VERTICES),
            batch_target: None,
        })
    }

    pub(crate) fn backend(&self) -> &dyn HeatmapBackend {
        self.backend.as_ref()
    }

    pub(crate) fn into_backend(mut self) -> Box<dyn HeatmapBackend> {
        self.flush();
        self.backend
    }

    fn add_tri(&mut self, target: HeatmapTarget, a: Vertex, b: Vertex, c: Vertex) {
        if self.batch_target != Some(target) {
            self.flush();
            self.batch_target = Some(target);
        }
        self.batch.extend_from_slice(&[a, b, c]);
        if self.batch.len() >= BATCH_VERTICES {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if let Some(target) = self.batch_target {
            if !self.batch.is_empty() {
                self.backend.draw_triangles(target, &self.batch);
            }
        }
        self.batch.clear();
    }

    /// Draw the written area of `logged` into `written` and the read area into `read`.
    pub(crate) fn emit(&mut self, logged: &Logged, written: HeatmapTarget, read: HeatmapTarget) {
        logged.get_vertices(&mut |a, b, c| self.add_tri(written, a, b, c), PixelOp::Write);
        logged.get_vertices(&mut |a, b, c| self.add_tri(read, a, b, c), PixelOp::Read);
        self.flush();
    }

    pub(crate) fn clear(&mut self, target: HeatmapTarget) {
        self.flush();
        self.backend.clear(target);
    }
}

struct CoverageTarget {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

/// CPU heatmap rasterizer.
///
/// Pixels are sampled at their center. A center lying exactly on an edge belongs to the
/// triangle for which that edge goes down, or left when horizontal, so triangles sharing
/// an edge never cover a pixel twice or leave a gap.
pub struct SoftwareHeatmap {
    texture_units: u32,
    targets: [Option<CoverageTarget>; 4],
}

impl Default for SoftwareHeatmap {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareHeatmap {
    pub fn new() -> Self {
        Self::with_texture_units(16)
    }

    /// Advertise a specific number of texture units, mostly to exercise the logger
    /// fallback when there are not enough.
    pub fn with_texture_units(texture_units: u32) -> Self {
        Self {
            texture_units,
            targets: [None, None, None, None],
        }
    }

    /// Number of pixels of `target` with non zero coverage.
    pub fn covered_pixels(&self, target: HeatmapTarget) -> usize {
        self.targets[target.index()]
            .as_ref()
            .map(|t| t.data.iter().filter(|&&c| c > 0.0).count())
            .unwrap_or(0)
    }

    fn rasterize(target: &mut CoverageTarget, a: Vertex, mut b: Vertex, mut c: Vertex) {
        let area = triangle_area2(a, b, c);
        if area == 0 {
            return;
        }
        // make the winding positive, so inside points are positive for all edges
        if area < 0 {
            std::mem::swap(&mut b, &mut c);
        }

        let min_x = a.x.min(b.x).min(c.x).max(0);
        let min_y = a.y.min(b.y).min(c.y).max(0);
        let max_x = a.x.max(b.x).max(c.x).min(target.width as i32);
        let max_y = a.y.max(b.y).max(c.y).min(target.height as i32);

        // work with doubled coordinates, so pixel centers are integers
        let double = |v: Vertex| Vertex::new(v.x * 2, v.y * 2);
        let edges = [
            (double(a), double(b)),
            (double(b), double(c)),
            (double(c), double(a)),
        ];

        for y in min_y..max_y {
            for x in min_x..max_x {
                let center = Vertex::new(x * 2 + 1, y * 2 + 1);
                let inside = edges.iter().all(|&(from, to)| {
                    let w = triangle_area2(from, to, center);
                    let dx = to.x - from.x;
                    let dy = to.y - from.y;
                    w > 0 || (w == 0 && (dy > 0 || (dy == 0 && dx < 0)))
                });
                if inside {
                    target.data[(y as u32 * target.width + x as u32) as usize] = 1.0;
                }
            }
        }
    }
}

impl HeatmapBackend for SoftwareHeatmap {
    fn texture_units(&self) -> u32 {
        self.texture_units
    }

    fn create_target(
        &mut self,
        target: HeatmapTarget,
        width: u32,
        height: u32,
    ) -> Result<(), HeatmapError> {
        if width == 0 || height == 0 {
            return Err(HeatmapError::TargetCreation {
                target,
                reason: format!("invalid size {}x{}", width, height),
            });
        }
        self.targets[target.index()] = Some(CoverageTarget {
            width,
            height,
            data: vec![0.0; (width * height) as usize],
        });
        Ok(())
    }

    fn clear(&mut self, target: HeatmapTarget) {
        if let Some(target) = self.targets[target.index()].as_mut() {
            target.data.fill(0.0);
        }
    }

    fn draw_triangles(&mut self, target: HeatmapTarget, vertices: &[Vertex]) {
        let Some(target) = self.targets[target.index()].as_mut() else {
            log::warn!("drawing into heatmap target {:?} before creating it", target);
            return;
        };
        for tri in vertices.chunks_exact(3) {
            Self::rasterize(target, tri[0], tri[1], tri[2]);
        }
    }

    fn coverage(&self, target: HeatmapTarget, x: u32, y: u32) -> Option<f32> {
        let target = self.targets[target.index()].as_ref()?;
        if x >= target.width || y >= target.height {
            return None;
        }
        Some(target.data[(y * target.width + x) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{add_line, add_rect};

    fn draw<F: FnOnce(&mut dyn FnMut(Vertex, Vertex, Vertex))>(f: F) -> SoftwareHeatmap {
        let mut heatmap = SoftwareHeatmap::new();
        heatmap
            .create_target(HeatmapTarget::WrittenHeatmap, 64, 64)
            .unwrap();
        let mut vertices = Vec::new();
        f(&mut |a, b, c| vertices.extend_from_slice(&[a, b, c]));
        heatmap.draw_triangles(HeatmapTarget::WrittenHeatmap, &vertices);
        heatmap
    }

    #[test]
    fn rect_exact_coverage() {
        let heatmap = draw(|add| add_rect(add, 10, 20, 5, 5));
        let target = HeatmapTarget::WrittenHeatmap;

        assert_eq!(heatmap.covered_pixels(target), 25);
        assert_eq!(heatmap.coverage(target, 10, 20), Some(1.0));
        assert_eq!(heatmap.coverage(target, 14, 24), Some(1.0));
        assert_eq!(heatmap.coverage(target, 15, 20), Some(0.0));
        assert_eq!(heatmap.coverage(target, 10, 25), Some(0.0));
        assert_eq!(heatmap.coverage(target, 9, 20), Some(0.0));
    }

    #[test]
    fn adjacent_rects_share_edges() {
        let heatmap = draw(|add| {
            add_rect(add, 0, 0, 4, 4);
            add_rect(add, 4, 0, 4, 4);
        });
        assert_eq!(heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap), 32);
    }

    #[test]
    fn clockwise_triangles_are_drawn() {
        let heatmap = draw(|add| add(Vertex::new(0, 0), Vertex::new(0, 4), Vertex::new(4, 4)));
        let covered = heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap);
        // half of a 4x4 square, the diagonal pixels are split by the tie rule
        assert!((6..=10).contains(&covered));
    }

    #[test]
    fn lines_cover_their_length() {
        let heatmap = draw(|add| add_line(add, 2, 3, 9, 3));
        assert_eq!(heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap), 8);

        let heatmap = draw(|add| add_line(add, 5, 5, 5, 5));
        assert_eq!(heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap), 1);
        assert_eq!(
            heatmap.coverage(HeatmapTarget::WrittenHeatmap, 5, 5),
            Some(1.0)
        );
    }

    #[test]
    fn clipped_to_target() {
        let heatmap = draw(|add| add_rect(add, 60, -2, 10, 4));
        assert_eq!(heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap), 8);
        assert_eq!(heatmap.coverage(HeatmapTarget::WrittenHeatmap, 64, 0), None);
    }

    #[test]
    fn clear_resets_coverage() {
        let mut heatmap = draw(|add| add_rect(add, 0, 0, 2, 2));
        heatmap.clear(HeatmapTarget::WrittenHeatmap);
        assert_eq!(heatmap.covered_pixels(HeatmapTarget::WrittenHeatmap), 0);
    }

    #[test]
    fn attach_requires_texture_units() {
        let result = Heatmaps::attach(Box::new(SoftwareHeatmap::with_texture_units(4)));
        assert_eq!(
            result.err(),
            Some(HeatmapError::NotEnoughTextureUnits {
                available: 4,
                required: REQUIRED_TEXTURE_UNITS
            })
        );

        let heatmaps = Heatmaps::attach(Box::new(SoftwareHeatmap::new())).unwrap();
        for target in HeatmapTarget::ALL {
            assert_eq!(heatmaps.backend().coverage(target, 1023, 511), Some(0.0));
        }
    }
}

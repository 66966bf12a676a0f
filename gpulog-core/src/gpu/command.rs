use serde_json::{json, Value};

use super::geometry::{add_line, add_rect, triangle_area2, Vertex};
use super::{GpuStats, PixelOp};
use crate::utils::color_to_hex;

/// Position of a drawing vertex, both coordinates are signed 11 bits.
fn vertex_position_from_u32(data: u32) -> (i32, i32) {
    let x = (((data & 0x7FF) << 21) as i32) >> 21;
    let y = ((((data >> 16) & 0x7FF) << 21) as i32) >> 21;
    (x, y)
}

fn vram_position_from_u32(data: u32) -> (i32, i32) {
    ((data & 0x3FF) as i32, ((data >> 16) & 0x1FF) as i32)
}

/// Sizes of `0` are treated as the max size, 1024 and 512.
fn vram_size_from_u32(data: u32) -> (i32, i32) {
    let w = ((data & 0xFFFF).wrapping_sub(1) & 0x3FF) + 1;
    let h = ((data >> 16).wrapping_sub(1) & 0x1FF) + 1;
    (w as i32, h as i32)
}

fn raw_halves(data: u32) -> (i32, i32) {
    ((data & 0xFFFF) as i32, (data >> 16) as i32)
}

fn area(w: i32, h: i32) -> u64 {
    (w.max(0) as u64) * (h.max(0) as u64)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    fn to_json(self) -> Value {
        json!({"x": self.x, "y": self.y, "w": self.w, "h": self.h})
    }
}

/// GP0(02h), fill a VRAM rectangle with a solid color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastFill {
    pub color: u32,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// the values as written by the CPU, before alignment and masking
    pub raw: Rect,
    pub clipped: bool,
}

impl FastFill {
    pub fn new(color: u32, x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            color: color & 0xFFFFFF,
            x,
            y,
            w,
            h,
            raw: Rect::new(x, y, w, h),
            clipped: false,
        }
    }

    fn from_words(words: &[u32]) -> Option<Self> {
        let [data0, position, size, ..] = *words else {
            return None;
        };

        // the X coordinate and width are in steps of 16 pixels
        let x = (position & 0x3F0) as i32;
        let y = ((position >> 16) & 0x1FF) as i32;
        let w = (((size & 0x3FF) + 0xF) & !0xF) as i32;
        let h = ((size >> 16) & 0x1FF) as i32;

        let (raw_x, raw_y) = raw_halves(position);
        let (raw_w, raw_h) = raw_halves(size);
        let raw = Rect::new(raw_x, raw_y, raw_w, raw_h);

        Some(Self {
            color: data0 & 0xFFFFFF,
            x,
            y,
            w,
            h,
            raw,
            clipped: raw != Rect::new(x, y, w, h),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlitVramVramRaw {
    pub s_x: i32,
    pub s_y: i32,
    pub d_x: i32,
    pub d_y: i32,
    pub w: i32,
    pub h: i32,
}

/// GP0(80h), copy a rectangle inside VRAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlitVramVram {
    pub s_x: i32,
    pub s_y: i32,
    pub d_x: i32,
    pub d_y: i32,
    pub w: i32,
    pub h: i32,
    pub raw: BlitVramVramRaw,
    pub clipped: bool,
}

impl BlitVramVram {
    pub fn new(s_x: i32, s_y: i32, d_x: i32, d_y: i32, w: i32, h: i32) -> Self {
        Self {
            s_x,
            s_y,
            d_x,
            d_y,
            w,
            h,
            raw: BlitVramVramRaw {
                s_x,
                s_y,
                d_x,
                d_y,
                w,
                h,
            },
            clipped: false,
        }
    }

    fn from_words(words: &[u32]) -> Option<Self> {
        let [_, src, dst, size, ..] = *words else {
            return None;
        };

        let (s_x, s_y) = vram_position_from_u32(src);
        let (d_x, d_y) = vram_position_from_u32(dst);
        let (w, h) = vram_size_from_u32(size);

        let (raw_s_x, raw_s_y) = raw_halves(src);
        let (raw_d_x, raw_d_y) = raw_halves(dst);
        let (raw_w, raw_h) = raw_halves(size);
        let raw = BlitVramVramRaw {
            s_x: raw_s_x,
            s_y: raw_s_y,
            d_x: raw_d_x,
            d_y: raw_d_y,
            w: raw_w,
            h: raw_h,
        };

        Some(Self {
            s_x,
            s_y,
            d_x,
            d_y,
            w,
            h,
            raw,
            clipped: raw
                != BlitVramVramRaw {
                    s_x,
                    s_y,
                    d_x,
                    d_y,
                    w,
                    h,
                },
        })
    }
}

/// GP0(A0h), upload a rectangle from the CPU into VRAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlitRamVram {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub raw: Rect,
    pub clipped: bool,
    /// texels received with the command, may be less than `w*h` if the transfer
    /// was interrupted or the words were truncated by the logger
    pub data: Vec<u16>,
}

impl BlitRamVram {
    pub fn new(x: i32, y: i32, w: i32, h: i32, data: Vec<u16>) -> Self {
        Self {
            x,
            y,
            w,
            h,
            raw: Rect::new(x, y, w, h),
            clipped: false,
            data,
        }
    }

    fn from_words(words: &[u32]) -> Option<Self> {
        let [_, dest, size, ref payload @ ..] = *words else {
            return None;
        };

        let (x, y) = vram_position_from_u32(dest);
        let (w, h) = vram_size_from_u32(size);
        let (raw_x, raw_y) = raw_halves(dest);
        let (raw_w, raw_h) = raw_halves(size);
        let raw = Rect::new(raw_x, raw_y, raw_w, raw_h);

        let total_size = area(w, h) as usize;
        let data = payload
            .iter()
            .flat_map(|word| [*word as u16, (word >> 16) as u16])
            .take(total_size)
            .collect();

        Some(Self {
            x,
            y,
            w,
            h,
            raw,
            clipped: raw != Rect::new(x, y, w, h),
            data,
        })
    }
}

/// GP0(C0h), read a rectangle of VRAM back to the CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlitVramRam {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub raw: Rect,
    pub clipped: bool,
}

impl BlitVramRam {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            raw: Rect::new(x, y, w, h),
            clipped: false,
        }
    }

    fn from_words(words: &[u32]) -> Option<Self> {
        let [_, src, size, ..] = *words else {
            return None;
        };

        let (x, y) = vram_position_from_u32(src);
        let (w, h) = vram_size_from_u32(size);
        let (raw_x, raw_y) = raw_halves(src);
        let (raw_w, raw_h) = raw_halves(size);
        let raw = Rect::new(raw_x, raw_y, raw_w, raw_h);

        Some(Self {
            x,
            y,
            w,
            h,
            raw,
            clipped: raw != Rect::new(x, y, w, h),
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BlendFunction {
    #[default]
    HalfBackAndHalfFront,
    FullBackAndFullFront,
    FullBackSubFullFront,
    FullBackAndQuarterFront,
}

impl BlendFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HalfBackAndHalfFront => "HalfBackAndHalfFront",
            Self::FullBackAndFullFront => "FullBackAndFullFront",
            Self::FullBackSubFullFront => "FullBackSubFullFront",
            Self::FullBackAndQuarterFront => "FullBackAndQuarterFront",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TexDepth {
    #[default]
    Tex4Bits,
    Tex8Bits,
    Tex16Bits,
}

impl TexDepth {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tex4Bits => "Tex4Bits",
            Self::Tex8Bits => "Tex8Bits",
            Self::Tex16Bits => "Tex16Bits",
        }
    }

    /// How many texels are packed in one 16 bit VRAM pixel.
    fn texels_per_pixel(&self) -> i32 {
        match self {
            Self::Tex4Bits => 4,
            Self::Tex8Bits => 2,
            Self::Tex16Bits => 1,
        }
    }
}

/// GP0(E1h) draw mode, also carried in the texture coordinates of textured polygons.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TPage {
    pub raw: u32,
    /// texture page X base, in units of 64 pixels
    pub tx: u32,
    /// texture page Y base, in units of 256 lines
    pub ty: u32,
    pub blend_function: BlendFunction,
    pub tex_depth: TexDepth,
    pub dither: bool,
    pub draw_to_display: bool,
    pub tex_disable: bool,
    pub xflip: bool,
    pub yflip: bool,
}

impl TPage {
    pub fn from_raw(data: u32) -> Self {
        // 0-3   Texture page X Base   (N*64)
        // 4     Texture page Y Base   (N*256)
        // 5-6   Semi Transparency     (0=B/2+F/2, 1=B+F, 2=B-F, 3=B+F/4)
        // 7-8   Texture page colors   (0=4bit, 1=8bit, 2=15bit, 3=Reserved)
        // 9     Dither 24bit to 15bit (0=Off/strip LSBs, 1=Dither Enabled)
        // 10    Drawing to display area (0=Prohibited, 1=Allowed)
        // 11    Texture Disable (0=Normal, 1=Disable if GP1(09h).Bit0=1)
        // 12    Textured Rectangle X-Flip
        // 13    Textured Rectangle Y-Flip
        let raw = data & 0xFFFFFF;
        Self {
            raw,
            tx: raw & 0xF,
            ty: (raw >> 4) & 1,
            blend_function: match (raw >> 5) & 3 {
                0 => BlendFunction::HalfBackAndHalfFront,
                1 => BlendFunction::FullBackAndFullFront,
                2 => BlendFunction::FullBackSubFullFront,
                _ => BlendFunction::FullBackAndQuarterFront,
            },
            tex_depth: match (raw >> 7) & 3 {
                0 => TexDepth::Tex4Bits,
                1 => TexDepth::Tex8Bits,
                // 3 is reserved, and behaves like 15bit
                _ => TexDepth::Tex16Bits,
            },
            dither: (raw >> 9) & 1 == 1,
            draw_to_display: (raw >> 10) & 1 == 1,
            tex_disable: (raw >> 11) & 1 == 1,
            xflip: (raw >> 12) & 1 == 1,
            yflip: (raw >> 13) & 1 == 1,
        }
    }

    pub fn base_x(&self) -> i32 {
        (self.tx * 64) as i32
    }

    pub fn base_y(&self) -> i32 {
        (self.ty * 256) as i32
    }

    /// Location in VRAM of the texel `(u, v)` of this page.
    fn texel_position(&self, u: u8, v: u8) -> Vertex {
        Vertex::new(
            self.base_x() + u as i32 / self.tex_depth.texels_per_pixel(),
            self.base_y() + v as i32,
        )
    }

    fn json_fields(&self) -> Value {
        json!({
            "raw": self.raw,
            "tx": self.tx,
            "ty": self.ty,
            "blendFunction": self.blend_function.name(),
            "depth": self.tex_depth.name(),
            "dither": self.dither,
            "drawToDisplay": self.draw_to_display,
            "textureDisable": self.tex_disable,
            "xflip": self.xflip,
            "yflip": self.yflip,
        })
    }
}

/// GP0(E2h) texture window, the values are in units of 8 pixels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TWindow {
    pub raw: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl TWindow {
    pub fn from_raw(data: u32) -> Self {
        let raw = data & 0xFFFFFF;
        Self {
            raw,
            w: raw & 0x1F,
            h: (raw >> 5) & 0x1F,
            x: (raw >> 10) & 0x1F,
            y: (raw >> 15) & 0x1F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    Off,
    FifoQuery,
    CpuToGp0,
    GpuReadToCpu,
}

impl DmaDirection {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::FifoQuery => "FifoQuery",
            Self::CpuToGp0 => "CpuToGp0",
            Self::GpuReadToCpu => "GpuReadToCpu",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalResolution {
    Hr256,
    Hr320,
    Hr512,
    Hr640,
    Hr368,
    Hr384,
}

impl HorizontalResolution {
    pub fn pixels(&self) -> u32 {
        match self {
            Self::Hr256 => 256,
            Self::Hr320 => 320,
            Self::Hr512 => 512,
            Self::Hr640 => 640,
            Self::Hr368 => 368,
            Self::Hr384 => 384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalResolution {
    Vr240,
    Vr480,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoMode {
    Ntsc,
    Pal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    Bits15,
    Bits24,
}

/// GP1(08h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    pub hres: HorizontalResolution,
    pub vres: VerticalResolution,
    pub mode: VideoMode,
    pub depth: ColorDepth,
    pub interlace: bool,
    /// the 3 width bits, `bit 0` is the "Horizontal Resolution 2" bit
    pub width_raw: u32,
}

impl DisplayMode {
    pub fn from_raw(data: u32) -> Self {
        // 0-1   Horizontal Resolution 1     (0=256, 1=320, 2=512, 3=640)
        // 2     Vertical Resolution         (0=240, 1=480, when Bit5=1)
        // 3     Video Mode                  (0=NTSC/60Hz, 1=PAL/50Hz)
        // 4     Display Area Color Depth    (0=15bit, 1=24bit)
        // 5     Vertical Interlace          (0=Off, 1=On)
        // 6     Horizontal Resolution 2     (0=256/320/512/640, 1=368)
        let extended = (data >> 6) & 1 == 1;
        let hres = match (extended, data & 3) {
            (true, 0) => HorizontalResolution::Hr368,
            (true, 1) => HorizontalResolution::Hr384,
            (_, 2) => HorizontalResolution::Hr512,
            (_, 3) => HorizontalResolution::Hr640,
            (false, 0) => HorizontalResolution::Hr256,
            _ => HorizontalResolution::Hr320,
        };

        Self {
            hres,
            vres: if (data >> 2) & 1 == 1 {
                VerticalResolution::Vr480
            } else {
                VerticalResolution::Vr240
            },
            mode: if (data >> 3) & 1 == 1 {
                VideoMode::Pal
            } else {
                VideoMode::Ntsc
            },
            depth: if (data >> 4) & 1 == 1 {
                ColorDepth::Bits24
            } else {
                ColorDepth::Bits15
            },
            interlace: (data >> 5) & 1 == 1,
            width_raw: ((data >> 6) & 1) | ((data & 3) << 1),
        }
    }

    fn to_json(self) -> Value {
        json!({
            "primitive": "ctrl_display_mode",
            "hres": self.hres.pixels(),
            "extendedWidth": self.width_raw & 1 == 1,
            "vres": match self.vres {
                VerticalResolution::Vr240 => 240,
                VerticalResolution::Vr480 => 480,
            },
            "mode": match self.mode {
                VideoMode::Ntsc => "NTSC",
                VideoMode::Pal => "PAL",
            },
            "depth": match self.depth {
                ColorDepth::Bits15 => "15bits",
                ColorDepth::Bits24 => "24bits",
            },
            "interlace": self.interlace,
            "widthRaw": self.width_raw,
        })
    }
}

/// GP1(10h) GPU info request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    TextureWindow,
    DrawAreaStart,
    DrawAreaEnd,
    DrawOffset,
    GpuVersion,
    Unknown(u8),
}

impl QueryType {
    fn from_raw(data: u32) -> Self {
        match data & 0xF {
            2 => Self::TextureWindow,
            3 => Self::DrawAreaStart,
            4 => Self::DrawAreaEnd,
            5 => Self::DrawOffset,
            7 => Self::GpuVersion,
            n => Self::Unknown(n as u8),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TextureWindow => "TextureWindow",
            Self::DrawAreaStart => "DrawAreaStart",
            Self::DrawAreaEnd => "DrawAreaEnd",
            Self::DrawOffset => "DrawOffset",
            Self::GpuVersion => "GpuVersion",
            Self::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Polygon,
    Line,
    Rectangle,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveVertex {
    pub x: i32,
    pub y: i32,
    pub color: u32,
    pub u: u8,
    pub v: u8,
}

/// Drawing commands GP0(20h..7Fh).
///
/// Positions are kept as sent by the CPU, without the drawing offset applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub gouraud: bool,
    pub textured: bool,
    pub semi_transparent: bool,
    pub raw_texture: bool,
    pub polyline: bool,
    pub vertices: Vec<PrimitiveVertex>,
    pub clut: u16,
    /// the page used for texturing, polygons carry their own, rectangles use the
    /// last one set by the CPU
    pub tpage: Option<TPage>,
    /// only for rectangles
    pub size: (i32, i32),
}

impl Primitive {
    fn new(kind: PrimitiveKind, data0: u32) -> Self {
        Self {
            kind,
            gouraud: (data0 >> 28) & 1 == 1,
            textured: kind != PrimitiveKind::Line && (data0 >> 26) & 1 == 1,
            semi_transparent: (data0 >> 25) & 1 == 1,
            raw_texture: kind != PrimitiveKind::Line && (data0 >> 24) & 1 == 1,
            polyline: kind == PrimitiveKind::Line && (data0 >> 27) & 1 == 1,
            vertices: Vec::new(),
            clut: 0,
            tpage: None,
            size: (0, 0),
        }
    }

    fn polygon_from_words(words: &[u32]) -> Option<Self> {
        let data0 = *words.first()?;
        let mut polygon = Self::new(PrimitiveKind::Polygon, data0);
        let n_vertices = if (data0 >> 27) & 1 == 1 { 4 } else { 3 };

        let mut params = words[1..].iter().copied();
        let mut color = data0 & 0xFFFFFF;
        for i in 0..n_vertices {
            if polygon.gouraud && i > 0 {
                color = params.next()? & 0xFFFFFF;
            }
            let (x, y) = vertex_position_from_u32(params.next()?);
            let mut vertex = PrimitiveVertex {
                x,
                y,
                color,
                ..PrimitiveVertex::default()
            };
            if polygon.textured {
                let param = params.next()?;
                vertex.u = param as u8;
                vertex.v = (param >> 8) as u8;
                match i {
                    0 => polygon.clut = (param >> 16) as u16,
                    1 => polygon.tpage = Some(TPage::from_raw(param >> 16)),
                    _ => {}
                }
            }
            polygon.vertices.push(vertex);
        }

        Some(polygon)
    }

    fn line_from_words(words: &[u32]) -> Option<Self> {
        let data0 = *words.first()?;
        let mut line = Self::new(PrimitiveKind::Line, data0);

        // the end of polyline marker, can appear instead of a color or a position
        let is_end = |line: &Self, param: u32| {
            line.polyline && line.vertices.len() >= 2 && (param & 0xF000F000) == 0x50005000
        };

        let mut params = words[1..].iter().copied();
        let mut color = data0 & 0xFFFFFF;
        loop {
            if line.gouraud && !line.vertices.is_empty() {
                let Some(param) = params.next() else { break };
                if is_end(&line, param) {
                    break;
                }
                color = param & 0xFFFFFF;
            }

            let Some(param) = params.next() else { break };
            if is_end(&line, param) {
                break;
            }
            let (x, y) = vertex_position_from_u32(param);
            line.vertices.push(PrimitiveVertex {
                x,
                y,
                color,
                ..PrimitiveVertex::default()
            });

            if !line.polyline && line.vertices.len() == 2 {
                break;
            }
        }

        if line.vertices.len() < 2 {
            return None;
        }
        Some(line)
    }

    fn rectangle_from_words(words: &[u32]) -> Option<Self> {
        let data0 = *words.first()?;
        let mut rect = Self::new(PrimitiveKind::Rectangle, data0);

        let mut params = words[1..].iter().copied();
        let (x, y) = vertex_position_from_u32(params.next()?);
        let mut vertex = PrimitiveVertex {
            x,
            y,
            color: data0 & 0xFFFFFF,
            ..PrimitiveVertex::default()
        };
        if rect.textured {
            let param = params.next()?;
            vertex.u = param as u8;
            vertex.v = (param >> 8) as u8;
            rect.clut = (param >> 16) as u16;
        }
        rect.vertices.push(vertex);

        rect.size = match (data0 >> 27) & 3 {
            0 => {
                let param = params.next()?;
                ((param & 0x3FF) as i32, ((param >> 16) & 0x1FF) as i32)
            }
            1 => (1, 1),
            2 => (8, 8),
            _ => (16, 16),
        };

        Some(rect)
    }

    /// The triangles this polygon is drawn with, as vertex indices.
    fn triangle_indices(&self) -> &'static [[usize; 3]] {
        if self.vertices.len() >= 4 {
            &[[0, 1, 2], [1, 2, 3]]
        } else if self.vertices.len() == 3 {
            &[[0, 1, 2]]
        } else {
            &[]
        }
    }

    fn polygon_area(&self) -> u64 {
        let area2: i64 = self
            .triangle_indices()
            .iter()
            .map(|&[a, b, c]| {
                let position = |i: usize| Vertex::new(self.vertices[i].x, self.vertices[i].y);
                triangle_area2(position(a), position(b), position(c)).abs()
            })
            .sum();
        area2 as u64 / 2
    }

    fn cumulate_stats(&self, stats: &mut GpuStats) {
        match self.kind {
            PrimitiveKind::Polygon => {
                let triangles = self.triangle_indices().len() as u64;
                let area = self.polygon_area();
                stats.triangles += triangles;
                stats.pixel_writes += area;
                if self.textured {
                    stats.textured_triangles += triangles;
                    stats.texel_reads += area;
                }
            }
            PrimitiveKind::Line => {
                for pair in self.vertices.windows(2) {
                    let dx = (pair[1].x - pair[0].x).unsigned_abs() as u64;
                    let dy = (pair[1].y - pair[0].y).unsigned_abs() as u64;
                    stats.pixel_writes += dx.max(dy) + 1;
                }
            }
            PrimitiveKind::Rectangle => {
                let size = area(self.size.0, self.size.1);
                stats.pixel_writes += size;
                if self.textured {
                    stats.sprites += 1;
                    stats.texel_reads += size;
                } else {
                    stats.rectangles += 1;
                }
            }
        }
    }

    fn get_vertices<F>(&self, add: &mut F, op: PixelOp)
    where
        F: FnMut(Vertex, Vertex, Vertex) + ?Sized,
    {
        // texture reads are only known when the texture page is
        let tpage = self.tpage.filter(|_| self.textured);

        match (self.kind, op) {
            (PrimitiveKind::Polygon, PixelOp::Write) => {
                for &[a, b, c] in self.triangle_indices() {
                    let position = |i: usize| Vertex::new(self.vertices[i].x, self.vertices[i].y);
                    add(position(a), position(b), position(c));
                }
            }
            (PrimitiveKind::Polygon, PixelOp::Read) => {
                let Some(tpage) = tpage else { return };
                for &[a, b, c] in self.triangle_indices() {
                    let texel = |i: usize| {
                        tpage.texel_position(self.vertices[i].u, self.vertices[i].v)
                    };
                    add(texel(a), texel(b), texel(c));
                }
            }
            (PrimitiveKind::Line, PixelOp::Write) => {
                for pair in self.vertices.windows(2) {
                    add_line(add, pair[0].x, pair[0].y, pair[1].x, pair[1].y);
                }
            }
            (PrimitiveKind::Line, PixelOp::Read) => {}
            (PrimitiveKind::Rectangle, PixelOp::Write) => {
                let Some(top_left) = self.vertices.first() else {
                    return;
                };
                add_rect(add, top_left.x, top_left.y, self.size.0, self.size.1);
            }
            (PrimitiveKind::Rectangle, PixelOp::Read) => {
                let (Some(tpage), Some(top_left)) = (tpage, self.vertices.first()) else {
                    return;
                };
                let start = tpage.texel_position(top_left.u, top_left.v);
                let texels_per_pixel = tpage.tex_depth.texels_per_pixel();
                let w = (self.size.0 + texels_per_pixel - 1) / texels_per_pixel;
                add_rect(add, start.x, start.y, w, self.size.1);
            }
        }
    }

    fn to_json(&self) -> Value {
        let mut details = json!({
            "primitive": match self.kind {
                PrimitiveKind::Polygon => "polygon",
                PrimitiveKind::Line => "line",
                PrimitiveKind::Rectangle => "rectangle",
            },
            "gouraud": self.gouraud,
            "textured": self.textured,
            "semiTransparent": self.semi_transparent,
            "rawTexture": self.raw_texture,
            "vertices": self
                .vertices
                .iter()
                .map(|v| json!({
                    "x": v.x,
                    "y": v.y,
                    "color": color_to_hex(v.color),
                    "u": v.u,
                    "v": v.v,
                }))
                .collect::<Vec<_>>(),
            "clut": self.clut,
            "tpage": self.tpage.map(|tpage| tpage.json_fields()),
        });

        match self.kind {
            PrimitiveKind::Line => {
                details["polyline"] = json!(self.polyline);
            }
            PrimitiveKind::Rectangle => {
                details["size"] = json!({"w": self.size.0, "h": self.size.1});
            }
            PrimitiveKind::Polygon => {}
        }
        details
    }
}

/// All the GPU operations that can be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuCommand {
    ClearCache,
    FastFill(FastFill),
    BlitVramVram(BlitVramVram),
    BlitRamVram(BlitRamVram),
    BlitVramRam(BlitVramRam),
    TPage(TPage),
    TWindow(TWindow),
    DrawingAreaStart { raw: u32, x: u32, y: u32 },
    DrawingAreaEnd { raw: u32, x: u32, y: u32 },
    DrawingOffset { raw: u32, x: i32, y: i32 },
    MaskBit { set: bool, check: bool },
    Primitive(Primitive),

    CtrlReset,
    CtrlClearFifo,
    CtrlIrqAck,
    CtrlDisplayEnable { enable: bool },
    CtrlDmaSetting { dma: DmaDirection },
    CtrlDisplayStart { x: u32, y: u32 },
    CtrlHorizontalDisplayRange { x0: u32, x1: u32 },
    CtrlVerticalDisplayRange { y0: u32, y1: u32 },
    CtrlDisplayMode(DisplayMode),
    CtrlQuery(QueryType),
}

impl GpuCommand {
    /// Decode a complete GP0 command from its words, the first word holds the command.
    ///
    /// Returns `None` for commands that are not logged (nops, interrupt request) or when
    /// `words` is too short for the command.
    pub fn from_gp0(words: &[u32]) -> Option<Self> {
        let data0 = *words.first()?;
        let cmd = data0 >> 24;

        let command = match cmd {
            0x01 => Self::ClearCache,
            0x02 => Self::FastFill(FastFill::from_words(words)?),
            0x20..=0x3F => Self::Primitive(Primitive::polygon_from_words(words)?),
            0x40..=0x5F => Self::Primitive(Primitive::line_from_words(words)?),
            0x60..=0x7F => Self::Primitive(Primitive::rectangle_from_words(words)?),
            0x80..=0x9F => Self::BlitVramVram(BlitVramVram::from_words(words)?),
            0xA0..=0xBF => Self::BlitRamVram(BlitRamVram::from_words(words)?),
            0xC0..=0xDF => Self::BlitVramRam(BlitVramRam::from_words(words)?),
            0xE1 => Self::TPage(TPage::from_raw(data0)),
            0xE2 => Self::TWindow(TWindow::from_raw(data0)),
            0xE3 => Self::DrawingAreaStart {
                raw: data0 & 0xFFFFFF,
                x: data0 & 0x3FF,
                y: (data0 >> 10) & 0x3FF,
            },
            0xE4 => Self::DrawingAreaEnd {
                raw: data0 & 0xFFFFFF,
                x: data0 & 0x3FF,
                y: (data0 >> 10) & 0x3FF,
            },
            0xE5 => {
                // signed 11 bits each
                let x = data0 & 0x7FF;
                let sign_extend = 0xFFFFF800 * ((x >> 10) & 1);
                let x = (x | sign_extend) as i32;
                let y = (data0 >> 11) & 0x7FF;
                let sign_extend = 0xFFFFF800 * ((y >> 10) & 1);
                let y = (y | sign_extend) as i32;
                Self::DrawingOffset {
                    raw: data0 & 0xFFFFFF,
                    x,
                    y,
                }
            }
            0xE6 => Self::MaskBit {
                set: data0 & 1 == 1,
                check: (data0 >> 1) & 1 == 1,
            },
            _ => return None,
        };
        Some(command)
    }

    /// Decode a GP1 control write.
    pub fn from_gp1(data: u32) -> Option<Self> {
        let cmd = (data >> 24) & 0x3F;

        let command = match cmd {
            0x00 => Self::CtrlReset,
            0x01 => Self::CtrlClearFifo,
            0x02 => Self::CtrlIrqAck,
            0x03 => Self::CtrlDisplayEnable {
                // the bit is "display disabled"
                enable: data & 1 == 0,
            },
            0x04 => Self::CtrlDmaSetting {
                dma: match data & 3 {
                    0 => DmaDirection::Off,
                    1 => DmaDirection::FifoQuery,
                    2 => DmaDirection::CpuToGp0,
                    _ => DmaDirection::GpuReadToCpu,
                },
            },
            0x05 => Self::CtrlDisplayStart {
                x: data & 0x3FF,
                y: (data >> 10) & 0x1FF,
            },
            0x06 => Self::CtrlHorizontalDisplayRange {
                x0: data & 0xFFF,
                x1: (data >> 12) & 0xFFF,
            },
            0x07 => Self::CtrlVerticalDisplayRange {
                y0: data & 0x3FF,
                y1: (data >> 10) & 0x3FF,
            },
            0x08 => Self::CtrlDisplayMode(DisplayMode::from_raw(data)),
            0x10..=0x1F => Self::CtrlQuery(QueryType::from_raw(data)),
            _ => return None,
        };
        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClearCache => "ClearCache",
            Self::FastFill(_) => "FastFill",
            Self::BlitVramVram(_) => "BlitVramVram",
            Self::BlitRamVram(_) => "BlitRamVram",
            Self::BlitVramRam(_) => "BlitVramRam",
            Self::TPage(_) => "TPage",
            Self::TWindow(_) => "TWindow",
            Self::DrawingAreaStart { .. } => "DrawingAreaStart",
            Self::DrawingAreaEnd { .. } => "DrawingAreaEnd",
            Self::DrawingOffset { .. } => "DrawingOffset",
            Self::MaskBit { .. } => "MaskBit",
            Self::Primitive(primitive) => match primitive.kind {
                PrimitiveKind::Polygon => "Polygon",
                PrimitiveKind::Line => "Line",
                PrimitiveKind::Rectangle => "Rectangle",
            },
            Self::CtrlReset => "CtrlReset",
            Self::CtrlClearFifo => "CtrlClearFifo",
            Self::CtrlIrqAck => "CtrlIrqAck",
            Self::CtrlDisplayEnable { .. } => "CtrlDisplayEnable",
            Self::CtrlDmaSetting { .. } => "CtrlDmaSetting",
            Self::CtrlDisplayStart { .. } => "CtrlDisplayStart",
            Self::CtrlHorizontalDisplayRange { .. } => "CtrlHorizontalDisplayRange",
            Self::CtrlVerticalDisplayRange { .. } => "CtrlVerticalDisplayRange",
            Self::CtrlDisplayMode(_) => "CtrlDisplayMode",
            Self::CtrlQuery(_) => "CtrlQuery",
        }
    }

    /// `true` for GP1 commands.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::CtrlReset
                | Self::CtrlClearFifo
                | Self::CtrlIrqAck
                | Self::CtrlDisplayEnable { .. }
                | Self::CtrlDmaSetting { .. }
                | Self::CtrlDisplayStart { .. }
                | Self::CtrlHorizontalDisplayRange { .. }
                | Self::CtrlVerticalDisplayRange { .. }
                | Self::CtrlDisplayMode(_)
                | Self::CtrlQuery(_)
        )
    }

    pub fn cumulate_stats(&self, stats: &mut GpuStats) {
        match self {
            Self::FastFill(fill) => stats.pixel_writes += area(fill.w, fill.h),
            Self::BlitVramVram(blit) => {
                let size = area(blit.w, blit.h);
                stats.pixel_writes += size;
                stats.pixel_reads += size;
            }
            Self::BlitRamVram(blit) => stats.pixel_writes += area(blit.w, blit.h),
            Self::BlitVramRam(blit) => stats.pixel_reads += area(blit.w, blit.h),
            Self::Primitive(primitive) => primitive.cumulate_stats(stats),
            _ => {}
        }
    }

    /// Emit the triangles covering the VRAM area this command reads or writes.
    pub fn get_vertices<F>(&self, add: &mut F, op: PixelOp)
    where
        F: FnMut(Vertex, Vertex, Vertex) + ?Sized,
    {
        match (self, op) {
            (Self::FastFill(fill), PixelOp::Write) => add_rect(add, fill.x, fill.y, fill.w, fill.h),
            (Self::BlitVramVram(blit), PixelOp::Read) => {
                add_rect(add, blit.s_x, blit.s_y, blit.w, blit.h)
            }
            (Self::BlitVramVram(blit), PixelOp::Write) => {
                add_rect(add, blit.d_x, blit.d_y, blit.w, blit.h)
            }
            (Self::BlitRamVram(blit), PixelOp::Write) => {
                add_rect(add, blit.x, blit.y, blit.w, blit.h)
            }
            (Self::BlitVramRam(blit), PixelOp::Read) => {
                add_rect(add, blit.x, blit.y, blit.w, blit.h)
            }
            (Self::Primitive(primitive), op) => primitive.get_vertices(add, op),
            _ => {}
        }
    }

    /// The structured description of the command, used in the JSON dump.
    pub fn details(&self) -> Value {
        match self {
            Self::ClearCache => json!({"primitive": "clear_cache"}),
            Self::FastFill(fill) => json!({
                "primitive": "fast_fill",
                "color": color_to_hex(fill.color),
                "rect": Rect::new(fill.x, fill.y, fill.w, fill.h).to_json(),
                "raw": fill.raw.to_json(),
                "clipped": fill.clipped,
            }),
            Self::BlitVramVram(blit) => json!({
                "primitive": "blit_vram_to_vram",
                "source": Rect::new(blit.s_x, blit.s_y, blit.w, blit.h).to_json(),
                "destination": Rect::new(blit.d_x, blit.d_y, blit.w, blit.h).to_json(),
                "raw": {
                    "sX": blit.raw.s_x,
                    "sY": blit.raw.s_y,
                    "dX": blit.raw.d_x,
                    "dY": blit.raw.d_y,
                    "w": blit.raw.w,
                    "h": blit.raw.h,
                },
                "clipped": blit.clipped,
            }),
            Self::BlitRamVram(blit) => json!({
                "primitive": "blit_ram_to_vram",
                "destination": Rect::new(blit.x, blit.y, blit.w, blit.h).to_json(),
                "raw": blit.raw.to_json(),
                "clipped": blit.clipped,
                "dataBytes": blit.data.len() * 2,
            }),
            Self::BlitVramRam(blit) => json!({
                "primitive": "blit_vram_to_ram",
                "source": Rect::new(blit.x, blit.y, blit.w, blit.h).to_json(),
                "raw": blit.raw.to_json(),
                "clipped": blit.clipped,
            }),
            Self::TPage(tpage) => {
                let mut details = json!({"primitive": "texture_page"});
                if let (Some(details), Value::Object(fields)) =
                    (details.as_object_mut(), tpage.json_fields())
                {
                    details.extend(fields);
                }
                details
            }
            Self::TWindow(window) => json!({
                "primitive": "texture_window",
                "raw": window.raw,
                "x": window.x,
                "y": window.y,
                "w": window.w,
                "h": window.h,
            }),
            Self::DrawingAreaStart { raw, x, y } => json!({
                "primitive": "drawing_area_start",
                "raw": raw,
                "x": x,
                "y": y,
            }),
            Self::DrawingAreaEnd { raw, x, y } => json!({
                "primitive": "drawing_area_end",
                "raw": raw,
                "x": x,
                "y": y,
            }),
            Self::DrawingOffset { raw, x, y } => json!({
                "primitive": "drawing_offset",
                "raw": raw,
                "x": x,
                "y": y,
            }),
            Self::MaskBit { set, check } => json!({
                "primitive": "mask_bit",
                "set": set,
                "check": check,
            }),
            Self::Primitive(primitive) => primitive.to_json(),
            Self::CtrlReset => json!({"primitive": "ctrl_reset"}),
            Self::CtrlClearFifo => json!({"primitive": "ctrl_clear_fifo"}),
            Self::CtrlIrqAck => json!({"primitive": "ctrl_irq_ack"}),
            Self::CtrlDisplayEnable { enable } => json!({
                "primitive": "ctrl_display_enable",
                "enable": enable,
            }),
            Self::CtrlDmaSetting { dma } => json!({
                "primitive": "ctrl_dma_setting",
                "dma": dma.name(),
            }),
            Self::CtrlDisplayStart { x, y } => json!({
                "primitive": "ctrl_display_start",
                "x": x,
                "y": y,
            }),
            Self::CtrlHorizontalDisplayRange { x0, x1 } => json!({
                "primitive": "ctrl_horizontal_display_range",
                "x0": x0,
                "x1": x1,
            }),
            Self::CtrlVerticalDisplayRange { y0, y1 } => json!({
                "primitive": "ctrl_vertical_display_range",
                "y0": y0,
                "y1": y1,
            }),
            Self::CtrlDisplayMode(mode) => mode.to_json(),
            Self::CtrlQuery(query) => json!({
                "primitive": "ctrl_query",
                "query": query.name(),
            }),
        }
    }
}

#[cfg(test)]
fn collect_triangles(command: &GpuCommand, op: PixelOp) -> Vec<[Vertex; 3]> {
    let mut tris = Vec::new();
    command.get_vertices(&mut |a, b, c| tris.push([a, b, c]), op);
    tris
}

#[test]
fn fast_fill_scenario() {
    let fill = GpuCommand::FastFill(FastFill::new(0x112233, 10, 20, 5, 5));

    let mut stats = GpuStats::default();
    fill.cumulate_stats(&mut stats);
    assert_eq!(stats.pixel_writes, 25);
    assert_eq!(stats.pixel_reads, 0);

    let tris = collect_triangles(&fill, PixelOp::Write);
    assert_eq!(
        tris,
        vec![
            [Vertex::new(10, 20), Vertex::new(15, 20), Vertex::new(15, 25)],
            [Vertex::new(15, 25), Vertex::new(10, 25), Vertex::new(10, 20)],
        ]
    );
    assert!(collect_triangles(&fill, PixelOp::Read).is_empty());

    let details = fill.details();
    assert_eq!(details["primitive"], "fast_fill");
    assert_eq!(details["color"], "0x112233");
    assert_eq!(details["rect"]["w"], 5);
    assert_eq!(details["clipped"], false);
}

#[test]
fn fast_fill_from_words_aligns_and_clips() {
    let fill = GpuCommand::from_gp0(&[0x0211_2233, 0x0014_0013, 0x0005_0005]).unwrap();

    let GpuCommand::FastFill(fill) = fill else {
        panic!("expected a fast fill");
    };
    assert_eq!(fill.color, 0x112233);
    assert_eq!((fill.x, fill.y, fill.w, fill.h), (0x10, 0x14, 0x10, 5));
    assert_eq!(fill.raw, Rect::new(0x13, 0x14, 5, 5));
    assert!(fill.clipped);
}

#[test]
fn blit_vram_vram_stats_and_geometry() {
    let blit = GpuCommand::BlitVramVram(BlitVramVram::new(0, 0, 100, 100, 8, 8));

    let mut stats = GpuStats::default();
    blit.cumulate_stats(&mut stats);
    assert_eq!(stats.pixel_reads, 64);
    assert_eq!(stats.pixel_writes, 64);

    let read = collect_triangles(&blit, PixelOp::Read);
    assert_eq!(read[0], [Vertex::new(0, 0), Vertex::new(8, 0), Vertex::new(8, 8)]);
    let write = collect_triangles(&blit, PixelOp::Write);
    assert_eq!(
        write[1],
        [Vertex::new(108, 108), Vertex::new(100, 108), Vertex::new(100, 100)]
    );
}

#[test]
fn blit_vram_vram_from_words() {
    let blit = GpuCommand::from_gp0(&[0x8000_0000, 0x0000_0000, 0x0064_0064, 0x0008_0008]).unwrap();
    assert_eq!(
        blit,
        GpuCommand::BlitVramVram(BlitVramVram::new(0, 0, 100, 100, 8, 8))
    );
}

#[test]
fn blit_vram_ram_only_reads() {
    let blit = GpuCommand::from_gp0(&[0xC000_0000, 0x0010_0020, 0x0004_0002]).unwrap();

    let mut stats = GpuStats::default();
    blit.cumulate_stats(&mut stats);
    assert_eq!(stats.pixel_reads, 8);
    assert_eq!(stats.pixel_writes, 0);

    assert!(collect_triangles(&blit, PixelOp::Write).is_empty());
    assert_eq!(collect_triangles(&blit, PixelOp::Read).len(), 2);
}

#[test]
fn blit_ram_vram_keeps_payload() {
    // 3x1 block, the last half word is padding
    let blit = GpuCommand::from_gp0(&[0xA000_0000, 0x0000_0005, 0x0001_0003, 0x2222_1111, 0xFFFF_3333])
        .unwrap();

    let GpuCommand::BlitRamVram(ref upload) = blit else {
        panic!("expected a cpu to vram blit");
    };
    assert_eq!(upload.data, vec![0x1111, 0x2222, 0x3333]);
    assert_eq!((upload.x, upload.y, upload.w, upload.h), (5, 0, 3, 1));
    assert_eq!(blit.details()["dataBytes"], 6);

    let mut stats = GpuStats::default();
    blit.cumulate_stats(&mut stats);
    assert_eq!(stats.pixel_writes, 3);
    assert!(collect_triangles(&blit, PixelOp::Read).is_empty());
}

#[test]
fn blit_size_zero_is_max() {
    let blit = GpuCommand::from_gp0(&[0xC000_0000, 0x0000_0000, 0x0000_0000]).unwrap();
    let GpuCommand::BlitVramRam(blit) = blit else {
        panic!("expected a vram to cpu blit");
    };
    assert_eq!((blit.w, blit.h), (1024, 512));
    assert!(blit.clipped);
}

#[test]
fn environment_commands() {
    let tpage = GpuCommand::from_gp0(&[0xE100_0525]).unwrap();
    let GpuCommand::TPage(tpage) = tpage else {
        panic!("expected a texture page");
    };
    assert_eq!(tpage.tx, 5);
    assert_eq!(tpage.ty, 0);
    assert_eq!(tpage.blend_function, BlendFunction::FullBackAndFullFront);
    assert_eq!(tpage.tex_depth, TexDepth::Tex16Bits);
    assert!(tpage.draw_to_display);
    assert!(!tpage.dither);

    let details = GpuCommand::TPage(tpage).details();
    assert_eq!(details["primitive"], "texture_page");
    assert_eq!(details["depth"], "Tex16Bits");
    assert_eq!(details["drawToDisplay"], true);

    assert_eq!(
        GpuCommand::from_gp0(&[0xE500_0000 | (0x7FF << 11) | 0x002]),
        Some(GpuCommand::DrawingOffset {
            raw: (0x7FF << 11) | 0x002,
            x: 2,
            y: -1
        })
    );
    assert_eq!(
        GpuCommand::from_gp0(&[0xE600_0002]),
        Some(GpuCommand::MaskBit {
            set: false,
            check: true
        })
    );
    assert_eq!(GpuCommand::from_gp0(&[0x0000_0000]), None);
    assert_eq!(GpuCommand::from_gp0(&[]), None);
}

#[test]
fn control_commands() {
    assert_eq!(
        GpuCommand::from_gp1(0x0300_0001),
        Some(GpuCommand::CtrlDisplayEnable { enable: false })
    );
    assert_eq!(
        GpuCommand::from_gp1(0x0500_0000 | (100 << 10) | 320),
        Some(GpuCommand::CtrlDisplayStart { x: 320, y: 100 })
    );

    let GpuCommand::CtrlDisplayMode(mode) = GpuCommand::from_gp1(0x0800_0029).unwrap() else {
        panic!("expected display mode");
    };
    assert_eq!(mode.hres, HorizontalResolution::Hr320);
    assert_eq!(mode.mode, VideoMode::Pal);
    assert!(mode.interlace);
    assert_eq!(mode.width_raw, 2);

    let GpuCommand::CtrlDisplayMode(mode) = GpuCommand::from_gp1(0x0800_0040).unwrap() else {
        panic!("expected display mode");
    };
    assert_eq!(mode.hres, HorizontalResolution::Hr368);

    assert_eq!(
        GpuCommand::from_gp1(0x1000_0007),
        Some(GpuCommand::CtrlQuery(QueryType::GpuVersion))
    );
    assert!(GpuCommand::from_gp1(0x0100_0000).unwrap().is_control());
    assert_eq!(GpuCommand::from_gp1(0x0900_0001), None);

    let mut stats = GpuStats::default();
    let reset = GpuCommand::CtrlReset;
    reset.cumulate_stats(&mut stats);
    assert_eq!(stats, GpuStats::default());
    assert!(collect_triangles(&reset, PixelOp::Write).is_empty());
    assert!(collect_triangles(&reset, PixelOp::Read).is_empty());
}

#[test]
fn flat_triangle() {
    // monochrome triangle
    let tri = GpuCommand::from_gp0(&[0x2000_00FF, 0x0000_0000, 0x0000_0010, 0x0010_0000]).unwrap();

    let GpuCommand::Primitive(ref primitive) = tri else {
        panic!("expected a primitive");
    };
    assert_eq!(primitive.kind, PrimitiveKind::Polygon);
    assert_eq!(primitive.vertices.len(), 3);
    assert_eq!(primitive.vertices[2].y, 16);
    assert_eq!(tri.name(), "Polygon");

    let mut stats = GpuStats::default();
    tri.cumulate_stats(&mut stats);
    assert_eq!(stats.triangles, 1);
    assert_eq!(stats.textured_triangles, 0);
    assert_eq!(stats.pixel_writes, 128);

    assert_eq!(collect_triangles(&tri, PixelOp::Write).len(), 1);
    assert!(collect_triangles(&tri, PixelOp::Read).is_empty());
}

#[test]
fn textured_gouraud_quad() {
    let words = [
        0x3C00_0010, // color0 + command
        0x0000_0000, // vertex0
        0x0010_0000, // clut + uv0
        0x0000_0020, // color1
        0x0000_0040, // vertex1
        0x0081_0040, // tpage (x=1, 8bit) + uv1
        0x0000_0030, // color2
        0x0040_0000, // vertex2
        0x0000_4000, // uv2
        0x0000_0040, // color3
        0x0040_0040, // vertex3
        0x0000_4040, // uv3
    ];
    let quad = GpuCommand::from_gp0(&words).unwrap();

    let GpuCommand::Primitive(ref primitive) = quad else {
        panic!("expected a primitive");
    };
    assert!(primitive.gouraud && primitive.textured);
    assert_eq!(primitive.vertices.len(), 4);
    assert_eq!(primitive.vertices[3].color, 0x40);
    assert_eq!(primitive.clut, 0x0010);
    let tpage = primitive.tpage.unwrap();
    assert_eq!(tpage.tx, 1);
    assert_eq!(tpage.tex_depth, TexDepth::Tex8Bits);

    let mut stats = GpuStats::default();
    quad.cumulate_stats(&mut stats);
    assert_eq!(stats.triangles, 2);
    assert_eq!(stats.textured_triangles, 2);
    assert_eq!(stats.pixel_writes, 64 * 64);
    assert_eq!(stats.texel_reads, 64 * 64);

    // 8bit texels, 2 per VRAM pixel, starting at page x=64
    let read = collect_triangles(&quad, PixelOp::Read);
    assert_eq!(read.len(), 2);
    assert_eq!(read[0][0], Vertex::new(64, 0));
    assert_eq!(read[0][1], Vertex::new(96, 0));
    assert_eq!(read[1][2], Vertex::new(96, 64));

    // too short
    assert_eq!(GpuCommand::from_gp0(&words[..11]), None);
}

#[test]
fn polyline_until_terminator() {
    let words = [
        0x4800_00FF, // flat polyline
        0x0000_0000,
        0x0000_0004,
        0x0004_0004,
        0x5555_5555, // end marker
    ];
    let line = GpuCommand::from_gp0(&words).unwrap();

    let GpuCommand::Primitive(ref primitive) = line else {
        panic!("expected a primitive");
    };
    assert!(primitive.polyline);
    assert_eq!(primitive.vertices.len(), 3);

    let mut stats = GpuStats::default();
    line.cumulate_stats(&mut stats);
    assert_eq!(stats.pixel_writes, 10);

    assert_eq!(collect_triangles(&line, PixelOp::Write).len(), 4);
    assert!(collect_triangles(&line, PixelOp::Read).is_empty());
    assert_eq!(line.details()["polyline"], true);
}

#[test]
fn gouraud_line() {
    let line = GpuCommand::from_gp0(&[0x5000_0011, 0x0000_0000, 0x0000_0022, 0x0000_0004]).unwrap();

    let GpuCommand::Primitive(ref primitive) = line else {
        panic!("expected a primitive");
    };
    assert_eq!(primitive.vertices[0].color, 0x11);
    assert_eq!(primitive.vertices[1].color, 0x22);
    assert_eq!(primitive.vertices[1].x, 4);
}

#[test]
fn sprite_and_rectangle() {
    // variable size textured rectangle
    let words = [0x6400_0000, 0x0020_0010, 0x0000_1008, 0x0008_0010];
    let mut sprite = GpuCommand::from_gp0(&words).unwrap();

    let mut stats = GpuStats::default();
    sprite.cumulate_stats(&mut stats);
    assert_eq!(stats.sprites, 1);
    assert_eq!(stats.rectangles, 0);
    assert_eq!(stats.pixel_writes, 16 * 8);
    assert_eq!(stats.texel_reads, 16 * 8);

    let write = collect_triangles(&sprite, PixelOp::Write);
    assert_eq!(write[0][0], Vertex::new(16, 32));
    assert_eq!(write[0][2], Vertex::new(32, 40));

    // no texture page known yet
    assert!(collect_triangles(&sprite, PixelOp::Read).is_empty());

    if let GpuCommand::Primitive(primitive) = &mut sprite {
        primitive.tpage = Some(TPage::from_raw(0x0002)); // x=128, 4bit
    }
    let read = collect_triangles(&sprite, PixelOp::Read);
    assert_eq!(read[0][0], Vertex::new(128 + 2, 16));
    assert_eq!(read[0][2], Vertex::new(128 + 2 + 4, 24));

    // 8x8 monochrome
    let rect = GpuCommand::from_gp0(&[0x7000_0000, 0x0000_0000]).unwrap();
    let mut stats = GpuStats::default();
    rect.cumulate_stats(&mut stats);
    assert_eq!(stats.rectangles, 1);
    assert_eq!(stats.pixel_writes, 64);
    assert_eq!(rect.details()["size"]["w"], 8);
}

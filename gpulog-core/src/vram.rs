pub const VRAM_WIDTH: usize = 1024;
pub const VRAM_HEIGHT: usize = 512;

/// A full copy of the GPU memory, 1024x512 texels of 16 bits each.
///
/// This is what the logger keeps as the "baseline" of a frame, so that replaying
/// the frame's commands starts from the same memory the emulator had.
#[derive(Clone, PartialEq, Eq)]
pub struct Vram {
    data: Box<[u16]>,
}

impl Vram {
    pub fn new() -> Self {
        Self {
            data: vec![0; VRAM_WIDTH * VRAM_HEIGHT].into_boxed_slice(),
        }
    }

    /// Wraps a texel buffer taken from the emulator.
    /// Returns `None` if the buffer doesn't cover the whole VRAM.
    pub fn from_texels(texels: Vec<u16>) -> Option<Self> {
        if texels.len() != VRAM_WIDTH * VRAM_HEIGHT {
            return None;
        }
        Some(Self {
            data: texels.into_boxed_slice(),
        })
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn read(&self, x: u32, y: u32) -> u16 {
        let x = x as usize % VRAM_WIDTH;
        let y = y as usize % VRAM_HEIGHT;
        self.data[y * VRAM_WIDTH + x]
    }

    /// Write a `w`x`h` block at (`x`, `y`), wrapping around the edges like the hardware does.
    ///
    /// If `block` is shorter than the area, only the rows/texels available are written.
    pub fn partial_update(&mut self, x: u32, y: u32, w: u32, h: u32, block: &[u16]) {
        let (x, y, w) = (x as usize, y as usize, w as usize);
        if w == 0 {
            return;
        }
        let area = w.saturating_mul(h as usize);
        for (i, texel) in block.iter().take(area).enumerate() {
            let vx = (x % VRAM_WIDTH + i % w) % VRAM_WIDTH;
            let vy = (y % VRAM_HEIGHT + i / w) % VRAM_HEIGHT;
            self.data[vy * VRAM_WIDTH + vx] = *texel;
        }
    }
}

impl Default for Vram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Vram({}x{})", VRAM_WIDTH, VRAM_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_texels_rejects_wrong_size() {
        assert!(Vram::from_texels(vec![0; 10]).is_none());
        assert!(Vram::from_texels(vec![0; VRAM_WIDTH * VRAM_HEIGHT]).is_some());
    }

    #[test]
    fn partial_update_wraps_around() {
        let mut vram = Vram::new();
        vram.partial_update(1023, 511, 2, 2, &[1, 2, 3, 4]);

        assert_eq!(vram.read(1023, 511), 1);
        assert_eq!(vram.read(0, 511), 2);
        assert_eq!(vram.read(1023, 0), 3);
        assert_eq!(vram.read(0, 0), 4);
    }

    #[test]
    fn partial_update_short_block() {
        let mut vram = Vram::new();
        vram.partial_update(10, 10, 4, 4, &[7, 7, 7]);

        assert_eq!(vram.read(12, 10), 7);
        assert_eq!(vram.read(13, 10), 0);
        assert_eq!(vram.read(10, 11), 0);
    }

    #[test]
    fn partial_update_large_values() {
        let mut vram = Vram::new();
        vram.partial_update(u32::MAX, u32::MAX, u32::MAX, u32::MAX, &[5, 6]);

        // u32::MAX wraps to the last column and row
        assert_eq!(vram.read(1023, 511), 5);
        assert_eq!(vram.read(0, 511), 6);
    }
}

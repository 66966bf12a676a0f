/// A VRAM coordinate, used as triangle vertex when drawing heatmaps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Emit two triangles covering the rectangle `[x, x+w) x [y, y+h)`.
pub fn add_rect<F>(add: &mut F, x: i32, y: i32, w: i32, h: i32)
where
    F: FnMut(Vertex, Vertex, Vertex) + ?Sized,
{
    add(
        Vertex::new(x, y),
        Vertex::new(x + w, y),
        Vertex::new(x + w, y + h),
    );
    add(
        Vertex::new(x + w, y + h),
        Vertex::new(x, y + h),
        Vertex::new(x, y),
    );
}

/// Emit two triangles approximating a 1 pixel wide line from `(x1, y1)` to `(x2, y2)`.
pub fn add_line<F>(add: &mut F, mut x1: i32, mut y1: i32, mut x2: i32, mut y2: i32)
where
    F: FnMut(Vertex, Vertex, Vertex) + ?Sized,
{
    let dx = x2 - x1;
    let dy = y2 - y1;

    // both vertices coincide, draw a single pixel
    if dx == 0 && dy == 0 {
        add_rect(add, x1, y1, 1, 1);
        return;
    }

    let (x_offset, y_offset) = if dx.abs() > dy.abs() {
        // x-major, extend the end in the direction of travel so the last pixel is covered
        if dx > 0 {
            x2 += 1;
        } else {
            x1 += 1;
        }
        (0, 1)
    } else {
        // y-major
        if dy > 0 {
            y2 += 1;
        } else {
            y1 += 1;
        }
        (1, 0)
    };

    add(
        Vertex::new(x1, y1),
        Vertex::new(x2, y2),
        Vertex::new(x2 + x_offset, y2 + y_offset),
    );
    add(
        Vertex::new(x2 + x_offset, y2 + y_offset),
        Vertex::new(x1 + x_offset, y1 + y_offset),
        Vertex::new(x1, y1),
    );
}

/// Twice the signed area of the triangle, positive when counter clockwise in a y-up space.
pub(crate) fn triangle_area2(a: Vertex, b: Vertex, c: Vertex) -> i64 {
    (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64)
}

use embedded_graphics::{
    prelude::{Point, Size},
    primitives::Rectangle,
};

/// A rectangle given by two inclusive corners, as the drawing primitives
/// address the screen.
///
/// Corners are not required to be ordered; use [`Rect::normalized`] when the
/// operation needs `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Rect {
        Rect { x1, y1, x2, y2 }
    }

    /// The rectangle covering a `width` x `height` area starting at the origin
    pub const fn of_size(width: i32, height: i32) -> Rect {
        Rect::new(0, 0, width - 1, height - 1)
    }

    pub fn normalized(&self) -> Rect {
        Rect {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    pub const fn translate(&self, by: Point) -> Rect {
        Rect::new(self.x1 + by.x, self.y1 + by.y, self.x2 + by.x, self.y2 + by.y)
    }

    pub const fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    pub const fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    #[inline(always)]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub const fn intersects(&self, other: &Rect) -> bool {
        !(self.x1 > other.x2 || self.x2 < other.x1 || self.y1 > other.y2 || self.y2 < other.y1)
    }

    /// Clamps every corner into `bounds` independently
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        Rect {
            x1: self.x1.clamp(bounds.x1, bounds.x2),
            y1: self.y1.clamp(bounds.y1, bounds.y2),
            x2: self.x2.clamp(bounds.x1, bounds.x2),
            y2: self.y2.clamp(bounds.y1, bounds.y2),
        }
    }
}

impl From<Rectangle> for Rect {
    fn from(r: Rectangle) -> Rect {
        let Size { width, height } = r.size;
        Rect::new(
            r.top_left.x,
            r.top_left.y,
            r.top_left.x + width as i32 - 1,
            r.top_left.y + height as i32 - 1,
        )
    }
}

impl From<Rect> for Rectangle {
    fn from(r: Rect) -> Rectangle {
        let r = r.normalized();
        Rectangle::new(
            Point::new(r.x1, r.y1),
            Size::new(r.width() as u32, r.height() as u32),
        )
    }
}

//! Sprites and the mouse cursor, drawn over the viewport after each batch
//! of primitives and lifted off again before the next one touches it.

use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicI16, Ordering};

use embedded_graphics::prelude::{Point, Size};
use fixedbitset::FixedBitSet;

use crate::{
    bitmap::Bitmap,
    color::PixelFormat,
    paint,
    viewport::FrameBuffer,
};

/// Sprite coordinates the application may update from anywhere.
///
/// Each coordinate is read and written atomically but the pair is not, so
/// a concurrent reader can see the new x with the old y for one frame.
#[derive(Debug, Default)]
pub struct SpritePosition {
    x: AtomicI16,
    y: AtomicI16,
}

impl SpritePosition {
    pub fn new(x: i16, y: i16) -> SpritePosition {
        SpritePosition {
            x: AtomicI16::new(x),
            y: AtomicI16::new(y),
        }
    }

    pub fn get(&self) -> Point {
        Point::new(
            self.x.load(Ordering::Relaxed).into(),
            self.y.load(Ordering::Relaxed).into(),
        )
    }

    pub fn set(&self, x: i32, y: i32) {
        self.x.store(saturate(x), Ordering::Relaxed);
        self.y.store(saturate(y), Ordering::Relaxed);
    }
}

fn saturate(v: i32) -> i16 {
    v.clamp(i16::MIN.into(), i16::MAX.into()) as i16
}

/// Viewport pixels a sprite covered when it was last drawn. Only the
/// pixels actually overwritten are remembered.
#[derive(Debug, Default)]
pub struct SavedBackground {
    origin: Point,
    width: i32,
    height: i32,
    pixels: Vec<u8>,
    written: FixedBitSet,
}

impl SavedBackground {
    pub(crate) fn begin(&mut self, origin: Point, width: i32, height: i32) {
        let area = (width.max(0) * height.max(0)) as usize;
        self.origin = origin;
        self.width = width;
        self.height = height;
        if self.pixels.len() < area {
            self.pixels.resize(area, 0);
        }
        self.written.clear();
        self.written.grow(area);
    }

    #[inline(always)]
    pub(crate) fn record(&mut self, x: i32, y: i32, raw: u8) {
        let i = (y * self.width + x) as usize;
        self.pixels[i] = raw;
        self.written.insert(i);
    }

    fn reserve(&mut self, area: usize) {
        if self.pixels.len() < area {
            self.pixels.resize(area, 0);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Puts the remembered pixels back and forgets them
    pub(crate) fn restore(&mut self, frame: &mut FrameBuffer) {
        if !self.is_empty() {
            for i in self.written.ones() {
                let (x, y) = (i as i32 % self.width, i as i32 / self.width);
                frame.set_pixel(self.origin.x + x, self.origin.y + y, self.pixels[i]);
            }
        }
        self.forget();
    }

    fn forget(&mut self) {
        self.width = 0;
        self.height = 0;
        self.written.clear();
    }
}

/// A movable stack of bitmap frames, one shown at a time
#[derive(Debug)]
pub struct Sprite {
    position: Arc<SpritePosition>,
    frames: Vec<Bitmap>,
    current: usize,
    visible: bool,
    is_static: bool,
    allow_draw: bool,
    saved: SavedBackground,
}

impl Default for Sprite {
    fn default() -> Sprite {
        Sprite::new()
    }
}

impl Sprite {
    pub fn new() -> Sprite {
        Sprite {
            position: Arc::new(SpritePosition::default()),
            frames: Vec::new(),
            current: 0,
            visible: true,
            is_static: false,
            allow_draw: true,
            saved: SavedBackground::default(),
        }
    }

    /// Shared handle to the coordinates, for moving the sprite from another
    /// context while the controller owns it
    pub fn position(&self) -> Arc<SpritePosition> {
        Arc::clone(&self.position)
    }

    pub fn x(&self) -> i32 {
        self.position.get().x
    }

    pub fn y(&self) -> i32 {
        self.position.get().y
    }

    pub fn move_to(&self, x: i32, y: i32) {
        self.position.set(x, y);
    }

    pub fn move_by(&self, dx: i32, dy: i32) {
        let p = self.position.get();
        self.position.set(p.x + dx, p.y + dy);
    }

    /// Moves and, once the sprite has left the viewport entirely, brings it
    /// back in from the opposite edge.
    pub fn move_by_wrapping(&self, dx: i32, dy: i32, viewport: Size) {
        let p = self.position.get();
        let (mut x, mut y) = (p.x + dx, p.y + dy);
        let (w, h) = (self.width(), self.height());
        let (vw, vh) = (viewport.width as i32, viewport.height as i32);
        if x > vw {
            x = -w;
        } else if x < -w {
            x = vw;
        }
        if y > vh {
            y = -h;
        } else if y < -h {
            y = vh;
        }
        self.position.set(x, y);
    }

    pub fn add_bitmap(&mut self, bitmap: Bitmap) -> &mut Sprite {
        self.frames.push(bitmap);
        self
    }

    pub fn add_bitmaps(&mut self, bitmaps: impl IntoIterator<Item = Bitmap>) -> &mut Sprite {
        self.frames.extend(bitmaps);
        self
    }

    pub fn clear_bitmaps(&mut self) {
        self.frames.clear();
        self.current = 0;
    }

    pub fn frames_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self) -> Option<&Bitmap> {
        self.frames.get(self.current)
    }

    pub fn frame_index(&self) -> usize {
        self.current
    }

    pub fn set_frame(&mut self, index: usize) {
        if index < self.frames.len() {
            self.current = index;
        }
    }

    /// Advances to the next frame, wrapping to the first
    pub fn next_frame(&mut self) {
        self.current = (self.current + 1) % self.frames.len().max(1);
    }

    pub fn width(&self) -> i32 {
        self.frame().map_or(0, Bitmap::width)
    }

    pub fn height(&self) -> i32 {
        self.frame().map_or(0, Bitmap::height)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// A static sprite is drawn once and then left alone, background
    /// included, until [`Sprite::allow_draw`] is set again.
    pub fn set_static(&mut self, is_static: bool) {
        self.is_static = is_static;
    }

    pub fn allow_draw(&self) -> bool {
        self.allow_draw
    }

    pub fn set_allow_draw(&mut self, allow: bool) {
        self.allow_draw = allow;
    }

    pub fn saved_background(&self) -> &SavedBackground {
        &self.saved
    }

    fn largest_frame_area(&self) -> usize {
        self.frames
            .iter()
            .map(|f| (f.width() * f.height()) as usize)
            .max()
            .unwrap_or(0)
    }

    fn draw(&mut self, frame: &mut FrameBuffer, format: PixelFormat, save: bool) {
        let Some(bitmap) = self.frames.get(self.current) else {
            return;
        };
        let at = self.position.get();
        let clip = frame.bounds();
        let saved = save.then_some(&mut self.saved);
        paint::blit(frame, format, clip, at, bitmap, saved);
    }
}

/// Mouse pointer image and the pixel of it that points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub hotspot: Point,
    pub bitmap: Bitmap,
}

impl Cursor {
    pub fn new(bitmap: Bitmap, hotspot: Point) -> Cursor {
        Cursor { hotspot, bitmap }
    }
}

/// The application's sprites plus the mouse cursor, always on top
#[derive(Debug)]
pub struct SpriteLayer {
    sprites: Vec<Sprite>,
    cursor: Sprite,
    hotspot: Point,
    hidden: bool,
    double_buffered: bool,
}

impl Default for SpriteLayer {
    fn default() -> SpriteLayer {
        SpriteLayer::new()
    }
}

impl SpriteLayer {
    pub fn new() -> SpriteLayer {
        let mut cursor = Sprite::new();
        cursor.set_visible(false);
        SpriteLayer {
            sprites: vec![],
            cursor,
            hotspot: Point::zero(),
            hidden: true,
            double_buffered: false,
        }
    }

    /// Double buffered screens are redrawn whole every frame, so nothing is
    /// saved or restored
    pub fn set_double_buffered(&mut self, double_buffered: bool) {
        self.double_buffered = double_buffered;
        self.reserve_backgrounds();
    }

    /// Swaps in a new set of sprites, handing back the old one. Hide the
    /// layer first or the old sprites stay on screen.
    pub fn replace(&mut self, sprites: Vec<Sprite>) -> Vec<Sprite> {
        let old = core::mem::replace(&mut self.sprites, sprites);
        self.reserve_backgrounds();
        old
    }

    /// Sizes every background buffer for the largest frame of its sprite
    pub fn reserve_backgrounds(&mut self) {
        if self.double_buffered {
            return;
        }
        for sprite in self.sprites.iter_mut().chain(core::iter::once(&mut self.cursor)) {
            let area = sprite.largest_frame_area();
            sprite.saved.reserve(area);
        }
    }

    pub fn sprites(&self) -> &[Sprite] {
        &self.sprites
    }

    pub fn sprites_mut(&mut self) -> &mut [Sprite] {
        &mut self.sprites
    }

    pub fn cursor(&self) -> &Sprite {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Sprite {
        &mut self.cursor
    }

    pub fn hotspot(&self) -> Point {
        self.hotspot
    }

    pub fn set_hotspot(&mut self, hotspot: Point) {
        self.hotspot = hotspot;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Restores what the sprites covered, topmost (the cursor) first
    pub fn hide(&mut self, frame: &mut FrameBuffer) {
        if self.hidden {
            return;
        }
        self.hidden = true;
        if self.double_buffered {
            return;
        }
        self.cursor.saved.restore(frame);
        for sprite in self.sprites.iter_mut().rev() {
            if sprite.allow_draw {
                sprite.saved.restore(frame);
            }
        }
    }

    /// Saves what is underneath and draws, bottom sprite first
    pub fn show(&mut self, frame: &mut FrameBuffer, format: PixelFormat) {
        if !self.hidden {
            return;
        }
        self.hidden = false;
        let save = !self.double_buffered;
        for sprite in self.sprites.iter_mut() {
            if sprite.visible && sprite.allow_draw && sprite.frame().is_some() {
                sprite.draw(frame, format, save);
                if sprite.is_static {
                    sprite.allow_draw = false;
                }
            }
        }
        if self.cursor.visible {
            self.cursor.draw(frame, format, save);
        }
    }

    /// Drops every saved background without restoring it, for when the
    /// viewport memory underneath has been replaced
    pub fn invalidate(&mut self) {
        self.hidden = true;
        for sprite in self.sprites.iter_mut().chain(core::iter::once(&mut self.cursor)) {
            sprite.saved.forget();
        }
    }
}

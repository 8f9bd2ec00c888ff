//! Primitive execution: everything that actually writes viewport pixels.
//!
//! All coordinates reaching the frame buffer here are absolute viewport
//! coordinates, already offset by the origin and clipped against the
//! absolute clipping rectangle (or the viewport, where noted).

use alloc::vec::Vec;
use core::mem;

use embedded_graphics::prelude::{Point, RgbColor, Size};

use crate::{
    bitmap::{is_opaque, Bitmap},
    color::{ChannelDepth, PixelFormat, Rgb222, COLOR_MASK},
    dma::DescriptorChain,
    geometry::Rect,
    primitive::{DoubleWidth, Glyph, GlyphOptions, PaintOptions, Primitive},
    sprite::{SavedBackground, SpriteLayer},
    viewport::{swizzle, FrameBuffer},
};

/// Drawing state carried from one primitive to the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintState {
    pub pen: Rgb222,
    pub brush: Rgb222,
    /// Absolute, origin already applied
    pub position: Point,
    pub glyph_options: GlyphOptions,
    pub paint_options: PaintOptions,
    pub scrolling_region: Rect,
    pub origin: Point,
    pub clipping_rect: Rect,
    /// `clipping_rect` moved by the origin and clamped to the viewport
    pub abs_clipping_rect: Rect,
}

impl PaintState {
    pub fn new(viewport: Rect) -> PaintState {
        PaintState {
            pen: Rgb222::WHITE,
            brush: Rgb222::BLACK,
            position: Point::zero(),
            glyph_options: GlyphOptions::default(),
            paint_options: PaintOptions::empty(),
            scrolling_region: viewport,
            origin: Point::zero(),
            clipping_rect: viewport,
            abs_clipping_rect: viewport,
        }
    }
}

/// Borrows everything a primitive may touch for the duration of a batch
pub struct Painter<'a> {
    pub frame: &'a mut FrameBuffer,
    pub chain: &'a mut DescriptorChain,
    pub sprites: &'a mut SpriteLayer,
    pub state: &'a mut PaintState,
    pub format: PixelFormat,
    pub depth: ChannelDepth,
}

impl Painter<'_> {
    pub fn execute(&mut self, primitive: &Primitive) {
        log::trace!("execute {}", primitive.kind());
        let origin = self.state.origin;
        match primitive {
            Primitive::SetPenColor(color) => self.state.pen = *color,
            Primitive::SetBrushColor(color) => self.state.brush = *color,
            Primitive::SetPixel(p) => {
                self.hide_sprites();
                let raw = self.draw_pixel();
                self.plot(*p + origin, raw);
            }
            Primitive::SetPixelAt { position, color } => {
                self.hide_sprites();
                let raw = self.format.pixel(*color);
                self.plot(*position + origin, raw);
            }
            Primitive::MoveTo(p) => self.state.position = *p + origin,
            Primitive::LineTo(p) => {
                self.hide_sprites();
                let (from, to) = (self.state.position, *p + origin);
                let raw = self.draw_pixel();
                self.line(from, to, raw);
                self.state.position = to;
            }
            Primitive::FillRect(r) => {
                self.hide_sprites();
                let raw = self.fill_pixel();
                self.fill_rect(r.normalized().translate(origin), raw);
            }
            Primitive::DrawRect(r) => {
                self.hide_sprites();
                self.draw_rect(r.normalized().translate(origin));
            }
            Primitive::FillEllipse(size) => {
                self.hide_sprites();
                let raw = self.fill_pixel();
                self.fill_ellipse(self.state.position, *size, raw);
            }
            Primitive::DrawEllipse(size) => {
                self.hide_sprites();
                let raw = self.draw_pixel();
                self.draw_ellipse(self.state.position, *size, raw);
            }
            Primitive::Clear => {
                self.hide_sprites();
                let raw = self.fill_pixel();
                self.frame.fill(raw);
            }
            Primitive::VScroll(n) => {
                self.hide_sprites();
                self.vscroll(*n);
            }
            Primitive::HScroll(n) => {
                self.hide_sprites();
                self.hscroll(*n);
            }
            Primitive::DrawGlyph(glyph) => {
                self.hide_sprites();
                let (options, pen, brush) = (self.state.glyph_options, self.state.pen, self.state.brush);
                self.draw_glyph(glyph, options, pen, brush);
            }
            Primitive::RenderGlyphsBuffer {
                column,
                row,
                buffer,
            } => {
                self.hide_sprites();
                if let Some((glyph, item)) = buffer.glyph(*column, *row) {
                    let pen = item.foreground().rgb(self.depth);
                    let brush = item.background().rgb(self.depth);
                    self.draw_glyph(&glyph, item.options(), pen, brush);
                }
            }
            Primitive::SetGlyphOptions(options) => self.state.glyph_options = *options,
            Primitive::SetPaintOptions(options) => self.state.paint_options = *options,
            Primitive::InvertRect(r) => {
                self.hide_sprites();
                self.invert_rect(r.normalized().translate(origin));
            }
            Primitive::CopyRect(source) => {
                self.hide_sprites();
                self.copy_rect(source.normalized().translate(origin));
            }
            Primitive::SetScrollingRegion(r) => {
                let bounds = self.frame.bounds();
                self.state.scrolling_region = r.normalized().clamp_to(&bounds);
            }
            Primitive::SwapFgBg(r) => {
                self.hide_sprites();
                self.swap_fg_bg(r.normalized().translate(origin));
            }
            Primitive::DrawBitmap { position, bitmap } => {
                self.hide_sprites();
                let clip = self.clip();
                blit(self.frame, self.format, clip, *position + origin, bitmap, None);
            }
            Primitive::RefreshSprites => {
                self.hide_sprites();
                self.show_sprites();
            }
            Primitive::SwapBuffers => {
                self.frame.swap_buffers();
                self.chain.swap_banks();
                log::debug!("buffers swapped");
            }
            Primitive::DrawPath(points) => {
                self.hide_sprites();
                self.draw_path(points);
            }
            Primitive::FillPath(points) => {
                self.hide_sprites();
                self.fill_path(points);
            }
            Primitive::SetOrigin(p) => {
                self.state.origin = *p;
                self.update_clipping();
            }
            Primitive::SetClippingRect(r) => {
                self.state.clipping_rect = r.normalized();
                self.update_clipping();
            }
        }
    }

    pub fn show_sprites(&mut self) {
        self.sprites.show(self.frame, self.format);
    }

    pub fn hide_sprites(&mut self) {
        self.sprites.hide(self.frame);
    }

    fn swapped(&self) -> bool {
        self.state.paint_options.contains(PaintOptions::SWAP_FG_BG)
    }

    /// Raw pixel for outlines, lines and dots
    fn draw_pixel(&self) -> u8 {
        let color = if self.swapped() {
            self.state.brush
        } else {
            self.state.pen
        };
        self.format.pixel(color)
    }

    /// Raw pixel for filled areas and whatever scrolling uncovers
    fn fill_pixel(&self) -> u8 {
        let color = if self.swapped() {
            self.state.pen
        } else {
            self.state.brush
        };
        self.format.pixel(color)
    }

    #[inline(always)]
    fn clip(&self) -> Rect {
        self.state.abs_clipping_rect
    }

    fn update_clipping(&mut self) {
        let bounds = self.frame.bounds();
        self.state.abs_clipping_rect = self
            .state
            .clipping_rect
            .translate(self.state.origin)
            .clamp_to(&bounds);
    }

    #[inline(always)]
    fn plot(&mut self, p: Point, raw: u8) {
        if self.clip().contains(p.x, p.y) {
            self.frame.set_pixel_unchecked(p.x, p.y, raw);
        }
    }

    #[inline(always)]
    fn invert_pixel(&mut self, x: i32, y: i32) {
        let px = self.frame.pixel(x, y);
        self.frame.set_pixel_unchecked(x, y, self.format.invert(px));
    }

    fn fill_row_clipped(&mut self, y: i32, x1: i32, x2: i32, raw: u8) {
        let clip = self.clip();
        if y < clip.y1 || y > clip.y2 || x1 > clip.x2 || x2 < clip.x1 {
            return;
        }
        self.frame.fill_row(y, x1.max(clip.x1), x2.min(clip.x2), raw);
    }

    /// Straight lines take a row fill or a column walk, anything else is
    /// Bresenham with a per pixel clip test. With [`PaintOptions::NOT`]
    /// every pixel on the line is inverted instead.
    fn line(&mut self, from: Point, to: Point, raw: u8) {
        let clip = self.clip();
        let invert = self.state.paint_options.contains(PaintOptions::NOT);
        if from.y == to.y {
            let y = from.y;
            let (x1, x2) = (from.x.min(to.x), from.x.max(to.x));
            if y < clip.y1 || y > clip.y2 || x1 > clip.x2 || x2 < clip.x1 {
                return;
            }
            let (x1, x2) = (x1.max(clip.x1), x2.min(clip.x2));
            if invert {
                for x in x1..=x2 {
                    self.invert_pixel(x, y);
                }
            } else {
                self.frame.fill_row(y, x1, x2, raw);
            }
        } else if from.x == to.x {
            let x = from.x;
            let (y1, y2) = (from.y.min(to.y), from.y.max(to.y));
            if x < clip.x1 || x > clip.x2 || y1 > clip.y2 || y2 < clip.y1 {
                return;
            }
            for y in y1.max(clip.y1)..=y2.min(clip.y2) {
                if invert {
                    self.invert_pixel(x, y);
                } else {
                    self.frame.set_pixel_unchecked(x, y, raw);
                }
            }
        } else {
            if !Rect::new(from.x, from.y, to.x, to.y)
                .normalized()
                .intersects(&clip)
            {
                return;
            }
            let far = |p: Point| p.x.unsigned_abs() > FAR || p.y.unsigned_abs() > FAR;
            let (from, to) = if far(from) || far(to) {
                match clip_segment(from, to, &clip) {
                    Some(segment) => segment,
                    None => return,
                }
            } else {
                (from, to)
            };
            let dx = (i64::from(to.x) - i64::from(from.x)).abs();
            let dy = (i64::from(to.y) - i64::from(from.y)).abs();
            let sx = if from.x < to.x { 1 } else { -1 };
            let sy = if from.y < to.y { 1 } else { -1 };
            let mut err = (if dx > dy { dx } else { -dy }) / 2;
            let (mut x, mut y) = (from.x, from.y);
            loop {
                if clip.contains(x, y) {
                    if invert {
                        self.invert_pixel(x, y);
                    } else {
                        self.frame.set_pixel_unchecked(x, y, raw);
                    }
                }
                if x == to.x && y == to.y {
                    break;
                }
                let e2 = err;
                if e2 > -dx {
                    err -= dy;
                    x += sx;
                }
                if e2 < dy {
                    err += dx;
                    y += sy;
                }
            }
        }
    }

    fn draw_rect(&mut self, r: Rect) {
        let raw = self.draw_pixel();
        self.line(Point::new(r.x1 + 1, r.y1), Point::new(r.x2, r.y1), raw);
        self.line(Point::new(r.x2, r.y1 + 1), Point::new(r.x2, r.y2), raw);
        self.line(Point::new(r.x2 - 1, r.y2), Point::new(r.x1, r.y2), raw);
        self.line(Point::new(r.x1, r.y2 - 1), Point::new(r.x1, r.y1), raw);
    }

    fn fill_rect(&mut self, r: Rect, raw: u8) {
        let clip = self.clip();
        if !r.intersects(&clip) {
            return;
        }
        let r = r.clamp_to(&clip);
        for y in r.y1..=r.y2 {
            self.frame.fill_row(y, r.x1, r.x2, raw);
        }
    }

    fn fill_ellipse(&mut self, center: Point, size: Size, raw: u8) {
        let half_width = size.width as i32 / 2;
        let half_height = size.height as i32 / 2;
        let hh = i64::from(half_height).pow(2);
        let ww = i64::from(half_width).pow(2);
        let hhww = hh * ww;

        self.fill_row_clipped(center.y, center.x - half_width, center.x + half_width, raw);

        let (mut x0, mut dx) = (i64::from(half_width), 0i64);
        for y in 1..=half_height {
            let yyww = i64::from(y).pow(2) * ww;
            let mut x1 = x0 - (dx - 1);
            while x1 > 0 && x1 * x1 * hh + yyww > hhww {
                x1 -= 1;
            }
            dx = x0 - x1;
            x0 = x1;
            let x = x0 as i32;
            self.fill_row_clipped(center.y - y, center.x - x, center.x + x, raw);
            self.fill_row_clipped(center.y + y, center.x - x, center.x + x, raw);
        }
    }

    fn draw_ellipse(&mut self, center: Point, size: Size, raw: u8) {
        let half_width = size.width as i32 / 2;
        let half_height = size.height as i32 / 2;
        let (mut x0, mut x1) = (center.x - half_width, center.x + half_width);
        let mut y0 = center.y - half_height;

        let a = i64::from(x1 - x0);
        let b = i64::from(2 * half_height);
        let odd = b & 1;
        let mut dx = 4 * (1 - a) * b * b;
        let mut dy = 4 * (odd + 1) * a * a;
        let mut err = dx + dy + odd * a * a;
        let (a8, b8) = (8 * a * a, 8 * b * b);

        y0 += ((b + 1) / 2) as i32;
        let mut y1 = y0 - odd as i32;
        loop {
            self.plot(Point::new(x1, y0), raw);
            self.plot(Point::new(x0, y0), raw);
            self.plot(Point::new(x0, y1), raw);
            self.plot(Point::new(x1, y1), raw);
            let e2 = 2 * err;
            if e2 >= dx {
                x0 += 1;
                x1 -= 1;
                dx += b8;
                err += dx;
            }
            if e2 <= dy {
                y0 += 1;
                y1 -= 1;
                dy += a8;
                err += dy;
            }
            if x0 > x1 {
                break;
            }
        }
        // flat ellipses end before the tips are reached
        while i64::from(y0 - y1) < b {
            self.plot(Point::new(x0 - 1, y0), raw);
            self.plot(Point::new(x1 + 1, y0), raw);
            y0 += 1;
            self.plot(Point::new(x0 - 1, y1), raw);
            self.plot(Point::new(x1 + 1, y1), raw);
            y1 -= 1;
        }
    }

    /// Scrolls the scrolling region by swapping row table entries; the
    /// columns outside the region are swapped back so they stay put.
    /// Negative `scroll` moves content up.
    fn vscroll(&mut self, scroll: i32) {
        let Rect { x1, y1, x2, y2 } = self.state.scrolling_region;
        let height = y2 - y1 + 1;
        let scroll = scroll.clamp(-height, height);
        if scroll == 0 || height <= 0 {
            return;
        }
        let raw = self.fill_pixel();
        let last_column = self.frame.width() - 1;

        let exchange = |frame: &mut FrameBuffer, a: i32, b: i32| {
            if x1 > 0 {
                frame.swap_row_pixels(a, b, 0, x1 - 1);
            }
            if x2 < last_column {
                frame.swap_row_pixels(a, b, x2 + 1, last_column);
            }
            frame.swap_rows(a, b);
        };

        if scroll < 0 {
            for i in 0..height + scroll {
                exchange(self.frame, y1 + i, y1 + i - scroll);
            }
            for y in y1 + height + scroll..=y2 {
                self.frame.fill_row(y, x1, x2, raw);
            }
        } else {
            for i in (0..height - scroll).rev() {
                exchange(self.frame, y1 + i, y1 + i + scroll);
            }
            for y in y1..y1 + scroll {
                self.frame.fill_row(y, x1, x2, raw);
            }
        }
        self.chain.repoint_rows(self.frame, y1, y2);
    }

    /// Negative `scroll` moves content left. Regions starting and ending on
    /// word boundaries are shifted a word at a time.
    fn hscroll(&mut self, scroll: i32) {
        let Rect { x1, y1, x2, y2 } = self.state.scrolling_region;
        let width = x2 - x1 + 1;
        let scroll = scroll.clamp(-width, width);
        if scroll == 0 || width <= 0 {
            return;
        }
        let raw = self.fill_pixel();
        let aligned = x1 & 3 == 0 && width & 3 == 0;
        for y in y1..=y2 {
            let row = self.frame.row_mut(y);
            if aligned {
                shift_row_words(&mut row[x1 as usize..(x1 + width) as usize], scroll, raw);
            } else {
                shift_row_pixels(row, x1, x2, scroll, raw);
            }
        }
    }

    fn draw_glyph(&mut self, glyph: &Glyph, options: GlyphOptions, mut pen: Rgb222, mut brush: Rgb222) {
        if glyph.width <= 0
            || glyph.height <= 0
            || glyph.data.len() < glyph.height as usize * glyph.row_bytes()
        {
            return;
        }
        if options.invert() ^ self.swapped() {
            mem::swap(&mut pen, &mut brush);
        }
        if options.reduce_luminosity() {
            pen = pen.faint();
        }
        let (pen, brush) = (self.format.pixel(pen), self.format.pixel(brush));
        let at = glyph.position + self.state.origin;

        let plain = !(options.bold() || options.italic() || options.blank() || options.underline())
            && options.double_width() == DoubleWidth::Off;
        if plain && glyph.width <= 32 {
            self.glyph_light(glyph, at, options.fill_background(), pen, brush);
        } else {
            self.glyph_full(glyph, at, options, pen, brush);
        }
    }

    /// Glyphs up to 32 pixels wide without effects: each row is one word
    fn glyph_light(&mut self, glyph: &Glyph, at: Point, fill_background: bool, pen: u8, brush: u8) {
        let Some(c) = GlyphClip::new(self.clip(), at, glyph.width, glyph.height, 1, 0) else {
            return;
        };
        let row_bytes = glyph.row_bytes();
        for (dest_y, y) in (c.dest_y..).zip(c.y1..c.y1 + c.y_count) {
            let src = &glyph.data[y as usize * row_bytes..][..row_bytes];
            let mut bits = src
                .iter()
                .take(4)
                .enumerate()
                .fold(0u32, |acc, (i, &b)| acc | u32::from(b) << (24 - 8 * i));
            bits <<= c.x1;
            let row = self.frame.row_mut(dest_y);
            for x in c.dest_x..c.dest_x + c.x_count {
                if bits & 0x8000_0000 != 0 {
                    row[swizzle(x as usize)] = pen;
                } else if fill_background {
                    row[swizzle(x as usize)] = brush;
                }
                bits <<= 1;
            }
        }
    }

    fn glyph_full(&mut self, glyph: &Glyph, at: Point, options: GlyphOptions, pen: u8, brush: u8) {
        let (width, height) = (glyph.width, glyph.height);
        let row_bytes = glyph.row_bytes();
        let double = options.double_width();

        // double height shows one half of the glyph with every row twice
        let stretched: Vec<u8>;
        let data: &[u8] = match double {
            DoubleWidth::TopHalf | DoubleWidth::BottomHalf => {
                let offset = if double == DoubleWidth::TopHalf {
                    0
                } else {
                    height as usize / 2
                };
                stretched = (0..height as usize)
                    .flat_map(move |y| {
                        let start = (offset + y / 2) * row_bytes;
                        glyph.data[start..start + row_bytes].iter().copied()
                    })
                    .collect();
                &stretched
            }
            _ => &glyph.data,
        };
        let wide = double != DoubleWidth::Off;

        let italic = options.italic();
        let mut skew = if italic { 2 } else { 0 };
        let (skew_h1, skew_h2) = (height / 3, height / 3 * 2);

        let clip = self.clip();
        let Some(c) = GlyphClip::new(clip, at, width, height, if wide { 2 } else { 1 }, skew) else {
            return;
        };
        let (bold, blank, fill_background) = (options.bold(), options.blank(), options.fill_background());
        let underline_row = options.underline().then_some(height - 1);

        for (dest_y, y) in (c.dest_y..).zip(c.y1..c.y1 + c.y_count) {
            let src = &data[y as usize * row_bytes..][..row_bytes];
            let row = self.frame.row_mut(dest_y);
            let mut dest_x = c.dest_x + skew;

            if underline_row == Some(y) {
                let raw = if blank { brush } else { pen };
                for _ in 0..c.x_count {
                    if dest_x > clip.x2 {
                        break;
                    }
                    row[swizzle(dest_x as usize)] = raw;
                    if wide {
                        dest_x += 1;
                        if dest_x > clip.x2 {
                            break;
                        }
                        row[swizzle(dest_x as usize)] = raw;
                    }
                    dest_x += 1;
                }
            } else {
                // whether the previous source pixel was set, for bold
                let mut prev = false;
                for x in c.x1..c.x1 + c.x_count {
                    if dest_x > clip.x2 {
                        break;
                    }
                    let set = !blank && (src[(x >> 3) as usize] << (x & 7)) & 0x80 != 0;
                    let on = set || (bold && prev);
                    prev = set;
                    for _ in 0..if wide { 2 } else { 1 } {
                        if dest_x > clip.x2 {
                            break;
                        }
                        let i = swizzle(dest_x as usize);
                        if on {
                            row[i] = pen;
                        } else if fill_background {
                            row[i] = brush;
                        }
                        dest_x += 1;
                    }
                }
            }

            if italic && (y == skew_h1 || y == skew_h2) {
                skew -= 1;
            }
        }
    }

    fn invert_rect(&mut self, r: Rect) {
        let clip = self.clip();
        if !r.intersects(&clip) {
            return;
        }
        let r = r.clamp_to(&clip);
        for y in r.y1..=r.y2 {
            for x in r.x1..=r.x2 {
                self.invert_pixel(x, y);
            }
        }
    }

    /// Exchanges pen and brush colored pixels, clamped to the viewport
    fn swap_fg_bg(&mut self, r: Rect) {
        let bounds = self.frame.bounds();
        if !r.intersects(&bounds) {
            return;
        }
        let r = r.clamp_to(&bounds);
        let pen = self.format.pixel(self.state.pen);
        let brush = self.format.pixel(self.state.brush);
        for y in r.y1..=r.y2 {
            let row = self.frame.row_mut(y);
            for x in r.x1..=r.x2 {
                let px = &mut row[swizzle(x as usize)];
                if *px == pen {
                    *px = brush;
                } else if *px == brush {
                    *px = pen;
                }
            }
        }
    }

    /// Copies `source` to the current position, walking away from the
    /// overlap so no pixel is read after it has been overwritten.
    fn copy_rect(&mut self, source: Rect) {
        let clip = self.clip();
        let bounds = self.frame.bounds();
        let (width, height) = (source.width(), source.height());
        let dest = self.state.position;
        let (delta_x, delta_y) = (dest.x - source.x1, dest.y - source.y1);
        let (inc_x, start_x) = if delta_x < 0 {
            (1, dest.x)
        } else {
            (-1, dest.x + width - 1)
        };
        let (inc_y, start_y) = if delta_y < 0 {
            (1, dest.y)
        } else {
            (-1, dest.y + height - 1)
        };

        for j in 0..height {
            let y = start_y + j * inc_y;
            let src_y = y - delta_y;
            if y < clip.y1 || y > clip.y2 || src_y < bounds.y1 || src_y > bounds.y2 {
                continue;
            }
            for i in 0..width {
                let x = start_x + i * inc_x;
                let src_x = x - delta_x;
                if x >= clip.x1 && x <= clip.x2 && src_x >= bounds.x1 && src_x <= bounds.x2 {
                    let px = self.frame.pixel(src_x, src_y);
                    self.frame.set_pixel_unchecked(x, y, px);
                }
            }
        }
    }

    /// Closed outline through every point
    fn draw_path(&mut self, points: &[Point]) {
        let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
            return;
        };
        let origin = self.state.origin;
        let raw = self.draw_pixel();
        for pair in points.windows(2) {
            self.line(pair[0] + origin, pair[1] + origin, raw);
        }
        self.line(last + origin, first + origin, raw);
    }

    /// Even-odd scanline fill. Each row crossing an edge yields a node;
    /// sorted nodes pair up into spans `[a, b)`.
    fn fill_path(&mut self, points: &[Point]) {
        let origin = self.state.origin;
        let points: Vec<Point> = points.iter().map(|&p| p + origin).collect();
        let (Some(top), Some(bottom)) = (
            points.iter().map(|p| p.y).min(),
            points.iter().map(|p| p.y).max(),
        ) else {
            return;
        };
        let clip = self.clip();
        let raw = self.fill_pixel();
        let (min_x, max_x) = (clip.x1, clip.x2 + 1);

        let mut nodes = Vec::with_capacity(points.len());
        for y in top.max(clip.y1)..=bottom.min(clip.y2) {
            nodes.clear();
            let mut j = points.len() - 1;
            for i in 0..points.len() {
                let (pi, pj) = (points[i], points[j]);
                if (pi.y < y && pj.y >= y) || (pj.y < y && pi.y >= y) {
                    let a = (i128::from(y) - i128::from(pi.y))
                        * (i128::from(pj.x) - i128::from(pi.x));
                    let b = i128::from(pj.y) - i128::from(pi.y);
                    // rounds the intersection up
                    let x = i128::from(pi.x) + a / b + i128::from(((a < 0) ^ (b > 0)) && a % b != 0);
                    nodes.push(x.clamp(i128::from(min_x), i128::from(max_x)) as i32);
                }
                j = i;
            }
            nodes.sort_unstable();
            for span in nodes.chunks_exact(2) {
                if span[0] >= max_x {
                    break;
                }
                if span[1] > min_x {
                    self.frame
                        .fill_row(y, span[0].max(min_x), span[1].min(max_x) - 1, raw);
                }
            }
        }
    }
}

/// Lines reaching further than this from the origin are clipped before
/// they are walked
const FAR: u32 = 1 << 15;

/// Cuts the segment down to the part inside `clip`, rounding the new ends
/// to the nearest pixel
fn clip_segment(from: Point, to: Point, clip: &Rect) -> Option<(Point, Point)> {
    type P = (i128, i128);
    // `d` is positive at every call
    let div_round = |n: i128, d: i128| (2 * n + d).div_euclid(2 * d);
    let at_x = |p: P, q: P, x: i128| (x, p.1 + div_round((q.1 - p.1) * (x - p.0), q.0 - p.0));
    let at_y = |p: P, q: P, y: i128| (p.0 + div_round((q.0 - p.0) * (y - p.1), q.1 - p.1), y);

    let mut a = (i128::from(from.x), i128::from(from.y));
    let mut b = (i128::from(to.x), i128::from(to.y));

    let (x1, x2) = (i128::from(clip.x1), i128::from(clip.x2));
    if a.0 > b.0 {
        mem::swap(&mut a, &mut b);
    }
    if b.0 < x1 || a.0 > x2 {
        return None;
    }
    let (oa, ob) = (a, b);
    if oa.0 < x1 {
        a = at_x(oa, ob, x1);
    }
    if ob.0 > x2 {
        b = at_x(oa, ob, x2);
    }

    let (y1, y2) = (i128::from(clip.y1), i128::from(clip.y2));
    if a.1 > b.1 {
        mem::swap(&mut a, &mut b);
    }
    if b.1 < y1 || a.1 > y2 {
        return None;
    }
    let (oa, ob) = (a, b);
    if oa.1 < y1 {
        a = at_y(oa, ob, y1);
    }
    if ob.1 > y2 {
        b = at_y(oa, ob, y2);
    }

    Some((
        Point::new(a.0 as i32, a.1 as i32),
        Point::new(b.0 as i32, b.1 as i32),
    ))
}

/// Part of a glyph left after clipping and where it lands
struct GlyphClip {
    x1: i32,
    x_count: i32,
    dest_x: i32,
    y1: i32,
    y_count: i32,
    dest_y: i32,
}

impl GlyphClip {
    fn new(clip: Rect, at: Point, width: i32, height: i32, x_scale: i32, skew: i32) -> Option<GlyphClip> {
        if at.x > clip.x2 || at.y > clip.y2 {
            return None;
        }

        let (mut x1, mut x_count, mut dest_x) = (0, width, at.x);
        if dest_x < clip.x1 {
            x1 = (clip.x1 - dest_x) / x_scale;
            dest_x = clip.x1;
        }
        if x1 >= width {
            return None;
        }
        if dest_x + x_count + skew > clip.x2 + 1 {
            x_count = clip.x2 + 1 - dest_x - skew;
        }
        if x1 + x_count > width {
            x_count = width - x1;
        }

        let (mut y1, mut y_count, mut dest_y) = (0, height, at.y);
        if dest_y < clip.y1 {
            y1 = clip.y1 - dest_y;
            dest_y = clip.y1;
        }
        if y1 >= height {
            return None;
        }
        if dest_y + y_count > clip.y2 + 1 {
            y_count = clip.y2 + 1 - dest_y;
        }
        if y1 + y_count > height {
            y_count = height - y1;
        }

        Some(GlyphClip {
            x1,
            x_count,
            dest_x,
            y1,
            y_count,
            dest_y,
        })
    }
}

/// Draws the opaque pixels of `bitmap` at `at`, clipped to `clip`. With
/// `save`, every pixel about to be overwritten is remembered first.
pub fn blit(
    frame: &mut FrameBuffer,
    format: PixelFormat,
    clip: Rect,
    at: Point,
    bitmap: &Bitmap,
    mut save: Option<&mut SavedBackground>,
) {
    let (width, height) = (bitmap.width(), bitmap.height());
    if let Some(saved) = save.as_deref_mut() {
        saved.begin(at, width, height);
    }
    let area = Rect::new(at.x, at.y, at.x + width - 1, at.y + height - 1);
    if !area.intersects(&clip) {
        return;
    }
    let visible = area.clamp_to(&clip);
    let sync = format.idle_sync();
    for y in visible.y1..=visible.y2 {
        let by = y - at.y;
        for x in visible.x1..=visible.x2 {
            let src = bitmap.pixel(x - at.x, by);
            if is_opaque(src) {
                if let Some(saved) = save.as_deref_mut() {
                    saved.record(x - at.x, by, frame.pixel(x, y));
                }
                frame.set_pixel_unchecked(x, y, sync | (src & COLOR_MASK));
            }
        }
    }
}

#[inline(always)]
fn load_word(span: &[u8], i: usize) -> u32 {
    let b = &span[i * 4..i * 4 + 4];
    // logical pixel 0 ends up in the low byte
    u32::from_le_bytes([b[0], b[1], b[2], b[3]]).rotate_left(16)
}

#[inline(always)]
fn store_word(span: &mut [u8], i: usize, word: u32) {
    span[i * 4..i * 4 + 4].copy_from_slice(&word.rotate_right(16).to_le_bytes());
}

/// Shifts a word aligned run of pixels by `scroll` (negative is left),
/// filling what is uncovered with `raw`. Whole word shifts are plain
/// moves, the remaining 1 to 3 pixels a funnel shift across word pairs.
pub(crate) fn shift_row_words(span: &mut [u8], scroll: i32, raw: u8) {
    let words = span.len() / 4;
    let distance = scroll.unsigned_abs() as usize;
    let (skip, bits) = (distance / 4, (distance % 4) as u32 * 8);
    let fill = u32::from_ne_bytes([raw; 4]);
    let word = |span: &[u8], i: Option<usize>| match i {
        Some(i) if i < words => load_word(span, i),
        _ => fill,
    };

    if scroll < 0 {
        if bits == 0 {
            let keep = words.saturating_sub(skip) * 4;
            span.copy_within(skip.min(words) * 4..words * 4, 0);
            span[keep..words * 4].fill(raw);
            return;
        }
        for i in 0..words {
            let lo = word(span, Some(i + skip));
            let hi = word(span, Some(i + skip + 1));
            store_word(span, i, lo >> bits | hi << (32 - bits));
        }
    } else {
        if bits == 0 {
            let keep = words.saturating_sub(skip) * 4;
            span.copy_within(0..keep, words * 4 - keep);
            span[..words * 4 - keep].fill(raw);
            return;
        }
        for i in (0..words).rev() {
            let hi = word(span, i.checked_sub(skip));
            let lo = word(span, i.checked_sub(skip + 1));
            store_word(span, i, hi << bits | lo >> (32 - bits));
        }
    }
}

/// Pixel by pixel shift of columns `x1..=x2`, any alignment
pub(crate) fn shift_row_pixels(row: &mut [u8], x1: i32, x2: i32, scroll: i32, raw: u8) {
    let at = |x: i32| swizzle(x as usize);
    if scroll < 0 {
        for x in x1..=x2 + scroll {
            row[at(x)] = row[at(x - scroll)];
        }
        for x in (x2 + 1 + scroll).max(x1)..=x2 {
            row[at(x)] = raw;
        }
    } else {
        for x in (x1..=x2 - scroll).rev() {
            row[at(x + scroll)] = row[at(x)];
        }
        for x in x1..(x1 + scroll).min(x2 + 1) {
            row[at(x)] = raw;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        primitive::{Glyph, GlyphOptions},
        viewport::{FrameMemory, HeapAllocator},
    };
    use alloc::{sync::Arc, vec};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    struct Fixture {
        frame: FrameBuffer,
        chain: DescriptorChain,
        sprites: SpriteLayer,
        state: PaintState,
        format: PixelFormat,
    }

    impl Fixture {
        fn new(width: usize, height: usize) -> Fixture {
            let frame: FrameBuffer = FrameMemory::allocate(&mut HeapAllocator, width, height, false, 1)
                .unwrap()
                .into();
            let state = PaintState::new(frame.bounds());
            Fixture {
                frame,
                chain: DescriptorChain::new(false),
                sprites: SpriteLayer::new(),
                state,
                format: PixelFormat::default(),
            }
        }

        fn painter(&mut self) -> Painter<'_> {
            Painter {
                frame: &mut self.frame,
                chain: &mut self.chain,
                sprites: &mut self.sprites,
                state: &mut self.state,
                format: self.format,
                depth: ChannelDepth::Two,
            }
        }

        fn run(&mut self, primitives: &[Primitive]) {
            let mut painter = self.painter();
            for p in primitives {
                painter.execute(p);
            }
        }

        /// Pattern background so copies and scrolls are observable
        fn checker(&mut self) {
            for y in 0..self.frame.height() {
                for x in 0..self.frame.width() {
                    let c = Rgb222::from_byte((x * 7 + y * 13) as u8);
                    self.frame.set_pixel_unchecked(x, y, self.format.pixel(c));
                }
            }
        }

        fn pixels(&self) -> Vec<Vec<u8>> {
            (0..self.frame.height())
                .map(|y| (0..self.frame.width()).map(|x| self.frame.pixel(x, y)).collect())
                .collect()
        }

        fn painted(&self, raw: u8) -> Vec<(i32, i32)> {
            let mut found = vec![];
            for y in 0..self.frame.height() {
                for x in 0..self.frame.width() {
                    if self.frame.pixel(x, y) == raw {
                        found.push((x, y));
                    }
                }
            }
            found
        }
    }

    fn white(f: &Fixture) -> u8 {
        f.format.pixel(Rgb222::WHITE)
    }

    #[test]
    fn diagonal_lines_follow_bresenham() {
        let mut f = Fixture::new(16, 16);
        f.run(&[Primitive::MoveTo(Point::new(0, 0)), Primitive::LineTo(Point::new(4, 2))]);
        assert_eq!(f.painted(white(&f)), [(0, 0), (1, 0), (2, 1), (3, 1), (4, 2)]);
        assert_eq!(f.state.position, Point::new(4, 2));
    }

    #[test]
    fn lines_are_clipped() {
        let mut f = Fixture::new(16, 8);
        f.run(&[
            Primitive::SetClippingRect(Rect::new(2, 0, 5, 7)),
            Primitive::MoveTo(Point::new(-10, 3)),
            Primitive::LineTo(Point::new(30, 3)),
            Primitive::MoveTo(Point::new(4, -5)),
            Primitive::LineTo(Point::new(4, 1)),
        ]);
        assert_eq!(
            f.painted(white(&f)),
            [(4, 0), (4, 1), (2, 3), (3, 3), (4, 3), (5, 3)]
        );
    }

    #[test]
    fn not_lines_invert_twice_to_nothing() {
        let mut f = Fixture::new(16, 8);
        f.checker();
        let before = f.pixels();
        let not = Primitive::SetPaintOptions(PaintOptions::NOT);
        let line = [
            Primitive::MoveTo(Point::new(1, 1)),
            Primitive::LineTo(Point::new(12, 6)),
        ];
        f.run(&[not]);
        f.run(&line);
        assert_ne!(f.pixels(), before);
        f.run(&line);
        assert_eq!(f.pixels(), before);
    }

    #[test]
    fn rect_outline_leaves_inside_alone() {
        let mut f = Fixture::new(8, 8);
        f.run(&[Primitive::DrawRect(Rect::new(4, 3, 1, 1))]);
        let painted = f.painted(white(&f));
        assert_eq!(painted.len(), 10);
        assert!(!painted.contains(&(2, 2)) && !painted.contains(&(3, 2)));
        assert!(painted.contains(&(1, 1)) && painted.contains(&(4, 3)));
    }

    #[test]
    fn fills_use_the_brush_unless_swapped() {
        let mut f = Fixture::new(8, 8);
        let red = f.format.pixel(Rgb222::RED);
        f.run(&[
            Primitive::SetBrushColor(Rgb222::RED),
            Primitive::FillRect(Rect::new(-3, -3, 1, 2)),
        ]);
        assert_eq!(f.painted(red).len(), 6);

        f.run(&[
            Primitive::SetPaintOptions(PaintOptions::SWAP_FG_BG),
            Primitive::FillRect(Rect::new(6, 6, 7, 7)),
        ]);
        assert_eq!(f.frame.pixel(7, 7), white(&f));
    }

    #[test]
    fn origin_moves_the_clipping_rect() {
        let mut f = Fixture::new(32, 32);
        f.run(&[
            Primitive::SetOrigin(Point::new(10, 10)),
            Primitive::SetClippingRect(Rect::new(0, 0, 3, 3)),
            Primitive::SetBrushColor(Rgb222::GREEN),
            Primitive::FillRect(Rect::new(-5, -5, 20, 20)),
        ]);
        assert_eq!(f.state.abs_clipping_rect, Rect::new(10, 10, 13, 13));
        let green = f.painted(f.format.pixel(Rgb222::GREEN));
        assert_eq!(green.len(), 16);
        assert_eq!(green[0], (10, 10));
    }

    #[test]
    fn filled_ellipse_is_symmetric() {
        let mut f = Fixture::new(16, 16);
        f.run(&[
            Primitive::SetBrushColor(Rgb222::WHITE),
            Primitive::MoveTo(Point::new(5, 5)),
            Primitive::FillEllipse(Size::new(5, 3)),
        ]);
        assert_eq!(
            f.painted(white(&f)),
            [(5, 4), (3, 5), (4, 5), (5, 5), (6, 5), (7, 5), (5, 6)]
        );
    }

    #[test]
    fn ellipse_outline_is_symmetric() {
        let mut f = Fixture::new(32, 32);
        f.run(&[
            Primitive::MoveTo(Point::new(15, 15)),
            Primitive::DrawEllipse(Size::new(20, 12)),
        ]);
        let painted = f.painted(white(&f));
        assert!(painted.contains(&(5, 15)) && painted.contains(&(25, 15)));
        assert!(painted.contains(&(15, 9)) && painted.contains(&(15, 21)));
        for &(x, y) in &painted {
            assert!(painted.contains(&(30 - x, y)), "({x}, {y})");
            assert!(painted.contains(&(x, 30 - y)), "({x}, {y})");
        }
    }

    #[test]
    fn vscroll_swaps_rows_and_keeps_outer_columns() {
        let mut f = Fixture::new(8, 8);
        f.checker();
        let before = f.pixels();
        let table = f.frame.drawing().clone();
        f.run(&[
            Primitive::SetScrollingRegion(Rect::new(2, 0, 5, 7)),
            Primitive::VScroll(-3),
        ]);
        let black = f.format.pixel(Rgb222::BLACK);
        let after = f.pixels();
        for y in 0..8 {
            for x in 0..8 {
                let expected = if !(2..=5).contains(&x) {
                    before[y][x]
                } else if y < 5 {
                    before[y + 3][x]
                } else {
                    black
                };
                assert_eq!(after[y][x], expected, "({x}, {y})");
            }
        }

        f.run(&[Primitive::VScroll(3)]);
        assert_eq!(f.frame.drawing(), &table);
        let after = f.pixels();
        assert_eq!(after[3..], before[3..]);
        assert!(after[0][2..=5].iter().all(|&p| p == black));
    }

    #[test]
    fn scrolling_is_clamped_to_the_region() {
        let mut f = Fixture::new(8, 4);
        f.checker();
        f.run(&[Primitive::VScroll(100), Primitive::HScroll(-100)]);
        assert_eq!(f.painted(f.format.pixel(Rgb222::BLACK)).len(), 32);
    }

    #[test]
    fn hscroll_moves_only_the_region() {
        let mut f = Fixture::new(16, 2);
        f.checker();
        let before = f.pixels();
        f.run(&[
            Primitive::SetScrollingRegion(Rect::new(3, 0, 9, 1)),
            Primitive::HScroll(2),
        ]);
        let after = f.pixels();
        let black = f.format.pixel(Rgb222::BLACK);
        for x in 0..16 {
            let expected = match x {
                3 | 4 => black,
                5..=9 => before[0][x - 2],
                _ => before[0][x],
            };
            assert_eq!(after[0][x], expected, "{x}");
        }
    }

    proptest! {
        #[test]
        fn word_shift_agrees_with_pixel_shift(
            row in proptest::collection::vec(any::<u8>(), 4..=64),
            scroll in -70i32..=70,
            raw in any::<u8>(),
        ) {
            let len = row.len() & !3;
            let mut words = row[..len].to_vec();
            let mut pixels = words.clone();
            let scroll = scroll.clamp(-(len as i32), len as i32);
            shift_row_words(&mut words, scroll, raw);
            shift_row_pixels(&mut pixels, 0, len as i32 - 1, scroll, raw);
            prop_assert_eq!(words, pixels);
        }
    }

    #[test]
    fn hscroll_round_trip_keeps_the_middle() {
        for scroll in [0, 1, 2, 3, 4, 5, 8, 100] {
            for (x1, x2) in [(0, 31), (4, 27), (1, 30)] {
                let mut f = Fixture::new(32, 1);
                f.checker();
                let before = f.pixels();
                f.run(&[
                    Primitive::SetScrollingRegion(Rect::new(x1, 0, x2, 0)),
                    Primitive::HScroll(scroll),
                    Primitive::HScroll(-scroll),
                ]);
                let after = f.pixels();
                for x in x1..=x2 - scroll.min(x2 - x1 + 1) {
                    assert_eq!(after[0][x as usize], before[0][x as usize], "{scroll} {x1}..{x2}");
                }
            }
        }
    }

    #[test]
    fn overlapping_copy_matches_a_buffered_copy() {
        for (source, dest) in [
            (Rect::new(0, 0, 7, 7), Point::new(3, 2)),
            (Rect::new(3, 2, 10, 9), Point::new(0, 0)),
            (Rect::new(2, 2, 12, 4), Point::new(4, 2)),
            (Rect::new(10, 10, 15, 15), Point::new(12, 13)),
        ] {
            let mut f = Fixture::new(16, 16);
            f.checker();
            let before = f.pixels();
            let mut expected = before.clone();
            for y in 0..source.height() {
                for x in 0..source.width() {
                    let (dx, dy) = (dest.x + x, dest.y + y);
                    if (0..16).contains(&dx) && (0..16).contains(&dy) {
                        expected[dy as usize][dx as usize] =
                            before[(source.y1 + y) as usize][(source.x1 + x) as usize];
                    }
                }
            }
            f.run(&[Primitive::MoveTo(dest), Primitive::CopyRect(source)]);
            assert_eq!(f.pixels(), expected, "{source:?} -> {dest:?}");
        }
    }

    #[test]
    fn invert_and_swap_rects() {
        let mut f = Fixture::new(8, 8);
        let black = f.format.pixel(Rgb222::BLACK);
        f.run(&[Primitive::InvertRect(Rect::new(1, 1, 2, 2))]);
        assert_eq!(f.painted(white(&f)), [(1, 1), (2, 1), (1, 2), (2, 2)]);

        f.run(&[Primitive::SwapFgBg(Rect::new(0, 0, 1, 1))]);
        assert_eq!(f.frame.pixel(1, 1), black);
        assert_eq!(f.frame.pixel(0, 0), white(&f));

        f.run(&[Primitive::InvertRect(Rect::new(20, 20, 30, 30))]);
        assert_eq!(f.painted(white(&f)).len(), 6);
    }

    #[test]
    fn square_path_fills_half_open() {
        let mut f = Fixture::new(8, 8);
        let points: Arc<[Point]> = Arc::from(vec![
            Point::new(1, 1),
            Point::new(4, 1),
            Point::new(4, 4),
            Point::new(1, 4),
        ]);
        f.run(&[
            Primitive::SetBrushColor(Rgb222::BLUE),
            Primitive::FillPath(points.clone()),
        ]);
        let blue = f.painted(f.format.pixel(Rgb222::BLUE));
        assert_eq!(blue.len(), 9);
        assert_eq!(blue.first(), Some(&(1, 2)));
        assert_eq!(blue.last(), Some(&(3, 4)));

        f.run(&[Primitive::DrawPath(points)]);
        assert_eq!(f.painted(white(&f)).len(), 12);
    }

    #[test]
    fn far_away_coordinates_clip_without_overflow() {
        let mut f = Fixture::new(16, 8);
        f.run(&[
            Primitive::MoveTo(Point::new(-2_000_000_000, 0)),
            Primitive::LineTo(Point::new(2_000_000_000, 6)),
        ]);
        let row: Vec<(i32, i32)> = (0..16).map(|x| (x, 3)).collect();
        assert_eq!(f.painted(white(&f)), row);

        let points: Arc<[Point]> = Arc::from(vec![
            Point::new(-2_000_000_000, 0),
            Point::new(2_000_000_000, 0),
            Point::new(0, 2_000_000_000),
        ]);
        f.run(&[
            Primitive::SetBrushColor(Rgb222::BLUE),
            Primitive::FillPath(points),
        ]);
        // the top edge is horizontal, so row 0 has no crossings
        let blue = f.painted(f.format.pixel(Rgb222::BLUE));
        assert_eq!(blue.len(), 7 * 16);
        assert_eq!(blue.first(), Some(&(0, 1)));
    }

    fn letter() -> Glyph {
        // 8x8 with a mix of edge and interior bits
        Glyph::new(
            Point::new(2, 1),
            8,
            8,
            [0x18, 0x24, 0x42, 0x81, 0xFF, 0x81, 0x81, 0x00],
        )
    }

    #[test]
    fn light_and_full_glyph_paths_agree() {
        for fill_background in [false, true] {
            for clip in [Rect::new(0, 0, 15, 11), Rect::new(4, 3, 7, 6)] {
                let mut light = Fixture::new(16, 12);
                let mut full = Fixture::new(16, 12);
                light.checker();
                full.checker();
                light.state.abs_clipping_rect = clip;
                full.state.abs_clipping_rect = clip;
                let (pen, brush) = (0xC3, 0xCC);
                let glyph = letter();
                let options = GlyphOptions::default().with_fill_background(fill_background);
                light.painter().glyph_light(&glyph, glyph.position, fill_background, pen, brush);
                full.painter().glyph_full(&glyph, glyph.position, options, pen, brush);
                assert_eq!(light.pixels(), full.pixels(), "{fill_background} {clip:?}");
            }
        }
    }

    #[test]
    fn bold_smears_one_pixel_right() {
        let mut f = Fixture::new(16, 8);
        let glyph = Glyph::new(Point::zero(), 8, 1, [0b1000_0100]);
        f.run(&[
            Primitive::SetGlyphOptions(GlyphOptions::default().with_bold(true)),
            Primitive::DrawGlyph(glyph),
        ]);
        assert_eq!(f.painted(white(&f)), [(0, 0), (1, 0), (5, 0), (6, 0)]);
    }

    #[test]
    fn double_width_doubles_every_pixel() {
        let mut f = Fixture::new(32, 8);
        let glyph = Glyph::new(Point::zero(), 8, 1, [0b1010_0000]);
        f.run(&[
            Primitive::SetGlyphOptions(GlyphOptions::default().with_double_width(DoubleWidth::Double)),
            Primitive::DrawGlyph(glyph),
        ]);
        assert_eq!(f.painted(white(&f)), [(0, 0), (1, 0), (4, 0), (5, 0)]);
    }

    #[test]
    fn underline_and_invert() {
        let mut f = Fixture::new(16, 8);
        let glyph = Glyph::new(Point::zero(), 4, 2, [0x00, 0x00]);
        let options = GlyphOptions::default()
            .with_underline(true)
            .with_invert(true)
            .with_fill_background(true);
        f.run(&[Primitive::SetGlyphOptions(options), Primitive::DrawGlyph(glyph)]);
        // inverted: background in pen color, underline in brush color
        let black = f.format.pixel(Rgb222::BLACK);
        assert_eq!(f.painted(white(&f)), [(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert!((0..4).all(|x| f.frame.pixel(x, 1) == black));
    }

    #[test]
    fn bitmaps_skip_transparent_pixels() {
        let mut f = Fixture::new(8, 8);
        f.checker();
        let before = f.pixels();
        let bitmap = Bitmap::from_mask(2, 2, &[0x80, 0x40], Rgb222::RED).unwrap();
        f.run(&[Primitive::DrawBitmap {
            position: Point::new(6, 6),
            bitmap,
        }]);
        let after = f.pixels();
        let red = f.format.pixel(Rgb222::RED);
        assert_eq!(after[6][6], red);
        assert_eq!(after[7][7], red);
        assert_eq!(after[6][7], before[6][7]);
        assert_eq!(after[7][6], before[7][6]);
    }
}

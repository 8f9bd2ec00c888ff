use alloc::{sync::Arc, vec::Vec};

use embedded_graphics::{
    prelude::{DrawTarget, OriginDimensions, Point, Size},
    primitives::Rectangle,
    Pixel,
};

use crate::{
    bitmap::Bitmap,
    clock::Clock,
    color::Rgb222,
    controller::VgaController,
    dma::ScanoutEngine,
    error::{Error, Result},
    geometry::Rect,
    primitive::{Glyph, GlyphOptions, GlyphsBuffer, PaintOptions, Primitive},
    viewport::DmaAllocator,
};

/// Drawing front end: every call becomes one or more primitives for the
/// controller.
///
/// As an embedded-graphics [`DrawTarget`], pixels become `SetPixelAt`,
/// solid fills `FillRect` and `clear` a `Clear`. The last two set the brush
/// color and leave it set.
pub struct Canvas<'a, A, E, C> {
    vga: &'a VgaController<A, E, C>,
}

impl<'a, A: DmaAllocator, E: ScanoutEngine, C: Clock> Canvas<'a, A, E, C> {
    pub fn new(vga: &'a VgaController<A, E, C>) -> Self {
        Canvas { vga }
    }

    #[inline(always)]
    fn add(&self, primitive: Primitive) -> Result<()> {
        self.vga.add_primitive(primitive)
    }

    pub fn set_pen_color(&self, color: Rgb222) -> Result<()> {
        self.add(Primitive::SetPenColor(color))
    }

    pub fn set_brush_color(&self, color: Rgb222) -> Result<()> {
        self.add(Primitive::SetBrushColor(color))
    }

    pub fn set_pixel(&self, x: i32, y: i32) -> Result<()> {
        self.add(Primitive::SetPixel(Point::new(x, y)))
    }

    pub fn set_pixel_color(&self, x: i32, y: i32, color: Rgb222) -> Result<()> {
        self.add(Primitive::SetPixelAt {
            position: Point::new(x, y),
            color,
        })
    }

    pub fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.add(Primitive::MoveTo(Point::new(x, y)))
    }

    pub fn line_to(&self, x: i32, y: i32) -> Result<()> {
        self.add(Primitive::LineTo(Point::new(x, y)))
    }

    pub fn draw_line(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        self.move_to(x1, y1)?;
        self.line_to(x2, y2)
    }

    pub fn draw_rectangle(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::DrawRect(rect))
    }

    pub fn fill_rectangle(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::FillRect(rect))
    }

    pub fn invert_rectangle(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::InvertRect(rect))
    }

    /// Exchanges pen and brush colored pixels inside `rect`
    pub fn swap_rectangle(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::SwapFgBg(rect))
    }

    /// Ellipse centered on `(x, y)`
    pub fn draw_ellipse(&self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        self.move_to(x, y)?;
        self.add(Primitive::DrawEllipse(Size::new(width, height)))
    }

    pub fn fill_ellipse(&self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        self.move_to(x, y)?;
        self.add(Primitive::FillEllipse(Size::new(width, height)))
    }

    /// Fills the whole viewport with the brush color
    pub fn clear(&self) -> Result<()> {
        self.add(Primitive::Clear)
    }

    pub fn set_scrolling_region(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::SetScrollingRegion(rect))
    }

    /// Scrolls the scrolling region; negative offsets move content left
    /// and up
    pub fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        if dx != 0 {
            self.add(Primitive::HScroll(dx))?;
        }
        if dy != 0 {
            self.add(Primitive::VScroll(dy))?;
        }
        Ok(())
    }

    /// Copies `source` so its top left corner lands on `(x, y)`
    pub fn copy_rect(&self, source: Rect, x: i32, y: i32) -> Result<()> {
        self.move_to(x, y)?;
        self.add(Primitive::CopyRect(source))
    }

    pub fn set_glyph_options(&self, options: GlyphOptions) -> Result<()> {
        self.add(Primitive::SetGlyphOptions(options))
    }

    pub fn set_paint_options(&self, options: PaintOptions) -> Result<()> {
        self.add(Primitive::SetPaintOptions(options))
    }

    /// Draws a `width` x `height` one bit per pixel glyph, rows padded to
    /// whole bytes, with the current glyph options
    pub fn draw_glyph(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<()> {
        self.add(Primitive::DrawGlyph(Glyph::new(Point::new(x, y), width, height, data)))
    }

    pub fn render_glyphs_buffer(&self, column: i32, row: i32, buffer: &Arc<GlyphsBuffer>) -> Result<()> {
        self.add(Primitive::RenderGlyphsBuffer {
            column,
            row,
            buffer: Arc::clone(buffer),
        })
    }

    /// Renders every cell of a glyph buffer
    pub fn render_glyphs(&self, buffer: &Arc<GlyphsBuffer>) -> Result<()> {
        for row in 0..buffer.rows() {
            for column in 0..buffer.columns() {
                self.render_glyphs_buffer(column, row, buffer)?;
            }
        }
        Ok(())
    }

    pub fn draw_bitmap(&self, x: i32, y: i32, bitmap: &Bitmap) -> Result<()> {
        self.add(Primitive::DrawBitmap {
            position: Point::new(x, y),
            bitmap: bitmap.clone(),
        })
    }

    /// Closed outline through `points`
    pub fn draw_path(&self, points: &[Point]) -> Result<()> {
        self.add(Primitive::DrawPath(Arc::from(points)))
    }

    pub fn fill_path(&self, points: &[Point]) -> Result<()> {
        self.add(Primitive::FillPath(Arc::from(points)))
    }

    pub fn set_origin(&self, x: i32, y: i32) -> Result<()> {
        self.add(Primitive::SetOrigin(Point::new(x, y)))
    }

    /// Clipping rectangle relative to the origin
    pub fn set_clipping_rect(&self, rect: Rect) -> Result<()> {
        self.add(Primitive::SetClippingRect(rect))
    }

    pub fn reset_clipping_rect(&self) -> Result<()> {
        let bounds = self.vga.geometry().ok_or(Error::NotConfigured)?.bounds();
        self.set_clipping_rect(bounds)
    }

    pub fn swap_buffers(&self) -> Result<()> {
        self.vga.swap_buffers()
    }

    /// Waits until everything drawn so far has reached the frame buffer
    pub fn wait_completion(&self) -> Result<()> {
        self.vga.primitives_execution_wait()
    }

    /// Colors currently in the frame buffer; queued primitives are not
    /// taken into account
    pub fn pixels(&self, rect: Rect) -> Result<Vec<Rgb222>> {
        self.vga.read_screen(rect)
    }
}

impl<A: DmaAllocator, E: ScanoutEngine, C: Clock> OriginDimensions for Canvas<'_, A, E, C> {
    fn size(&self) -> Size {
        self.vga.geometry().map_or(Size::zero(), |g| {
            Size::new(g.width.max(0) as u32, g.height.max(0) as u32)
        })
    }
}

impl<A: DmaAllocator, E: ScanoutEngine, C: Clock> DrawTarget for Canvas<'_, A, E, C> {
    type Color = Rgb222;
    type Error = Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(position, color) in pixels {
            self.add(Primitive::SetPixelAt { position, color })?;
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        if area.size.width == 0 || area.size.height == 0 {
            return Ok(());
        }
        self.set_brush_color(color)?;
        self.fill_rectangle(Rect::from(*area))
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.set_brush_color(color)?;
        Canvas::clear(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        clock::ManualClock,
        config::ControllerConfig,
        dma::NullScanout,
        timings::presets,
        viewport::HeapAllocator,
    };
    use embedded_graphics::{
        mono_font::{ascii::FONT_6X10, MonoTextStyle},
        prelude::{Drawable, Primitive as _, RgbColor},
        primitives::{Circle, PrimitiveStyle},
        text::Text,
    };
    use pretty_assertions::assert_eq;

    fn immediate() -> VgaController<HeapAllocator, NullScanout, ManualClock> {
        let vga = VgaController::new(
            ControllerConfig::default().with_background_execution(false),
            HeapAllocator,
            NullScanout::default(),
            ManualClock::new(),
        );
        vga.set_resolution(presets::VGA_320X200_75HZ, 0, 0, false).unwrap();
        vga
    }

    #[test]
    fn size_follows_the_viewport() {
        let vga = immediate();
        assert_eq!(Canvas::new(&vga).size(), Size::new(320, 200));
        vga.shutdown();
        assert_eq!(Canvas::new(&vga).size(), Size::zero());
    }

    #[test]
    fn embedded_graphics_draws_through_primitives() {
        let vga = immediate();
        let mut canvas = Canvas::new(&vga);
        DrawTarget::clear(&mut canvas, Rgb222::BLUE).unwrap();
        Circle::new(Point::new(10, 10), 9)
            .into_styled(PrimitiveStyle::with_fill(Rgb222::RED))
            .draw(&mut canvas)
            .unwrap();
        Text::new("Hi", Point::new(40, 20), MonoTextStyle::new(&FONT_6X10, Rgb222::WHITE))
            .draw(&mut canvas)
            .unwrap();

        assert_eq!(canvas.pixels(Rect::new(14, 14, 14, 14)), Ok(vec![Rgb222::RED]));
        assert_eq!(canvas.pixels(Rect::new(0, 0, 0, 0)), Ok(vec![Rgb222::BLUE]));
        let text = canvas.pixels(Rect::new(40, 10, 51, 22)).unwrap();
        assert!(text.contains(&Rgb222::WHITE));
    }

    #[test]
    fn fill_solid_becomes_a_rect() {
        let vga = immediate();
        let mut canvas = Canvas::new(&vga);
        canvas
            .fill_solid(&Rectangle::new(Point::new(2, 2), Size::new(3, 2)), Rgb222::GREEN)
            .unwrap();
        canvas
            .fill_solid(&Rectangle::new(Point::new(0, 0), Size::zero()), Rgb222::RED)
            .unwrap();
        let pixels = canvas.pixels(Rect::new(1, 1, 5, 4)).unwrap();
        let green = pixels.iter().filter(|&&c| c == Rgb222::GREEN).count();
        assert_eq!(green, 6);
        assert!(!pixels.contains(&Rgb222::RED));
    }

    #[test]
    fn helpers_queue_in_background_mode() {
        let vga = VgaController::new(
            ControllerConfig::default(),
            HeapAllocator,
            NullScanout::default(),
            ManualClock::new(),
        );
        vga.set_resolution(presets::VGA_320X200_75HZ, 0, 0, false).unwrap();
        let canvas = Canvas::new(&vga);
        canvas.set_pen_color(Rgb222::YELLOW).unwrap();
        canvas.draw_line(0, 0, 9, 0).unwrap();
        canvas.scroll(0, 0).unwrap();
        assert_eq!(vga.queued(), 3);
        assert_eq!(canvas.pixels(Rect::new(9, 0, 9, 0)), Ok(vec![Rgb222::BLACK]));

        vga.on_vertical_retrace();
        assert_eq!(canvas.pixels(Rect::new(9, 0, 9, 0)), Ok(vec![Rgb222::YELLOW]));
    }
}

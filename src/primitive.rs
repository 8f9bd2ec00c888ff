//! Drawing commands and the data they carry.
//!
//! Anything a primitive references (glyph bits, bitmaps, paths, glyph
//! maps) is reference counted, so it stays alive until the executor is
//! done with it no matter when the producer lets go.

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicU32, Ordering};

use embedded_graphics::prelude::{Point, Size};

use crate::{
    bitmap::Bitmap,
    color::{Color, Rgb222},
    geometry::Rect,
};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct PaintOptions: u8 {
        /// Draw with the brush and fill with the pen
        const SWAP_FG_BG = 0b01;
        /// Lines invert the pixels they cross instead of painting them
        const NOT        = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoubleWidth {
    #[default]
    Off,
    Double,
    /// Double width, showing the upper half of the glyph at double height
    TopHalf,
    /// Double width, showing the lower half of the glyph at double height
    BottomHalf,
}

/// Rendering options of a glyph.
///
/// `User2:10 User1:9 DoubleWidth:7-8 Underline:6 Blank:5 Invert:4 Italic:3 Faint:2 Bold:1 FillBackground:0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct GlyphOptions(u16);

impl GlyphOptions {
    const FILL_BACKGROUND: u16 = 1 << 0;
    const BOLD: u16 = 1 << 1;
    const REDUCE_LUMINOSITY: u16 = 1 << 2;
    const ITALIC: u16 = 1 << 3;
    const INVERT: u16 = 1 << 4;
    const BLANK: u16 = 1 << 5;
    const UNDERLINE: u16 = 1 << 6;
    const DOUBLE_WIDTH_SHIFT: u16 = 7;
    const DOUBLE_WIDTH: u16 = 0b11 << Self::DOUBLE_WIDTH_SHIFT;
    const USER_1: u16 = 1 << 9;
    const USER_2: u16 = 1 << 10;

    pub const fn from_bits(bits: u16) -> GlyphOptions {
        GlyphOptions(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    const fn flag(self, bit: u16, on: bool) -> GlyphOptions {
        if on {
            GlyphOptions(self.0 | bit)
        } else {
            GlyphOptions(self.0 & !bit)
        }
    }

    pub fn fill_background(&self) -> bool {
        self.0 & Self::FILL_BACKGROUND != 0
    }

    pub fn bold(&self) -> bool {
        self.0 & Self::BOLD != 0
    }

    pub fn reduce_luminosity(&self) -> bool {
        self.0 & Self::REDUCE_LUMINOSITY != 0
    }

    pub fn italic(&self) -> bool {
        self.0 & Self::ITALIC != 0
    }

    pub fn invert(&self) -> bool {
        self.0 & Self::INVERT != 0
    }

    pub fn blank(&self) -> bool {
        self.0 & Self::BLANK != 0
    }

    pub fn underline(&self) -> bool {
        self.0 & Self::UNDERLINE != 0
    }

    pub fn double_width(&self) -> DoubleWidth {
        match (self.0 & Self::DOUBLE_WIDTH) >> Self::DOUBLE_WIDTH_SHIFT {
            0 => DoubleWidth::Off,
            1 => DoubleWidth::Double,
            2 => DoubleWidth::TopHalf,
            _ => DoubleWidth::BottomHalf,
        }
    }

    pub fn user_1(&self) -> bool {
        self.0 & Self::USER_1 != 0
    }

    pub fn user_2(&self) -> bool {
        self.0 & Self::USER_2 != 0
    }

    pub const fn with_fill_background(self, on: bool) -> GlyphOptions {
        self.flag(Self::FILL_BACKGROUND, on)
    }

    pub const fn with_bold(self, on: bool) -> GlyphOptions {
        self.flag(Self::BOLD, on)
    }

    pub const fn with_reduce_luminosity(self, on: bool) -> GlyphOptions {
        self.flag(Self::REDUCE_LUMINOSITY, on)
    }

    pub const fn with_italic(self, on: bool) -> GlyphOptions {
        self.flag(Self::ITALIC, on)
    }

    pub const fn with_invert(self, on: bool) -> GlyphOptions {
        self.flag(Self::INVERT, on)
    }

    pub const fn with_blank(self, on: bool) -> GlyphOptions {
        self.flag(Self::BLANK, on)
    }

    pub const fn with_underline(self, on: bool) -> GlyphOptions {
        self.flag(Self::UNDERLINE, on)
    }

    pub const fn with_double_width(self, mode: DoubleWidth) -> GlyphOptions {
        let value = match mode {
            DoubleWidth::Off => 0,
            DoubleWidth::Double => 1,
            DoubleWidth::TopHalf => 2,
            DoubleWidth::BottomHalf => 3,
        };
        GlyphOptions((self.0 & !Self::DOUBLE_WIDTH) | value << Self::DOUBLE_WIDTH_SHIFT)
    }

    pub const fn with_user_1(self, on: bool) -> GlyphOptions {
        self.flag(Self::USER_1, on)
    }

    pub const fn with_user_2(self, on: bool) -> GlyphOptions {
        self.flag(Self::USER_2, on)
    }
}

/// A 1 bit per pixel glyph, most significant bit leftmost, rows padded
/// to whole bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    pub position: Point,
    pub width: i32,
    pub height: i32,
    pub data: Arc<[u8]>,
}

impl Glyph {
    pub fn new(position: Point, width: i32, height: i32, data: impl Into<Arc<[u8]>>) -> Glyph {
        Glyph {
            position,
            width,
            height,
            data: data.into(),
        }
    }

    /// Bytes per glyph row
    pub const fn row_bytes(&self) -> usize {
        ((if self.width > 0 { self.width } else { 0 }) as usize + 7) / 8
    }
}

/// Cell of a glyph map: `Options:16-31 Fg:12-15 Bg:8-11 Index:0-7`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct GlyphMapItem(u32);

impl GlyphMapItem {
    pub fn new(index: u8, background: Color, foreground: Color, options: GlyphOptions) -> GlyphMapItem {
        GlyphMapItem(
            u32::from(index)
                | (background as u32) << 8
                | (foreground as u32) << 12
                | u32::from(options.bits()) << 16,
        )
    }

    pub const fn from_bits(bits: u32) -> GlyphMapItem {
        GlyphMapItem(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> u8 {
        self.0 as u8
    }

    pub fn background(&self) -> Color {
        Color::from_index((self.0 >> 8) as u8)
    }

    pub fn foreground(&self) -> Color {
        Color::from_index((self.0 >> 12) as u8)
    }

    pub fn options(&self) -> GlyphOptions {
        GlyphOptions::from_bits((self.0 >> 16) as u16)
    }

    pub fn with_options(self, options: GlyphOptions) -> GlyphMapItem {
        GlyphMapItem((self.0 & 0xFFFF) | u32::from(options.bits()) << 16)
    }
}

/// A grid of glyph map cells over a shared font.
///
/// Cells may be rewritten by the producer while render primitives for
/// them are still queued; each render reads the cell as it is then.
#[derive(Debug)]
pub struct GlyphsBuffer {
    glyph_width: i32,
    glyph_height: i32,
    font: Arc<[u8]>,
    columns: i32,
    rows: i32,
    map: Box<[AtomicU32]>,
}

impl GlyphsBuffer {
    pub fn new(
        glyph_width: i32,
        glyph_height: i32,
        font: impl Into<Arc<[u8]>>,
        columns: i32,
        rows: i32,
    ) -> GlyphsBuffer {
        let cells = (columns.max(0) * rows.max(0)) as usize;
        GlyphsBuffer {
            glyph_width,
            glyph_height,
            font: font.into(),
            columns,
            rows,
            map: (0..cells).map(|_| AtomicU32::new(0)).collect::<Vec<_>>().into_boxed_slice(),
        }
    }

    pub fn glyph_width(&self) -> i32 {
        self.glyph_width
    }

    pub fn glyph_height(&self) -> i32 {
        self.glyph_height
    }

    pub fn columns(&self) -> i32 {
        self.columns
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    fn cell(&self, column: i32, row: i32) -> Option<&AtomicU32> {
        if column < 0 || row < 0 || column >= self.columns || row >= self.rows {
            return None;
        }
        self.map.get((column + row * self.columns) as usize)
    }

    pub fn item(&self, column: i32, row: i32) -> Option<GlyphMapItem> {
        self.cell(column, row)
            .map(|c| GlyphMapItem::from_bits(c.load(Ordering::Relaxed)))
    }

    pub fn set_item(&self, column: i32, row: i32, item: GlyphMapItem) {
        if let Some(cell) = self.cell(column, row) {
            cell.store(item.bits(), Ordering::Relaxed);
        }
    }

    /// Glyph to render for cell `(column, row)` with its map item
    pub fn glyph(&self, column: i32, row: i32) -> Option<(Glyph, GlyphMapItem)> {
        let item = self.item(column, row)?;
        let double = item.options().double_width() != DoubleWidth::Off;
        let row_bytes = (self.glyph_width.max(0) as usize + 7) / 8;
        let size = self.glyph_height.max(0) as usize * row_bytes;
        let start = usize::from(item.index()) * size;
        let data = self.font.get(start..start + size)?;
        let glyph = Glyph::new(
            Point::new(
                column * self.glyph_width * if double { 2 } else { 1 },
                row * self.glyph_height,
            ),
            self.glyph_width,
            self.glyph_height,
            data,
        );
        Some((glyph, item))
    }
}

/// One drawing command
#[derive(Debug, Clone)]
pub enum Primitive {
    SetPenColor(Rgb222),
    SetBrushColor(Rgb222),
    /// Pen colored pixel
    SetPixel(Point),
    SetPixelAt {
        position: Point,
        color: Rgb222,
    },
    MoveTo(Point),
    /// Line from the current position, which then moves to the end point
    LineTo(Point),
    FillRect(Rect),
    DrawRect(Rect),
    /// Ellipse centered at the current position
    FillEllipse(Size),
    DrawEllipse(Size),
    Clear,
    /// Negative values scroll up
    VScroll(i32),
    /// Negative values scroll left
    HScroll(i32),
    DrawGlyph(Glyph),
    RenderGlyphsBuffer {
        column: i32,
        row: i32,
        buffer: Arc<GlyphsBuffer>,
    },
    SetGlyphOptions(GlyphOptions),
    SetPaintOptions(PaintOptions),
    InvertRect(Rect),
    /// Copies the source rectangle to the current position
    CopyRect(Rect),
    SetScrollingRegion(Rect),
    SwapFgBg(Rect),
    DrawBitmap {
        position: Point,
        bitmap: Bitmap,
    },
    RefreshSprites,
    SwapBuffers,
    DrawPath(Arc<[Point]>),
    FillPath(Arc<[Point]>),
    SetOrigin(Point),
    SetClippingRect(Rect),
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::SetPenColor(_) => "SetPenColor",
            Primitive::SetBrushColor(_) => "SetBrushColor",
            Primitive::SetPixel(_) => "SetPixel",
            Primitive::SetPixelAt { .. } => "SetPixelAt",
            Primitive::MoveTo(_) => "MoveTo",
            Primitive::LineTo(_) => "LineTo",
            Primitive::FillRect(_) => "FillRect",
            Primitive::DrawRect(_) => "DrawRect",
            Primitive::FillEllipse(_) => "FillEllipse",
            Primitive::DrawEllipse(_) => "DrawEllipse",
            Primitive::Clear => "Clear",
            Primitive::VScroll(_) => "VScroll",
            Primitive::HScroll(_) => "HScroll",
            Primitive::DrawGlyph(_) => "DrawGlyph",
            Primitive::RenderGlyphsBuffer { .. } => "RenderGlyphsBuffer",
            Primitive::SetGlyphOptions(_) => "SetGlyphOptions",
            Primitive::SetPaintOptions(_) => "SetPaintOptions",
            Primitive::InvertRect(_) => "InvertRect",
            Primitive::CopyRect(_) => "CopyRect",
            Primitive::SetScrollingRegion(_) => "SetScrollingRegion",
            Primitive::SwapFgBg(_) => "SwapFgBg",
            Primitive::DrawBitmap { .. } => "DrawBitmap",
            Primitive::RefreshSprites => "RefreshSprites",
            Primitive::SwapBuffers => "SwapBuffers",
            Primitive::DrawPath(_) => "DrawPath",
            Primitive::FillPath(_) => "FillPath",
            Primitive::SetOrigin(_) => "SetOrigin",
            Primitive::SetClippingRect(_) => "SetClippingRect",
        }
    }
}

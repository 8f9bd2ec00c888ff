//! Blank scanline buffers and the horizontal layout of viewport lines.
//!
//! Every non-visible line of a frame, and the padding around the viewport
//! on visible lines, is streamed out of one of two blank lines: one with
//! only the horizontal sync pulse, one with the vertical sync asserted
//! as well.

use alloc::{vec, vec::Vec};
use heapless::Vec as InlineVec;

use crate::{
    color::Rgb222,
    timings::{ScreenBlock, Timings},
    viewport::{swizzle, ViewGeometry},
};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BlankLine {
    /// Porch and sync pulse only
    Plain,
    /// Vertical sync asserted for the whole line
    VSync,
}

#[derive(Debug, Clone)]
pub struct ScanlineBuffers {
    plain: Vec<u8>,
    vsync: Vec<u8>,
}

impl ScanlineBuffers {
    pub fn new(timings: &Timings) -> ScanlineBuffers {
        let len = timings.h_line_size().max(0) as usize;
        let mut buffers = ScanlineBuffers {
            plain: vec![0; len],
            vsync: vec![0; len],
        };
        buffers.fill(timings);
        buffers
    }

    /// Regenerates both lines for the current horizontal porches.
    /// The line length itself never changes after construction.
    pub fn fill(&mut self, timings: &Timings) {
        let format = timings.pixel_format();
        self.plain
            .fill(format.pixel_with_sync(Rgb222::default(), false, false));
        self.vsync
            .fill(format.pixel_with_sync(Rgb222::default(), false, true));

        let start = sync_position(timings).max(0) as usize;
        let end = (start + timings.h_sync_pulse.max(0) as usize).min(self.plain.len());
        let hsync = format.pixel_with_sync(Rgb222::default(), true, false);
        let both = format.pixel_with_sync(Rgb222::default(), true, true);
        for x in start..end {
            self.plain[swizzle(x)] = hsync;
            self.vsync[swizzle(x)] = both;
        }
    }

    pub fn line(&self, which: BlankLine) -> &[u8] {
        match which {
            BlankLine::Plain => &self.plain,
            BlankLine::VSync => &self.vsync,
        }
    }

    pub fn len(&self) -> usize {
        self.plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }
}

/// First pixel clock of the horizontal sync pulse within a blank line
pub fn sync_position(timings: &Timings) -> i32 {
    let fp = i32::from(timings.h_front_porch);
    let bp = i32::from(timings.h_back_porch);
    let visible = i32::from(timings.h_visible_area);
    match timings.h_starting_block {
        ScreenBlock::FrontPorch => fp,
        ScreenBlock::Sync => 0,
        ScreenBlock::BackPorch => bp + visible + fp,
        ScreenBlock::VisibleArea => visible + fp,
    }
}

/// One DMA transfer of a visible scanline that crosses the viewport
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Segment {
    /// `length` pixel clocks of the plain blank line starting at `offset`
    Blank { offset: i32, length: i32 },
    /// The viewport row itself
    View,
}

pub type LineSegments = InlineVec<Segment, 3>;

/// Splits a scanline that crosses the viewport into the transfers that
/// reproduce it: blank padding, the viewport row, more padding.
///
/// Two segments are enough when the viewport touches the edge of the
/// visible area adjacent to the blanking interval, otherwise three.
pub fn view_line_segments(timings: &Timings, geometry: &ViewGeometry) -> LineSegments {
    let line = timings.h_line_size();
    let invisible = timings.h_invisible_size();
    let visible = i32::from(timings.h_visible_area);
    let fp = i32::from(timings.h_front_porch);
    let sync = i32::from(timings.h_sync_pulse);
    let bp = i32::from(timings.h_back_porch);
    let col = geometry.col;
    let right_pad = geometry.right_pad(timings);

    let mut segments = LineSegments::new();
    let mut push = |s: Segment| {
        // capacity is never exceeded: at most three segments per line
        let _ = segments.push(s);
    };
    match timings.h_starting_block {
        ScreenBlock::FrontPorch => {
            push(Segment::Blank {
                offset: 0,
                length: invisible + col,
            });
            push(Segment::View);
            if right_pad > 0 {
                push(Segment::Blank {
                    offset: invisible,
                    length: right_pad,
                });
            }
        }
        ScreenBlock::Sync => {
            push(Segment::Blank {
                offset: 0,
                length: sync + bp + col,
            });
            push(Segment::View);
            push(Segment::Blank {
                offset: line - fp - right_pad,
                length: fp + right_pad,
            });
        }
        ScreenBlock::BackPorch => {
            push(Segment::Blank {
                offset: 0,
                length: bp + col,
            });
            push(Segment::View);
            push(Segment::Blank {
                offset: line - fp - sync - right_pad,
                length: fp + sync + right_pad,
            });
        }
        ScreenBlock::VisibleArea => {
            if col > 0 {
                push(Segment::Blank {
                    offset: 0,
                    length: col,
                });
            }
            push(Segment::View);
            push(Segment::Blank {
                offset: visible - right_pad,
                length: invisible + right_pad,
            });
        }
    }
    segments
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{color::SYNC_MASK, timings::presets};

    fn timings(modeline: &str) -> Timings {
        Timings::from_modeline(modeline).unwrap()
    }

    #[test]
    fn blank_lines_carry_the_hsync_pulse() {
        let t = timings(presets::VGA_640X480_60HZ);
        let buffers = ScanlineBuffers::new(&t);
        assert_eq!(buffers.len(), 800);

        let plain = buffers.line(BlankLine::Plain);
        let vsync = buffers.line(BlankLine::VSync);
        // negative polarity: asserted pulses drive the bit low
        let hsync_low = plain.iter().filter(|&&b| b & 0x40 == 0).count();
        assert_eq!(hsync_low, 96);
        assert!(vsync.iter().all(|&b| b & 0x80 == 0));
        assert!(plain.iter().all(|&b| b & 0x80 != 0));
        assert_eq!(plain[swizzle(16)] & SYNC_MASK, 0x80);
        assert_eq!(plain[swizzle(15)] & SYNC_MASK, SYNC_MASK);
        assert_eq!(plain[swizzle(16 + 96)] & SYNC_MASK, SYNC_MASK);
    }

    #[test]
    fn sync_position_follows_block_order() {
        let mut t = timings(presets::VGA_640X480_60HZ);
        assert_eq!(sync_position(&t), 16);
        t.h_starting_block = ScreenBlock::Sync;
        assert_eq!(sync_position(&t), 0);
        t.h_starting_block = ScreenBlock::BackPorch;
        assert_eq!(sync_position(&t), 48 + 640 + 16);
        t.h_starting_block = ScreenBlock::VisibleArea;
        assert_eq!(sync_position(&t), 656);
    }

    fn covered(t: &Timings, geometry: &ViewGeometry) -> i32 {
        view_line_segments(t, geometry)
            .iter()
            .map(|s| match s {
                Segment::Blank { length, .. } => *length,
                Segment::View => geometry.width,
            })
            .sum()
    }

    #[test]
    fn segments_cover_a_whole_line() {
        let mut t = timings(presets::VGA_640X480_60HZ);
        let full = ViewGeometry::new(&t, 0, 0);
        let narrow = ViewGeometry::new(&t, 320, 200);
        for block in [
            ScreenBlock::FrontPorch,
            ScreenBlock::Sync,
            ScreenBlock::BackPorch,
            ScreenBlock::VisibleArea,
        ] {
            t.h_starting_block = block;
            assert_eq!(covered(&t, &full), 800, "{block:?}");
            assert_eq!(covered(&t, &narrow), 800, "{block:?}");
        }
    }

    #[test]
    fn segment_counts_per_block_order() {
        let mut t = timings(presets::VGA_640X480_60HZ);
        let full = ViewGeometry::new(&t, 0, 0);
        let narrow = ViewGeometry::new(&t, 320, 200);

        assert_eq!(view_line_segments(&t, &full).len(), 2);
        assert_eq!(view_line_segments(&t, &narrow).len(), 3);

        t.h_starting_block = ScreenBlock::Sync;
        assert_eq!(view_line_segments(&t, &full).len(), 3);

        t.h_starting_block = ScreenBlock::VisibleArea;
        assert_eq!(view_line_segments(&t, &full).len(), 2);
        assert_eq!(view_line_segments(&t, &narrow).len(), 3);
    }
}

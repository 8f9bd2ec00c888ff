//! The circular descriptor list the DMA engine follows to stream a frame.
//!
//! Each descriptor points either into one of the blank scanlines or at a
//! viewport row. The last descriptor of an array links back to a sentinel
//! head, and the head links to the first descriptor of whichever array is
//! currently visible. Swapping buffers only has to rewrite that one link.

use alloc::vec::Vec;
use core::mem;

use fugit::HertzU32;

use crate::{
    scanline::{view_line_segments, BlankLine, ScanlineBuffers, Segment},
    timings::{ScreenBlock, Timings},
    viewport::{FrameBuffer, FrameMemory, RowId, ViewGeometry, ViewPort},
};

/// Longest transfer a single descriptor can describe
pub const MAX_DESCRIPTOR_LENGTH: usize = 4092;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Source {
    /// Bytes of a blank line starting at `offset`
    Blank { line: BlankLine, offset: u32 },
    /// A viewport row
    Row(RowId),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Link {
    /// Index of the following descriptor in the same array
    Next(u32),
    /// Back to the sentinel head: end of frame
    Head,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Descriptor {
    /// Set while the descriptor belongs to the DMA engine
    pub owner: bool,
    pub source: Source,
    /// Bytes transferred
    pub length: u16,
    /// Bytes of the buffer, `length` rounded up to a whole word
    pub size: u16,
    pub next: Link,
}

impl Descriptor {
    const fn blank() -> Descriptor {
        Descriptor {
            owner: true,
            source: Source::Blank {
                line: BlankLine::Plain,
                offset: 0,
            },
            length: 0,
            size: 0,
            next: Link::Head,
        }
    }

    fn point(&mut self, source: Source, length: usize) {
        self.source = source;
        self.length = length as u16;
        self.size = ((length + 3) & !3) as u16;
    }

    /// Bytes this descriptor streams
    pub fn bytes<'a>(&self, scanlines: &'a ScanlineBuffers, memory: &'a FrameMemory) -> &'a [u8] {
        let length = self.length as usize;
        match self.source {
            Source::Blank { line, offset } => {
                let offset = offset as usize;
                &scanlines.line(line)[offset..offset + length]
            }
            Source::Row(id) => &memory.row(id)[..length],
        }
    }
}

/// Identity of a descriptor array, kept across swaps
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Bank {
    A,
    B,
}

#[derive(Debug, Clone)]
pub struct DescriptorArray {
    bank: Bank,
    descriptors: Vec<Descriptor>,
}

impl DescriptorArray {
    fn new(bank: Bank) -> DescriptorArray {
        DescriptorArray {
            bank,
            descriptors: Vec::new(),
        }
    }

    fn resize(&mut self, count: usize) {
        self.descriptors.resize(count, Descriptor::blank());
        for (i, d) in self.descriptors.iter_mut().enumerate() {
            d.owner = true;
            d.next = if i + 1 == count {
                Link::Head
            } else {
                Link::Next(i as u32 + 1)
            };
        }
    }

    pub fn bank(&self) -> Bank {
        self.bank
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }
}

/// Sentinel the last descriptor of every array links back to
#[derive(Debug, Clone, Copy, Default)]
pub struct Head {
    /// Array whose first descriptor starts the next frame
    pub next: Option<Bank>,
}

/// Number of descriptors a frame needs for the given viewport
pub fn required_descriptors(timings: &Timings, geometry: &ViewGeometry) -> usize {
    let scan = usize::from(timings.scan_count);
    let lines = timings.v_lines().max(0) as usize;
    let rows = geometry.height.max(0) as usize;
    let per_row = view_line_segments(timings, geometry).len();
    scan * (lines - rows.min(lines)) + scan * rows * per_row
}

#[derive(Debug, Clone)]
pub struct DescriptorChain {
    head: Head,
    drawing: DescriptorArray,
    visible: Option<DescriptorArray>,
    scan_count: usize,
    /// Descriptor index of the view segment of each `(row, scan)`
    view_slots: Vec<u32>,
    view_length: usize,
    /// Offset into the plain blank line standing in for repeated scans
    blank_repeats: Option<u32>,
}

impl DescriptorChain {
    pub fn new(double_buffered: bool) -> DescriptorChain {
        DescriptorChain {
            head: Head::default(),
            drawing: DescriptorArray::new(Bank::A),
            visible: double_buffered.then(|| DescriptorArray::new(Bank::B)),
            scan_count: 1,
            view_slots: Vec::new(),
            view_length: 0,
            blank_repeats: None,
        }
    }

    pub fn len(&self) -> usize {
        self.drawing.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawing.descriptors.is_empty()
    }

    pub fn head(&self) -> Head {
        self.head
    }

    pub fn drawing(&self) -> &DescriptorArray {
        &self.drawing
    }

    /// The array being scanned out; the drawing one when single buffered
    pub fn visible(&self) -> &DescriptorArray {
        self.visible.as_ref().unwrap_or(&self.drawing)
    }

    fn arrays_mut(&mut self) -> impl Iterator<Item = &mut DescriptorArray> {
        core::iter::once(&mut self.drawing).chain(self.visible.as_mut())
    }

    /// Grows or shrinks every array to `count` descriptors and relinks
    /// them; descriptors that survive keep their source.
    pub fn resize(&mut self, count: usize) {
        for array in self.arrays_mut() {
            array.resize(count);
        }
    }

    /// Points descriptor `index` of every array at a blank line
    pub fn set_blank(&mut self, index: usize, line: BlankLine, offset: i32, length: i32) {
        let source = Source::Blank {
            line,
            offset: offset.max(0) as u32,
        };
        for array in self.arrays_mut() {
            array.descriptors[index].point(source, length.max(0) as usize);
        }
    }

    fn view_source(&self, rows: &ViewPort, row: usize, scan: usize) -> Source {
        match self.blank_repeats {
            Some(offset) if scan > 0 => Source::Blank {
                line: BlankLine::Plain,
                offset,
            },
            _ => Source::Row(rows.get(row)),
        }
    }

    /// Points view descriptor `index` of each array at `row` of the
    /// matching row table
    pub fn set_view(&mut self, index: usize, frame: &FrameBuffer, row: usize, scan: usize) {
        let length = self.view_length;
        let drawing = self.view_source(frame.drawing(), row, scan);
        self.drawing.descriptors[index].point(drawing, length);
        let visible = self.view_source(frame.visible(), row, scan);
        if let Some(array) = self.visible.as_mut() {
            array.descriptors[index].point(visible, length);
        }
    }

    /// Wires a whole frame: visible area, front porch, sync, back porch.
    ///
    /// `geometry.height` must match the rows of `frame`.
    pub fn build_frame(&mut self, timings: &Timings, geometry: &ViewGeometry, frame: &FrameBuffer) {
        self.scan_count = usize::from(timings.scan_count);
        self.view_length = geometry.width.max(0) as usize;
        self.blank_repeats = (timings.multi_scan_blank
            && timings.h_starting_block == ScreenBlock::FrontPorch)
            .then(|| (timings.h_line_size() - i32::from(timings.h_visible_area)).max(0) as u32);
        self.resize(required_descriptors(timings, geometry));
        self.view_slots.clear();
        self.view_slots
            .resize(geometry.height.max(0) as usize * self.scan_count, 0);

        let line_size = timings.h_line_size();
        let segments = view_line_segments(timings, geometry);
        let front_porch_at = i32::from(timings.v_visible_area);
        let sync_at = front_porch_at + i32::from(timings.v_front_porch);
        let back_porch_at = sync_at + i32::from(timings.v_sync_pulse);

        let mut index = 0;
        let mut oversize = 0;
        for line in 0..timings.v_lines() {
            for scan in 0..self.scan_count {
                if line >= sync_at && line < back_porch_at {
                    self.set_blank(index, BlankLine::VSync, 0, line_size);
                    index += 1;
                } else if line >= front_porch_at || !geometry.covers_line(line) {
                    self.set_blank(index, BlankLine::Plain, 0, line_size);
                    index += 1;
                } else {
                    let row = (line - geometry.row) as usize;
                    for segment in &segments {
                        match *segment {
                            Segment::Blank { offset, length } => {
                                self.set_blank(index, BlankLine::Plain, offset, length)
                            }
                            Segment::View => {
                                self.view_slots[row * self.scan_count + scan] = index as u32;
                                self.set_view(index, frame, row, scan);
                            }
                        }
                        index += 1;
                    }
                }
                if self.drawing.descriptors[index - 1].length as usize > MAX_DESCRIPTOR_LENGTH {
                    oversize += 1;
                }
            }
        }
        if oversize > 0 {
            log::warn!(
                "{} descriptors exceed {} bytes, the DMA engine will truncate them",
                oversize,
                MAX_DESCRIPTOR_LENGTH
            );
        }

        self.head.next = Some(self.visible().bank);
    }

    /// Re-points the drawing array's view descriptors of rows `y1..=y2` at
    /// the rows the drawing table now holds there
    pub fn repoint_rows(&mut self, frame: &FrameBuffer, y1: i32, y2: i32) {
        for row in y1.max(0) as usize..=y2.max(0) as usize {
            for scan in 0..self.scan_count {
                let Some(&slot) = self.view_slots.get(row * self.scan_count + scan) else {
                    return;
                };
                let source = self.view_source(frame.drawing(), row, scan);
                let length = self.view_length;
                self.drawing.descriptors[slot as usize].point(source, length);
            }
        }
    }

    /// Exchanges the drawing and visible arrays and points the head at the
    /// new visible one. A no-op when single buffered.
    pub fn swap_banks(&mut self) {
        if let Some(visible) = self.visible.as_mut() {
            mem::swap(&mut self.drawing, visible);
            self.head.next = Some(visible.bank);
        }
    }

    /// Follows the links from the head back to the head: one frame as the
    /// DMA engine sees it.
    pub fn frame(&self) -> Frame<'_> {
        let array = match self.head.next {
            Some(bank) if self.drawing.bank == bank => Some(&self.drawing),
            Some(_) => self.visible.as_ref(),
            None => None,
        };
        Frame {
            array,
            at: array.filter(|a| !a.descriptors.is_empty()).map(|_| 0),
        }
    }

    /// The byte slices of one frame, in transmission order
    pub fn play<'a>(
        &'a self,
        scanlines: &'a ScanlineBuffers,
        memory: &'a FrameMemory,
    ) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.frame().map(move |d| d.bytes(scanlines, memory))
    }
}

pub struct Frame<'a> {
    array: Option<&'a DescriptorArray>,
    at: Option<usize>,
}

impl<'a> Iterator for Frame<'a> {
    type Item = &'a Descriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.array?.descriptors.get(self.at?)?;
        self.at = match descriptor.next {
            Link::Next(i) => Some(i as usize),
            Link::Head => None,
        };
        Some(descriptor)
    }
}

/// The hardware that clocks the chain out at the pixel frequency
pub trait ScanoutEngine {
    fn start(&mut self, frequency: HertzU32, chain: &DescriptorChain);
    fn stop(&mut self);
}

/// Scan-out that goes nowhere, for hosts without video hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScanout {
    running: bool,
}

impl NullScanout {
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl ScanoutEngine for NullScanout {
    fn start(&mut self, frequency: HertzU32, chain: &DescriptorChain) {
        log::debug!(
            "scan-out of {} descriptors at {} Hz",
            chain.len(),
            frequency.raw()
        );
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        timings::presets,
        viewport::{FrameMemory, HeapAllocator},
    };
    use pretty_assertions::assert_eq;

    struct Setup {
        timings: Timings,
        scanlines: ScanlineBuffers,
        frame: FrameBuffer,
        chain: DescriptorChain,
    }

    fn setup(modeline: &str, width: i32, height: i32, double_buffered: bool) -> Setup {
        let timings = Timings::from_modeline(modeline).unwrap();
        let mut geometry = ViewGeometry::new(&timings, width, height);
        let frame: FrameBuffer = FrameMemory::allocate(
            &mut HeapAllocator,
            geometry.width as usize,
            geometry.height as usize,
            double_buffered,
            10,
        )
        .unwrap()
        .into();
        geometry.height = frame.height();
        let mut chain = DescriptorChain::new(double_buffered);
        chain.build_frame(&timings, &geometry, &frame);
        Setup {
            scanlines: ScanlineBuffers::new(&timings),
            timings,
            frame,
            chain,
        }
    }

    #[test]
    fn chain_length_matches_required_count() {
        let s = setup(presets::VGA_640X480_60HZ, 0, 0, false);
        assert_eq!(s.chain.len(), 525 + 480);
        assert_eq!(s.chain.frame().count(), s.chain.len());

        let s = setup(presets::VGA_640X480_60HZ, 320, 200, false);
        assert_eq!(s.chain.len(), 525 - 200 + 200 * 3);
    }

    #[test]
    fn frame_plays_every_line_once() {
        for modeline in presets::ALL {
            for (w, h) in [(0, 0), (200, 100), (100, 50)] {
                let s = setup(modeline, w, h, false);
                let line = s.timings.h_line_size() as usize;
                let scan = usize::from(s.timings.scan_count);
                let bytes: usize = s.chain.play(&s.scanlines, s.frame.memory()).map(<[u8]>::len).sum();
                assert_eq!(bytes, scan * s.timings.v_lines() as usize * line, "{modeline}");

                let vsync = s
                    .chain
                    .frame()
                    .filter(|d| matches!(d.source, Source::Blank { line: BlankLine::VSync, .. }))
                    .count();
                assert_eq!(vsync, scan * s.timings.v_sync_pulse as usize, "{modeline}");
            }
        }
    }

    #[test]
    fn descriptors_link_back_to_the_head() {
        let s = setup(presets::VGA_400X300_60HZ, 0, 0, false);
        let descriptors = s.chain.drawing().descriptors();
        assert_eq!(descriptors.last().map(|d| d.next), Some(Link::Head));
        assert_eq!(descriptors[0].next, Link::Next(1));
        assert!(descriptors.iter().all(|d| d.owner && d.size as usize % 4 == 0));
    }

    #[test]
    fn view_segments_carry_pixels() {
        let mut s = setup(presets::VGA_640X480_60HZ, 0, 0, false);
        s.frame.fill_row(0, 0, 639, 0xC3);
        let first = s.chain.play(&s.scanlines, s.frame.memory()).nth(1).unwrap();
        assert_eq!(first.len(), 640);
        assert!(first.iter().all(|&b| b == 0xC3));
    }

    #[test]
    fn multi_scan_blank_repeats_are_blank() {
        let mut s = setup(presets::VGA_320X200_75HZ_RETRO, 0, 0, false);
        s.frame.fill(0xC3);
        let views: Vec<&[u8]> = s
            .chain
            .frame()
            .filter(|d| d.length == 320)
            .map(|d| d.bytes(&s.scanlines, s.frame.memory()))
            .collect();
        assert_eq!(views.len(), 400);
        assert!(views[0].iter().all(|&b| b == 0xC3));
        assert!(views[1].iter().all(|&b| b & 0x3F == 0));
    }

    #[test]
    fn swapping_banks_moves_the_head() {
        let mut s = setup(presets::VGA_640X480_60HZ, 320, 200, true);
        assert_eq!(s.chain.head().next, Some(Bank::B));
        assert_eq!(s.chain.visible().bank(), Bank::B);

        let drawing_row = s.frame.drawing().get(0);
        let visible_row = s.frame.visible().get(0);
        let view = |c: &DescriptorChain| {
            c.frame()
                .find_map(|d| match d.source {
                    Source::Row(id) => Some(id),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(view(&s.chain), visible_row);

        s.chain.swap_banks();
        s.frame.swap_buffers();
        assert_eq!(s.chain.head().next, Some(Bank::A));
        assert_eq!(view(&s.chain), drawing_row);
        assert_eq!(s.frame.visible().get(0), drawing_row);
    }

    #[test]
    fn repointing_follows_row_swaps() {
        let mut s = setup(presets::VGA_640X480_60HZ, 0, 0, false);
        let rows = |c: &DescriptorChain| -> Vec<RowId> {
            c.frame()
                .filter_map(|d| match d.source {
                    Source::Row(id) => Some(id),
                    _ => None,
                })
                .collect()
        };
        let before = rows(&s.chain);
        s.frame.swap_rows(0, 479);
        s.chain.repoint_rows(&s.frame, 0, 479);
        let after = rows(&s.chain);
        assert_eq!(after[0], before[479]);
        assert_eq!(after[479], before[0]);
        assert_eq!(after[1..479], before[1..479]);
    }
}

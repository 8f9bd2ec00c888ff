//! Viewport memory: rows of raw pixels carved out of a handful of DMA
//! capable pools, and the row tables the DMA chain and the primitives
//! address them through.

use alloc::{vec, vec::Vec};
use core::mem;

use crate::{error::Error, geometry::Rect, timings::Timings};

/// Physical byte of logical column `x` within a row.
///
/// The DMA engine shifts out 32 bit words half-word swapped, so logical
/// pixels 0, 1, 2, 3 of a word live at bytes 2, 3, 0, 1.
#[inline(always)]
pub const fn swizzle(x: usize) -> usize {
    x ^ 2
}

/// Position and size of the viewport within the visible area
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ViewGeometry {
    pub width: i32,
    pub height: i32,
    /// First visible column covered by the viewport
    pub col: i32,
    /// First visible line covered by the viewport
    pub row: i32,
}

impl ViewGeometry {
    /// Centers a `width` x `height` viewport inside the visible area.
    /// Zero, negative or oversized requests select the whole visible area.
    /// Width and both offsets are rounded down to a multiple of four.
    pub fn new(timings: &Timings, width: i32, height: i32) -> ViewGeometry {
        let h_visible = i32::from(timings.h_visible_area);
        let v_visible = i32::from(timings.v_visible_area);
        let width = !3 & if width <= 0 || width >= h_visible {
            h_visible
        } else {
            width
        };
        let height = if height <= 0 || height >= v_visible {
            v_visible
        } else {
            height
        };
        ViewGeometry {
            width,
            height,
            col: ((h_visible - width) / 2) & !3,
            row: ((v_visible - height) / 2) & !3,
        }
    }

    /// Blank pixels between the viewport and the right edge of the visible area
    pub fn right_pad(&self, timings: &Timings) -> i32 {
        i32::from(timings.h_visible_area) - self.width - self.col
    }

    /// Whether visible line `line` is scanned out of a viewport row
    pub fn covers_line(&self, line: i32) -> bool {
        line >= self.row && line < self.row + self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }
}

/// Source of DMA capable memory
pub trait DmaAllocator {
    /// Size in bytes of the largest block [`DmaAllocator::allocate`] can currently satisfy
    fn largest_free_block(&self) -> usize;

    fn allocate(&mut self, bytes: usize) -> Option<Vec<u8>>;

    /// Returns `bytes` previously handed out by [`DmaAllocator::allocate`]
    fn release(&mut self, bytes: usize) {
        let _ = bytes;
    }
}

/// The global heap, which never runs out on the host
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapAllocator;

impl DmaAllocator for HeapAllocator {
    fn largest_free_block(&self) -> usize {
        isize::MAX as usize
    }

    fn allocate(&mut self, bytes: usize) -> Option<Vec<u8>> {
        Some(vec![0; bytes])
    }
}

/// A fixed budget of memory that is only available in blocks of at most
/// `max_block` bytes, the way a fragmented DMA heap behaves.
#[derive(Debug, Clone, Copy)]
pub struct LimitedAllocator {
    free: usize,
    max_block: usize,
}

impl LimitedAllocator {
    pub const fn new(free: usize, max_block: usize) -> LimitedAllocator {
        LimitedAllocator { free, max_block }
    }

    pub fn free(&self) -> usize {
        self.free
    }
}

impl DmaAllocator for LimitedAllocator {
    fn largest_free_block(&self) -> usize {
        self.free.min(self.max_block)
    }

    fn allocate(&mut self, bytes: usize) -> Option<Vec<u8>> {
        if bytes > self.largest_free_block() {
            return None;
        }
        self.free -= bytes;
        Some(vec![0; bytes])
    }

    fn release(&mut self, bytes: usize) {
        self.free += bytes;
    }
}

/// Location of one row: pool index and byte offset within the pool
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct RowId {
    pub pool: u16,
    pub offset: u32,
}

/// Pools of rows, each pool one allocation
#[derive(Debug, Default)]
pub struct FrameMemory {
    pools: Vec<Vec<u8>>,
    width: usize,
}

/// Memory handed out for a viewport, with as many rows as the allocator
/// could provide.
#[derive(Debug)]
pub struct Allocation {
    pub memory: FrameMemory,
    pub drawing: ViewPort,
    pub visible: Option<ViewPort>,
    pub requested_rows: usize,
    /// Rows in each of the drawing and visible buffers
    pub achieved_rows: usize,
}

impl FrameMemory {
    /// Requests the largest free block over and over, up to `max_pools`
    /// times, until `rows` rows (twice that when double buffered) of
    /// `width` bytes are covered.
    pub fn allocate(
        allocator: &mut dyn DmaAllocator,
        width: usize,
        rows: usize,
        double_buffered: bool,
        max_pools: usize,
    ) -> Result<Allocation, Error> {
        let mut remaining = if double_buffered { rows * 2 } else { rows };
        let mut memory = FrameMemory {
            pools: Vec::new(),
            width,
        };
        let mut ids = Vec::with_capacity(remaining);

        while remaining > 0 && memory.pools.len() < max_pools {
            let lines = remaining.min(allocator.largest_free_block().checked_div(width).unwrap_or(0));
            if lines == 0 {
                break;
            }
            let Some(pool) = allocator.allocate(lines * width) else {
                break;
            };
            let index = memory.pools.len() as u16;
            ids.extend((0..lines).map(|l| RowId {
                pool: index,
                offset: (l * width) as u32,
            }));
            memory.pools.push(pool);
            remaining -= lines;
        }

        let achieved_rows = if double_buffered {
            ids.len() / 2
        } else {
            ids.len()
        };
        if achieved_rows == 0 {
            memory.release(allocator);
            return Err(Error::OutOfMemory);
        }
        if achieved_rows < rows {
            log::warn!(
                "viewport degraded to {} of {} rows in {} pools",
                achieved_rows,
                rows,
                memory.pools.len()
            );
        }

        let visible = double_buffered.then(|| {
            let mut back = ids.split_off(achieved_rows);
            back.truncate(achieved_rows);
            ViewPort(back)
        });
        Ok(Allocation {
            memory,
            drawing: ViewPort(ids),
            visible,
            requested_rows: rows,
            achieved_rows,
        })
    }

    /// Hands every pool back to `allocator`
    pub fn release(self, allocator: &mut dyn DmaAllocator) {
        for pool in self.pools {
            allocator.release(pool.len());
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    #[inline(always)]
    pub fn row(&self, id: RowId) -> &[u8] {
        let start = id.offset as usize;
        &self.pools[id.pool as usize][start..start + self.width]
    }

    #[inline(always)]
    pub fn row_mut(&mut self, id: RowId) -> &mut [u8] {
        let start = id.offset as usize;
        &mut self.pools[id.pool as usize][start..start + self.width]
    }

    /// Two distinct rows at once
    pub fn two_rows_mut(&mut self, a: RowId, b: RowId) -> (&mut [u8], &mut [u8]) {
        assert_ne!(a, b, "a row cannot be borrowed twice");
        let width = self.width;
        let (a_start, b_start) = (a.offset as usize, b.offset as usize);
        if a.pool == b.pool {
            let pool = &mut self.pools[a.pool as usize];
            if a_start < b_start {
                let (lo, hi) = pool.split_at_mut(b_start);
                (&mut lo[a_start..a_start + width], &mut hi[..width])
            } else {
                let (lo, hi) = pool.split_at_mut(a_start);
                (&mut hi[..width], &mut lo[b_start..b_start + width])
            }
        } else {
            let (ai, bi) = (a.pool as usize, b.pool as usize);
            if ai < bi {
                let (lo, hi) = self.pools.split_at_mut(bi);
                (
                    &mut lo[ai][a_start..a_start + width],
                    &mut hi[0][b_start..b_start + width],
                )
            } else {
                let (lo, hi) = self.pools.split_at_mut(ai);
                (
                    &mut hi[0][a_start..a_start + width],
                    &mut lo[bi][b_start..b_start + width],
                )
            }
        }
    }
}

/// Row table of one buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewPort(Vec<RowId>);

impl ViewPort {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, y: usize) -> RowId {
        self.0[y]
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.0.swap(a, b);
    }

    pub fn rows(&self) -> &[RowId] {
        &self.0
    }
}

/// The pixel addressable viewport: memory plus the drawing row table and,
/// when double buffered, the visible one.
///
/// Pixel coordinates here are viewport coordinates; origin and clipping
/// are the caller's business. Out of range accesses through the unchecked
/// accessors panic.
#[derive(Debug)]
pub struct FrameBuffer {
    memory: FrameMemory,
    drawing: ViewPort,
    visible: Option<ViewPort>,
    width: i32,
    height: i32,
}

impl From<Allocation> for FrameBuffer {
    fn from(allocation: Allocation) -> FrameBuffer {
        FrameBuffer {
            width: allocation.memory.width as i32,
            height: allocation.achieved_rows as i32,
            memory: allocation.memory,
            drawing: allocation.drawing,
            visible: allocation.visible,
        }
    }
}

impl FrameBuffer {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_double_buffered(&self) -> bool {
        self.visible.is_some()
    }

    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    pub fn memory(&self) -> &FrameMemory {
        &self.memory
    }

    pub fn into_memory(self) -> FrameMemory {
        self.memory
    }

    /// Row table primitives draw into
    pub fn drawing(&self) -> &ViewPort {
        &self.drawing
    }

    /// Row table being scanned out; the drawing one when single buffered
    pub fn visible(&self) -> &ViewPort {
        self.visible.as_ref().unwrap_or(&self.drawing)
    }

    #[inline(always)]
    pub fn row(&self, y: i32) -> &[u8] {
        self.memory.row(self.drawing.get(y as usize))
    }

    #[inline(always)]
    pub fn row_mut(&mut self, y: i32) -> &mut [u8] {
        self.memory.row_mut(self.drawing.get(y as usize))
    }

    /// Two distinct rows of the drawing buffer
    pub fn two_rows_mut(&mut self, a: i32, b: i32) -> (&mut [u8], &mut [u8]) {
        let (a, b) = (self.drawing.get(a as usize), self.drawing.get(b as usize));
        self.memory.two_rows_mut(a, b)
    }

    #[inline(always)]
    pub fn pixel(&self, x: i32, y: i32) -> u8 {
        self.row(y)[swizzle(x as usize)]
    }

    #[inline(always)]
    pub fn set_pixel_unchecked(&mut self, x: i32, y: i32, raw: u8) {
        self.row_mut(y)[swizzle(x as usize)] = raw;
    }

    pub fn get_pixel(&self, x: i32, y: i32) -> Option<u8> {
        self.bounds().contains(x, y).then(|| self.pixel(x, y))
    }

    /// Writes the pixel if it lies inside the viewport
    pub fn set_pixel(&mut self, x: i32, y: i32, raw: u8) -> bool {
        let inside = self.bounds().contains(x, y);
        if inside {
            self.set_pixel_unchecked(x, y, raw);
        }
        inside
    }

    /// Fills columns `x1..=x2` of row `y`, a word at a time where possible.
    /// The range must already be clipped.
    pub fn fill_row(&mut self, y: i32, x1: i32, x2: i32, raw: u8) {
        if x1 > x2 {
            return;
        }
        let row = self.row_mut(y);
        let (start, end) = (x1 as usize, x2 as usize + 1);
        let head = ((start + 3) & !3).min(end);
        let tail = (end & !3).max(head);
        for x in start..head {
            row[swizzle(x)] = raw;
        }
        // a uniform word reads the same in either byte order
        row[head..tail].fill(raw);
        for x in tail..end {
            row[swizzle(x)] = raw;
        }
    }

    /// Exchanges columns `x1..=x2` between rows `a` and `b`
    pub fn swap_row_pixels(&mut self, a: i32, b: i32, x1: i32, x2: i32) {
        if a == b || x1 > x2 {
            return;
        }
        let (ra, rb) = self.two_rows_mut(a, b);
        for x in x1 as usize..=x2 as usize {
            mem::swap(&mut ra[swizzle(x)], &mut rb[swizzle(x)]);
        }
    }

    /// Exchanges two rows of the drawing table without moving pixels
    pub fn swap_rows(&mut self, a: i32, b: i32) {
        self.drawing.swap(a as usize, b as usize);
    }

    pub fn fill(&mut self, raw: u8) {
        for y in 0..self.height {
            self.row_mut(y).fill(raw);
        }
    }

    /// Exchanges the drawing and visible tables; a no-op when single buffered
    pub fn swap_buffers(&mut self) {
        if let Some(visible) = self.visible.as_mut() {
            mem::swap(&mut self.drawing, visible);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::timings::presets;
    use pretty_assertions::assert_eq;

    fn frame(width: usize, rows: usize, double_buffered: bool) -> FrameBuffer {
        FrameMemory::allocate(&mut HeapAllocator, width, rows, double_buffered, 10)
            .unwrap()
            .into()
    }

    #[test]
    fn swizzle_swaps_half_words() {
        let physical: Vec<usize> = (0..8).map(swizzle).collect();
        assert_eq!(physical, [2, 3, 0, 1, 6, 7, 4, 5]);
    }

    #[test]
    fn geometry_centers_and_aligns() {
        let t = Timings::from_modeline(presets::VGA_640X480_60HZ).unwrap();
        let full = ViewGeometry::new(&t, 0, 0);
        assert_eq!(full, ViewGeometry { width: 640, height: 480, col: 0, row: 0 });
        assert_eq!(full.right_pad(&t), 0);

        let g = ViewGeometry::new(&t, 322, 201);
        assert_eq!(g, ViewGeometry { width: 320, height: 201, col: 160, row: 136 });
        assert_eq!(g.right_pad(&t), 160);
        assert!(g.covers_line(136) && g.covers_line(336) && !g.covers_line(337));
    }

    #[test]
    fn pixels_are_stored_swizzled() {
        let mut fb = frame(8, 2, false);
        fb.set_pixel_unchecked(0, 1, 0xAA);
        assert_eq!(fb.row(1)[2], 0xAA);
        assert_eq!(fb.pixel(0, 1), 0xAA);
        assert_eq!(fb.get_pixel(8, 0), None);
        assert!(!fb.set_pixel(-1, 0, 1));
    }

    #[test]
    fn fill_row_matches_pixel_writes() {
        for (x1, x2) in [(0, 15), (1, 2), (3, 12), (5, 5), (2, 13), (4, 7)] {
            let mut fast = frame(16, 1, false);
            let mut slow = frame(16, 1, false);
            fast.fill_row(0, x1, x2, 0x15);
            for x in x1..=x2 {
                slow.set_pixel_unchecked(x, 0, 0x15);
            }
            assert_eq!(fast.row(0), slow.row(0), "{x1}..={x2}");
        }
    }

    #[test]
    fn degraded_allocation_reports_achieved_rows() {
        // 3 pools of at most 2 rows of 64 bytes
        let mut allocator = LimitedAllocator::new(64 * 6, 128);
        let allocation = FrameMemory::allocate(&mut allocator, 64, 10, false, 10).unwrap();
        assert_eq!(allocation.achieved_rows, 6);
        assert_eq!(allocation.memory.pool_count(), 3);
        assert_eq!(allocator.free(), 0);

        allocation.memory.release(&mut allocator);
        assert_eq!(allocator.free(), 64 * 6);
    }

    #[test]
    fn pool_count_is_bounded() {
        let mut allocator = LimitedAllocator::new(1 << 20, 64);
        let allocation = FrameMemory::allocate(&mut allocator, 64, 100, false, 4).unwrap();
        assert_eq!(allocation.achieved_rows, 4);
    }

    #[test]
    fn no_memory_is_an_error() {
        let mut allocator = LimitedAllocator::new(32, 32);
        assert_eq!(
            FrameMemory::allocate(&mut allocator, 64, 10, false, 10).unwrap_err(),
            Error::OutOfMemory
        );
        assert_eq!(allocator.free(), 32);
    }

    #[test]
    fn double_buffering_splits_rows_evenly() {
        let mut allocator = LimitedAllocator::new(16 * 7, 16 * 7);
        let allocation = FrameMemory::allocate(&mut allocator, 16, 10, true, 10).unwrap();
        assert_eq!(allocation.achieved_rows, 3);
        assert_eq!(allocation.drawing.len(), 3);
        assert_eq!(allocation.visible.as_ref().map(ViewPort::len), Some(3));

        let mut fb = FrameBuffer::from(allocation);
        fb.set_pixel_unchecked(0, 0, 7);
        fb.swap_buffers();
        assert_eq!(fb.pixel(0, 0), 0);
        fb.swap_buffers();
        assert_eq!(fb.pixel(0, 0), 7);
    }

    #[test]
    fn rows_swap_without_copying() {
        let mut fb = frame(8, 4, false);
        fb.fill_row(0, 0, 7, 1);
        fb.fill_row(3, 0, 7, 3);
        let before = fb.drawing().clone();
        fb.swap_rows(0, 3);
        assert_eq!(fb.pixel(5, 0), 3);
        assert_eq!(fb.pixel(5, 3), 1);
        fb.swap_rows(0, 3);
        assert_eq!(fb.drawing(), &before);

        fb.swap_row_pixels(0, 3, 0, 1);
        assert_eq!((fb.pixel(0, 0), fb.pixel(1, 0), fb.pixel(2, 0)), (3, 3, 1));
    }
}

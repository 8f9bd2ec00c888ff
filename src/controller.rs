//! The display controller: owns the screen, the primitive queue and the
//! sprites, and is the one place the pieces are wired together.
//!
//! Producers call [`VgaController::add_primitive`] from anywhere; the board
//! crate calls [`VgaController::on_vertical_retrace`] from its VSync
//! interrupt (or a task woken by it) to drain the queue while the beam is
//! outside the viewport.

use core::{
    cell::RefCell,
    hint,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use alloc::vec::Vec;
use critical_section::Mutex;
use embedded_graphics::prelude::Point;
use fugit::{MicrosDurationU32, MicrosDurationU64};

use crate::{
    clock::{self, Clock},
    color::{PixelFormat, Rgb222, COLOR_MASK},
    config::ControllerConfig,
    dma::{DescriptorChain, ScanoutEngine},
    error::{Error, Result},
    geometry::Rect,
    paint::{PaintState, Painter},
    primitive::Primitive,
    queue::{self, Receiver, Sender, TrySendError},
    scanline::ScanlineBuffers,
    sprite::{Cursor, Sprite, SpriteLayer},
    timings::Timings,
    viewport::{swizzle, DmaAllocator, FrameBuffer, FrameMemory, ViewGeometry},
};

/// Everything that exists only while a resolution is set
struct Screen {
    timings: Timings,
    geometry: ViewGeometry,
    format: PixelFormat,
    frame: FrameBuffer,
    chain: DescriptorChain,
    scanlines: ScanlineBuffers,
    paint: PaintState,
    budget: MicrosDurationU32,
}

impl Screen {
    fn painter<'a>(&'a mut self, sprites: &'a mut SpriteLayer, config: &ControllerConfig) -> Painter<'a> {
        Painter {
            frame: &mut self.frame,
            chain: &mut self.chain,
            sprites,
            state: &mut self.paint,
            format: self.format,
            depth: config.channel_depth,
        }
    }

    fn rebuild(&mut self) {
        self.scanlines.fill(&self.timings);
        self.chain.build_frame(&self.timings, &self.geometry, &self.frame);
        self.budget = self.timings.retrace_budget(self.geometry.row);
    }
}

struct Inner<A, E> {
    allocator: A,
    engine: E,
    screen: Option<Screen>,
    sprites: SpriteLayer,
}

impl<A: DmaAllocator, E: ScanoutEngine> Inner<A, E> {
    fn configure(
        &mut self,
        config: &ControllerConfig,
        timings: Timings,
        width: i32,
        height: i32,
        double_buffered: bool,
    ) -> Result<ViewGeometry> {
        self.release();

        let geometry = ViewGeometry::new(&timings, width, height);
        let allocation = FrameMemory::allocate(
            &mut self.allocator,
            geometry.width as usize,
            geometry.height as usize,
            double_buffered,
            config.memory_pool_count,
        )?;
        let mut frame = FrameBuffer::from(allocation);
        let geometry = ViewGeometry {
            height: frame.height(),
            ..geometry
        };

        let format = timings.pixel_format();
        frame.fill(format.pixel(Rgb222::default()));
        if frame.is_double_buffered() {
            frame.swap_buffers();
            frame.fill(format.pixel(Rgb222::default()));
            frame.swap_buffers();
        }

        let scanlines = ScanlineBuffers::new(&timings);
        let mut chain = DescriptorChain::new(frame.is_double_buffered());
        chain.build_frame(&timings, &geometry, &frame);
        let budget = timings.retrace_budget(geometry.row);

        self.engine.start(timings.frequency, &chain);
        self.sprites.invalidate();
        self.sprites.set_double_buffered(frame.is_double_buffered());

        log::info!(
            "{}: {}x{} viewport at ({}, {}), {} descriptors, {}us retrace budget",
            timings.label,
            geometry.width,
            geometry.height,
            geometry.col,
            geometry.row,
            chain.len(),
            budget.ticks()
        );

        self.screen = Some(Screen {
            paint: PaintState::new(frame.bounds()),
            timings,
            geometry,
            format,
            frame,
            chain,
            scanlines,
            budget,
        });
        Ok(geometry)
    }

    /// Stops the scan-out and hands the viewport memory back
    fn release(&mut self) {
        if let Some(screen) = self.screen.take() {
            self.engine.stop();
            self.sprites.invalidate();
            screen.frame.into_memory().release(&mut self.allocator);
        }
    }
}

/// A VGA display controller over an allocator of DMA memory `A`, the
/// scan-out hardware `E` and a microsecond clock `C`.
///
/// Every method takes `&self`, so the controller can live in a `static`
/// shared by the application and the VSync handler. Closures passed to the
/// `with_*` methods run inside a critical section and must not call back
/// into the controller.
pub struct VgaController<A, E, C> {
    config: ControllerConfig,
    sender: Sender<Primitive>,
    receiver: Receiver<Primitive>,
    inner: Mutex<RefCell<Inner<A, E>>>,
    clock: C,
    suspended: AtomicU32,
    background: AtomicBool,
    timeout: AtomicBool,
    double_buffered: AtomicBool,
}

impl<A: DmaAllocator, E: ScanoutEngine, C: Clock> VgaController<A, E, C> {
    pub fn new(config: ControllerConfig, allocator: A, engine: E, clock: C) -> Self {
        let (sender, receiver) = queue::channel(config.queue_capacity);
        VgaController {
            sender,
            receiver,
            inner: Mutex::new(RefCell::new(Inner {
                allocator,
                engine,
                screen: None,
                sprites: SpriteLayer::new(),
            })),
            clock,
            suspended: AtomicU32::new(0),
            background: AtomicBool::new(config.background_execution),
            timeout: AtomicBool::new(config.background_timeout),
            double_buffered: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner<A, E>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    fn with_screen<R>(&self, f: impl FnOnce(&mut Screen, &mut SpriteLayer) -> R) -> Result<R> {
        self.with_inner(|inner| {
            let screen = inner.screen.as_mut().ok_or(Error::NotConfigured)?;
            Ok(f(screen, &mut inner.sprites))
        })
    }

    fn with_painter<R>(&self, f: impl FnOnce(&mut Painter<'_>) -> R) -> Result<R> {
        self.with_screen(|screen, sprites| f(&mut screen.painter(sprites, &self.config)))
    }

    /// Decodes `modeline` and switches to it; see [`VgaController::set_timings`]
    pub fn set_resolution(
        &self,
        modeline: &str,
        width: i32,
        height: i32,
        double_buffered: bool,
    ) -> Result<ViewGeometry> {
        let timings = Timings::from_modeline(modeline)?;
        self.set_timings(timings, width, height, double_buffered)
    }

    /// Replaces the current screen with a `width` x `height` viewport
    /// centered in `timings` (non-positive sizes take the whole visible
    /// area). The returned geometry carries the height actually allocated.
    ///
    /// Invalid timings leave the current screen untouched.
    pub fn set_timings(
        &self,
        timings: Timings,
        width: i32,
        height: i32,
        double_buffered: bool,
    ) -> Result<ViewGeometry> {
        timings.validate()?;

        self.suspend_background_primitive_execution();
        let result = self.with_inner(|inner| {
            inner.configure(&self.config, timings, width, height, double_buffered)
        });
        let actual = self.with_inner(|inner| {
            inner
                .screen
                .as_ref()
                .is_some_and(|s| s.frame.is_double_buffered())
        });
        self.double_buffered.store(actual, Ordering::Release);
        self.resume_background_primitive_execution();
        result
    }

    /// Moves the picture on the monitor by shifting porch time: positive
    /// `x` moves it right, positive `y` down
    pub fn move_screen(&self, x: i32, y: i32) -> Result<()> {
        self.with_screen(|screen, _| {
            screen.timings.shift_horizontal(x);
            screen.timings.shift_vertical(y);
            screen.rebuild();
        })
    }

    /// Grows the porches (`4 * x` pixels and `y` lines per side) so the
    /// picture shrinks on the monitor, then reapplies the resolution
    pub fn shrink_screen(&self, x: i32, y: i32) -> Result<ViewGeometry> {
        let (mut timings, geometry, double_buffered) = self.with_screen(|screen, _| {
            (
                screen.timings.clone(),
                screen.geometry,
                screen.frame.is_double_buffered(),
            )
        })?;
        timings.shrink(x, y);
        self.set_timings(timings, geometry.width, geometry.height, double_buffered)
    }

    /// Adds a primitive, blocking while the queue is full
    pub fn add_primitive(&self, primitive: Primitive) -> Result<()> {
        nb::block!(self.try_add_primitive(&primitive))
    }

    /// Queues `primitive` for the next retrace, or executes it right away
    /// (redrawing the sprites) when background execution is off or the
    /// screen is double buffered. `SwapBuffers` is always queued, and
    /// anything added while the queue is not empty waits behind it, so
    /// drawing for the next frame never lands before a pending swap.
    pub fn try_add_primitive(&self, primitive: &Primitive) -> nb::Result<(), Error> {
        let queued = matches!(primitive, Primitive::SwapBuffers)
            || (self.background.load(Ordering::Acquire)
                && !self.double_buffered.load(Ordering::Acquire))
            || !self.receiver.is_empty();
        if queued {
            return match self.sender.try_send(primitive.clone()) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(nb::Error::WouldBlock),
                Err(TrySendError::Closed(_)) => Err(nb::Error::Other(Error::Closed)),
            };
        }
        self.with_painter(|painter| {
            painter.execute(primitive);
            painter.show_sprites();
        })
        .map_err(nb::Error::Other)
    }

    /// The consumer entry point: drains queued primitives until the retrace
    /// budget is spent. A `SwapBuffers` only ever runs first in a window;
    /// met later, it goes back to the head of the queue for the next one.
    pub fn on_vertical_retrace(&self) {
        if self.suspended.load(Ordering::Acquire) > 0 || self.receiver.is_empty() {
            return;
        }
        let timeout = self.timeout.load(Ordering::Acquire);
        let _ = self.with_screen(|screen, sprites| {
            let start = self.clock.now();
            let deadline = start + MicrosDurationU64::from_ticks(u64::from(screen.budget.ticks()));
            let mut painter = screen.painter(sprites, &self.config);
            let mut executed = 0usize;
            while let Ok(primitive) = self.receiver.try_recv() {
                if executed > 0 && matches!(primitive, Primitive::SwapBuffers) {
                    self.receiver.requeue(primitive);
                    break;
                }
                painter.execute(&primitive);
                executed += 1;
                if timeout && self.clock.now() >= deadline {
                    break;
                }
            }
            painter.show_sprites();

            #[cfg(feature = "perf_log")]
            log::debug!(
                "retrace: {} primitives in {}us, {} left",
                executed,
                self.clock
                    .now()
                    .checked_duration_since(start)
                    .map_or(0, |d| d.ticks()),
                self.receiver.len()
            );
        });
    }

    /// Executes everything queued right now, without waiting for a retrace
    /// (so without any tearing protection)
    pub fn process_primitives(&self) -> Result<()> {
        self.suspend_background_primitive_execution();
        let mut elapsed = MicrosDurationU64::from_ticks(0);
        let result = clock::measure(&self.clock, &mut elapsed, || {
            self.with_painter(|painter| {
                let mut executed = 0usize;
                for primitive in self.receiver.recv_all() {
                    painter.execute(&primitive);
                    executed += 1;
                }
                painter.show_sprites();
                executed
            })
        });
        self.resume_background_primitive_execution();
        let executed = result?;
        log::debug!("processed {} primitives in {}us", executed, elapsed.ticks());
        Ok(())
    }

    /// Waits until the queue is empty. While execution is suspended nobody
    /// else would drain it, so the caller does.
    pub fn primitives_execution_wait(&self) -> Result<()> {
        while !self.receiver.is_empty() {
            if self.suspended.load(Ordering::Acquire) > 0 {
                return self.process_primitives();
            }
            hint::spin_loop();
        }
        Ok(())
    }

    /// Stops [`VgaController::on_vertical_retrace`] from draining the
    /// queue. Nestable; every call needs a matching resume.
    ///
    /// Adding more than the queue capacity while suspended blocks forever
    /// unless [`VgaController::process_primitives`] is called.
    pub fn suspend_background_primitive_execution(&self) {
        self.suspended.fetch_add(1, Ordering::AcqRel);
    }

    pub fn resume_background_primitive_execution(&self) {
        let _ = self
            .suspended
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire) > 0
    }

    /// Switching background execution off first drains whatever is queued
    pub fn enable_background_primitive_execution(&self, enabled: bool) -> Result<()> {
        if !enabled && self.background.load(Ordering::Acquire) {
            match self.process_primitives() {
                Ok(()) | Err(Error::NotConfigured) => {}
                Err(e) => return Err(e),
            }
        }
        self.background.store(enabled, Ordering::Release);
        Ok(())
    }

    pub fn enable_background_primitive_timeout(&self, enabled: bool) {
        self.timeout.store(enabled, Ordering::Release);
    }

    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered.load(Ordering::Acquire)
    }

    /// Queues a buffer swap for the next retrace. Primitives added after it
    /// are queued too and run once the swap has happened.
    pub fn swap_buffers(&self) -> Result<()> {
        self.add_primitive(Primitive::SwapBuffers)
    }

    /// Installs a new set of sprites, handing back the previous one. The
    /// old sprites are taken off the screen first.
    pub fn set_sprites(&self, sprites: Vec<Sprite>) -> Vec<Sprite> {
        let old = self.with_inner(|inner| {
            if let Some(screen) = inner.screen.as_mut() {
                inner.sprites.hide(&mut screen.frame);
            }
            inner.sprites.replace(sprites)
        });
        let _ = self.refresh_sprites();
        old
    }

    /// Changes sprites in place (frames, flags) with the layer hidden, then
    /// queues a redraw
    pub fn update_sprites<R>(&self, f: impl FnOnce(&mut [Sprite]) -> R) -> R {
        let r = self.with_inner(|inner| {
            if let Some(screen) = inner.screen.as_mut() {
                inner.sprites.hide(&mut screen.frame);
            }
            let r = f(inner.sprites.sprites_mut());
            inner.sprites.reserve_backgrounds();
            r
        });
        let _ = self.refresh_sprites();
        r
    }

    /// Redraws the sprites, e.g. after they were moved
    pub fn refresh_sprites(&self) -> Result<()> {
        self.add_primitive(Primitive::RefreshSprites)
    }

    /// Shows `cursor` as the mouse pointer, or hides the pointer. The
    /// pointer position is kept across cursor changes.
    pub fn set_mouse_cursor(&self, cursor: Option<Cursor>) -> Result<()> {
        self.with_inner(|inner| {
            if let Some(screen) = inner.screen.as_mut() {
                inner.sprites.hide(&mut screen.frame);
            }
            let pointer = inner.sprites.cursor().position().get() + inner.sprites.hotspot();
            let sprites = &mut inner.sprites;
            sprites.cursor_mut().clear_bitmaps();
            match cursor {
                Some(Cursor { hotspot, bitmap }) => {
                    sprites.set_hotspot(hotspot);
                    let shape = sprites.cursor_mut();
                    shape.add_bitmap(bitmap);
                    shape.set_visible(true);
                    shape.move_to(pointer.x - hotspot.x, pointer.y - hotspot.y);
                }
                None => {
                    sprites.cursor_mut().set_visible(false);
                    sprites.set_hotspot(Point::zero());
                    sprites.cursor_mut().move_to(pointer.x, pointer.y);
                }
            }
            sprites.reserve_backgrounds();
        });
        self.refresh_sprites()
    }

    /// Moves the pointer so its hotspot lands on `(x, y)`
    pub fn set_mouse_cursor_pos(&self, x: i32, y: i32) -> Result<()> {
        self.with_inner(|inner| {
            let hotspot = inner.sprites.hotspot();
            inner.sprites.cursor().move_to(x - hotspot.x, y - hotspot.y);
        });
        self.refresh_sprites()
    }

    /// Position of the pointer's hotspot
    pub fn mouse_cursor_pos(&self) -> Point {
        self.with_inner(|inner| inner.sprites.cursor().position().get() + inner.sprites.hotspot())
    }

    /// Raw pixel byte for `color` with idle sync bits
    pub fn create_raw_pixel(&self, color: Rgb222) -> Result<u8> {
        self.with_screen(|screen, _| screen.format.pixel(color))
    }

    /// Writes a raw pixel straight into the drawing buffer, bypassing the
    /// queue. Returns whether `(x, y)` was inside the viewport.
    pub fn set_raw_pixel(&self, x: i32, y: i32, raw: u8) -> Result<bool> {
        self.with_screen(|screen, _| screen.frame.set_pixel(x, y, raw))
    }

    pub fn raw_pixel(&self, x: i32, y: i32) -> Result<Option<u8>> {
        self.with_screen(|screen, _| screen.frame.get_pixel(x, y))
    }

    /// Row `y` of the drawing buffer as raw bytes, left to right
    pub fn scanline(&self, y: i32) -> Result<Option<Vec<u8>>> {
        self.with_screen(|screen, _| {
            let frame = &screen.frame;
            (0..frame.height()).contains(&y).then(|| {
                let row = frame.row(y);
                (0..frame.width() as usize).map(|x| row[swizzle(x)]).collect()
            })
        })
    }

    /// Colors of the part of `rect` inside the viewport, row by row
    pub fn read_screen(&self, rect: Rect) -> Result<Vec<Rgb222>> {
        self.with_screen(|screen, _| {
            let frame = &screen.frame;
            let rect = rect.normalized();
            if !rect.intersects(&frame.bounds()) {
                return Vec::new();
            }
            let r = rect.clamp_to(&frame.bounds());
            let mut colors = Vec::with_capacity((r.width() * r.height()) as usize);
            for y in r.y1..=r.y2 {
                colors.extend((r.x1..=r.x2).map(|x| Rgb222::from_byte(frame.pixel(x, y) & COLOR_MASK)));
            }
            colors
        })
    }

    /// Writes `colors` over `rect` row by row; positions outside the
    /// viewport consume a color but are not written
    pub fn write_screen(&self, rect: Rect, colors: &[Rgb222]) -> Result<()> {
        self.with_screen(|screen, _| {
            let rect = rect.normalized();
            let positions = (rect.y1..=rect.y2).flat_map(|y| (rect.x1..=rect.x2).map(move |x| (x, y)));
            for ((x, y), &color) in positions.zip(colors) {
                screen.frame.set_pixel(x, y, screen.format.pixel(color));
            }
        })
    }

    /// Direct access to the frame buffer
    pub fn with_frame<R>(&self, f: impl FnOnce(&mut FrameBuffer) -> R) -> Result<R> {
        self.with_screen(|screen, _| f(&mut screen.frame))
    }

    /// The descriptor chain together with what its descriptors point into
    pub fn with_chain<R>(
        &self,
        f: impl FnOnce(&DescriptorChain, &ScanlineBuffers, &FrameMemory) -> R,
    ) -> Result<R> {
        self.with_screen(|screen, _| f(&screen.chain, &screen.scanlines, screen.frame.memory()))
    }

    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut A, &mut E) -> R) -> R {
        self.with_inner(|inner| f(&mut inner.allocator, &mut inner.engine))
    }

    pub fn paint_state(&self) -> Result<PaintState> {
        self.with_screen(|screen, _| screen.paint.clone())
    }

    pub fn geometry(&self) -> Option<ViewGeometry> {
        self.with_inner(|inner| inner.screen.as_ref().map(|s| s.geometry))
    }

    pub fn timings(&self) -> Option<Timings> {
        self.with_inner(|inner| inner.screen.as_ref().map(|s| s.timings.clone()))
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.with_inner(|inner| inner.screen.as_ref().map(|s| s.format))
    }

    /// Shortest time the retrace gives to drain the queue
    pub fn retrace_budget(&self) -> Option<MicrosDurationU32> {
        self.with_inner(|inner| inner.screen.as_ref().map(|s| s.budget))
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Closes the queue, stops the scan-out and frees the viewport.
    /// Primitives still queued are dropped.
    pub fn shutdown(&self) {
        self.sender.close();
        for _ in self.receiver.recv_all() {}
        self.with_inner(|inner| inner.release());
        self.double_buffered.store(false, Ordering::Release);
        log::info!("controller shut down");
    }
}

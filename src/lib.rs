//! A hardware independent VGA scan-out core: video timings, the DMA
//! descriptor chain that turns a frame buffer into a signal, and the
//! retrace synchronized primitive executor with sprites on top.
//!
//! A board crate supplies DMA capable memory ([`viewport::DmaAllocator`]),
//! the engine that clocks the chain out ([`dma::ScanoutEngine`]) and a
//! microsecond [`clock::Clock`], and calls
//! [`VgaController::on_vertical_retrace`] on every VSync.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod canvas;
pub mod clock;
pub mod color;
pub mod config;
pub mod controller;
pub mod dma;
pub mod error;
pub mod geometry;
pub mod paint;
pub mod primitive;
pub mod queue;
pub mod scanline;
pub mod sprite;
pub mod timings;
pub mod viewport;

pub use canvas::Canvas;
pub use color::Rgb222;
pub use config::ControllerConfig;
pub use controller::VgaController;
pub use error::{Error, Result};
pub use geometry::Rect;
pub use primitive::Primitive;
pub use timings::Timings;

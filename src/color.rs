use core::fmt::Display;

use embedded_graphics::{
    pixelcolor::raw::RawU8,
    prelude::{PixelColor, RawData, RgbColor},
};

pub const RED_BIT: u8 = 0;
pub const GREEN_BIT: u8 = 2;
pub const BLUE_BIT: u8 = 4;
pub const HSYNC_BIT: u8 = 6;
pub const VSYNC_BIT: u8 = 7;

/// Bits of a raw pixel that carry the sync signals rather than color
pub const SYNC_MASK: u8 = (1 << HSYNC_BIT) | (1 << VSYNC_BIT);
pub const COLOR_MASK: u8 = !SYNC_MASK;

/// Level of a sync pulse while it is asserted
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum SyncPolarity {
    Positive,
    #[default]
    Negative,
}

impl SyncPolarity {
    /// Bit value put on the wire for the given pulse state
    #[inline(always)]
    pub const fn level(self, asserted: bool) -> u8 {
        match self {
            SyncPolarity::Positive => asserted as u8,
            SyncPolarity::Negative => !asserted as u8,
        }
    }
}

/// A 6 bit (2 bits per color channel) RGB color, the native depth of
/// the scanline bus.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct Rgb222 {
    red: u8,
    green: u8,
    blue: u8,
}

impl Rgb222 {
    pub const fn new(r: u8, g: u8, b: u8) -> Rgb222 {
        Rgb222 {
            red: r & 0b11,
            green: g & 0b11,
            blue: b & 0b11,
        }
    }

    /// Quantizes 8 bit channels down to 2 bits each
    pub const fn from_rgb888(r: u8, g: u8, b: u8) -> Rgb222 {
        Rgb222::new(r >> 6, g >> 6, b >> 6)
    }

    /// Decodes the color bits of a raw pixel or bitmap byte, ignoring bits 6 and 7
    #[inline(always)]
    pub const fn from_byte(b: u8) -> Rgb222 {
        Rgb222::new(b >> RED_BIT, b >> GREEN_BIT, b >> BLUE_BIT)
    }

    /// `00BBGGRR`
    #[inline(always)]
    pub const fn to_byte(&self) -> u8 {
        self.blue << BLUE_BIT | self.green << GREEN_BIT | self.red << RED_BIT
    }

    /// Lowers every channel brighter than 2 by one step. Used for faint text.
    pub const fn faint(&self) -> Rgb222 {
        const fn dim(c: u8) -> u8 {
            if c > 2 {
                c - 1
            } else {
                c
            }
        }
        Rgb222 {
            red: dim(self.red),
            green: dim(self.green),
            blue: dim(self.blue),
        }
    }
}

impl Display for Rgb222 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Rgb222({}, {}, {})", self.red, self.green, self.blue)
    }
}

impl PixelColor for Rgb222 {
    type Raw = RawU8;
}

impl RgbColor for Rgb222 {
    fn r(&self) -> u8 {
        self.red
    }

    fn g(&self) -> u8 {
        self.green
    }

    fn b(&self) -> u8 {
        self.blue
    }

    const MAX_R: u8 = 3;
    const MAX_G: u8 = 3;
    const MAX_B: u8 = 3;

    const BLACK: Self = Rgb222::new(0, 0, 0);
    const WHITE: Self = Rgb222::new(Self::MAX_R, Self::MAX_G, Self::MAX_B);
    const RED: Self = Rgb222::new(Self::MAX_R, 0, 0);
    const GREEN: Self = Rgb222::new(0, Self::MAX_G, 0);
    const BLUE: Self = Rgb222::new(0, 0, Self::MAX_B);
    const YELLOW: Self = Rgb222::new(Self::MAX_R, Self::MAX_G, 0);
    const CYAN: Self = Rgb222::new(0, Self::MAX_G, Self::MAX_B);
    const MAGENTA: Self = Rgb222::new(Self::MAX_R, 0, Self::MAX_B);
}

impl From<RawU8> for Rgb222 {
    fn from(value: RawU8) -> Rgb222 {
        Rgb222::from_byte(value.into_inner())
    }
}

impl From<Rgb222> for RawU8 {
    fn from(value: Rgb222) -> RawU8 {
        RawU8::new(value.to_byte())
    }
}

/// Number of DAC bits wired per color channel
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ChannelDepth {
    /// 8 colors
    One,
    /// 64 colors
    #[default]
    Two,
}

/// The sixteen named colors addressable from glyph maps
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

// The low eight colors stay at level 1 so they remain visible with one
// bit per channel; 64 color wiring lifts Red through White to level 2.
static PALETTE_ONE_BIT: [Rgb222; 16] = [
    Rgb222::new(0, 0, 0),
    Rgb222::new(1, 0, 0),
    Rgb222::new(0, 1, 0),
    Rgb222::new(1, 1, 0),
    Rgb222::new(0, 0, 1),
    Rgb222::new(1, 0, 1),
    Rgb222::new(0, 1, 1),
    Rgb222::new(1, 1, 1),
    Rgb222::new(1, 1, 1),
    Rgb222::new(3, 0, 0),
    Rgb222::new(0, 3, 0),
    Rgb222::new(3, 3, 0),
    Rgb222::new(0, 0, 3),
    Rgb222::new(3, 0, 3),
    Rgb222::new(0, 3, 3),
    Rgb222::new(3, 3, 3),
];

static PALETTE_TWO_BIT: [Rgb222; 16] = [
    Rgb222::new(0, 0, 0),
    Rgb222::new(2, 0, 0),
    Rgb222::new(0, 2, 0),
    Rgb222::new(2, 2, 0),
    Rgb222::new(0, 0, 2),
    Rgb222::new(2, 0, 2),
    Rgb222::new(0, 2, 2),
    Rgb222::new(2, 2, 2),
    Rgb222::new(1, 1, 1),
    Rgb222::new(3, 0, 0),
    Rgb222::new(0, 3, 0),
    Rgb222::new(3, 3, 0),
    Rgb222::new(0, 0, 3),
    Rgb222::new(3, 0, 3),
    Rgb222::new(0, 3, 3),
    Rgb222::new(3, 3, 3),
];

impl Color {
    /// Maps the low nibble of `index` to a color
    pub const fn from_index(index: u8) -> Color {
        match index & 0x0F {
            0 => Color::Black,
            1 => Color::Red,
            2 => Color::Green,
            3 => Color::Yellow,
            4 => Color::Blue,
            5 => Color::Magenta,
            6 => Color::Cyan,
            7 => Color::White,
            8 => Color::BrightBlack,
            9 => Color::BrightRed,
            10 => Color::BrightGreen,
            11 => Color::BrightYellow,
            12 => Color::BrightBlue,
            13 => Color::BrightMagenta,
            14 => Color::BrightCyan,
            _ => Color::BrightWhite,
        }
    }

    pub fn rgb(self, depth: ChannelDepth) -> Rgb222 {
        match depth {
            ChannelDepth::One => PALETTE_ONE_BIT[self as usize],
            ChannelDepth::Two => PALETTE_TWO_BIT[self as usize],
        }
    }
}

/// Packs colors and sync state into raw scanline bytes
/// (`VSync:1 HSync:1 Blue:2 Green:2 Red:2`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct PixelFormat {
    pub hsync: SyncPolarity,
    pub vsync: SyncPolarity,
}

impl PixelFormat {
    pub const fn new(hsync: SyncPolarity, vsync: SyncPolarity) -> PixelFormat {
        PixelFormat { hsync, vsync }
    }

    #[inline(always)]
    pub const fn sync_bits(&self, hsync: bool, vsync: bool) -> u8 {
        self.vsync.level(vsync) << VSYNC_BIT | self.hsync.level(hsync) << HSYNC_BIT
    }

    /// Sync bits of a visible pixel: neither pulse asserted
    #[inline(always)]
    pub const fn idle_sync(&self) -> u8 {
        self.sync_bits(false, false)
    }

    #[inline(always)]
    pub const fn pixel(&self, color: Rgb222) -> u8 {
        self.idle_sync() | color.to_byte()
    }

    #[inline(always)]
    pub const fn pixel_with_sync(&self, color: Rgb222, hsync: bool, vsync: bool) -> u8 {
        self.sync_bits(hsync, vsync) | color.to_byte()
    }

    /// Inverts the color bits of a raw pixel, leaving the sync bits idle
    #[inline(always)]
    pub const fn invert(&self, raw: u8) -> u8 {
        self.idle_sync() | (!raw & COLOR_MASK)
    }
}

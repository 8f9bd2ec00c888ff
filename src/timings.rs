//! Video timings and the modeline decoder.
//!
//! A modeline describes one video mode on a single line, X11 style:
//!
//! ```text
//! "label" clockMHz hdisp hsyncstart hsyncend htotal vdisp vsyncstart vsyncend vtotal
//!         (+HSync|-HSync) (+VSync|-VSync) [DoubleScan|QuadScan]
//!         [FrontPorchBegins|SyncBegins|BackPorchBegins|VisibleBegins] [MultiScanBlank]
//! ```
//!
//! Only the sign of a polarity token and the first letter of an option
//! keyword are significant, so `-hsync` and `D` are accepted too.
//!
//! ```
//! use vgactl::timings::{presets, ScreenBlock, Timings};
//!
//! let t: Timings = presets::VGA_640X480_60HZ.parse().unwrap();
//! assert_eq!(t.h_line_size(), 800);
//! assert_eq!(t.v_lines(), 525);
//! assert_eq!(t.h_starting_block, ScreenBlock::FrontPorch);
//! ```

use core::{fmt::Display, str::FromStr};

use alloc::vec::Vec;
use fugit::{HertzU32, MicrosDurationU32};
use heapless::String;
use nom::{
    bytes::complete::{take_till, take_till1},
    character::complete::{char, i32 as int, space0, space1},
    combinator::all_consuming,
    multi::{count, many0},
    number::complete::double,
    sequence::{delimited, preceded, terminated, tuple},
    IResult,
};

use crate::color::{PixelFormat, SyncPolarity};

pub const LABEL_CAPACITY: usize = 22;

/// Which of the four horizontal blocks a scanline buffer starts with.
/// The blocks always follow each other in the same rotation:
/// front porch, sync, back porch, visible area.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum ScreenBlock {
    #[default]
    FrontPorch,
    Sync,
    BackPorch,
    VisibleArea,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timings {
    pub label: String<LABEL_CAPACITY>,
    pub frequency: HertzU32,
    pub h_visible_area: i16,
    pub h_front_porch: i16,
    pub h_sync_pulse: i16,
    pub h_back_porch: i16,
    pub v_visible_area: i16,
    pub v_front_porch: i16,
    pub v_sync_pulse: i16,
    pub v_back_porch: i16,
    pub h_sync_polarity: SyncPolarity,
    pub v_sync_polarity: SyncPolarity,
    /// 1 for normal modes, 2 when every row is scanned twice
    pub scan_count: u8,
    /// When double scanning, output the repeated scans of a row as black
    pub multi_scan_blank: bool,
    pub h_starting_block: ScreenBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelineError {
    #[error("malformed modeline at byte {offset}")]
    Syntax { offset: usize },
    #[error("label is {len} bytes, at most {LABEL_CAPACITY} fit")]
    LabelTooLong { len: usize },
    #[error("pixel clock must be positive")]
    Frequency,
    #[error("value at byte {offset} does not fit a timing field")]
    OutOfRange { offset: usize },
    #[error("unexpected option at byte {offset}")]
    UnknownOption { offset: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimingsError {
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("scan count {0} is not 1, 2 or 4")]
    ScanCount(u8),
}

impl Timings {
    pub fn from_modeline(modeline: &str) -> Result<Timings, ModelineError> {
        let (_, raw) = all_consuming(raw_modeline)(modeline).map_err(|e| {
            let offset = match e {
                nom::Err::Error(e) | nom::Err::Failure(e) => modeline.len() - e.input.len(),
                nom::Err::Incomplete(_) => modeline.len(),
            };
            ModelineError::Syntax { offset }
        })?;

        let mut label = String::new();
        label.push_str(raw.label).map_err(|_| ModelineError::LabelTooLong {
            len: raw.label.len(),
        })?;

        if !(raw.mhz > 0.0) || raw.mhz > 4_000.0 {
            return Err(ModelineError::Frequency);
        }
        // no_std has no f64::round; the clock is positive so truncating +0.5 rounds
        let hz = (raw.mhz * 1_000_000.0 + 0.5) as u32;

        let field = |value: i32, at: &str| -> Result<i16, ModelineError> {
            i16::try_from(value).map_err(|_| ModelineError::OutOfRange {
                offset: offset_of(modeline, at),
            })
        };
        let [hdisp, hss, hse, htotal, vdisp, vss, vse, vtotal] = raw.counts;

        let mut timings = Timings {
            label,
            frequency: HertzU32::from_raw(hz),
            h_visible_area: field(hdisp, raw.counts_at)?,
            h_front_porch: field(hss - hdisp, raw.counts_at)?,
            h_sync_pulse: field(hse - hss, raw.counts_at)?,
            h_back_porch: field(htotal - hse, raw.counts_at)?,
            v_visible_area: field(vdisp, raw.counts_at)?,
            v_front_porch: field(vss - vdisp, raw.counts_at)?,
            v_sync_pulse: field(vse - vss, raw.counts_at)?,
            v_back_porch: field(vtotal - vse, raw.counts_at)?,
            h_sync_polarity: SyncPolarity::Negative,
            v_sync_polarity: SyncPolarity::Negative,
            scan_count: 1,
            multi_scan_blank: false,
            h_starting_block: ScreenBlock::FrontPorch,
        };

        let mut polarities = 0;
        for word in raw.options {
            let unknown = || ModelineError::UnknownOption {
                offset: offset_of(modeline, word),
            };
            let first = word.chars().next().ok_or_else(unknown)?;
            match first.to_ascii_lowercase() {
                '+' | '-' => {
                    let polarity = if first == '+' {
                        SyncPolarity::Positive
                    } else {
                        SyncPolarity::Negative
                    };
                    match polarities {
                        0 => timings.h_sync_polarity = polarity,
                        1 => timings.v_sync_polarity = polarity,
                        _ => return Err(unknown()),
                    }
                    polarities += 1;
                }
                'd' => timings.scan_count = 2,
                'q' => timings.scan_count = 4,
                'f' => timings.h_starting_block = ScreenBlock::FrontPorch,
                's' => timings.h_starting_block = ScreenBlock::Sync,
                'b' => timings.h_starting_block = ScreenBlock::BackPorch,
                'v' => timings.h_starting_block = ScreenBlock::VisibleArea,
                'm' => timings.multi_scan_blank = true,
                _ => return Err(unknown()),
            }
        }

        Ok(timings)
    }

    /// Checks the derived segments describe a signal the scanline builder
    /// can produce. Parsing alone never rejects negative porches.
    pub fn validate(&self) -> Result<(), TimingsError> {
        let positive = [
            (self.h_visible_area, "horizontal visible area"),
            (self.h_sync_pulse, "horizontal sync pulse"),
            (self.v_visible_area, "vertical visible area"),
            (self.v_sync_pulse, "vertical sync pulse"),
        ];
        for (value, name) in positive {
            if value <= 0 {
                return Err(TimingsError::NotPositive(name));
            }
        }
        let porches = [
            (self.h_front_porch, "horizontal front porch"),
            (self.h_back_porch, "horizontal back porch"),
            (self.v_front_porch, "vertical front porch"),
            (self.v_back_porch, "vertical back porch"),
        ];
        for (value, name) in porches {
            if value < 0 {
                return Err(TimingsError::Negative(name));
            }
        }
        if self.frequency.raw() == 0 {
            return Err(TimingsError::NotPositive("pixel clock"));
        }
        if !matches!(self.scan_count, 1 | 2 | 4) {
            return Err(TimingsError::ScanCount(self.scan_count));
        }
        Ok(())
    }

    /// Pixel clocks in one scanline
    pub fn h_line_size(&self) -> i32 {
        i32::from(self.h_front_porch)
            + i32::from(self.h_sync_pulse)
            + i32::from(self.h_back_porch)
            + i32::from(self.h_visible_area)
    }

    /// Pixel clocks of a scanline outside the visible area
    pub fn h_invisible_size(&self) -> i32 {
        self.h_line_size() - i32::from(self.h_visible_area)
    }

    /// Lines in one frame, counted before scan doubling
    pub fn v_lines(&self) -> i32 {
        i32::from(self.v_visible_area)
            + i32::from(self.v_front_porch)
            + i32::from(self.v_sync_pulse)
            + i32::from(self.v_back_porch)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::new(self.h_sync_polarity, self.v_sync_polarity)
    }

    /// Time between the start of the vertical sync pulse and the first
    /// viewport row leaving the DMA engine, rounded up.
    ///
    /// This is the window in which the retrace consumer may touch the frame
    /// buffer without tearing.
    pub fn retrace_budget(&self, viewport_row: i32) -> MicrosDurationU32 {
        let lines = i64::from(self.v_sync_pulse) + i64::from(self.v_back_porch) + i64::from(viewport_row);
        let clocks = i64::from(self.scan_count) * i64::from(self.h_line_size()) * lines.max(0);
        let hz = i64::from(self.frequency.raw().max(1));
        let micros = (clocks * 1_000_000 + hz - 1) / hz;
        MicrosDurationU32::from_ticks(micros.clamp(0, i64::from(u32::MAX)) as u32)
    }

    /// Moves `offset` pixels from the horizontal front porch to the back
    /// porch, keeping each at least 8 pixels and their sum unchanged.
    /// Porches too narrow for that are left alone.
    pub fn shift_horizontal(&mut self, offset: i32) {
        (self.h_front_porch, self.h_back_porch) =
            shift_porches(self.h_front_porch, self.h_back_porch, offset, 8);
    }

    /// Moves `offset` lines from the vertical front porch to the back porch,
    /// keeping each at least one line and their sum unchanged.
    pub fn shift_vertical(&mut self, offset: i32) {
        (self.v_front_porch, self.v_back_porch) =
            shift_porches(self.v_front_porch, self.v_back_porch, offset, 1);
    }

    /// Grows both horizontal porches by `4 * x` pixels and both vertical
    /// porches by `y` lines; negative values enlarge the picture.
    pub fn shrink(&mut self, x: i32, y: i32) {
        let grow = |porch: i16, by: i32, min: i32| (i32::from(porch) + by).max(min) as i16;
        self.h_back_porch = grow(self.h_back_porch, 4 * x, 4);
        self.h_front_porch = grow(self.h_front_porch, 4 * x, 4);
        self.v_back_porch = grow(self.v_back_porch, y, 1);
        self.v_front_porch = grow(self.v_front_porch, y, 1);
    }
}

fn shift_porches(front: i16, back: i16, offset: i32, min: i32) -> (i16, i16) {
    let sum = i32::from(front) + i32::from(back);
    if sum < 2 * min {
        return (front, back);
    }
    let front = (i32::from(front) - offset).clamp(min, sum - min);
    (front as i16, (sum - front) as i16)
}

impl FromStr for Timings {
    type Err = ModelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timings::from_modeline(s)
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let hz = self.frequency.raw();
        let hdisp = i32::from(self.h_visible_area);
        let hss = hdisp + i32::from(self.h_front_porch);
        let hse = hss + i32::from(self.h_sync_pulse);
        let vdisp = i32::from(self.v_visible_area);
        let vss = vdisp + i32::from(self.v_front_porch);
        let vse = vss + i32::from(self.v_sync_pulse);
        let sign = |p: SyncPolarity| match p {
            SyncPolarity::Positive => '+',
            SyncPolarity::Negative => '-',
        };
        write!(
            f,
            "\"{}\" {}.{:06} {} {} {} {} {} {} {} {} {}HSync {}VSync",
            self.label,
            hz / 1_000_000,
            hz % 1_000_000,
            hdisp,
            hss,
            hse,
            self.h_line_size(),
            vdisp,
            vss,
            vse,
            self.v_lines(),
            sign(self.h_sync_polarity),
            sign(self.v_sync_polarity),
        )?;
        match self.scan_count {
            2 => write!(f, " DoubleScan")?,
            4 => write!(f, " QuadScan")?,
            _ => {}
        }
        match self.h_starting_block {
            ScreenBlock::FrontPorch => {}
            ScreenBlock::Sync => write!(f, " SyncBegins")?,
            ScreenBlock::BackPorch => write!(f, " BackPorchBegins")?,
            ScreenBlock::VisibleArea => write!(f, " VisibleBegins")?,
        }
        if self.multi_scan_blank {
            write!(f, " MultiScanBlank")?;
        }
        Ok(())
    }
}

struct RawModeline<'a> {
    label: &'a str,
    mhz: f64,
    counts_at: &'a str,
    counts: [i32; 8],
    options: Vec<&'a str>,
}

fn offset_of(whole: &str, part: &str) -> usize {
    (part.as_ptr() as usize).saturating_sub(whole.as_ptr() as usize)
}

fn quoted_label(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_till(|c| c == '"'), char('"'))(input)
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_ascii_whitespace())(input)
}

fn raw_modeline(input: &str) -> IResult<&str, RawModeline> {
    let (rest, (label, mhz)) = tuple((
        preceded(space0, quoted_label),
        preceded(space1, double),
    ))(input)?;
    let counts_at = rest;
    let (rest, counts) = count(preceded(space1, int), 8)(rest)?;
    let (rest, options) = terminated(many0(preceded(space1, word)), space0)(rest)?;

    let mut fixed = [0; 8];
    fixed.copy_from_slice(&counts);
    Ok((
        rest,
        RawModeline {
            label,
            mhz,
            counts_at,
            counts: fixed,
            options,
        },
    ))
}

/// Modelines for common modes
pub mod presets {
    pub const VGA_256X192_50HZ: &str =
        "\"256x192@50\" 8.13 256 288 296 328 192 196 198 202 -HSync -VSync DoubleScan";
    pub const VGA_320X200_75HZ: &str =
        "\"320x200@75Hz\" 12.93 320 352 376 408 200 208 211 229 -HSync -VSync DoubleScan";
    pub const VGA_320X200_75HZ_RETRO: &str =
        "\"320x200@75Hz\" 12.93 320 352 376 408 200 208 211 229 -HSync -VSync DoubleScan MultiScanBlank";
    pub const VGA_400X300_60HZ: &str =
        "\"400x300@60Hz\" 20 400 420 484 528 300 300 302 314 -HSync -VSync DoubleScan";
    pub const VGA_512X384_60HZ: &str =
        "\"512x384@60Hz\" 32.5 512 524 592 672 384 385 388 403 -HSync -VSync DoubleScan";
    pub const VGA_640X240_60HZ: &str =
        "\"640x240@60Hz\" 25.175 640 656 752 800 240 245 247 262 -HSync -VSync DoubleScan";
    pub const VGA_640X350_70HZ: &str =
        "\"640x350@70Hz\" 25.175 640 656 752 800 350 387 389 449 -HSync -VSync";
    pub const VGA_640X400_70HZ: &str =
        "\"640x400@70Hz\" 25.175 640 656 752 800 400 412 414 449 -HSync -VSync";
    pub const VGA_640X480_60HZ: &str =
        "\"640x480@60Hz\" 25.175 640 656 752 800 480 490 492 525 -HSync -VSync";
    pub const VGA_640X480_60HZ_ALT1: &str =
        "\"640x480@60HzAlt1\" 27.5 640 672 768 864 480 482 488 530 -HSync -VSync";
    pub const VGA_640X480_60HZ_D: &str =
        "\"640x480@60HzD\" 54.00 640 688 744 900 480 480 482 500 +HSync +VSync DoubleScan";
    pub const SVGA_800X600_56HZ: &str =
        "\"800x600@56Hz\" 36 800 824 896 1024 600 601 603 625 -HSync -VSync";
    pub const SVGA_800X600_60HZ: &str =
        "\"800x600@60Hz\" 40 800 840 968 1056 600 601 605 628 -HSync -VSync";

    pub const ALL: &[&str] = &[
        VGA_256X192_50HZ,
        VGA_320X200_75HZ,
        VGA_320X200_75HZ_RETRO,
        VGA_400X300_60HZ,
        VGA_512X384_60HZ,
        VGA_640X240_60HZ,
        VGA_640X350_70HZ,
        VGA_640X400_70HZ,
        VGA_640X480_60HZ,
        VGA_640X480_60HZ_ALT1,
        VGA_640X480_60HZ_D,
        SVGA_800X600_56HZ,
        SVGA_800X600_60HZ,
    ];
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn decodes_640x480() {
        let t = Timings::from_modeline(presets::VGA_640X480_60HZ).unwrap();
        assert_eq!(t.label.as_str(), "640x480@60Hz");
        assert_eq!(t.frequency.raw(), 25_175_000);
        assert_eq!(
            (t.h_visible_area, t.h_front_porch, t.h_sync_pulse, t.h_back_porch),
            (640, 16, 96, 48)
        );
        assert_eq!(
            (t.v_visible_area, t.v_front_porch, t.v_sync_pulse, t.v_back_porch),
            (480, 10, 2, 33)
        );
        assert_eq!(t.h_sync_polarity, SyncPolarity::Negative);
        assert_eq!(t.scan_count, 1);
        assert!(!t.multi_scan_blank);
    }

    #[test]
    fn decodes_flags_and_polarity() {
        let t = Timings::from_modeline(presets::VGA_640X480_60HZ_D).unwrap();
        assert_eq!(t.h_sync_polarity, SyncPolarity::Positive);
        assert_eq!(t.v_sync_polarity, SyncPolarity::Positive);
        assert_eq!(t.scan_count, 2);

        let t = Timings::from_modeline(presets::VGA_320X200_75HZ_RETRO).unwrap();
        assert!(t.multi_scan_blank);

        let t = Timings::from_modeline(
            "\"quad\" 25.175 640 656 752 800 120 122 123 131 -HSync -VSync QuadScan",
        )
        .unwrap();
        assert_eq!(t.scan_count, 4);
        assert_eq!(t.validate(), Ok(()));
        assert_eq!(format!("{t}").parse::<Timings>(), Ok(t));

        let t = Timings::from_modeline(
            "\"x\" 25.175 640 656 752 800 480 490 492 525 -hsync +vsync visiblebegins",
        )
        .unwrap();
        assert_eq!(t.v_sync_polarity, SyncPolarity::Positive);
        assert_eq!(t.h_starting_block, ScreenBlock::VisibleArea);
    }

    #[test]
    fn polarity_defaults_to_negative() {
        let t = Timings::from_modeline("\"bare\" 25.175 640 656 752 800 480 490 492 525").unwrap();
        assert_eq!(t.h_sync_polarity, SyncPolarity::Negative);
        assert_eq!(t.v_sync_polarity, SyncPolarity::Negative);
        assert_eq!(t.h_starting_block, ScreenBlock::FrontPorch);
    }

    #[test]
    fn malformed_modelines_are_rejected() {
        assert!(matches!(
            Timings::from_modeline("640x480 25.175 640 656 752 800 480 490 492 525"),
            Err(ModelineError::Syntax { offset: 0 })
        ));
        assert!(matches!(
            Timings::from_modeline("\"short\" 25.175 640 656 752 800 480 490"),
            Err(ModelineError::Syntax { .. })
        ));
        assert!(matches!(
            Timings::from_modeline("\"x\" 25.175 640 656 752 800 480 490 492 525 -HSync -VSync Zebra"),
            Err(ModelineError::UnknownOption { offset: 57 })
        ));
        assert!(matches!(
            Timings::from_modeline("\"a label that is far too long\" 25 640 656 752 800 480 490 492 525"),
            Err(ModelineError::LabelTooLong { len: 28 })
        ));
        assert!(matches!(
            Timings::from_modeline("\"zero\" 0 640 656 752 800 480 490 492 525"),
            Err(ModelineError::Frequency)
        ));
    }

    #[test]
    fn negative_porches_parse_but_fail_validation() {
        let t = Timings::from_modeline("\"bad\" 25 640 600 752 800 480 490 492 525").unwrap();
        assert_eq!(t.h_front_porch, -40);
        assert_eq!(
            t.validate(),
            Err(TimingsError::Negative("horizontal front porch"))
        );
    }

    #[test]
    fn narrow_porches_are_valid() {
        let t = Timings::from_modeline("\"tight\" 25 640 644 740 748 480 480 482 482").unwrap();
        assert_eq!((t.h_front_porch, t.h_back_porch), (4, 8));
        assert_eq!((t.v_front_porch, t.v_back_porch), (0, 0));
        assert_eq!(t.validate(), Ok(()));

        // too narrow to keep 8 pixels / 1 line on both sides: left alone
        let mut shifted = t.clone();
        shifted.shift_horizontal(3);
        shifted.shift_vertical(-1);
        assert_eq!(shifted, t);
    }

    #[test]
    fn presets_are_valid() {
        for modeline in presets::ALL {
            let t = Timings::from_modeline(modeline).unwrap();
            assert_eq!(t.validate(), Ok(()), "{modeline}");
        }
    }

    #[test]
    fn retrace_budget_rounds_up() {
        let t = Timings::from_modeline(presets::VGA_640X480_60HZ).unwrap();
        // 800 clocks * 35 lines at 25.175 MHz = 1112.21us
        assert_eq!(t.retrace_budget(0).ticks(), 1113);
    }

    #[test]
    fn shifting_keeps_porch_sums() {
        let mut t = Timings::from_modeline(presets::VGA_640X480_60HZ).unwrap();
        t.shift_horizontal(4);
        assert_eq!((t.h_front_porch, t.h_back_porch), (12, 52));
        t.shift_horizontal(100);
        assert_eq!((t.h_front_porch, t.h_back_porch), (8, 56));
        t.shift_horizontal(-100);
        assert_eq!((t.h_front_porch, t.h_back_porch), (56, 8));
        t.shift_vertical(-5);
        assert_eq!((t.v_front_porch, t.v_back_porch), (15, 28));
        assert_eq!(t.h_line_size(), 800);
        assert_eq!(t.v_lines(), 525);
    }

    #[test]
    fn shrink_clamps_porches() {
        let mut t = Timings::from_modeline(presets::VGA_640X480_60HZ).unwrap();
        t.shrink(-10, -20);
        assert_eq!((t.h_front_porch, t.h_back_porch), (4, 8));
        assert_eq!((t.v_front_porch, t.v_back_porch), (1, 13));
    }

    fn modeline() -> impl Strategy<Value = (u32, [i32; 8], bool, u8)> {
        (
            1_000u32..200_000,
            (8i32..2048, 0i32..200, 1i32..200, 0i32..300),
            (8i32..1200, 0i32..60, 1i32..10, 0i32..60),
            any::<bool>(),
            0u8..4,
        )
            .prop_map(|(khz, (hv, hf, hs, hb), (vv, vf, vs, vb), double, block)| {
                (
                    khz,
                    [hv, hv + hf, hv + hf + hs, hv + hf + hs + hb, vv, vv + vf, vv + vf + vs, vv + vf + vs + vb],
                    double,
                    block,
                )
            })
    }

    proptest! {
        #[test]
        fn segments_add_up_to_totals((khz, c, double, block) in modeline()) {
            let block = ["", " SyncBegins", " BackPorchBegins", " VisibleBegins"][block as usize];
            let line = alloc::format!(
                "\"p\" {}.{:03} {} {} {} {} {} {} {} {} -HSync +VSync{}{}",
                khz / 1000, khz % 1000, c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
                if double { " DoubleScan" } else { "" }, block,
            );
            let t = Timings::from_modeline(&line).unwrap();
            prop_assert_eq!(t.h_line_size(), c[3]);
            prop_assert_eq!(t.v_lines(), c[7]);
            prop_assert_eq!(t.scan_count, if double { 2 } else { 1 });
            prop_assert_eq!(t.frequency.raw(), khz * 1000);

            let reparsed = Timings::from_modeline(&alloc::format!("{t}")).unwrap();
            prop_assert_eq!(reparsed, t);
        }
    }
}

//! Video mode negotiation
//!
//! Maps a core resolution and refresh rate onto one of the raster timings
//! the display device is known to handle. Two timing families exist: the
//! "high" family (refresh above 55 Hz, or an explicit 240p/480i request)
//! covering 15 kHz NTSC-like and VGA outputs, and the "low" family for
//! interlaced PAL-like outputs.
//!
//! The tables below are hardware-fitted values. Horizontal entries are
//! checked from the widest threshold down and the first match wins; sizes
//! that match nothing keep the family default.

/// Refresh rate above which the high family is used
pub const HIGH_FAMILY_MIN_HZ: f64 = 55.0;

/// Interlace mode sent with SWITCHRES
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Interlace {
    #[default]
    Progressive = 0,
    /// Interlaced output, fields sent separately
    Interlaced = 1,
    /// Interlaced output from a progressive framebuffer
    InterlacedProgressiveBuffer = 2,
}

impl Interlace {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Interlace::Progressive),
            1 => Some(Interlace::Interlaced),
            2 => Some(Interlace::InterlacedProgressiveBuffer),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the raster itself is interlaced
    pub fn is_interlaced(self) -> bool {
        self != Interlace::Progressive
    }
}

/// Output family requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum OutputFamily {
    /// NTSC or PAL picked from the refresh rate
    #[default]
    Auto = 0,
    /// Line-doubled sources folded to 240 progressive lines
    Ntsc240p = 1,
    /// NTSC 480i
    Ntsc480i = 2,
    /// 31 kHz progressive
    Vga = 3,
}

impl OutputFamily {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OutputFamily::Auto),
            1 => Some(OutputFamily::Ntsc240p),
            2 => Some(OutputFamily::Ntsc480i),
            3 => Some(OutputFamily::Vga),
            _ => None,
        }
    }
}

/// Raster timing sent to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMode {
    /// Pixel clock in MHz
    pub pixel_clock: f64,
    pub h_active: u16,
    pub h_begin: u16,
    pub h_end: u16,
    pub h_total: u16,
    pub v_active: u16,
    pub v_begin: u16,
    pub v_end: u16,
    pub v_total: u16,
    pub interlace: Interlace,
}

impl VideoMode {
    /// Time to raster one line, in nanoseconds
    pub fn line_time_ns(&self) -> u64 {
        (self.h_total as f64 * 1000.0 / self.pixel_clock).round() as u64
    }

    /// Time to raster one field, in nanoseconds
    pub fn field_time_ns(&self) -> u64 {
        (self.line_time_ns() * self.v_total as u64) >> self.field_shift()
    }

    /// 1 for interlaced rasters (two fields per frame), 0 otherwise
    pub fn field_shift(&self) -> u32 {
        self.interlace.is_interlaced() as u32
    }
}

/// Mode request coming from the emulation core
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeRequest {
    pub width: u16,
    pub height: u16,
    pub refresh_hz: f64,
    pub family: OutputFamily,
    /// Whether the source framebuffer is already progressive
    pub progressive_buffer: bool,
}

/// Negotiated mode plus the derived framebuffer handling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeTiming {
    pub mode: VideoMode,
    /// False when two fields must be cut from one progressive source
    pub buffer_progressive: bool,
    /// Refresh rate fell in the PAL-like family
    pub pal: bool,
}

impl ModeTiming {
    /// Lines carried by one field in the encoder
    pub fn field_lines(&self) -> u16 {
        if self.buffer_progressive {
            self.mode.v_active
        } else {
            self.mode.v_active / 2
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Fit {
    Exact(u16),
    AtLeast(u16),
}

impl Fit {
    fn matches(self, value: u16) -> bool {
        match self {
            Fit::Exact(v) => value == v,
            Fit::AtLeast(v) => value >= v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HTiming {
    fit: Fit,
    pixel_clock: f64,
    active: u16,
    begin: u16,
    end: u16,
    total: u16,
}

#[derive(Debug, Clone, Copy)]
struct VTiming {
    fit: Fit,
    active: u16,
    begin: u16,
    end: u16,
}

const fn h(fit: Fit, pixel_clock: f64, active: u16, begin: u16, end: u16, total: u16) -> HTiming {
    HTiming {
        fit,
        pixel_clock,
        active,
        begin,
        end,
        total,
    }
}

const fn v(fit: Fit, active: u16, begin: u16, end: u16) -> VTiming {
    VTiming {
        fit,
        active,
        begin,
        end,
    }
}

const HIGH_DEFAULT: HTiming = h(Fit::AtLeast(0), 12.146841, 640, 658, 715, 772);

/// Widest first
const HIGH_H: [HTiming; 7] = [
    h(Fit::AtLeast(666), 12.634602, 666, 685, 744, 803),
    h(Fit::AtLeast(660), 12.540197, 660, 679, 738, 797),
    h(Fit::AtLeast(656), 12.445791, 656, 675, 733, 791),
    h(Fit::Exact(608), 11.533205, 608, 625, 679, 733),
    h(Fit::Exact(512), 9.739500, 512, 527, 573, 619),
    h(Fit::Exact(320), 6.046147, 320, 329, 357, 385),
    h(Fit::Exact(256), 4.852622, 256, 263, 286, 309),
];

const LOW_DEFAULT: HTiming = h(Fit::AtLeast(0), 12.296875, 640, 658, 716, 787);

/// Widest first
const LOW_H: [HTiming; 5] = [
    h(Fit::AtLeast(666), 12.796875, 666, 685, 745, 819),
    h(Fit::AtLeast(660), 12.703125, 660, 679, 739, 813),
    h(Fit::AtLeast(650), 12.5, 650, 669, 728, 800),
    h(Fit::Exact(608), 11.703125, 608, 626, 681, 749),
    h(Fit::Exact(512), 9.843750, 512, 527, 573, 630),
];

const HIGH_V_TOTAL: u16 = 525;
const HIGH_V_DEFAULT: VTiming = v(Fit::AtLeast(0), 480, 487, 493);
const SHORT_V_TOTAL: u16 = 262;
const V_224: VTiming = v(Fit::Exact(224), 224, 236, 239);
const V_240: VTiming = v(Fit::Exact(240), 240, 244, 247);
const HIGH_V_448: VTiming = v(Fit::Exact(448), 448, 471, 477);

const LOW_V_TOTAL: u16 = 625;
const LOW_V_DEFAULT: VTiming = v(Fit::AtLeast(0), 528, 558, 563);

/// Tallest first
const LOW_V: [VTiming; 8] = [
    v(Fit::AtLeast(574), 574, 581, 586),
    v(Fit::AtLeast(538), 538, 563, 568),
    v(Fit::AtLeast(530), 530, 559, 564),
    v(Fit::AtLeast(528), 528, 558, 563),
    v(Fit::AtLeast(522), 522, 555, 560),
    v(Fit::AtLeast(512), 512, 550, 555),
    v(Fit::AtLeast(496), 496, 542, 547),
    v(Fit::Exact(448), 448, 518, 523),
];

/// Pixel clock for line-doubled sources folded to 240p, by width
fn folded_240p_clock(width: u16, include_320: bool) -> f64 {
    match width {
        320 if include_320 => 6.046147,
        512 => 9.739500,
        608 => 11.533205,
        656 => 12.422085,
        660 => 12.516311,
        666 => 12.610536,
        _ => 12.123704,
    }
}

fn pick_h(table: &[HTiming], default: HTiming, width: u16) -> HTiming {
    table
        .iter()
        .copied()
        .find(|entry| entry.fit.matches(width))
        .unwrap_or(default)
}

fn pick_v(table: &[VTiming], default: VTiming, height: u16) -> VTiming {
    table
        .iter()
        .copied()
        .find(|entry| entry.fit.matches(height))
        .unwrap_or(default)
}

/// Compute the raster timing for a mode request
pub fn compute_mode(request: &ModeRequest) -> ModeTiming {
    let ModeRequest {
        width,
        height,
        refresh_hz,
        family,
        ..
    } = *request;
    let mut progressive_buffer = request.progressive_buffer;
    let pal = refresh_hz <= HIGH_FAMILY_MIN_HZ;

    let high = refresh_hz > HIGH_FAMILY_MIN_HZ
        || family == OutputFamily::Ntsc240p
        || family == OutputFamily::Ntsc480i;

    let (mut pixel_clock, htiming, vtiming, v_total, mut interlaced) = if high {
        let ht = pick_h(&HIGH_H, HIGH_DEFAULT, width);
        let mut clock = ht.pixel_clock;
        let mut vt = HIGH_V_DEFAULT;
        let mut total = HIGH_V_TOTAL;
        let mut interlaced = true;
        let short_capable = family != OutputFamily::Vga;

        if short_capable && height == 224 {
            vt = V_224;
            total = SHORT_V_TOTAL;
            interlaced = false;
        }
        if short_capable && height == 240 {
            vt = V_240;
            total = SHORT_V_TOTAL;
            interlaced = false;
        }
        if family == OutputFamily::Ntsc240p && height >= 448 {
            clock = folded_240p_clock(width, true);
            vt = V_240;
            total = SHORT_V_TOTAL;
            interlaced = false;
        }
        if height == 448 {
            if family == OutputFamily::Ntsc240p {
                clock = folded_240p_clock(width, false);
                vt = V_224;
                total = SHORT_V_TOTAL;
                interlaced = false;
            } else {
                vt = HIGH_V_448;
            }
        }
        (clock, ht, vt, total, interlaced)
    } else {
        let ht = pick_h(&LOW_H, LOW_DEFAULT, width);
        let vt = pick_v(&LOW_V, LOW_V_DEFAULT, height);
        (ht.pixel_clock, ht, vt, LOW_V_TOTAL, true)
    };

    if family == OutputFamily::Vga {
        pixel_clock *= 2.0;
        interlaced = false;
        progressive_buffer = true;
    }

    let interlace = match (interlaced, progressive_buffer) {
        (false, _) => Interlace::Progressive,
        (true, false) => Interlace::Interlaced,
        (true, true) => Interlace::InterlacedProgressiveBuffer,
    };

    ModeTiming {
        mode: VideoMode {
            pixel_clock,
            h_active: htiming.active,
            h_begin: htiming.begin,
            h_end: htiming.end,
            h_total: htiming.total,
            v_active: vtiming.active,
            v_begin: vtiming.begin,
            v_end: vtiming.end,
            v_total,
            interlace,
        },
        buffer_progressive: interlace != Interlace::Interlaced,
        pal,
    }
}

//! Fixed-point trigonometry and the robot body calibration curve.
//!
//! Headings are `u32` where 2^32 is a full turn, so additions simply wrap. The sine
//! table holds `sin * 2^15`; products are shifted back by 15 bits.

use sweep_data::SLOTS_PER_SCAN;

/// One sensor angle step (1/16 degree). 2^32 / 5760, truncated.
pub const ANG_1PER16_DEG: u32 = 745_654;
pub const ANG_90_DEG: u32 = 1 << 30;

const SIN_LUT_BITS: u32 = 14;
const SIN_LUT_SHIFT: u32 = 32 - SIN_LUT_BITS;
const SIN_LUT_LEN: usize = 1 << SIN_LUT_BITS;
const SIN_SCALE_SHIFT: u32 = 15;
const SIN_SCALE: f64 = 32767.;

pub(crate) const N_CURVE_POINTS: usize = 32;

/// Distance (mm) from the sensor to the outline of the robot body, in 32 steps of
/// 11.25 degrees starting straight ahead. Odd entries are midpoints of their neighbours.
pub(crate) const BODY_CURVE_MM: [u16; N_CURVE_POINTS] = [
    100, 135, 170, 185, 200, 210, 220, 210,
    200, 225, 250, 275, 300, 345, 390, 370,
    350, 370, 390, 345, 300, 275, 250, 225,
    200, 210, 220, 210, 200, 185, 170, 135,
];

pub fn ang_from_degrees(degrees: f64) -> u32 {
    let turns = (degrees / 360.).rem_euclid(1.);
    (turns * 4_294_967_296.) as u64 as u32
}

pub fn ang_to_degrees(ang: u32) -> f64 {
    (ang as f64) * 360. / 4_294_967_296.
}

/// Sensor angle (1/16 degree) to heading units.
pub(crate) fn ang_from_16th_deg(deg16: u16) -> u32 {
    (deg16 as u32).wrapping_mul(ANG_1PER16_DEG)
}

/// Precomputed sine lookup table.
pub struct SinTable {
    lut: Vec<i16>,
}

impl SinTable {
    pub fn new() -> SinTable {
        let lut = (0..SIN_LUT_LEN)
            .map(|i| {
                let radian = (i as f64) * 2. * std::f64::consts::PI / (SIN_LUT_LEN as f64);
                (radian.sin() * SIN_SCALE).round() as i16
            })
            .collect();
        SinTable { lut }
    }

    /// `sin(ang) * 2^15`
    pub fn sin(&self, ang: u32) -> i32 {
        self.lut[(ang >> SIN_LUT_SHIFT) as usize] as i32
    }

    /// `cos(ang) * 2^15`, read from the quarter-turn complement.
    pub fn cos(&self, ang: u32) -> i32 {
        self.sin(ANG_90_DEG.wrapping_sub(ang))
    }

    /// Offset of a point `len` away along heading `ang`. Heading zero points along +y.
    pub fn polar_to_xy(&self, ang: u32, len: i32) -> (i32, i32) {
        (mul_shift(self.sin(ang), len), mul_shift(self.cos(ang), len))
    }

    /// Rotates the vector `(x, y)` by `ang`, turning the same way headings grow.
    pub fn rotate(&self, ang: u32, x: i32, y: i32) -> (i32, i32) {
        let s = self.sin(ang);
        let c = self.cos(ang);
        (
            mul_shift(c, x) + mul_shift(s, y),
            mul_shift(c, y) - mul_shift(s, x),
        )
    }
}

impl Default for SinTable {
    fn default() -> Self {
        SinTable::new()
    }
}

fn mul_shift(scaled: i32, value: i32) -> i32 {
    ((scaled as i64 * value as i64) >> SIN_SCALE_SHIFT) as i32
}

/// Piecewise-linear interpolation of a 32-point curve at a scan slot, wrapping at 360 degrees.
pub(crate) fn interpolate_curve(curve: &[u16; N_CURVE_POINTS], slot: usize) -> u16 {
    let slot = slot % SLOTS_PER_SCAN;
    let pos = slot * N_CURVE_POINTS;
    let idx = pos / SLOTS_PER_SCAN;
    let frac = (pos % SLOTS_PER_SCAN) as i32;
    let a = curve[idx] as i32;
    let b = curve[(idx + 1) % N_CURVE_POINTS] as i32;
    (a + (b - a) * frac / SLOTS_PER_SCAN as i32) as u16
}

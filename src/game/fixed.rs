//! Fixed-point math for the simulation
//!
//! Everything that feeds the state hash is an integer. Lengths are millimetres,
//! velocities are millimetres per tick, ratios and probabilities are Q16
//! (`Q16_ONE == 1.0`) and angles are centidegrees. Floats only appear in the
//! presentation helpers at the bottom of this file.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Millimetres per metre
pub const MM_PER_METER: i64 = 1_000;

/// Q16 fractional bits
pub const Q16_SHIFT: u32 = 16;

/// 1.0 in Q16
pub const Q16_ONE: i64 = 1 << Q16_SHIFT;

/// Full turn in centidegrees
pub const FULL_TURN_CD: i64 = 36_000;

const Q30_ONE: i64 = 1 << 30;
/// π in Q30, rounded
const PI_Q30: i64 = 3_373_259_426;

/// Multiply by a Q16 ratio, truncating toward zero
#[inline]
pub fn mul_q16(value: i64, ratio: i64) -> i64 {
    ((value as i128 * ratio as i128) / Q16_ONE as i128) as i64
}

/// `num / den` as a Q16 ratio. Returns 0 for a zero denominator.
#[inline]
pub fn ratio_q16(num: i64, den: i64) -> i64 {
    if den == 0 {
        return 0;
    }
    ((num as i128 * Q16_ONE as i128) / den as i128) as i64
}

/// `base^exp` for a Q16 base
pub fn pow_q16(base: i64, exp: u32) -> i64 {
    (0..exp).fold(Q16_ONE, |acc, _| mul_q16(acc, base))
}

/// Floor of the square root
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let bits = 64 - n.leading_zeros();
    let mut x = 1u64 << ((bits + 1) / 2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

#[inline]
fn mul_q30(a: i64, b: i64) -> i64 {
    ((a as i128 * b as i128) >> 30) as i64
}

/// Sine and cosine of an angle in centidegrees, both in Q16.
///
/// Integer Taylor polynomials on the reduced octant; no libm involved, so the
/// result is identical on every platform.
pub fn sin_cos(angle_cd: i64) -> (i64, i64) {
    let angle = angle_cd.rem_euclid(FULL_TURN_CD);
    let quadrant = angle / 9_000;
    let rest = angle % 9_000;

    let (s0, c0) = if rest <= 4_500 {
        octant_sin_cos(rest)
    } else {
        let (s, c) = octant_sin_cos(9_000 - rest);
        (c, s)
    };

    match quadrant {
        0 => (s0, c0),
        1 => (c0, -s0),
        2 => (-s0, -c0),
        _ => (-c0, s0),
    }
}

/// sin/cos for `0..=4500` centidegrees
fn octant_sin_cos(angle_cd: i64) -> (i64, i64) {
    let x = angle_cd * PI_Q30 / 18_000;
    let x2 = mul_q30(x, x);

    let mut s = Q30_ONE - x2 / 72;
    s = Q30_ONE - mul_q30(x2, s) / 42;
    s = Q30_ONE - mul_q30(x2, s) / 20;
    s = Q30_ONE - mul_q30(x2, s) / 6;
    let sin = mul_q30(x, s);

    let mut c = Q30_ONE - x2 / 56;
    c = Q30_ONE - mul_q30(x2, c) / 30;
    c = Q30_ONE - mul_q30(x2, c) / 12;
    let cos = Q30_ONE - mul_q30(x2, c) / 2;

    (q30_to_q16(sin), q30_to_q16(cos))
}

#[inline]
fn q30_to_q16(v: i64) -> i64 {
    (v + (1 << 13)) >> 14
}

/// Integer 2D vector. Units depend on context (mm, mm/tick, or Q16 for
/// unit directions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i64,
    pub y: i64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Unit vector (Q16) pointing at `angle_cd`
    pub fn from_angle(angle_cd: i64) -> Self {
        let (sin, cos) = sin_cos(angle_cd);
        Self::new(cos, sin)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0
    }

    pub fn length_sq(self) -> u64 {
        let x = self.x as i128;
        let y = self.y as i128;
        (x * x + y * y).min(u64::MAX as i128) as u64
    }

    pub fn length(self) -> i64 {
        isqrt(self.length_sq()) as i64
    }

    pub fn distance(self, other: Self) -> i64 {
        (other - self).length()
    }

    pub fn distance_sq(self, other: Self) -> u64 {
        (other - self).length_sq()
    }

    /// Raw dot product (units multiply)
    pub fn dot(self, other: Self) -> i64 {
        (self.x as i128 * other.x as i128 + self.y as i128 * other.y as i128) as i64
    }

    /// Dot product with a Q16 unit vector; result keeps `self`'s units
    pub fn dot_q16(self, unit: Self) -> i64 {
        ((self.x as i128 * unit.x as i128 + self.y as i128 * unit.y as i128)
            / Q16_ONE as i128) as i64
    }

    /// Scale both components by a Q16 ratio
    pub fn scale_q16(self, ratio: i64) -> Self {
        Self::new(mul_q16(self.x, ratio), mul_q16(self.y, ratio))
    }

    /// Same direction with the given length. Zero stays zero.
    pub fn with_length(self, len: i64) -> Self {
        let current = self.length();
        if current == 0 {
            return Self::ZERO;
        }
        Self::new(
            (self.x as i128 * len as i128 / current as i128) as i64,
            (self.y as i128 * len as i128 / current as i128) as i64,
        )
    }

    /// Q16 unit vector in this direction
    pub fn direction_q16(self) -> Self {
        self.with_length(Q16_ONE)
    }

    /// Rotate by `angle_cd` centidegrees
    pub fn rotate(self, angle_cd: i64) -> Self {
        let (sin, cos) = sin_cos(angle_cd);
        Self::new(
            mul_q16(self.x, cos) - mul_q16(self.y, sin),
            mul_q16(self.x, sin) + mul_q16(self.y, cos),
        )
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Millimetres to metres (presentation only)
pub fn to_meters(mm: i64) -> f64 {
    mm as f64 / MM_PER_METER as f64
}

/// Whole metres to millimetres
pub const fn meters(m: i64) -> i64 {
    m * MM_PER_METER
}

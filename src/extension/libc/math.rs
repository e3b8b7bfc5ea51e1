//! `<math.h>`
//!
//! Almost everything maps onto an `f64` method. The error and gamma
//! functions have no host equivalent and are approximated here.

use super::Libc;
use crate::extension::error::Fault;
use std::f64::consts::PI;

/// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7
pub fn erf(x: f64) -> f64 {
    if x.is_nan() || x == 0.0 {
        return x;
    }
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

pub fn erfc(x: f64) -> f64 {
    1.0 - erf(x)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Lanczos approximation with the reflection formula below 0.5
pub fn tgamma(x: f64) -> f64 {
    if x.is_nan() {
        return x;
    }
    if x == x.floor() && x <= 0.0 {
        return f64::NAN;
    }
    if x < 0.5 {
        return PI / ((PI * x).sin() * tgamma(1.0 - x));
    }

    let x = x - 1.0;
    let mut sum = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    (2.0 * PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * sum
}

/// `ln |Γ(x)|`, computed in log space so large arguments do not overflow
pub fn lgamma(x: f64) -> f64 {
    if x.is_nan() {
        return x;
    }
    if x == x.floor() && x <= 0.0 {
        return f64::INFINITY;
    }
    if x < 0.5 {
        return (PI / (PI * x).sin().abs()).ln() - lgamma(1.0 - x);
    }

    let x = x - 1.0;
    let mut sum = LANCZOS[0];
    for (i, c) in LANCZOS.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

/// Split into a mantissa in `[0.5, 1)` and a power of two
pub fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    if exponent == 0 {
        // subnormal: scale into the normal range first
        let (m, e) = frexp(x * 2f64.powi(64));
        return (m, e - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, exponent - 1022)
}

macro_rules! unary {
    ($($name:ident => $method:ident),* $(,)?) => {
        impl Libc<'_> {
            $(
                pub fn $name(&self, x: f64) -> f64 {
                    x.$method()
                }
            )*
        }
    };
}

unary! {
    sin => sin, cos => cos, tan => tan,
    asin => asin, acos => acos, atan => atan,
    sinh => sinh, cosh => cosh, tanh => tanh,
    asinh => asinh, acosh => acosh, atanh => atanh,
    exp => exp, exp2 => exp2, expm1 => exp_m1,
    log => ln, log2 => log2, log10 => log10, log1p => ln_1p,
    sqrt => sqrt, cbrt => cbrt, fabs => abs,
    ceil => ceil, floor => floor, round => round, trunc => trunc,
}

impl Libc<'_> {
    pub fn atan2(&self, y: f64, x: f64) -> f64 {
        y.atan2(x)
    }

    pub fn pow(&self, x: f64, y: f64) -> f64 {
        x.powf(y)
    }

    pub fn hypot(&self, x: f64, y: f64) -> f64 {
        x.hypot(y)
    }

    /// C `fmod` keeps the sign of the dividend, as `%` does
    pub fn fmod(&self, x: f64, y: f64) -> f64 {
        x % y
    }

    pub fn fmin(&self, x: f64, y: f64) -> f64 {
        x.min(y)
    }

    pub fn fmax(&self, x: f64, y: f64) -> f64 {
        x.max(y)
    }

    pub fn copysign(&self, x: f64, y: f64) -> f64 {
        x.copysign(y)
    }

    pub fn ldexp(&self, x: f64, exp: i32) -> f64 {
        x * 2f64.powi(exp)
    }

    pub fn erf(&self, x: f64) -> f64 {
        erf(x)
    }

    pub fn erfc(&self, x: f64) -> f64 {
        erfc(x)
    }

    pub fn tgamma(&self, x: f64) -> f64 {
        tgamma(x)
    }

    pub fn lgamma(&self, x: f64) -> f64 {
        lgamma(x)
    }

    pub fn frexp(&self, x: f64, exp: u32) -> Result<f64, Fault> {
        let (mantissa, e) = frexp(x);
        self.memory(|memory| memory.write_i32(exp, e))?;
        Ok(mantissa)
    }

    /// Fractional part; the integral part goes to `iptr`
    pub fn modf(&self, x: f64, iptr: u32) -> Result<f64, Fault> {
        let whole = x.trunc();
        self.memory(|memory| memory.write_f64(iptr, whole))?;
        Ok(if x.is_infinite() { 0f64.copysign(x) } else { x - whole })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps * b.abs().max(1.0)
    }

    #[test]
    fn test_erf() {
        assert_eq!(erf(0.0), 0.0);
        assert!(close(erf(0.5), 0.520_499_877_8, 1e-6));
        assert!(close(erf(-1.0), -0.842_700_792_9, 1e-6));
        assert!(close(erfc(2.0), 0.004_677_734_98, 1e-6));
        assert!(erf(f64::NAN).is_nan());
    }

    #[test]
    fn test_gamma() {
        assert!(close(tgamma(5.0), 24.0, 1e-10));
        assert!(close(tgamma(0.5), PI.sqrt(), 1e-10));
        assert!(close(tgamma(-0.5), -2.0 * PI.sqrt(), 1e-9));
        assert!(tgamma(-2.0).is_nan());

        assert!(close(lgamma(10.0), 362_880f64.ln(), 1e-10));
        assert!(close(lgamma(200.0), 857.933_669_825_857_2, 1e-10));
        assert_eq!(lgamma(0.0), f64::INFINITY);
    }

    #[test]
    fn test_frexp() {
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.0), (0.0, 0));
        let (m, e) = frexp(f64::MIN_POSITIVE / 4.0);
        assert_eq!(m * 2f64.powi(e), f64::MIN_POSITIVE / 4.0);
    }
}

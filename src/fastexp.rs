//! IEEE-754 bit-trick fast exponential, after Schraudolph (1999).
//!
//! Ported from the original solver's `Approximation.h`. Each mode trades
//! a different error characteristic for the same constant cost: no
//! branches, no libm call, just an integer multiply-add into the upper
//! 32 bits of a `f64`'s bit pattern. Used by the transition protocol to
//! evaluate Metropolis acceptance probabilities, where the exact value of
//! `exp` has never mattered as much as doing millions of them per second.

const EXP_FACTOR: f64 = 1_048_576.0 / std::f64::consts::LN_2;
const BIAS_FACTOR: i32 = 1_072_693_248;

/// Which calibrated correction constant to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FastExpMode {
    /// Lowest possible root-mean-square error.
    Rms,
    /// Lowest possible mean error.
    Mean,
    /// Lowest possible maximum error, always at or above the exact value.
    Upper,
    /// Lowest possible maximum error, always at or below the exact value.
    Lower,
    /// Equal maximum error on both sides of the exact value.
    Tight,
}

impl FastExpMode {
    const fn correction(self) -> i32 {
        match self {
            FastExpMode::Rms => 60_801,
            FastExpMode::Mean => 68_243,
            FastExpMode::Upper => 90_253,
            FastExpMode::Lower => -1,
            FastExpMode::Tight => 45_799,
        }
    }
}

/// Fast approximation of `exp(exponent)` calibrated per `mode`.
///
/// Only meaningful for arguments in the range libm's `exp` itself stays
/// finite and normal; the acceptance-probability caller clamps its input
/// before reaching here (see `transition::acceptance_probability`).
#[inline]
pub fn fast_exp(exponent: f64, mode: FastExpMode) -> f64 {
    // The original writes only the high 32-bit word of the union (`n.i`,
    // an int32_t) and leaves the low word at its zero-initialized value.
    let high_word = (EXP_FACTOR * exponent) as i32 + (BIAS_FACTOR - mode.correction());
    f64::from_bits((high_word as u32 as u64) << 32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_mode_is_close_to_libm_exp() {
        for x in [-3.0, -1.0, -0.1, 0.0, 0.1, 1.0, 3.0] {
            let approx = fast_exp(x, FastExpMode::Rms);
            let exact = x.exp();
            let rel_err = ((approx - exact) / exact).abs();
            assert!(rel_err < 0.03, "x={x} approx={approx} exact={exact}");
        }
    }

    #[test]
    fn upper_mode_overestimates() {
        for x in [-2.0, -0.5, 0.0, 0.5, 2.0] {
            let approx = fast_exp(x, FastExpMode::Upper);
            assert!(approx >= x.exp() * 0.999, "x={x}");
        }
    }

    #[test]
    fn lower_mode_underestimates() {
        for x in [-2.0, -0.5, 0.0, 0.5, 2.0] {
            let approx = fast_exp(x, FastExpMode::Lower);
            assert!(approx <= x.exp() * 1.001, "x={x}");
        }
    }

    #[test]
    fn monotonic_in_exponent() {
        let mut prev = fast_exp(-5.0, FastExpMode::Mean);
        for i in -49..50 {
            let x = i as f64 / 10.0;
            let cur = fast_exp(x, FastExpMode::Mean);
            assert!(cur >= prev);
            prev = cur;
        }
    }
}

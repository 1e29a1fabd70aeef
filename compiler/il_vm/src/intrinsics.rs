//! Recognized math intrinsics (spec §4.6 "Call resolution order": module
//! function, then a recognized intrinsic, then the runtime bridge). These
//! are the handful of pure functions BASIC's standard library lowers to
//! that don't warrant a real `extern` round trip through the host, mirrored
//! on the small set `examples/original_source/src/vm/OpHelpers.cpp` handles
//! inline rather than dispatching to a host call.

use crate::slot::Slot;

/// Evaluates `name(args)` if it names a recognized intrinsic, returning
/// `None` if it doesn't (the caller then falls through to the runtime
/// bridge). This is exactly the spec §4.4 constant-folding name set
/// (`il_transform::const_fold::fold_intrinsic`) so that folding an
/// intrinsic call and executing the unfolded call agree on every input,
/// including which inputs trap instead of producing a value: `abs_i64`
/// overflows (and so falls through to the bridge, which traps) on
/// `i64::MIN`, the same value const-fold refuses to fold.
pub fn eval(name: &str, args: &[Slot]) -> Option<Slot> {
    match (name, args) {
        ("abs_i64", [a]) => a.as_i64().checked_abs().map(Slot::from_i64),
        ("abs_f64", [a]) => Some(Slot::from_f64(a.as_f64().abs())),
        ("floor", [a]) => Some(Slot::from_f64(a.as_f64().floor())),
        ("ceil", [a]) => Some(Slot::from_f64(a.as_f64().ceil())),
        ("trunc", [a]) => Some(Slot::from_f64(a.as_f64().trunc())),
        ("sqrt", [a]) => Some(Slot::from_f64(a.as_f64().sqrt())),
        ("pow", [a, b]) => Some(Slot::from_f64(a.as_f64().powf(b.as_f64()))),
        ("round_even", [a]) => Some(Slot::from_f64(a.as_f64().round_ties_even())),
        ("sin", [a]) => Some(Slot::from_f64(a.as_f64().sin())),
        ("cos", [a]) => Some(Slot::from_f64(a.as_f64().cos())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_is_recognized() {
        let v = eval("sqrt", &[Slot::from_f64(4.0)]).unwrap();
        assert_eq!(v.as_f64(), 2.0);
    }

    #[test]
    fn unknown_name_falls_through() {
        assert!(eval("frobnicate", &[]).is_none());
    }

    #[test]
    fn abs_i64_overflow_falls_through_instead_of_wrapping() {
        assert!(eval("abs_i64", &[Slot::from_i64(i64::MIN)]).is_none());
        assert_eq!(eval("abs_i64", &[Slot::from_i64(-5)]).unwrap().as_i64(), 5);
    }

    #[test]
    fn sin_and_cos_of_zero_match_const_fold() {
        assert_eq!(eval("sin", &[Slot::from_f64(0.0)]).unwrap().as_f64(), 0.0);
        assert_eq!(eval("cos", &[Slot::from_f64(0.0)]).unwrap().as_f64(), 1.0);
    }
}

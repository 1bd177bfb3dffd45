use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchStatus {
    /// Bracket narrowed below the precision, or the residual did.
    Converged,
    /// Even the upper bound falls short of the target; the upper bound is returned.
    BoundLimited,
    /// Iteration cap reached first; the best upper estimate is returned.
    IterationCapped,
}

#[derive(Debug, Clone, Copy)]
pub struct BisectionConfig {
    pub lower: f64,
    pub upper: f64,
    pub precision: f64,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct BisectionResult {
    pub value: f64,
    pub residual: f64,
    pub iterations: u32,
    pub status: SearchStatus,
}

impl BisectionResult {
    pub fn converged(&self) -> bool {
        self.status != SearchStatus::IterationCapped
    }
}

/// Finds the smallest `x` in the bracket with `residual(x) >= 0`, for a
/// residual that is non-decreasing in `x`. The returned value always sits on
/// the non-negative side, so callers never fall short of their target by
/// more than the precision allows.
pub fn bisect_increasing<F>(mut residual: F, config: BisectionConfig) -> BisectionResult
where
    F: FnMut(f64) -> f64,
{
    let mut lo = config.lower.min(config.upper);
    let mut hi = config.lower.max(config.upper);

    let mut hi_residual = residual(hi);
    if hi_residual < 0.0 {
        return BisectionResult {
            value: hi,
            residual: hi_residual,
            iterations: 0,
            status: SearchStatus::BoundLimited,
        };
    }

    let lo_residual = residual(lo);
    if lo_residual >= 0.0 {
        return BisectionResult {
            value: lo,
            residual: lo_residual,
            iterations: 0,
            status: SearchStatus::Converged,
        };
    }

    if hi - lo <= config.precision {
        return BisectionResult {
            value: hi,
            residual: hi_residual,
            iterations: 0,
            status: SearchStatus::Converged,
        };
    }

    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let mid_residual = residual(mid);
        if mid_residual >= 0.0 {
            hi = mid;
            hi_residual = mid_residual;
        } else {
            lo = mid;
        }

        if (hi - lo).abs() <= config.precision || hi_residual.abs() <= config.precision {
            return BisectionResult {
                value: hi,
                residual: hi_residual,
                iterations: it,
                status: SearchStatus::Converged,
            };
        }
    }

    BisectionResult {
        value: hi,
        residual: hi_residual,
        iterations: it,
        status: SearchStatus::IterationCapped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn config(lower: f64, upper: f64, precision: f64, max_iterations: u32) -> BisectionConfig {
        BisectionConfig {
            lower,
            upper,
            precision,
            max_iterations,
        }
    }

    #[test]
    fn finds_square_root_within_precision() {
        let result = bisect_increasing(|x| x * x - 2.0, config(0.0, 2.0, 1e-9, 200));
        assert_eq!(result.status, SearchStatus::Converged);
        assert!(result.value * result.value >= 2.0);
        assert_close(result.value, 2.0_f64.sqrt(), 1e-8);
    }

    #[test]
    fn grosses_up_flat_tax_withdrawal() {
        // 20% flat tax: net of 80 needs a gross of 100.
        let result = bisect_increasing(|gross| gross * 0.8 - 80.0, config(0.0, 1_000.0, 1e-6, 100));
        assert!(result.converged());
        assert_close(result.value, 100.0, 1e-5);
    }

    #[test]
    fn reports_bound_limited_when_upper_falls_short() {
        let result = bisect_increasing(|x| x - 500.0, config(0.0, 100.0, 1e-6, 100));
        assert_eq!(result.status, SearchStatus::BoundLimited);
        assert_eq!(result.iterations, 0);
        assert_close(result.value, 100.0, 0.0);
        assert_close(result.residual, -400.0, 0.0);
    }

    #[test]
    fn returns_lower_bound_when_already_satisfied() {
        let result = bisect_increasing(|x| x + 1.0, config(0.0, 100.0, 1e-6, 100));
        assert_eq!(result.status, SearchStatus::Converged);
        assert_close(result.value, 0.0, 0.0);
    }

    #[test]
    fn zero_width_bracket_terminates_immediately() {
        let result = bisect_increasing(|x| x - 5.0, config(5.0, 5.0, 1e-6, 100));
        assert!(result.converged());
        assert_eq!(result.iterations, 0);
        assert_close(result.value, 5.0, 0.0);
    }

    #[test]
    fn iteration_cap_returns_best_estimate() {
        let mut calls = 0;
        let result = bisect_increasing(
            |x| {
                calls += 1;
                x - 700.0
            },
            config(0.0, 1_024.0, 1e-12, 3),
        );
        assert_eq!(result.status, SearchStatus::IterationCapped);
        assert_eq!(result.iterations, 3);
        assert_eq!(calls, 5);
        // 1024 -> 512 (short) -> 768 -> 640 (short): best upper is 768.
        assert_close(result.value, 768.0, 0.0);
        assert!(result.residual >= 0.0);
    }

    #[test]
    fn reversed_bounds_are_normalized() {
        let result = bisect_increasing(|x| x - 10.0, config(20.0, 0.0, 1e-9, 200));
        assert!(result.converged());
        assert_close(result.value, 10.0, 1e-8);
    }
}

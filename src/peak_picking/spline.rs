/// A natural cubic spline through a set of points with strictly increasing abscissae.
///
/// Each segment `i` covers `[x[i], x[i + 1]]` and is stored as the polynomial
/// `a + b t + c t^2 + d t^3` with `t = x - x[i]`. Points outside the knots are
/// extrapolated from the first or last segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    knots: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    /// Fit the spline, or return `None` when there are fewer than two points, the
    /// lengths differ or `xs` is not strictly increasing.
    pub fn new(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 2 || n != ys.len() {
            return None;
        }
        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|v| !(*v > 0.0)) {
            return None;
        }

        // Second derivatives at the knots, zero at both ends
        let mut second = vec![0.0; n];
        if n > 2 {
            let m = n - 2;
            let mut diag = vec![0.0; m];
            let mut rhs = vec![0.0; m];
            for j in 0..m {
                let i = j + 1;
                diag[j] = 2.0 * (h[i - 1] + h[i]);
                rhs[j] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
            }
            // Thomas algorithm, the off diagonals are h[1..m]
            for j in 1..m {
                let w = h[j] / diag[j - 1];
                diag[j] -= w * h[j];
                rhs[j] -= w * rhs[j - 1];
            }
            second[m] = rhs[m - 1] / diag[m - 1];
            for j in (0..m - 1).rev() {
                second[j + 1] = (rhs[j] - h[j + 1] * second[j + 2]) / diag[j];
            }
        }

        let segments = n - 1;
        let mut a = Vec::with_capacity(segments);
        let mut b = Vec::with_capacity(segments);
        let mut c = Vec::with_capacity(segments);
        let mut d = Vec::with_capacity(segments);
        for i in 0..segments {
            a.push(ys[i]);
            b.push((ys[i + 1] - ys[i]) / h[i] - h[i] * (2.0 * second[i] + second[i + 1]) / 6.0);
            c.push(second[i] / 2.0);
            d.push((second[i + 1] - second[i]) / (6.0 * h[i]));
        }
        Some(Self {
            knots: xs.to_vec(),
            a,
            b,
            c,
            d,
        })
    }

    fn segment(&self, x: f64) -> usize {
        let i = self.knots.partition_point(|k| *k <= x);
        i.saturating_sub(1).min(self.a.len() - 1)
    }

    pub fn eval(&self, x: f64) -> f64 {
        let i = self.segment(x);
        let t = x - self.knots[i];
        self.a[i] + t * (self.b[i] + t * (self.c[i] + t * self.d[i]))
    }

    pub fn derivative(&self, x: f64) -> f64 {
        let i = self.segment(x);
        let t = x - self.knots[i];
        self.b[i] + t * (2.0 * self.c[i] + 3.0 * t * self.d[i])
    }

    pub fn first_knot(&self) -> f64 {
        self.knots[0]
    }

    pub fn last_knot(&self) -> f64 {
        self.knots[self.knots.len() - 1]
    }

    /// Locate the maximum between `lower` and `upper` by bisection on the sign of the
    /// derivative, returning its position and value.
    pub fn find_maximum(&self, lower: f64, upper: f64, tolerance: f64) -> (f64, f64) {
        let mut left = lower;
        let mut right = upper;
        let rising_at_left = self.derivative(left) > 0.0;
        let mut iterations = 0;
        while right - left > tolerance && iterations < 100 {
            let mid = (left + right) / 2.0;
            let slope = self.derivative(mid);
            if slope == 0.0 {
                left = mid;
                right = mid;
                break;
            }
            if (slope > 0.0) == rising_at_left {
                left = mid;
            } else {
                right = mid;
            }
            iterations += 1;
        }
        let x = (left + right) / 2.0;
        (x, self.eval(x))
    }

    /// Find where the spline crosses `level` between `outer` and `apex`, assuming it
    /// rises monotonically from `outer` towards `apex`.
    pub fn find_crossing(&self, outer: f64, apex: f64, level: f64, tolerance: f64) -> f64 {
        if self.eval(outer) > level {
            return outer;
        }
        let mut low = outer;
        let mut high = apex;
        let mut mid = (low + high) / 2.0;
        for _ in 0..100 {
            mid = (low + high) / 2.0;
            let value = self.eval(mid);
            if (value - level).abs() <= tolerance {
                break;
            }
            if value < level {
                low = mid;
            } else {
                high = mid;
            }
        }
        mid
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interpolates_knots() {
        let xs = [0.0, 1.0, 2.5, 3.0, 4.0];
        let ys = [1.0, 3.0, 2.0, 0.5, 0.0];
        let spline = CubicSpline::new(&xs, &ys).unwrap();
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert!((spline.eval(*x) - y).abs() < 1e-12, "{x} {y}");
        }
        assert_eq!(spline.first_knot(), 0.0);
        assert_eq!(spline.last_knot(), 4.0);
    }

    #[test]
    fn test_linear_data() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.0, 2.0, 4.0, 6.0];
        let spline = CubicSpline::new(&xs, &ys).unwrap();
        assert!((spline.eval(1.5) - 3.0).abs() < 1e-12);
        assert!((spline.derivative(2.2) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_knots() {
        assert!(CubicSpline::new(&[1.0], &[1.0]).is_none());
        assert!(CubicSpline::new(&[1.0, 1.0], &[1.0, 2.0]).is_none());
        assert!(CubicSpline::new(&[1.0, 2.0], &[1.0]).is_none());
    }

    #[test]
    fn test_maximum_of_symmetric_peak() {
        let xs: Vec<f64> = (0..9).map(|i| i as f64 * 0.25).collect();
        let ys: Vec<f64> = xs.iter().map(|x| (-(x - 1.0f64).powi(2)).exp()).collect();
        let spline = CubicSpline::new(&xs, &ys).unwrap();
        let (x, y) = spline.find_maximum(0.75, 1.25, 1e-9);
        assert!((x - 1.0).abs() < 1e-6, "{x}");
        assert!((y - 1.0).abs() < 1e-6, "{y}");
        let left = spline.find_crossing(0.0, x, 0.5, 1e-6);
        assert!((left - (1.0 - 0.5f64.ln().abs().sqrt())).abs() < 1e-2, "{left}");
    }
}

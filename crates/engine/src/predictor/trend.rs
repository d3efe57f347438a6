const MS_PER_DAY: f64 = 86_400_000.0;

/// Degradation trend for one (device, metric) window: how far the signal
/// sits from its baseline and how fast that gap grows.
#[derive(Debug, Clone, Copy)]
pub struct Trend {
    /// Growth of the normalized deviation, per day. Positive means the
    /// signal is drifting away from its baseline.
    pub slope_per_day: f64,
    /// Mean normalized deviation across the newest quartile.
    pub current_deviation: f64,
    /// Variance of the fit residuals; high values mean a noisy, less
    /// trustworthy trend.
    pub residual_variance: f64,
    pub samples: usize,
}

/// Least-squares slope and intercept. Zero slope when the x spread
/// collapses (all samples at one timestamp).
pub fn linear_fit(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    if points.len() < 2 {
        return (0.0, points.first().map(|p| p.1).unwrap_or(0.0));
    }
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in points {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x) * (x - mean_x);
    }
    if den == 0.0 {
        return (0.0, mean_y);
    }
    let slope = num / den;
    (slope, mean_y - slope * mean_x)
}

/// Deviation-from-baseline trend over an oldest-to-newest sample window.
/// Baseline is the mean of the oldest quartile, so slow drift away from
/// early-life behavior scores, while steady-state noise does not.
pub fn analyze(samples: &[(i64, f64)]) -> Option<Trend> {
    if samples.len() < 2 {
        return None;
    }

    let quartile = (samples.len() / 4).max(1);
    let baseline = samples[..quartile].iter().map(|s| s.1).sum::<f64>() / quartile as f64;
    let scale = baseline.abs().max(1.0);

    let t0 = samples[0].0;
    let points: Vec<(f64, f64)> = samples
        .iter()
        .map(|(ts, v)| (((ts - t0) as f64) / MS_PER_DAY, (v - baseline).abs() / scale))
        .collect();

    let (slope, intercept) = linear_fit(&points);

    let residual_variance = points
        .iter()
        .map(|(x, y)| {
            let r = y - (slope * x + intercept);
            r * r
        })
        .sum::<f64>()
        / points.len() as f64;

    let recent = &points[points.len() - quartile..];
    let current_deviation = recent.iter().map(|p| p.1).sum::<f64>() / recent.len() as f64;

    Some(Trend {
        slope_per_day: slope,
        current_deviation,
        residual_variance,
        samples: samples.len(),
    })
}

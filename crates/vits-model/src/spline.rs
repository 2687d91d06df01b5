//! Monotonic rational-quadratic splines used by the duration flows.
//!
//! Evaluated on the host: the duration predictor latent has two channels
//! per token, so there is little to gain from running this on a device.

/// Smallest bin width after normalization.
pub const MIN_BIN_WIDTH: f32 = 1e-3;
/// Smallest bin height after normalization.
pub const MIN_BIN_HEIGHT: f32 = 1e-3;
/// Smallest knot derivative.
pub const MIN_DERIVATIVE: f32 = 1e-3;

/// Direction in which to evaluate the spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Data to latent.
    Forward,
    /// Latent to data; what inference uses.
    Inverse,
}

/// Evaluate a spline with linear tails.
///
/// `widths` and `heights` hold one unnormalized value per bin, `derivatives`
/// one per interior knot. Inputs outside `[-tail_bound, tail_bound]` are
/// returned unchanged.
pub fn unconstrained_rational_quadratic(
    x: f32,
    widths: &[f32],
    heights: &[f32],
    derivatives: &[f32],
    tail_bound: f32,
    direction: Direction,
) -> f32 {
    if !(-tail_bound..=tail_bound).contains(&x) {
        return x;
    }

    // Boundary derivatives are pinned to 1 after the softplus below.
    let boundary = ((1.0 - MIN_DERIVATIVE).exp() - 1.0).ln();
    let mut padded = Vec::with_capacity(derivatives.len() + 2);
    padded.push(boundary);
    padded.extend_from_slice(derivatives);
    padded.push(boundary);

    rational_quadratic(x, widths, heights, &padded, -tail_bound, tail_bound, direction)
}

fn rational_quadratic(
    x: f32,
    widths: &[f32],
    heights: &[f32],
    derivatives: &[f32],
    lower: f32,
    upper: f32,
    direction: Direction,
) -> f32 {
    let num_bins = widths.len();
    let cumwidths = knots(widths, MIN_BIN_WIDTH, lower, upper);
    let cumheights = knots(heights, MIN_BIN_HEIGHT, lower, upper);
    let derivatives: Vec<f32> = derivatives
        .iter()
        .map(|&d| MIN_DERIVATIVE + softplus(d))
        .collect();

    let locations = match direction {
        Direction::Forward => &cumwidths,
        Direction::Inverse => &cumheights,
    };
    let bin = locations
        .iter()
        .enumerate()
        .filter(|&(i, &loc)| {
            let loc = if i == num_bins { loc + 1e-6 } else { loc };
            x >= loc
        })
        .count()
        .saturating_sub(1)
        .min(num_bins - 1);

    let input_cumwidth = cumwidths[bin];
    let input_width = cumwidths[bin + 1] - cumwidths[bin];
    let input_cumheight = cumheights[bin];
    let input_height = cumheights[bin + 1] - cumheights[bin];
    let delta = input_height / input_width;
    let d0 = derivatives[bin];
    let d1 = derivatives[bin + 1];
    let slope_gap = d0 + d1 - 2.0 * delta;

    match direction {
        Direction::Forward => {
            let theta = (x - input_cumwidth) / input_width;
            let theta_one_minus_theta = theta * (1.0 - theta);
            let numerator = input_height * (delta * theta * theta + d0 * theta_one_minus_theta);
            let denominator = delta + slope_gap * theta_one_minus_theta;
            input_cumheight + numerator / denominator
        }
        Direction::Inverse => {
            let offset = x - input_cumheight;
            let scaled = offset * slope_gap;
            let a = input_height * (delta - d0) + scaled;
            let b = input_height * d0 - scaled;
            let c = -delta * offset;
            let discriminant = (b * b - 4.0 * a * c).max(0.0);
            let root = (2.0 * c) / (-b - discriminant.sqrt());
            root * input_width + input_cumwidth
        }
    }
}

/// Knot positions in `[lower, upper]` from unnormalized bin sizes.
fn knots(unnormalized: &[f32], min_bin: f32, lower: f32, upper: f32) -> Vec<f32> {
    let num_bins = unnormalized.len();
    let max = unnormalized.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = unnormalized.iter().map(|&u| (u - max).exp()).collect();
    let total: f32 = exp.iter().sum();

    let mut knots = Vec::with_capacity(num_bins + 1);
    knots.push(lower);
    let mut acc = 0.0f32;
    for e in &exp {
        acc += min_bin + (1.0 - min_bin * num_bins as f32) * e / total;
        knots.push((upper - lower) * acc + lower);
    }
    knots[num_bins] = upper;
    knots
}

fn softplus(x: f32) -> f32 {
    if x > 20.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

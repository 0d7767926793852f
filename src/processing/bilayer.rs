//! Lipid bilayer detection in 1-D intensity profiles.
//!
//! A bilayer shows up as two dark leaflets (negative peaks) 25-45 Å apart
//! with a brighter intermembrane band (positive peak) between them.

/// Closest leaflet separation accepted as a bilayer, in Å.
pub const MIN_BILAYER_SEPARATION_A: usize = 25;
/// Widest leaflet separation accepted as a bilayer, in Å.
pub const MAX_BILAYER_SEPARATION_A: usize = 45;
/// Peaks must stand out by this fraction of the profile's value range.
pub const PEAK_PROMINENCE_FRACTION: f64 = 0.1;

/// Signed offsets (Å) of one bilayer along the edge normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BilayerCandidate {
    pub inner: i64,
    pub mid: i64,
    pub outer: i64,
}

impl BilayerCandidate {
    pub fn offsets(&self) -> [i64; 3] {
        [self.inner, self.mid, self.outer]
    }

    pub fn separation(&self) -> i64 {
        self.outer - self.inner
    }
}

/// How to choose between several bilayer candidates on one edge.
///
/// The darkest candidate wins only if it is darker than the runner-up by
/// more than `contrast_fraction` of the profile range. This threshold is an
/// empirical tuning knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbiguityPolicy {
    pub contrast_fraction: f64,
}

impl Default for AmbiguityPolicy {
    fn default() -> Self {
        Self {
            contrast_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BilayerChoice {
    Accepted(BilayerCandidate),
    Ambiguous {
        best: BilayerCandidate,
        runner_up: BilayerCandidate,
    },
    NotFound,
}

pub fn value_range(data: &[f64]) -> f64 {
    let max = data.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = data.iter().cloned().fold(f64::INFINITY, f64::min);
    if data.is_empty() {
        0.0
    } else {
        max - min
    }
}

/// Strict local maxima. Flat plateaus count once, at their middle sample
/// (rounded down). The first and last samples are never peaks.
pub fn local_maxima(data: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if data.len() < 3 {
        return peaks;
    }
    let i_max = data.len() - 1;
    let mut i = 1;
    while i < i_max {
        if data[i - 1] < data[i] {
            let mut i_ahead = i + 1;
            while i_ahead < i_max && data[i_ahead] == data[i] {
                i_ahead += 1;
            }
            if data[i_ahead] < data[i] {
                peaks.push((i + i_ahead - 1) / 2);
                i = i_ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Peak prominence: height above the higher of the two lowest points
/// reached before meeting a strictly higher sample (or the boundary) on
/// either side.
pub fn compute_prominences(peaks: &[usize], data: &[f64]) -> Vec<f64> {
    let n = data.len();
    let mut prominences = Vec::with_capacity(peaks.len());

    for &peak in peaks {
        let peak_height = data[peak];

        let mut left_min = peak_height;
        for i in (0..peak).rev() {
            if data[i] > peak_height {
                break;
            }
            left_min = left_min.min(data[i]);
        }

        let mut right_min = peak_height;
        for i in peak + 1..n {
            if data[i] > peak_height {
                break;
            }
            right_min = right_min.min(data[i]);
        }

        prominences.push(peak_height - left_min.max(right_min));
    }

    prominences
}

/// Local maxima whose prominence is at least `min_prominence`.
pub fn find_peaks(data: &[f64], min_prominence: f64) -> Vec<usize> {
    let candidates = local_maxima(data);
    let prominences = compute_prominences(&candidates, data);
    candidates
        .into_iter()
        .zip(prominences)
        .filter(|&(_, p)| p >= min_prominence)
        .map(|(i, _)| i)
        .collect()
}

/// Scans a profile (index `i` = offset `i - half_window` Å) for
/// negative/positive/negative peak triplets with a plausible leaflet
/// separation.
///
/// Each positive peak is paired with the nearest negative peak before it
/// and the next one after it. The scan stops once a positive peak has no
/// negative peak after it.
pub fn find_bilayers(intensities: &[f64], half_window: usize) -> Vec<BilayerCandidate> {
    let mut candidates = Vec::new();

    let threshold = PEAK_PROMINENCE_FRACTION * value_range(intensities);
    let pos_peaks = find_peaks(intensities, threshold);
    let negated: Vec<f64> = intensities.iter().map(|v| -v).collect();
    let neg_peaks = find_peaks(&negated, threshold);

    if neg_peaks.len() < 2 || pos_peaks.is_empty() {
        return candidates;
    }

    // First positive peak with at least one negative peak before it.
    let Some(mut pos_i) = pos_peaks.iter().position(|&p| p > neg_peaks[0]) else {
        return candidates;
    };

    let offset = half_window as i64;
    let mut neg_i = 0;
    while pos_i < pos_peaks.len() {
        let pos = pos_peaks[pos_i];
        while neg_i + 1 < neg_peaks.len() && neg_peaks[neg_i + 1] < pos {
            neg_i += 1;
        }
        if neg_i == neg_peaks.len() - 1 {
            return candidates;
        }

        let separation = neg_peaks[neg_i + 1] - neg_peaks[neg_i];
        if (MIN_BILAYER_SEPARATION_A..=MAX_BILAYER_SEPARATION_A).contains(&separation) {
            candidates.push(BilayerCandidate {
                inner: neg_peaks[neg_i] as i64 - offset,
                mid: pos as i64 - offset,
                outer: neg_peaks[neg_i + 1] as i64 - offset,
            });
        }
        pos_i += 1;
    }
    candidates
}

/// Summed intensity of the two leaflets; darker bilayers score lower.
pub fn bilayer_intensity(
    intensities: &[f64],
    candidate: &BilayerCandidate,
    half_window: usize,
) -> f64 {
    let at = |offset: i64| intensities[(offset + half_window as i64) as usize];
    at(candidate.inner) + at(candidate.outer)
}

/// Picks the bilayer to keep for one edge, or reports why none was kept.
pub fn select_bilayer(
    intensities: &[f64],
    candidates: &[BilayerCandidate],
    half_window: usize,
    policy: &AmbiguityPolicy,
) -> BilayerChoice {
    match candidates {
        [] => BilayerChoice::NotFound,
        [only] => BilayerChoice::Accepted(*only),
        _ => {
            let mut ranked: Vec<(f64, BilayerCandidate)> = candidates
                .iter()
                .map(|c| (bilayer_intensity(intensities, c, half_window), *c))
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (best_score, best) = ranked[0];
            let (runner_score, runner_up) = ranked[1];
            if runner_score - best_score > policy.contrast_fraction * value_range(intensities) {
                BilayerChoice::Accepted(best)
            } else {
                BilayerChoice::Ambiguous { best, runner_up }
            }
        }
    }
}

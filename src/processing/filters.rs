//! Owned single-channel micrograph buffer and the separable Gaussian blur
//! applied before intensity profiling.

/// Row-major `f32` image, `data.len() == w * h`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl ImageF32 {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    pub fn from_vec(w: usize, h: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == w * h).then_some(Self { w, h, data })
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.w + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// Value at a signed pixel coordinate, `None` outside the image.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<f32> {
        if x < 0 || y < 0 || x as usize >= self.w || y as usize >= self.h {
            return None;
        }
        Some(self.get(x as usize, y as usize))
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    pub fn row(&self, y: usize) -> &[f32] {
        let start = y * self.w;
        &self.data[start..start + self.w]
    }
}

/// Normalised Gaussian taps, `exp(-(i - c)^2 / 2σ^2)` around the centre
/// `c = (ksize - 1) / 2`.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    let centre = (ksize as f64 - 1.0) / 2.0;
    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - centre;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Mirror an out-of-range index without repeating the edge sample
/// (`dcb|abcd|cba`).
fn reflect_101(idx: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = idx.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

fn convolve_rows(src: &ImageF32, taps: &[f32]) -> ImageF32 {
    let radius = (taps.len() / 2) as isize;
    let mut dst = ImageF32::new(src.w, src.h);
    for y in 0..src.h {
        let row = src.row(y);
        for x in 0..src.w {
            let mut acc = 0.0f32;
            for (k, &t) in taps.iter().enumerate() {
                let sx = reflect_101(x as isize + k as isize - radius, src.w);
                acc += t * row[sx];
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

fn convolve_cols(src: &ImageF32, taps: &[f32]) -> ImageF32 {
    let radius = (taps.len() / 2) as isize;
    let mut dst = ImageF32::new(src.w, src.h);
    for y in 0..src.h {
        for x in 0..src.w {
            let mut acc = 0.0f32;
            for (k, &t) in taps.iter().enumerate() {
                let sy = reflect_101(y as isize + k as isize - radius, src.h);
                acc += t * src.get(x, sy);
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Separable Gaussian blur with an odd `ksize × ksize` kernel.
pub fn gaussian_blur(src: &ImageF32, ksize: usize, sigma: f64) -> ImageF32 {
    if src.w == 0 || src.h == 0 || ksize <= 1 {
        return src.clone();
    }
    let taps = gaussian_kernel(ksize | 1, sigma);
    let horizontal = convolve_rows(src, &taps);
    convolve_cols(&horizontal, &taps)
}

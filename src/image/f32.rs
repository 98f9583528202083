//! Owned single-channel f32 image in row-major layout (stride == width).
//!
//! Gray levels are kept in `[0, 1]` when loaded from disk. Sampling helpers
//! return `None` outside the image so callers choose the fill policy.
#[derive(Clone, Debug)]
pub struct ImageF32 {
    /// Image width in pixels
    pub w: usize,
    /// Image height in pixels
    pub h: usize,
    /// Number of f32 elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<f32>,
}

impl ImageF32 {
    /// Construct a zero-initialized buffer of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![0.0; w * h],
        }
    }

    /// Construct by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(w: usize, h: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        Self {
            w,
            h,
            stride: w,
            data,
        }
    }

    #[inline]
    /// Convert (x, y) to a linear index into `data`.
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.stride + x
    }
    #[inline]
    /// Get the pixel value at (x, y).
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[self.idx(x, y)]
    }
    #[inline]
    /// Set the pixel value at (x, y).
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        let i = self.idx(x, y);
        self.data[i] = v;
    }

    /// Mean gray level; 0 for an empty image.
    pub fn mean(&self) -> f64 {
        let n = self.w * self.h;
        if n == 0 {
            return 0.0;
        }
        let mut sum = 0.0f64;
        for y in 0..self.h {
            let start = y * self.stride;
            sum += self.data[start..start + self.w]
                .iter()
                .map(|&v| v as f64)
                .sum::<f64>();
        }
        sum / n as f64
    }

    /// Bilinear sample at a sub-pixel position (pixel centres at integers).
    ///
    /// Returns `None` when the 2×2 support leaves the image.
    #[inline]
    pub fn sample_bilinear(&self, x: f64, y: f64) -> Option<f64> {
        if !(x >= 0.0 && y >= 0.0) {
            return None;
        }
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        if self.w == 0 || self.h == 0 || x0 >= self.w || y0 >= self.h {
            return None;
        }
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;
        let x1 = if fx > 0.0 { x0 + 1 } else { x0 };
        let y1 = if fy > 0.0 { y0 + 1 } else { y0 };
        if x1 >= self.w || y1 >= self.h {
            return None;
        }
        let v00 = self.get(x0, y0) as f64;
        let v10 = self.get(x1, y0) as f64;
        let v01 = self.get(x0, y1) as f64;
        let v11 = self.get(x1, y1) as f64;
        let top = v00 + (v10 - v00) * fx;
        let bottom = v01 + (v11 - v01) * fx;
        Some(top + (bottom - top) * fy)
    }
}

impl crate::image::traits::ImageView for ImageF32 {
    type Pixel = f32;

    #[inline]
    fn width(&self) -> usize {
        self.w
    }
    #[inline]
    fn height(&self) -> usize {
        self.h
    }
    #[inline]
    fn stride(&self) -> usize {
        self.stride
    }
    #[inline]
    fn row(&self, y: usize) -> &[f32] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }
}

impl crate::image::traits::ImageViewMut for ImageF32 {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [f32] {
        let start = y * self.stride;
        let end = start + self.w;
        &mut self.data[start..end]
    }
}

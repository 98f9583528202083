//! Sample-window layouts used by the canonical recipes.
//!
//! For an `n × n` grid over a `w × h` image the cell size is `s = (w/n, h/n)`;
//! points sit at cell centres and windows are `win_scale_factor · s`.

use crate::swim::WindowSize;

/// Window centres plus their common size.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowGrid {
    pub points: Vec<[f64; 2]>,
    pub window: WindowSize,
}

/// Regular `n × n` grid of windows (`n = 1` is the single centred window).
pub fn grid(width: usize, height: usize, n: usize, win_scale_factor: f64) -> WindowGrid {
    let n = n.max(1);
    let sx = width as f64 / n as f64;
    let sy = height as f64 / n as f64;
    let mut points = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            points.push([0.5 * sx + i as f64 * sx, 0.5 * sy + j as f64 * sy]);
        }
    }
    WindowGrid {
        points,
        window: WindowSize::new(win_scale_factor * sx, win_scale_factor * sy),
    }
}

/// One window covering the whole image, used to re-measure SNR.
pub fn full_image(width: usize, height: usize) -> WindowGrid {
    WindowGrid {
        points: vec![[width as f64 / 2.0, height as f64 / 2.0]],
        window: WindowSize::new(width as f64, height as f64),
    }
}

/// Small square window centred on manual match points.
pub fn match_point_window(width: usize, fraction: f64) -> WindowSize {
    WindowSize::square(width as f64 * fraction)
}

use swim_align::image::{ImageF32, MemoryImageSource};
use swim_align::project::ProjectModel;

struct Blob {
    x: f64,
    y: f64,
    sigma: f64,
    amp: f64,
}

/// Deterministic texture of Gaussian blobs. Shifted copies are rendered
/// analytically, so sub-pixel offsets are exact.
pub struct BlobField {
    blobs: Vec<Blob>,
}

impl BlobField {
    /// `count` blobs spread over the frame plus a margin for shifted renders.
    pub fn new(width: f64, height: f64, count: usize, seed: u64) -> Self {
        let margin = 32.0;
        let mut state = seed;
        let mut next = move || {
            state = splitmix64(state);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let blobs = (0..count)
            .map(|_| Blob {
                x: -margin + next() * (width + 2.0 * margin),
                y: -margin + next() * (height + 2.0 * margin),
                sigma: 2.5 + 2.5 * next(),
                amp: if next() < 0.4 { -0.3 } else { 0.3 } * (0.5 + next()),
            })
            .collect();
        Self { blobs }
    }

    /// `w × h` render whose content is moved by `shift`.
    pub fn render(&self, w: usize, h: usize, shift: [f64; 2]) -> ImageF32 {
        let mut img = ImageF32::from_fn(w, h, |_, _| 0.5);
        for b in &self.blobs {
            let (cx, cy) = (b.x + shift[0], b.y + shift[1]);
            let reach = 4.0 * b.sigma;
            let x0 = (cx - reach).floor().max(0.0) as usize;
            let y0 = (cy - reach).floor().max(0.0) as usize;
            let x1 = ((cx + reach).ceil().max(0.0) as usize).min(w);
            let y1 = ((cy + reach).ceil().max(0.0) as usize).min(h);
            let inv = 1.0 / (2.0 * b.sigma * b.sigma);
            for y in y0..y1 {
                for x in x0..x1 {
                    let (dx, dy) = (x as f64 - cx, y as f64 - cy);
                    let v = b.amp * (-(dx * dx + dy * dy) * inv).exp();
                    let cur = img.get(x, y);
                    img.set(x, y, cur + v as f32);
                }
            }
        }
        img
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn stack_filenames(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("s{i:03}.tif")).collect()
}

/// Register `images[i]` under the base filename of layer `i` of scale `factor`.
pub fn insert_scale_images(
    source: &mut MemoryImageSource,
    project: &ProjectModel,
    factor: u32,
    images: Vec<ImageF32>,
) {
    let scale = project.scale(factor).expect("scale exists");
    for (layer, image) in scale.alignment_stack.iter().zip(images) {
        source.insert(layer.images.base.filename.clone(), image);
    }
}

/// Translation the affine applies at the image centre.
pub fn centre_shift(afm: &swim_align::Affine, w: usize, h: usize) -> [f64; 2] {
    let c = [w as f64 / 2.0, h as f64 / 2.0];
    let p = afm.apply(c);
    [p[0] - c[0], p[1] - c[1]]
}

pub fn assert_close(got: [f64; 2], want: [f64; 2], tol: f64, what: &str) {
    assert!(
        (got[0] - want[0]).abs() < tol && (got[1] - want[1]).abs() < tol,
        "{what}: got {got:?}, want {want:?}"
    );
}

//! Plain-text dumps of the decomposed stack and its fitted trends.
//!
//! Every parameter gets `<name>.dat` (raw cumulative values) and
//! `<name>_fit.dat` (fitted trend), one `<index> <value>` line per layer.

use super::{decompose_stack, BiasFuncs, BiasParam};
use crate::affine::Affine;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Write the bias analysis files for `cafms` into `dir`.
pub fn write_bias_analysis(dir: &Path, cafms: &[Affine], funcs: &BiasFuncs) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| format!("Failed to create {}: {e}", dir.display()))?;
    let params = decompose_stack(cafms).map_err(|e| e.to_string())?;
    for param in BiasParam::ALL {
        let raw: Vec<f64> = params.iter().map(|p| param.of(p)).collect();
        let trend = &funcs.trend(param).trend;
        let fit: Vec<f64> = (0..raw.len()).map(|i| trend.eval(i as f64)).collect();
        write_dat(&dir.join(format!("{}.dat", param.name())), &raw)?;
        write_dat(&dir.join(format!("{}_fit.dat", param.name())), &fit)?;
    }
    Ok(())
}

fn write_dat(path: &Path, values: &[f64]) -> Result<(), String> {
    let mut text = String::new();
    for (i, v) in values.iter().enumerate() {
        let _ = writeln!(text, "{i} {}", format_g(*v));
    }
    fs::write(path, text).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

/// C-style `%.6g`.
pub(crate) fn format_g(v: f64) -> String {
    const PRECISION: i32 = 6;
    if v == 0.0 {
        return "0".to_string();
    }
    if !v.is_finite() {
        return format!("{v}");
    }
    // Exponent after rounding to the requested significant digits.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, v);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };
    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(&mantissa), exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}"))
    }
}

fn trim_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bias::null_bias;

    #[test]
    fn formats_like_printf_g() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(-0.5), "-0.5");
        assert_eq!(format_g(123.456789), "123.457");
        assert_eq!(format_g(0.000123456), "0.000123456");
        assert_eq!(format_g(1.5e-7), "1.5e-07");
        assert_eq!(format_g(2_500_000.0), "2.5e+06");
        assert_eq!(format_g(999999.5), "1e+06");
    }

    #[test]
    fn writes_one_pair_of_files_per_parameter() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("bias");
        let afms: Vec<Affine> = (0..5).map(|i| Affine::translation(i as f64, 0.0)).collect();
        let out = null_bias(&afms, 2, 1).unwrap();
        write_bias_analysis(&dir, &out.cumulative, &out.funcs).unwrap();
        for param in BiasParam::ALL {
            let raw = fs::read_to_string(dir.join(format!("{}.dat", param.name()))).unwrap();
            assert_eq!(raw.lines().count(), 5);
            assert!(dir.join(format!("{}_fit.dat", param.name())).exists());
        }
        let scale = fs::read_to_string(dir.join("scale_x.dat")).unwrap();
        assert!(scale.lines().all(|l| l.ends_with(" 1")), "{scale}");
    }
}

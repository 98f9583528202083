//! Strongly typed project document.
//!
//! Mirrors the JSON layout shared with the GUI and scripts:
//! `data.scales["scale_N"].alignment_stack[i].align_to_ref_method.method_results`.
//! Fields the engine does not interpret are kept in `extra` maps so that a
//! load/save round trip preserves them.

pub mod link;
pub mod status;

use crate::affine::Affine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use link::{link_stack, reference_index};
pub use status::{evaluate_status, ProjectStatus, ScaleStatus};

/// How a layer's initial affine is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentOption {
    /// Bootstrap from scratch with the 1×1 → 2×2 → 4×4 recipe.
    #[default]
    InitAffine,
    /// Refine an affine carried over from a coarser scale.
    RefineAffine,
    /// Keep the carried-over affine and only re-measure SNR.
    ApplyAffine,
}

impl AlignmentOption {
    /// Options that need a seed scale to start from.
    pub fn needs_seed(self) -> bool {
        !matches!(self, AlignmentOption::InitAffine)
    }
}

impl std::fmt::Display for AlignmentOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlignmentOption::InitAffine => "init_affine",
            AlignmentOption::RefineAffine => "refine_affine",
            AlignmentOption::ApplyAffine => "apply_affine",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectedMethod {
    #[default]
    #[serde(rename = "Auto Swim Align")]
    AutoSwimAlign,
    #[serde(rename = "Match Point Align")]
    MatchPointAlign,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectModel {
    #[serde(default = "default_version")]
    pub version: f64,
    pub data: ProjectData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> f64 {
    0.31
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub destination_path: String,
    #[serde(default)]
    pub current_scale: String,
    #[serde(default)]
    pub scales: BTreeMap<String, ScaleRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScaleRecord {
    #[serde(default)]
    pub method_data: ScaleMethodData,
    #[serde(default)]
    pub null_cafm_trends: bool,
    #[serde(default = "default_poly_order")]
    pub poly_order: usize,
    #[serde(default)]
    pub use_bounding_rect: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<[i64; 4]>,
    #[serde(default)]
    pub alignment_stack: Vec<LayerRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_poly_order() -> usize {
    4
}

impl Default for ScaleRecord {
    fn default() -> Self {
        Self {
            method_data: ScaleMethodData::default(),
            null_cafm_trends: false,
            poly_order: default_poly_order(),
            use_bounding_rect: false,
            bounding_rect: None,
            alignment_stack: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScaleMethodData {
    #[serde(default)]
    pub alignment_option: AlignmentOption,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerRecord {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub images: LayerImages,
    #[serde(default)]
    pub align_to_ref_method: AlignToRefMethod,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayerRecord {
    /// New layer for `base` with an empty reference.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            images: LayerImages {
                base: ImageEntry::new(base),
                ..LayerImages::default()
            },
            ..Self::default()
        }
    }

    pub fn results(&self) -> &MethodResults {
        &self.align_to_ref_method.method_results
    }

    pub fn results_mut(&mut self) -> &mut MethodResults {
        &mut self.align_to_ref_method.method_results
    }

    /// Aligned means skipped or holding an affine result.
    pub fn is_aligned(&self) -> bool {
        self.skip || self.results().affine_matrix.is_some()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerImages {
    #[serde(rename = "ref", default)]
    pub reference: ImageEntry,
    #[serde(default)]
    pub base: ImageEntry,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub metadata: ImageMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImageEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(default)]
    pub match_points: Vec<[f64; 2]>,
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlignToRefMethod {
    #[serde(default)]
    pub selected_method: SelectedMethod,
    #[serde(default)]
    pub method_data: MethodData,
    #[serde(default)]
    pub method_results: MethodResults,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MethodData {
    #[serde(default)]
    pub alignment_option: AlignmentOption,
    #[serde(default)]
    pub bias_x_per_image: f64,
    #[serde(default)]
    pub bias_y_per_image: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitening_factor: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affine_matrix: Option<Affine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cumulative_afm: Option<Affine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snr: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr_report: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MethodResults {
    /// Identity result for layers that are skipped or have nothing to show.
    pub fn unaligned() -> Self {
        Self {
            affine_matrix: Some(Affine::identity()),
            cumulative_afm: Some(Affine::identity()),
            snr: vec![0.0],
            snr_report: Some("SNR: --".to_string()),
            extra: Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.affine_matrix.is_none()
    }
}

/// `scale_N` key for downsampling factor `n`.
pub fn scale_key(n: u32) -> String {
    format!("scale_{n}")
}

/// Downsampling factor of a `scale_N` key.
pub fn parse_scale_key(key: &str) -> Option<u32> {
    key.strip_prefix("scale_")?.parse().ok().filter(|&n| n > 0)
}

impl ProjectModel {
    /// Empty project rooted at `destination_path`.
    pub fn new(source_path: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            data: ProjectData {
                source_path: source_path.into(),
                destination_path: destination_path.into(),
                ..ProjectData::default()
            },
            extra: Map::new(),
        }
    }

    /// Project with one linked stack per factor. Layer images live under
    /// `<destination>/scale_N/img_src/<file name>`.
    pub fn new_stack(
        source_path: &str,
        destination_path: &str,
        filenames: &[String],
        factors: &[u32],
    ) -> Self {
        let mut project = Self::new(source_path, destination_path);
        for &n in factors {
            let mut stack: Vec<LayerRecord> = filenames
                .iter()
                .map(|f| {
                    let name = std::path::Path::new(f)
                        .file_name()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| f.clone());
                    LayerRecord::with_base(format!(
                        "{destination_path}/{}/img_src/{name}",
                        scale_key(n)
                    ))
                })
                .collect();
            link_stack(&mut stack);
            project.data.scales.insert(
                scale_key(n),
                ScaleRecord {
                    alignment_stack: stack,
                    ..ScaleRecord::default()
                },
            );
        }
        if let Some(coarsest) = project.scale_factors().last() {
            project.data.current_scale = scale_key(*coarsest);
        }
        project
    }

    /// Defined downsampling factors, finest first.
    pub fn scale_factors(&self) -> Vec<u32> {
        let mut factors: Vec<u32> = self
            .data
            .scales
            .keys()
            .filter_map(|k| parse_scale_key(k))
            .collect();
        factors.sort_unstable();
        factors
    }

    pub fn scale(&self, n: u32) -> Option<&ScaleRecord> {
        self.data.scales.get(&scale_key(n))
    }

    pub fn scale_mut(&mut self, n: u32) -> Option<&mut ScaleRecord> {
        self.data.scales.get_mut(&scale_key(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYER_JSON: &str = r#"{
        "skip": false,
        "images": {
            "ref": {"filename": "/p/scale_4/img_src/a.tif", "metadata": {"match_points": [], "annotations": []}},
            "base": {"filename": "/p/scale_4/img_src/b.tif", "metadata": {"match_points": [[1.0, 2.0]], "annotations": []}},
            "aligned": {"filename": "", "metadata": {}}
        },
        "align_to_ref_method": {
            "selected_method": "Auto Swim Align",
            "method_options": ["Auto Swim Align", "Match Point Align"],
            "method_data": {
                "alignment_option": "refine_affine",
                "bias_x_per_image": 0.5,
                "bias_y_per_image": -1.0,
                "bias_rot_per_image": 0.0,
                "whitening_factor": -0.68
            },
            "method_results": {
                "affine_matrix": [[1.0, 0.0, 3.0], [0.0, 1.0, -2.0]],
                "snr": [12.5, 13.0],
                "snr_report": "SNR: 12.8 (+-0.2 n:2)  <12.5  13.0>"
            }
        }
    }"#;

    #[test]
    fn layer_record_reads_persisted_shape() {
        let layer: LayerRecord = serde_json::from_str(LAYER_JSON).unwrap();
        let method = &layer.align_to_ref_method;
        assert_eq!(method.selected_method, SelectedMethod::AutoSwimAlign);
        assert_eq!(
            method.method_data.alignment_option,
            AlignmentOption::RefineAffine
        );
        assert_eq!(method.method_data.whitening_factor, Some(-0.68));
        assert_eq!(method.method_data.win_scale_factor, None);
        assert_eq!(
            layer.results().affine_matrix,
            Some(Affine::translation(3.0, -2.0))
        );
        assert!(layer.results().cumulative_afm.is_none());
        assert_eq!(layer.images.base.metadata.match_points, vec![[1.0, 2.0]]);
        assert!(layer.is_aligned());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let layer: LayerRecord = serde_json::from_str(LAYER_JSON).unwrap();
        let value = serde_json::to_value(&layer).unwrap();
        assert_eq!(
            value["align_to_ref_method"]["method_options"][1],
            "Match Point Align"
        );
        assert_eq!(
            value["align_to_ref_method"]["method_data"]["bias_rot_per_image"],
            0.0
        );
        assert_eq!(value["images"]["aligned"]["filename"], "");
        assert!(value["align_to_ref_method"]["method_results"]
            .get("cumulative_afm")
            .is_none());
    }

    #[test]
    fn scale_keys_parse() {
        assert_eq!(parse_scale_key("scale_4"), Some(4));
        assert_eq!(parse_scale_key("scale_0"), None);
        assert_eq!(parse_scale_key("scale_x"), None);
        assert_eq!(scale_key(2), "scale_2");
    }

    #[test]
    fn new_stack_links_layers() {
        let files: Vec<String> = ["/src/a.tif", "/src/b.tif", "/src/c.tif"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let project = ProjectModel::new_stack("/src", "/dst", &files, &[1, 4, 2]);
        assert_eq!(project.scale_factors(), vec![1, 2, 4]);
        assert_eq!(project.data.current_scale, "scale_4");
        let stack = &project.scale(2).unwrap().alignment_stack;
        assert_eq!(stack[1].images.base.filename, "/dst/scale_2/img_src/b.tif");
        assert_eq!(stack[1].images.reference.filename, "/dst/scale_2/img_src/a.tif");
        assert_eq!(stack[0].images.reference.filename, "");
    }

    #[test]
    fn project_round_trips_through_json() {
        let files = vec!["a.tif".to_string(), "b.tif".to_string()];
        let project = ProjectModel::new_stack("/src", "/dst", &files, &[1]);
        let json = serde_json::to_string(&project).unwrap();
        let back: ProjectModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scale_factors(), vec![1]);
        assert_eq!(back.scale(1).unwrap().poly_order, 4);
        assert_eq!(back.scale(1).unwrap().alignment_stack.len(), 2);
    }
}

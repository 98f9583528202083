use std::env;
use std::path::Path;
use swim_align::bias::report::write_bias_analysis;
use swim_align::bias::{chain_cumulative, null_bias, BiasParam};
use swim_align::config::align_stack::load_config;
use swim_align::driver::{align_scale, stack::layer_affines};
use swim_align::image::io::{read_json_file, write_json_file};
use swim_align::image::FsImageSource;
use swim_align::project::ProjectModel;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config = load_config(Path::new(&config_path))?;

    let mut project: ProjectModel = read_json_file(&config.project)?;
    let images = match &config.image_root {
        Some(root) => FsImageSource::with_root(root),
        None => FsImageSource::new(),
    };
    let matcher = config.alignment.matcher();
    let report = align_scale(
        &mut project,
        &config.request,
        &config.alignment,
        &matcher,
        &images,
    )
    .map_err(|e| e.to_string())?;

    write_json_file(config.output_project(), &project)?;
    println!(
        "scale_{}: {} aligned, {} failed, {} layers in range; project saved to {}",
        report.scale,
        report.aligned_count(),
        report.failed_count(),
        report.end_layer - report.start_layer,
        config.output_project().display()
    );

    if let Some(path) = &config.output.report_json {
        write_json_file(path, &report)?;
        println!("Saved batch report to {}", path.display());
    }

    if let Some(dir) = &config.output.bias_analysis_dir {
        let scale = project
            .scale_mut(report.scale)
            .ok_or_else(|| format!("Project lost scale_{}", report.scale))?;
        let poly_order = scale.poly_order;
        let afms = layer_affines(scale, false);
        let correction = null_bias(&afms, poly_order, config.alignment.bias_iterations.max(1))
            .map_err(|e| e.to_string())?;
        let raw = chain_cumulative(&afms, None);
        write_bias_analysis(dir, &raw, &correction.funcs)?;
        println!(
            "Saved bias analysis ({} parameters) to {}",
            BiasParam::ALL.len(),
            dir.display()
        );
    }

    Ok(())
}

fn usage() -> String {
    "Usage: align_stack <config.json>".to_string()
}

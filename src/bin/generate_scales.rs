use std::env;
use std::path::Path;
use swim_align::config::generate_scales::load_config;
use swim_align::image::io::{load_grayscale_f32, save_grayscale_f32, write_json_file};
use swim_align::project::ProjectModel;
use swim_align::scales::{scale_image_path, ScaleSet};

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
    let names = config.resolve_images()?;

    for name in &names {
        let image = load_grayscale_f32(&config.source_dir.join(name))?;
        let set = ScaleSet::build(&image, &config.factors).map_err(|e| e.to_string())?;
        for level in &set.levels {
            save_grayscale_f32(
                &level.image,
                &scale_image_path(&config.destination, level.factor, name),
            )?;
        }
        log::info!("{name}: {} scales written", set.levels.len());
    }

    let destination = config.destination.to_string_lossy().into_owned();
    let project = ProjectModel::new_stack(
        &config.source_dir.to_string_lossy(),
        &destination,
        &names,
        &config.factors,
    );
    let project_path = config.project_path();
    write_json_file(&project_path, &project)?;
    println!(
        "Wrote {} images at scales {:?}; project saved to {}",
        names.len(),
        project.scale_factors(),
        project_path.display()
    );
    Ok(())
}

fn usage() -> String {
    "Usage: generate_scales <config.json>".to_string()
}

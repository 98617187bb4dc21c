use course_image_optimizer::config::Config;
use course_image_optimizer::runner;
use std::env;
use std::path::Path;
use std::process;

fn main() {
    // Optional single argument: path to a TOML config file.
    let config = match env::args().nth(1) {
        Some(path) => match Config::load(Path::new(&path)) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("Could not load configuration {path}: {error}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    if let Err(error) = runner::run(&config) {
        eprintln!("Failed to execute main function: {error}");
        process::exit(1);
    }
}

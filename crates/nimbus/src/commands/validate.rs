use colored::Colorize;
use std::path::PathBuf;

pub fn handle(file: Option<PathBuf>) -> anyhow::Result<()> {
    println!("{}", "Validating spec...".blue());

    let (path, document) = match super::load(file) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Could not load spec".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };
    println!("Spec file: {}", path.display().to_string().cyan());

    match nimbus_cloud::validate(&document.server) {
        Ok(spec) => {
            println!("{}", "✓ Spec is valid".green().bold());
            println!();
            super::print_plan(&spec);
            if let Some(cloud) = &document.cloud.cloud {
                println!("  cloud:       {}", cloud);
            }
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid spec".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

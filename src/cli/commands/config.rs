//! Config command.

use confsync::Settings;

/// Display the resolved settings.
pub fn run(settings: &Settings) {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    match settings.to_toml() {
        Ok(toml_str) => println!("{toml_str}"),
        Err(e) => eprintln!("Error displaying config: {e}"),
    }
}

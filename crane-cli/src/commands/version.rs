//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("crane-imports - application import pipelines for Tekton");
    println!();
    println!("Version:     {}", VERSION);
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Resources:");
    println!("  tekton.dev/v1beta1 Pipeline");
    println!("  tekton.dev/v1beta1 PipelineRun");

    Ok(())
}

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use clap::Args;
use vocker::BuildOptions;
use vocker_shared::constants::DEFAULT_BUILD_FILE;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build script to read, `-` for stdin
    #[arg(short = 'f', long = "file", default_value = DEFAULT_BUILD_FILE)]
    pub file: String,

    /// Name the resulting image
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Rebuild every layer even if it is cached
    #[arg(long = "force-rm")]
    pub force_rm: bool,

    /// Print the layers the build would produce without building them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: BuildArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let script = read_script(&args.file)?;
    let runtime = global.create_runtime()?;

    let options = BuildOptions {
        force_rebuild: args.force_rm,
        tag: args.tag,
    };

    if args.dry_run {
        let plan = runtime.plan(&script, &options)?;
        for e in &plan.parse_errors {
            eprintln!("Warning: {}", e);
        }
        for layer in &plan.layers {
            let status = if layer.cached { "cached" } else { "build" };
            println!("{}\t{}\t{}", layer.name, status, layer.instruction);
        }
        return Ok(());
    }

    let outcome = runtime.build(&script, &options).await?;
    for e in &outcome.parse_errors {
        eprintln!("Warning: {}", e);
    }

    println!("{}", outcome.identity());
    Ok(())
}

fn read_script(file: &str) -> anyhow::Result<String> {
    if file == "-" {
        tracing::debug!("Reading build script from stdin");
        let mut script = String::new();
        std::io::stdin()
            .read_to_string(&mut script)
            .context("Failed to read build script from stdin")?;
        return Ok(script);
    }

    tracing::debug!("Reading build script from {}", file);
    std::fs::read_to_string(Path::new(file))
        .with_context(|| format!("Failed to read build script {}", file))
}

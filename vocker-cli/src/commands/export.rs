use std::path::PathBuf;

use clap::Args;
use vocker::DiskFormat;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Tag or layer name of the image
    pub image: String,

    /// Destination file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output disk format (raw or qcow2)
    #[arg(long, default_value = "raw")]
    pub format: DiskFormat,
}

pub async fn execute(args: ExportArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime()?;

    runtime
        .export(&args.image, &args.output, args.format)
        .await?;

    println!("{}", args.output.display());
    Ok(())
}

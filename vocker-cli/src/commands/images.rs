use clap::Args;
use comfy_table::{Table, presets};

/// Layer hashes are shortened to this length unless `--no-trunc` is given
const SHORT_NAME_LEN: usize = 12;

#[derive(Args, Debug)]
pub struct ImagesArgs {
    /// Only print layer names
    #[arg(short, long)]
    pub quiet: bool,

    /// Don't truncate layer names
    #[arg(long)]
    pub no_trunc: bool,
}

pub async fn execute(args: ImagesArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let runtime = global.create_runtime()?;
    let images = runtime.images()?;

    let short = |name: &str| -> String {
        if args.no_trunc {
            name.to_string()
        } else {
            name.chars().take(SHORT_NAME_LEN).collect()
        }
    };

    if args.quiet {
        for image in &images {
            println!("{}", short(&image.name));
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["NAME", "PARENT", "CREATED", "STATUS", "INSTRUCTION"]);

    for image in &images {
        table.add_row(vec![
            short(&image.name),
            image.parent.as_deref().map(short).unwrap_or_default(),
            image.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            if image.complete { "complete" } else { "incomplete" }.to_string(),
            image.instruction.clone(),
        ]);
    }

    println!("{table}");
    Ok(())
}

use super::{Connection, Options};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::manifest::{self, Manifest};
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;

pub fn run(ctx: &Context, options: &Options, args: &ApplyArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    if manifest.is_empty() {
        ui::info("Manifest declares nothing");
        return Ok(());
    }

    let target = options.host.as_deref().unwrap_or("localhost");
    ui::header(&format!("Converging {} entries on {target}", manifest.len()));
    for line in manifest.plan() {
        ui::dim(&line);
    }

    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }
    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let mut connection = Connection::open(ctx, options)?;
    println!();
    let summary = connection.on_host(|host| manifest::apply(host, &manifest));
    connection.report(ctx);

    println!();
    if summary.applied == 0 && summary.is_success() {
        ui::success("Everything already converged");
    } else {
        println!(
            "  {} changed, {} unchanged, {} failed",
            summary.applied.to_string().green(),
            summary.no_change,
            if summary.failed > 0 {
                summary.failed.to_string().red()
            } else {
                summary.failed.to_string().normal()
            }
        );
    }
    if !summary.is_success() {
        bail!("{} of {} operations failed", summary.failed, summary.total());
    }
    Ok(())
}

fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;
    Ok(confirmed)
}

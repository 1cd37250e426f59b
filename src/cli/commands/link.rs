//! `tts link` command - set a reference field

use miette::Result;

use crate::cli::helpers::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct LinkArgs {
    /// Thing id or id prefix
    pub id: String,

    /// Reference field (e.g. owner, categories, parameter_type)
    pub field: String,

    /// Target id or id prefix
    pub target: String,
}

pub async fn run(args: LinkArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let source = workspace.find(&args.id)?;
    let target = workspace.find(&args.target)?;

    let mut tx = workspace.session.open_transaction(&source)?;
    let mut edited = tx.snapshot(&source);
    edited.data.set_reference(&args.field, target.id())?;
    tx.create_or_update(edited)?;
    workspace.commit(tx, global).await?;

    if !global.quiet {
        println!(
            "{} {} --[{}]--> {}",
            console::style("✓").green(),
            console::style(source.id().short()).cyan(),
            args.field,
            console::style(target.id().short()).cyan()
        );
    }
    Ok(())
}

//! `tts set` command - edit attributes of a thing

use miette::Result;

use crate::cli::helpers::{parse_assignment, Workspace};
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Thing id or id prefix
    pub id: String,

    /// Attributes as field=value
    #[arg(required = true, value_name = "FIELD=VALUE")]
    pub assignments: Vec<String>,
}

pub async fn run(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let target = workspace.find(&args.id)?;

    let mut tx = workspace.session.open_transaction(&target)?;
    let mut edited = tx.snapshot(&target);
    for assignment in &args.assignments {
        let (field, value) = parse_assignment(assignment)?;
        edited.data.set_attribute(field, value)?;
    }
    if edited == *target {
        if !global.quiet {
            eprintln!("nothing changed");
        }
        return Ok(());
    }
    tx.create_or_update(edited)?;
    workspace.commit(tx, global).await?;
    Ok(())
}

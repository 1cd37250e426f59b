//! `tts delete` command - delete a thing with its contents

use miette::Result;
use std::sync::Arc;

use crate::cli::helpers::Workspace;
use crate::cli::GlobalOpts;
use crate::core::session::Session;
use crate::core::thing::Thing;

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Thing id or id prefix
    pub id: String,
}

pub async fn run(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let session = &workspace.session;
    let target = workspace.find(&args.id)?;

    let root = match target.container_key() {
        Some(key) => session
            .retrieve(&key)
            .ok_or_else(|| miette::miette!("container of {} is not in the store", target.id()))?,
        None => Arc::clone(&target),
    };

    let mut tx = session.open_transaction(&root)?;
    let doomed = subtree(session, &target);
    for thing in &doomed {
        tx.snapshot(thing);
    }
    // children first, each unlinking itself from its container's clone
    for thing in doomed.iter().rev() {
        tx.delete(thing)?;
    }
    workspace.commit(tx, global).await?;

    if !global.quiet {
        println!(
            "{} deleted {} thing(s)",
            console::style("✓").green(),
            doomed.len()
        );
    }
    Ok(())
}

/// `root` followed by everything it contains, parents before children
fn subtree(session: &Session, root: &Arc<Thing>) -> Vec<Arc<Thing>> {
    let mut things = vec![Arc::clone(root)];
    let mut next = 0;
    while next < things.len() {
        let parent = Arc::clone(&things[next]);
        for child in parent.data.child_ids() {
            if let Some(child) = session.retrieve(&parent.child_key(child)) {
                things.push(child);
            }
        }
        next += 1;
    }
    things
}

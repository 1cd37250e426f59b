//! `tts show` command - print one thing

use miette::Result;

use crate::cli::helpers::{print_structured, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Thing id or id prefix
    pub id: String,
}

pub async fn run(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let thing = workspace.find(&args.id)?;

    match global.format {
        OutputFormat::Json => print_structured(thing.as_ref(), true),
        OutputFormat::Id => {
            println!("{}", thing.id());
            Ok(())
        }
        OutputFormat::Tsv => {
            println!(
                "{}\t{}\t{}\t{}",
                thing.id(),
                thing.class_kind(),
                thing.revision(),
                thing.label()
            );
            Ok(())
        }
        OutputFormat::Yaml | OutputFormat::Auto => print_structured(thing.as_ref(), false),
    }
}

//! `tts list` command - list things in the store

use miette::Result;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{truncate_str, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ClassKind;

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only list things of this kind
    #[arg(long, short = 'k')]
    pub kind: Option<ClassKind>,

    /// List the known kinds instead of things
    #[arg(long, conflicts_with = "kind")]
    pub kinds: bool,
}

pub async fn run(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    if args.kinds {
        list_kinds();
        return Ok(());
    }

    let workspace = Workspace::open(global).await?;
    let mut things: Vec<_> = workspace
        .session
        .cache()
        .snapshot()
        .into_iter()
        .map(|(_, thing)| thing)
        .filter(|thing| args.kind.map_or(true, |kind| thing.class_kind() == kind))
        .collect();
    things.sort_by(|a, b| {
        a.class_kind()
            .as_str()
            .cmp(b.class_kind().as_str())
            .then_with(|| a.label().cmp(&b.label()))
    });

    match global.format {
        OutputFormat::Id => {
            for thing in &things {
                println!("{}", thing.id());
            }
        }
        OutputFormat::Tsv => {
            for thing in &things {
                println!(
                    "{}\t{}\t{}\t{}",
                    thing.id(),
                    thing.class_kind(),
                    thing.revision(),
                    thing.label()
                );
            }
        }
        OutputFormat::Json => {
            let things: Vec<_> = things.iter().map(|thing| thing.as_ref()).collect();
            crate::cli::helpers::print_structured(&things, true)?;
        }
        OutputFormat::Yaml => {
            let things: Vec<_> = things.iter().map(|thing| thing.as_ref()).collect();
            crate::cli::helpers::print_structured(&things, false)?;
        }
        OutputFormat::Auto => {
            if things.is_empty() {
                if !global.quiet {
                    println!("No things found.");
                }
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["ID", "KIND", "REV", "LABEL", "CONTAINER"]);
            for thing in &things {
                builder.push_record([
                    thing.id().short(),
                    thing.class_kind().short_name().to_string(),
                    thing.revision().to_string(),
                    truncate_str(&thing.label(), 48),
                    thing
                        .container()
                        .map(|c| c.id.short())
                        .unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{}", builder.build().with(Style::sharp()));
            if !global.quiet {
                println!("{} thing(s)", things.len());
            }
        }
    }
    Ok(())
}

fn list_kinds() {
    let mut builder = Builder::default();
    builder.push_record(["KIND", "SHORT", "CONTAINED BY"]);
    for kind in ClassKind::all() {
        let containers = if kind.is_top_level() {
            "-".to_string()
        } else {
            kind.container_kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        builder.push_record([
            kind.as_str().to_string(),
            kind.short_name().to_string(),
            containers,
        ]);
    }
    println!("{}", builder.build().with(Style::sharp()));
}

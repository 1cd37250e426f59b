//! `tts new` command - create a thing

use miette::Result;

use crate::cli::helpers::{parse_assignment, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ClassKind;
use crate::core::thing::{Thing, ThingData};

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Kind of thing to create (see `tts list --kinds`)
    pub kind: ClassKind,

    /// Name
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Short name
    #[arg(long, short = 's')]
    pub short_name: Option<String>,

    /// Container id or id prefix (required for everything but top-level kinds)
    #[arg(long, short = 'c')]
    pub container: Option<String>,

    /// Extra attributes as field=value
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub assignments: Vec<String>,
}

pub async fn run(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let session = &workspace.session;

    let mut thing = Thing::new(ThingData::empty(args.kind));
    let mut tx = match &args.container {
        Some(query) => {
            let container = workspace.find(query)?;
            if !args.kind.allows_container(container.class_kind()) {
                return Err(miette::miette!(
                    help = format!(
                        "a {} lives in: {}",
                        args.kind,
                        args.kind
                            .container_kinds()
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    "a {} cannot be created in a {}",
                    args.kind,
                    container.class_kind()
                ));
            }
            thing = thing.contained_by(&container);
            session.open_transaction(&container)?
        }
        None if args.kind.is_top_level() => session.open_transaction(&thing)?,
        None => {
            return Err(miette::miette!(
                help = "pass --container <id>",
                "a {} needs a container",
                args.kind
            ))
        }
    };

    if let Some(name) = &args.name {
        thing.data.set_attribute("name", name)?;
    }
    if let Some(short_name) = &args.short_name {
        thing.data.set_attribute("short_name", short_name)?;
    }
    for assignment in &args.assignments {
        let (field, value) = parse_assignment(assignment)?;
        thing.data.set_attribute(field, value)?;
    }

    let key = tx.create_or_update(thing)?;
    workspace.commit(tx, global).await?;

    match global.format {
        OutputFormat::Id | OutputFormat::Tsv => println!("{}", key.id),
        _ if global.quiet => println!("{}", key.id),
        _ => {
            let created = workspace
                .session
                .retrieve(&key)
                .map(|thing| thing.label())
                .unwrap_or_default();
            println!(
                "{} {} {} {}",
                console::style("✓").green(),
                args.kind,
                console::style(key.id.short()).cyan(),
                created
            );
        }
    }
    Ok(())
}

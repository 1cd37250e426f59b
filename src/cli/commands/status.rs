//! `tts status` command - store head, cache contents, and fingerprint

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::{print_structured, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::ClassKind;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {}

#[derive(Debug, Serialize)]
struct StatusReport {
    root: String,
    actor: String,
    revision: u64,
    things: usize,
    by_kind: Vec<(ClassKind, usize)>,
    fingerprint: String,
}

pub async fn run(_args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global).await?;
    let cache = workspace.session.cache();

    let by_kind: Vec<(ClassKind, usize)> = ClassKind::all()
        .iter()
        .map(|kind| (*kind, cache.of_kind(*kind).len()))
        .filter(|(_, count)| *count > 0)
        .collect();
    let report = StatusReport {
        root: workspace.project.root().display().to_string(),
        actor: workspace.actor.clone(),
        revision: workspace.session.revision(),
        things: cache.len(),
        by_kind,
        fingerprint: cache.fingerprint().into_diagnostic()?,
    };

    match global.format {
        OutputFormat::Json => return print_structured(&report, true),
        OutputFormat::Yaml => return print_structured(&report, false),
        OutputFormat::Id => {
            println!("{}", report.fingerprint);
            return Ok(());
        }
        OutputFormat::Tsv | OutputFormat::Auto => {}
    }

    println!("{} {}", style("Project:").bold(), style(&report.root).cyan());
    println!("{} {}", style("Actor:").bold(), report.actor);
    println!("{} {}", style("Revision:").bold(), report.revision);
    println!("{} {}", style("Things:").bold(), report.things);

    if !report.by_kind.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["KIND", "COUNT"]);
        for (kind, count) in &report.by_kind {
            builder.push_record([kind.as_str().to_string(), count.to_string()]);
        }
        println!();
        println!("{}", builder.build().with(Style::sharp()));
    }
    println!();
    println!(
        "{} {}",
        style("Fingerprint:").bold(),
        style(&report.fingerprint).dim()
    );
    Ok(())
}

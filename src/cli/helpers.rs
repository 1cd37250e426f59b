//! Shared helper functions for CLI commands
//!
//! Every command that touches the store goes through [`Workspace::open`],
//! which discovers the project, loads config and permissions, and opens a
//! session against the project's store.

use console::style;
use miette::{IntoDiagnostic, Result};
use std::sync::Arc;

use crate::cli::GlobalOpts;
use crate::core::bus::ChangeBus;
use crate::core::identity::ThingId;
use crate::core::permission::RolePermissions;
use crate::core::remote::SqliteRemote;
use crate::core::session::Session;
use crate::core::thing::Thing;
use crate::core::transaction::Transaction;
use crate::core::{Config, Project};

/// An opened project: config plus a live session on its store
pub struct Workspace {
    pub project: Project,
    pub config: Config,
    pub actor: String,
    pub session: Arc<Session>,
}

impl Workspace {
    /// Discover the project and open a session on its store
    pub async fn open(global: &GlobalOpts) -> Result<Self> {
        let project = discover_project(global)?;
        let config = Config::load_for(Some(&project));
        let actor = config.actor();

        let permissions = RolePermissions::load(&project)
            .unwrap_or_default()
            .for_actor(actor.clone());
        let remote = SqliteRemote::open(&project.store_path())?;
        let bus = Arc::new(ChangeBus::with_session_capacity(
            config.session_event_capacity(),
        ));
        let session = Arc::new(Session::with_bus(
            Arc::new(remote),
            Arc::new(permissions),
            bus,
        ));
        session.open().await?;

        Ok(Self {
            project,
            config,
            actor,
            session,
        })
    }

    /// Find a cached thing by full id or unique id prefix
    pub fn find(&self, query: &str) -> Result<Arc<Thing>> {
        find_thing(&self.session, query)
    }

    /// Submit `tx` and report the new store revision
    pub async fn commit(&self, tx: Transaction, global: &GlobalOpts) -> Result<u64> {
        let receipt = self.session.write(tx).await?;
        if !global.quiet {
            eprintln!(
                "{} committed revision {}",
                style("✓").green(),
                style(receipt.revision).cyan()
            );
        }
        Ok(receipt.revision)
    }
}

/// Project from `--project` or by walking up from the current directory
pub fn discover_project(global: &GlobalOpts) -> Result<Project> {
    let project = match &global.project {
        Some(path) => Project::discover_from(path),
        None => Project::discover(),
    };
    project.map_err(|e| miette::miette!("{}", e))
}

/// Look a thing up by full id, or by a prefix matching exactly one id
pub fn find_thing(session: &Session, query: &str) -> Result<Arc<Thing>> {
    let query = query.trim();
    if let Ok(id) = ThingId::parse(query) {
        return session
            .cache()
            .snapshot()
            .into_iter()
            .map(|(_, thing)| thing)
            .find(|thing| thing.id() == id)
            .ok_or_else(|| miette::miette!("no thing with id {}", id));
    }

    let needle = query.to_lowercase().replace('-', "");
    if needle.is_empty() {
        return Err(miette::miette!("empty id"));
    }
    let mut matches: Vec<Arc<Thing>> = session
        .cache()
        .snapshot()
        .into_iter()
        .map(|(_, thing)| thing)
        .filter(|thing| thing.id().uuid().simple().to_string().starts_with(&needle))
        .collect();

    match matches.len() {
        0 => Err(miette::miette!("no thing matches '{}'", query)),
        1 => Ok(matches.remove(0)),
        n => Err(miette::miette!(
            help = "use more characters of the id",
            "'{}' is ambiguous: {} things match",
            query,
            n
        )),
    }
}

/// Split a `field=value` assignment
pub fn parse_assignment(assignment: &str) -> Result<(&str, &str)> {
    assignment
        .split_once('=')
        .map(|(field, value)| (field.trim(), value.trim()))
        .filter(|(field, _)| !field.is_empty())
        .ok_or_else(|| miette::miette!("expected field=value, got '{}'", assignment))
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a serializable value as YAML or JSON
pub fn print_structured<T: serde::Serialize>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    } else {
        print!("{}", serde_yml::to_string(value).into_diagnostic()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
        assert_eq!(truncate_str("hi", 2), "hi");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("name=Pump").unwrap(), ("name", "Pump"));
        assert_eq!(
            parse_assignment(" text = shall hold = 5 bar").unwrap(),
            ("text", "shall hold = 5 bar")
        );
        assert!(parse_assignment("name").is_err());
        assert!(parse_assignment("=value").is_err());
    }
}

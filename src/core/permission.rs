//! Write permissions: the contract sessions call, and a role-based roster

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::identity::ClassKind;
use crate::core::thing::{ContainerRef, Thing};
use crate::core::Project;

/// What a write would touch
#[derive(Debug, Clone, Copy)]
pub enum PermissionTarget<'a> {
    /// An existing thing being updated or deleted
    Thing(&'a Thing),
    /// The container a new thing would be created in
    Container(&'a ContainerRef),
}

/// Decides whether the current actor may write
pub trait PermissionService: Send + Sync {
    fn can_write(&self, class_kind: ClassKind, target: PermissionTarget<'_>) -> bool;
}

/// Permits every write
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionService for AllowAll {
    fn can_write(&self, _class_kind: ClassKind, _target: PermissionTarget<'_>) -> bool {
        true
    }
}

/// Team roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Engineering,
    Quality,
    Management,
    Admin,
    /// Read-only access
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Engineering => write!(f, "engineering"),
            Role::Quality => write!(f, "quality"),
            Role::Management => write!(f, "management"),
            Role::Admin => write!(f, "admin"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "engineering" => Ok(Role::Engineering),
            "quality" => Ok(Role::Quality),
            "management" => Ok(Role::Management),
            "admin" => Ok(Role::Admin),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A team member with their roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    /// Actor name the member is matched by (case-insensitive)
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TeamMember {
    /// Check if member has any of the specified roles
    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }

    /// Check if member is an admin (can bypass authorization)
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// Whether the member has any role besides viewer
    pub fn can_edit(&self) -> bool {
        self.roles.iter().any(|r| *r != Role::Viewer)
    }
}

/// Role-based write permissions loaded from `.tts/permissions.yaml`
///
/// A roster without members permits everything. Otherwise the actor must be
/// an active member; admins may write anything, and a kind listed in the
/// write matrix requires one of its roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermissions {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    /// Write matrix: class kind -> roles allowed to write it
    #[serde(default)]
    pub write_matrix: HashMap<ClassKind, Vec<Role>>,
    /// Actor the checks are made for
    #[serde(skip)]
    actor: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Default for RolePermissions {
    fn default() -> Self {
        Self {
            version: 1,
            members: Vec::new(),
            write_matrix: HashMap::new(),
            actor: None,
        }
    }
}

impl RolePermissions {
    /// Load permissions from the project's .tts/permissions.yaml
    pub fn load(project: &Project) -> Option<Self> {
        Self::load_from_path(&project.permissions_path())
    }

    /// Load permissions from a specific path
    pub fn load_from_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str(&contents) {
            Ok(permissions) => Some(permissions),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable permissions file");
                None
            }
        }
    }

    /// Save permissions to a specific path
    pub fn save_to_path(&self, path: &Path) -> std::io::Result<()> {
        let contents = serde_yml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)
    }

    /// Make checks on behalf of `actor`
    pub fn for_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Find an active member by username
    pub fn find_member(&self, username: &str) -> Option<&TeamMember> {
        self.members
            .iter()
            .find(|m| m.active && m.username.eq_ignore_ascii_case(username))
    }

    /// Get roles required to write a kind
    pub fn required_roles(&self, kind: ClassKind) -> Option<&Vec<Role>> {
        self.write_matrix.get(&kind)
    }

    /// Check if a member may write things of `kind`
    pub fn member_can_write(&self, member: &TeamMember, kind: ClassKind) -> bool {
        // Admins can write anything
        if member.is_admin() {
            return true;
        }

        match self.required_roles(kind) {
            Some(required_roles) => member.has_any_role(required_roles),
            None => member.can_edit(),
        }
    }

    fn actor_can_write(&self, kind: ClassKind) -> bool {
        if self.members.is_empty() {
            return true;
        }
        let Some(member) = self.actor.as_deref().and_then(|a| self.find_member(a)) else {
            return false;
        };
        self.member_can_write(member, kind)
    }

    /// Generate default permissions.yaml template content
    pub fn default_template() -> &'static str {
        r#"# TTS Write Permissions
# With no members listed, everyone may write everything.

version: 1

members: []
  # Example member entry:
  # - name: "Jane Smith"
  #   username: "jsmith"        # Matches the configured actor
  #   roles: [engineering, quality]
  #   active: true

# Which roles may write which kinds
# If a kind is not listed, any member with a role other than viewer may write it
# Role options: engineering, quality, management, admin, viewer
write_matrix: {}
  # requirement: [engineering, quality]
  # requirements-specification: [quality, management]
  # site-reference-data-library: [management]
"#
    }
}

impl PermissionService for RolePermissions {
    fn can_write(&self, class_kind: ClassKind, target: PermissionTarget<'_>) -> bool {
        match target {
            PermissionTarget::Thing(_) => self.actor_can_write(class_kind),
            // creating a child also rewrites its container
            PermissionTarget::Container(container) => {
                self.actor_can_write(class_kind) && self.actor_can_write(container.class_kind)
            }
        }
    }
}

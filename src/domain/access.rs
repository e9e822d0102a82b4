// src/domain/access.rs
//
// Capability resolution over a role-settings snapshot loaded once per request.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::RoleSetting;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CaseCreate,
    CaseEdit,
    TaskCreate,
    TaskEdit,
    NoteAdd,
    ManageSettings,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::CaseCreate => "case_create",
            Capability::CaseEdit => "case_edit",
            Capability::TaskCreate => "task_create",
            Capability::TaskEdit => "task_edit",
            Capability::NoteAdd => "note_add",
            Capability::ManageSettings => "manage_settings",
        }
    }
}

impl RoleSetting {
    pub fn grants(&self, capability: Capability) -> bool {
        match capability {
            Capability::CaseCreate => self.can_case_create,
            Capability::CaseEdit => self.can_case_edit,
            Capability::TaskCreate => self.can_task_create,
            Capability::TaskEdit => self.can_task_edit,
            Capability::NoteAdd => self.can_note_add,
            Capability::ManageSettings => self.can_manage_settings,
        }
    }
}

/// The authenticated user as seen by authorization checks.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub groups: BTreeSet<String>,
}

/// Roles whose holders may move grey-listed cases.
const ELEVATED_ROLES: [&str; 2] = ["Doctor", "Admin"];

impl Principal {
    /// Superusers always pass; otherwise any of the user's groups with a
    /// matching role setting that grants the capability.
    pub fn has_capability(&self, roles: &[RoleSetting], capability: Capability) -> bool {
        self.is_superuser
            || roles
                .iter()
                .any(|role| self.groups.contains(&role.role_name) && role.grants(capability))
    }

    pub fn is_doctor_or_admin(&self) -> bool {
        self.is_superuser || ELEVATED_ROLES.iter().any(|r| self.groups.contains(*r))
    }
}

/// Capability flags returned alongside detail views.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityFlags {
    pub case_edit: bool,
    pub task_create: bool,
    pub task_edit: bool,
    pub note_add: bool,
}

impl CapabilityFlags {
    pub fn resolve(principal: &Principal, roles: &[RoleSetting]) -> Self {
        Self {
            case_edit: principal.has_capability(roles, Capability::CaseEdit),
            task_create: principal.has_capability(roles, Capability::TaskCreate),
            task_edit: principal.has_capability(roles, Capability::TaskEdit),
            note_add: principal.has_capability(roles, Capability::NoteAdd),
        }
    }
}

fn role(name: &str, flags: [bool; 6]) -> RoleSetting {
    let [case_create, case_edit, task_create, task_edit, note_add, manage_settings] = flags;
    RoleSetting {
        role_setting_id: 0,
        role_name: name.to_string(),
        can_case_create: case_create,
        can_case_edit: case_edit,
        can_task_create: task_create,
        can_task_edit: task_edit,
        can_note_add: note_add,
        can_manage_settings: manage_settings,
    }
}

/// Seeded at startup when absent; flags are
/// [case_create, case_edit, task_create, task_edit, note_add, manage_settings].
pub fn default_role_settings() -> Vec<RoleSetting> {
    vec![
        role("Admin", [true, true, true, true, true, true]),
        role("Doctor", [true, true, true, true, true, false]),
        role("Reception", [true, true, true, false, true, false]),
        role("Nurse", [false, false, false, true, true, false]),
        role("Caller", [false, false, false, false, true, false]),
    ]
}

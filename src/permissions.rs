use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

/// Role
///
/// The coarse identity class stored in `usuarios.rol`. `Admin` is a superuser: it bypasses
/// every capability check rather than holding an "all true" permission map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Asesor,
}

impl Role {
    /// Strict parse used for admin-submitted forms. Unknown values are rejected.
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim() {
            "admin" => Some(Role::Admin),
            "asesor" => Some(Role::Asesor),
            _ => None,
        }
    }

    /// Lenient parse used for stored rows. Anything other than `admin` is treated as a
    /// regular agent so a corrupted role column can never escalate privileges.
    pub fn from_stored(value: &str) -> Role {
        if value.trim() == "admin" {
            Role::Admin
        } else {
            Role::Asesor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Asesor => "asesor",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Capability
///
/// The closed set of named permission bits. Every permission check in the crate goes
/// through this enum; ad-hoc capability strings are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Capability {
    ViewRecords,
    AddRecords,
    EditRecords,
    DeleteRecords,
    ChangeOwnPassword,
    ManageUsers,
    ManageVisualSolutions,
}

impl Capability {
    pub const ALL: [Capability; 7] = [
        Capability::ViewRecords,
        Capability::AddRecords,
        Capability::EditRecords,
        Capability::DeleteRecords,
        Capability::ChangeOwnPassword,
        Capability::ManageUsers,
        Capability::ManageVisualSolutions,
    ];

    /// The canonical key written into stored permission maps.
    pub fn key(&self) -> &'static str {
        match self {
            Capability::ViewRecords => "view_records",
            Capability::AddRecords => "add_records",
            Capability::EditRecords => "edit_records",
            Capability::DeleteRecords => "delete_records",
            Capability::ChangeOwnPassword => "change_own_password",
            Capability::ManageUsers => "manage_users",
            Capability::ManageVisualSolutions => "manage_visual_solutions",
        }
    }

    /// Keys written by earlier revisions of the portal. Read-only: they are honoured when
    /// looking a capability up, but never written back.
    fn legacy_keys(&self) -> &'static [&'static str] {
        match self {
            Capability::ViewRecords => &["ver_fichas"],
            Capability::AddRecords => &["agregar_fichas"],
            Capability::EditRecords => &["editar_fichas", "edit_fichas"],
            Capability::DeleteRecords => &["eliminar_fichas"],
            Capability::ChangeOwnPassword => &["cambiar_password"],
            Capability::ManageUsers => &[],
            Capability::ManageVisualSolutions => &["gestionar_soluciones_visuales"],
        }
    }

    /// Capabilities that no stored map can grant; only the admin role holds them.
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Capability::ManageUsers)
    }
}

/// PermissionMap
///
/// Flat capability-key -> bool mapping as persisted (JSON text) in `usuarios.permisos`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(BTreeMap<String, bool>);

impl PermissionMap {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// parse
    ///
    /// Decodes the stored column. Absent, empty, or unparsable JSON degrades to an empty
    /// map, and entries whose value is not a JSON boolean are dropped. Never errors.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Self::empty();
        };

        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(entries)) => Self(
                entries
                    .into_iter()
                    .filter_map(|(key, value)| value.as_bool().map(|flag| (key, flag)))
                    .collect(),
            ),
            Ok(_) => {
                tracing::warn!("stored permission map is not a JSON object, treating as empty");
                Self::empty()
            }
            Err(e) => {
                tracing::warn!("unparsable permission map, treating as empty: {}", e);
                Self::empty()
            }
        }
    }

    /// Template applied to new non-admin identities.
    pub fn default_template() -> Self {
        Self::from_grants(false, false, false, false)
    }

    /// from_grants
    ///
    /// Builds the map an administrator submits from the user-management form.
    /// `view_records` and `change_own_password` are policy invariants and always true.
    pub fn from_grants(add: bool, edit: bool, delete: bool, manage_visual: bool) -> Self {
        let mut map = BTreeMap::new();
        map.insert(Capability::ViewRecords.key().to_string(), true);
        map.insert(Capability::ChangeOwnPassword.key().to_string(), true);
        map.insert(Capability::AddRecords.key().to_string(), add);
        map.insert(Capability::EditRecords.key().to_string(), edit);
        map.insert(Capability::DeleteRecords.key().to_string(), delete);
        map.insert(Capability::ManageVisualSolutions.key().to_string(), manage_visual);
        Self(map)
    }

    /// Stored value for a capability, checking the canonical key before legacy aliases.
    /// Missing keys resolve to `false`.
    pub fn get(&self, capability: Capability) -> bool {
        if let Some(flag) = self.0.get(capability.key()) {
            return *flag;
        }
        capability
            .legacy_keys()
            .iter()
            .find_map(|key| self.0.get(*key).copied())
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> String {
        // A BTreeMap<String, bool> always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, bool); N]> for PermissionMap {
    fn from(entries: [(&str, bool); N]) -> Self {
        Self(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// can
///
/// The access decision. Admins pass unconditionally; everyone else is looked up in their
/// stored map, closed by default.
pub fn can(role: Role, permissions: &PermissionMap, capability: Capability) -> bool {
    if role.is_admin() {
        return true;
    }
    if capability.is_admin_only() {
        return false;
    }
    permissions.get(capability)
}

/// Every capability the identity currently holds, in declaration order.
pub fn effective_capabilities(role: Role, permissions: &PermissionMap) -> Vec<Capability> {
    Capability::ALL
        .into_iter()
        .filter(|capability| can(role, permissions, *capability))
        .collect()
}

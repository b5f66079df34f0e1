use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::{
    codec::{self, StepRecord},
    errors::AppError,
    permissions::{Capability, PermissionMap, Role},
};

// --- Notices ---

/// NoticeLevel
///
/// Severity of a one-shot user notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Notice
///
/// A one-shot message for the agent ("Ficha agregada correctamente"). Returned explicitly in
/// the response body of the request that produced it; nothing is kept between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

// --- Users ---

/// User
///
/// A portal account from the `usuarios` table. The password hash is never serialized.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: i32,
    pub username: String,
    #[serde(skip)]
    #[ts(skip)]
    pub password_hash: String,
    pub role: Role,
    #[ts(type = "Record<string, boolean>")]
    #[schema(value_type = Object)]
    pub permissions: PermissionMap,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn can(&self, capability: Capability) -> bool {
        crate::permissions::can(self.role, &self.permissions, capability)
    }
}

/// UserProfile
///
/// Output for GET /me: the identity plus the capabilities it currently holds, so clients can
/// hide actions the agent cannot perform.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub role: Role,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// ChangePasswordForm
///
/// Self-service credential rotation. Field names follow the portal's form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ChangePasswordForm {
    pub password_actual: String,
    pub nueva_password: String,
    pub confirmar_password: String,
}

pub const MIN_PASSWORD_LEN: usize = 6;

impl ChangePasswordForm {
    /// Field-level checks that do not need the store.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.password_actual.is_empty()
            || self.nueva_password.is_empty()
            || self.confirmar_password.is_empty()
        {
            return Err(AppError::validation("Todos los campos son obligatorios"));
        }
        if self.nueva_password != self.confirmar_password {
            return Err(AppError::validation("Las nuevas contraseñas no coinciden"));
        }
        if self.nueva_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "La nueva contraseña debe tener al menos 6 caracteres",
            ));
        }
        Ok(())
    }
}

/// UserForm
///
/// Admin-submitted account form (create and edit). Capability checkboxes are present when
/// ticked; their value is irrelevant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct UserForm {
    pub username: String,
    /// Required on create. On edit, blank keeps the current credential.
    pub password: String,
    pub role: String,
    pub add_records: Option<String>,
    pub edit_records: Option<String>,
    pub delete_records: Option<String>,
    pub manage_visual_solutions: Option<String>,
}

impl UserForm {
    pub fn permissions(&self) -> PermissionMap {
        PermissionMap::from_grants(
            self.add_records.is_some(),
            self.edit_records.is_some(),
            self.delete_records.is_some(),
            self.manage_visual_solutions.is_some(),
        )
    }

    fn parsed_role(&self) -> Result<Role, AppError> {
        Role::parse(&self.role).ok_or_else(|| AppError::validation("Rol no válido"))
    }

    /// Checks for account creation; returns the trimmed username and role.
    pub fn validate_new(&self) -> Result<(String, Role), AppError> {
        let username = self.username.trim();
        if username.is_empty() || self.password.is_empty() {
            return Err(AppError::validation("Usuario y contraseña son obligatorios"));
        }
        Ok((username.to_string(), self.parsed_role()?))
    }

    /// Checks for account edits; the password may be blank.
    pub fn validate_edit(&self) -> Result<(String, Role), AppError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(AppError::validation("El nombre de usuario es obligatorio"));
        }
        if !self.password.is_empty() && self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(
                "La nueva contraseña debe tener al menos 6 caracteres",
            ));
        }
        Ok((username.to_string(), self.parsed_role()?))
    }
}

/// Insert payload handed to the repository; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub permissions: PermissionMap,
}

/// Update payload; `password_hash: None` keeps the stored credential.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub permissions: PermissionMap,
}

// --- Fichas ---

/// Ficha
///
/// A troubleshooting record from the `fichas` table with its list fields decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Ficha {
    pub id: i32,
    pub categoria: String,
    pub problema: String,
    pub descripcion: String,
    pub causas: Vec<String>,
    pub solucion: Vec<String>,
    pub palabras_clave: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// FichaForm
///
/// Create/edit submission. `causas` and `solucion` are textareas, one item per line.
/// `problema_real`, when filled, overrides the title picked from the canned selector.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(default)]
#[ts(export)]
pub struct FichaForm {
    pub categoria: String,
    pub problema: String,
    pub problema_real: Option<String>,
    pub descripcion: String,
    pub causas: String,
    pub solucion: String,
    pub palabras_clave: String,
}

impl FichaForm {
    /// validate
    ///
    /// Normalizes the submission. `categoria`, `problema`, `causas` and `solucion` are
    /// required; list fields must keep at least one non-blank line.
    pub fn validate(self) -> Result<NewFicha, AppError> {
        let problema = self
            .problema_real
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(self.problema.trim())
            .to_string();
        let categoria = self.categoria.trim().to_string();
        let causas = codec::normalize_lines(&self.causas);
        let solucion = codec::normalize_lines(&self.solucion);

        if categoria.is_empty() || problema.is_empty() || causas.is_empty() || solucion.is_empty() {
            return Err(AppError::validation(
                "Por favor, complete todos los campos requeridos",
            ));
        }

        Ok(NewFicha {
            categoria,
            problema,
            descripcion: self.descripcion.trim().to_string(),
            causas,
            solucion,
            palabras_clave: self.palabras_clave.trim().to_string(),
        })
    }

    /// The editable form view of a stored ficha (list fields back to textarea text).
    pub fn from_ficha(ficha: &Ficha) -> Self {
        Self {
            categoria: ficha.categoria.clone(),
            problema: ficha.problema.clone(),
            problema_real: None,
            descripcion: ficha.descripcion.clone(),
            causas: codec::to_textarea(&ficha.causas),
            solucion: codec::to_textarea(&ficha.solucion),
            palabras_clave: ficha.palabras_clave.clone(),
        }
    }
}

/// Validated ficha payload handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFicha {
    pub categoria: String,
    pub problema: String,
    pub descripcion: String,
    pub causas: Vec<String>,
    pub solucion: Vec<String>,
    pub palabras_clave: String,
}

/// FichaSearch
///
/// GET /fichas/search parameters. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct FichaSearch {
    /// Substring matched against `problema` and `palabras_clave`.
    pub q: Option<String>,
    /// Exact category.
    pub categoria: Option<String>,
}

impl FichaSearch {
    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    pub fn category(&self) -> Option<&str> {
        self.categoria.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

// --- Visual solutions ---

/// Estado
///
/// Visibility of a visual guide. Inactive guides are hidden from regular agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Estado {
    #[default]
    Activo,
    Inactivo,
}

impl Estado {
    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Activo => "activo",
            Estado::Inactivo => "inactivo",
        }
    }

    pub fn parse(value: &str) -> Option<Estado> {
        match value.trim() {
            "activo" => Some(Estado::Activo),
            "inactivo" => Some(Estado::Inactivo),
            _ => None,
        }
    }
}

/// VisualSolution
///
/// A step-by-step visual guide from the `soluciones_visuales` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VisualSolution {
    pub id: i32,
    pub titulo: String,
    pub categoria: String,
    pub descripcion: String,
    pub pasos: Vec<StepRecord>,
    pub estado: Estado,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Validated visual solution payload handed to the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisualSolution {
    pub titulo: String,
    pub categoria: String,
    pub descripcion: String,
    pub pasos: Vec<StepRecord>,
    pub estado: Estado,
}

impl NewVisualSolution {
    /// from_form
    ///
    /// Builds a guide from a flat form submission. Steps are collected with
    /// `codec::collect_steps`; a guide needs a title, a category and at least one step.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, AppError> {
        let field = |key: &str| form.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

        let titulo = field("titulo");
        let categoria = field("categoria");
        if titulo.is_empty() || categoria.is_empty() {
            return Err(AppError::validation("El título y la categoría son obligatorios"));
        }

        let estado = match form.get("estado").map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => Estado::Activo,
            Some(raw) => Estado::parse(raw).ok_or_else(|| AppError::validation("Estado no válido"))?,
        };

        let pasos = codec::collect_steps(form);
        if pasos.is_empty() {
            return Err(AppError::validation("Debe agregar al menos un paso"));
        }

        Ok(Self {
            titulo,
            categoria,
            descripcion: field("descripcion"),
            pasos,
            estado,
        })
    }
}

// --- Responses ---

/// FichaSaved
///
/// Body returned by a successful ficha create/update: the stored record plus the notice.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FichaSaved {
    pub notice: Notice,
    pub ficha: Ficha,
}

/// The edit view of a ficha: textarea form values plus the selector options (known
/// categories and the canned titles of the ficha's category).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FichaEditView {
    pub id: i32,
    pub form: FichaForm,
    pub categorias: Vec<String>,
    pub problemas: Vec<String>,
}

#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UserSaved {
    pub notice: Notice,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VisualSolutionSaved {
    pub notice: Notice,
    pub solution: VisualSolution,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> FichaForm {
        FichaForm {
            categoria: "Internet".into(),
            problema: "Sin conexión a internet".into(),
            problema_real: None,
            descripcion: "LED rojo encendido".into(),
            causas: "Router apagado\n\nPatchcord dañado\n".into(),
            solucion: "Habilitar el módem en Vortex.".into(),
            palabras_clave: "LOS, Modem".into(),
        }
    }

    #[test]
    fn ficha_form_normalizes_lists() {
        let ficha = valid_form().validate().unwrap();
        assert_eq!(ficha.causas, vec!["Router apagado", "Patchcord dañado"]);
        assert_eq!(ficha.solucion.len(), 1);
    }

    #[test]
    fn blank_causas_fail_validation() {
        let form = FichaForm { causas: " \n \n".into(), ..valid_form() };
        assert!(matches!(form.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn problema_real_overrides_selected_title() {
        let form = FichaForm {
            problema: "Otro problema con Internet".into(),
            problema_real: Some("DNS no resuelve".into()),
            ..valid_form()
        };
        assert_eq!(form.validate().unwrap().problema, "DNS no resuelve");

        let form = FichaForm { problema_real: Some("  ".into()), ..valid_form() };
        assert_eq!(form.validate().unwrap().problema, "Sin conexión a internet");
    }

    #[test]
    fn change_password_rules() {
        let mut form = ChangePasswordForm {
            password_actual: "asesor123".into(),
            nueva_password: "nueva1".into(),
            confirmar_password: "nueva1".into(),
        };
        assert!(form.validate().is_ok());

        form.confirmar_password = "nueva2".into();
        assert!(form.validate().is_err());

        form.nueva_password = "abc".into();
        form.confirmar_password = "abc".into();
        assert!(form.validate().is_err());
    }

    #[test]
    fn user_form_role_must_be_known() {
        let form = UserForm {
            username: "carla".into(),
            password: "secreta1".into(),
            role: "root".into(),
            ..UserForm::default()
        };
        assert!(form.validate_new().is_err());
    }

    #[test]
    fn visual_solution_requires_a_step() {
        let form: HashMap<String, String> = [("titulo", "Reboot"), ("categoria", "Vortex")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(NewVisualSolution::from_form(&form).is_err());
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use ficha_portal::{
    AppState,
    auth::AuthUser,
    config::AppConfig,
    errors::StoreError,
    models::{
        Estado, Ficha, FichaSearch, NewFicha, NewUser, NewVisualSolution, User, UserUpdate,
        VisualSolution,
    },
    permissions::{PermissionMap, Role},
    repository::Repository,
};
use std::sync::{Arc, Mutex};

// --- In-memory repository ---

// Behaves like the Postgres store for everything handlers can observe: serial ids,
// unique usernames, `None`/`false` for missing rows. `fail_all` simulates an unreachable store.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Tables>,
    pub fail_all: bool,
}

#[derive(Default)]
struct Tables {
    next_id: i32,
    users: Vec<User>,
    fichas: Vec<Ficha>,
    solutions: Vec<VisualSolution>,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryRepository {
    pub fn unavailable() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all {
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    pub fn ficha_count(&self) -> usize {
        self.inner.lock().unwrap().fichas.len()
    }

    pub fn user_by_id(&self, id: i32) -> Option<User> {
        self.inner.lock().unwrap().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn ficha_by_id(&self, id: i32) -> Option<Ficha> {
        self.inner.lock().unwrap().fichas.iter().find(|f| f.id == id).cloned()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.user_by_id(id))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        let tables = self.inner.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().users.iter().rev().cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation);
        }
        let now = Utc::now();
        let user = User {
            id: tables.next_id(),
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            permissions: user.permissions,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: i32, update: UserUpdate) -> Result<Option<User>, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        if tables
            .users
            .iter()
            .any(|u| u.id != id && u.username == update.username)
        {
            return Err(StoreError::UniqueViolation);
        }
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        user.username = update.username;
        if let Some(hash) = update.password_hash {
            user.password_hash = hash;
        }
        user.role = update.role;
        user.permissions = update.permissions;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i32, password_hash: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        match tables.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user(&self, id: i32) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        Ok(tables.users.len() != before)
    }

    async fn list_fichas(&self) -> Result<Vec<Ficha>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().fichas.iter().rev().cloned().collect())
    }

    async fn search_fichas(&self, search: &FichaSearch) -> Result<Vec<Ficha>, StoreError> {
        self.check()?;
        let q = search.query().map(str::to_lowercase);
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .fichas
            .iter()
            .rev()
            .filter(|f| search.category().is_none_or(|c| f.categoria == c))
            .filter(|f| {
                q.as_deref().is_none_or(|q| {
                    f.problema.to_lowercase().contains(q)
                        || f.palabras_clave.to_lowercase().contains(q)
                })
            })
            .cloned()
            .collect())
    }

    async fn get_ficha(&self, id: i32) -> Result<Option<Ficha>, StoreError> {
        self.check()?;
        Ok(self.ficha_by_id(id))
    }

    async fn create_ficha(&self, ficha: &NewFicha) -> Result<Ficha, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let now = Utc::now();
        let ficha = Ficha {
            id: tables.next_id(),
            categoria: ficha.categoria.clone(),
            problema: ficha.problema.clone(),
            descripcion: ficha.descripcion.clone(),
            causas: ficha.causas.clone(),
            solucion: ficha.solucion.clone(),
            palabras_clave: ficha.palabras_clave.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.fichas.push(ficha.clone());
        Ok(ficha)
    }

    async fn update_ficha(&self, id: i32, ficha: &NewFicha) -> Result<Option<Ficha>, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let Some(stored) = tables.fichas.iter_mut().find(|f| f.id == id) else {
            return Ok(None);
        };
        stored.categoria = ficha.categoria.clone();
        stored.problema = ficha.problema.clone();
        stored.descripcion = ficha.descripcion.clone();
        stored.causas = ficha.causas.clone();
        stored.solucion = ficha.solucion.clone();
        stored.palabras_clave = ficha.palabras_clave.clone();
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_ficha(&self, id: i32) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let before = tables.fichas.len();
        tables.fichas.retain(|f| f.id != id);
        Ok(tables.fichas.len() != before)
    }

    async fn list_visual_solutions(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<VisualSolution>, StoreError> {
        self.check()?;
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .solutions
            .iter()
            .rev()
            .filter(|s| include_inactive || s.estado == Estado::Activo)
            .cloned()
            .collect())
    }

    async fn get_visual_solution(&self, id: i32) -> Result<Option<VisualSolution>, StoreError> {
        self.check()?;
        let tables = self.inner.lock().unwrap();
        Ok(tables.solutions.iter().find(|s| s.id == id).cloned())
    }

    async fn create_visual_solution(
        &self,
        solution: &NewVisualSolution,
    ) -> Result<VisualSolution, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let now = Utc::now();
        let solution = VisualSolution {
            id: tables.next_id(),
            titulo: solution.titulo.clone(),
            categoria: solution.categoria.clone(),
            descripcion: solution.descripcion.clone(),
            pasos: solution.pasos.clone(),
            estado: solution.estado,
            created_at: now,
            updated_at: now,
        };
        tables.solutions.push(solution.clone());
        Ok(solution)
    }

    async fn update_visual_solution(
        &self,
        id: i32,
        solution: &NewVisualSolution,
    ) -> Result<Option<VisualSolution>, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let Some(stored) = tables.solutions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        stored.titulo = solution.titulo.clone();
        stored.categoria = solution.categoria.clone();
        stored.descripcion = solution.descripcion.clone();
        stored.pasos = solution.pasos.clone();
        stored.estado = solution.estado;
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_visual_solution(&self, id: i32) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.inner.lock().unwrap();
        let before = tables.solutions.len();
        tables.solutions.retain(|s| s.id != id);
        Ok(tables.solutions.len() != before)
    }
}

// --- Fixtures ---

// Low bcrypt cost keeps the suite fast.
pub fn hash(password: &str) -> String {
    bcrypt::hash(password, 4).unwrap()
}

pub async fn add_user(
    repo: &MemoryRepository,
    username: &str,
    password: &str,
    role: Role,
    permissions: PermissionMap,
) -> User {
    repo.create_user(NewUser {
        username: username.to_string(),
        password_hash: hash(password),
        role,
        permissions,
    })
    .await
    .unwrap()
}

pub async fn add_ficha(repo: &MemoryRepository, categoria: &str, problema: &str) -> Ficha {
    repo.create_ficha(&NewFicha {
        categoria: categoria.to_string(),
        problema: problema.to_string(),
        descripcion: "Usuario reporta la falla".to_string(),
        causas: vec!["Equipo apagado".to_string()],
        solucion: vec!["Encender el equipo.".to_string()],
        palabras_clave: "Modem".to_string(),
    })
    .await
    .unwrap()
}

pub fn create_test_state(repo: Arc<MemoryRepository>) -> AppState {
    AppState {
        repo,
        config: AppConfig::default(),
    }
}

pub fn as_auth(user: &User) -> AuthUser {
    AuthUser::from(user.clone())
}

pub fn form(pairs: &[(&str, &str)]) -> std::collections::HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

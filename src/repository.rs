use crate::{
    codec,
    errors::StoreError,
    models::{
        Estado, Ficha, FichaSearch, NewFicha, NewUser, NewVisualSolution, User, UserUpdate,
        VisualSolution,
    },
    permissions::{PermissionMap, Role},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};
use std::sync::Arc;

/// Repository Trait
///
/// Abstract contract for all persistence operations. Handlers only see this trait, so the
/// Postgres implementation can be swapped for an in-memory one in tests.
///
/// Every method re-queries the store; nothing is cached in process. Concurrent updates to
/// the same row are last-writer-wins.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i32) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    // Newest accounts first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    // Fails with `StoreError::UniqueViolation` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn update_user(&self, id: i32, update: UserUpdate) -> Result<Option<User>, StoreError>;
    // Returns false when the user does not exist.
    async fn update_password(&self, id: i32, password_hash: &str) -> Result<bool, StoreError>;
    async fn delete_user(&self, id: i32) -> Result<bool, StoreError>;

    // --- Fichas ---
    // Most recently updated first.
    async fn list_fichas(&self) -> Result<Vec<Ficha>, StoreError>;
    async fn search_fichas(&self, search: &FichaSearch) -> Result<Vec<Ficha>, StoreError>;
    async fn get_ficha(&self, id: i32) -> Result<Option<Ficha>, StoreError>;
    async fn create_ficha(&self, ficha: &NewFicha) -> Result<Ficha, StoreError>;
    async fn update_ficha(&self, id: i32, ficha: &NewFicha) -> Result<Option<Ficha>, StoreError>;
    async fn delete_ficha(&self, id: i32) -> Result<bool, StoreError>;

    // --- Visual solutions ---
    async fn list_visual_solutions(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<VisualSolution>, StoreError>;
    async fn get_visual_solution(&self, id: i32) -> Result<Option<VisualSolution>, StoreError>;
    async fn create_visual_solution(
        &self,
        solution: &NewVisualSolution,
    ) -> Result<VisualSolution, StoreError>;
    async fn update_visual_solution(
        &self,
        id: i32,
        solution: &NewVisualSolution,
    ) -> Result<Option<VisualSolution>, StoreError>;
    async fn delete_visual_solution(&self, id: i32) -> Result<bool, StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row structs (store boundary) ---

const USER_COLUMNS: &str =
    "id, usuario, password, rol, permisos, fecha_creacion, fecha_actualizacion";
const FICHA_COLUMNS: &str = "id, categoria, problema, descripcion, causas, solucion, palabras_clave, fecha_creacion, fecha_actualizacion";
const VISUAL_COLUMNS: &str =
    "id, titulo, categoria, descripcion, pasos, estado, fecha_creacion, fecha_actualizacion";

/// UserRow
///
/// Raw `usuarios` row. Column names are mapped by name, never by position.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i32,
    #[sqlx(rename = "usuario")]
    username: String,
    #[sqlx(rename = "password")]
    password_hash: String,
    #[sqlx(rename = "rol")]
    role: String,
    #[sqlx(rename = "permisos")]
    permissions: Option<String>,
    #[sqlx(rename = "fecha_creacion")]
    created_at: DateTime<Utc>,
    #[sqlx(rename = "fecha_actualizacion")]
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role: Role::from_stored(&row.role),
            permissions: PermissionMap::parse(row.permissions.as_deref()),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FichaRow {
    id: i32,
    categoria: String,
    problema: String,
    descripcion: Option<String>,
    causas: Option<String>,
    solucion: Option<String>,
    palabras_clave: Option<String>,
    #[sqlx(rename = "fecha_creacion")]
    created_at: DateTime<Utc>,
    #[sqlx(rename = "fecha_actualizacion")]
    updated_at: DateTime<Utc>,
}

impl From<FichaRow> for Ficha {
    fn from(row: FichaRow) -> Self {
        Ficha {
            id: row.id,
            categoria: row.categoria,
            problema: row.problema,
            descripcion: row.descripcion.unwrap_or_default(),
            causas: codec::decode_list(row.causas.as_deref().unwrap_or_default()),
            solucion: codec::decode_list(row.solucion.as_deref().unwrap_or_default()),
            palabras_clave: row.palabras_clave.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VisualSolutionRow {
    id: i32,
    titulo: String,
    categoria: String,
    descripcion: Option<String>,
    pasos: String,
    estado: String,
    #[sqlx(rename = "fecha_creacion")]
    created_at: DateTime<Utc>,
    #[sqlx(rename = "fecha_actualizacion")]
    updated_at: DateTime<Utc>,
}

impl TryFrom<VisualSolutionRow> for VisualSolution {
    type Error = StoreError;

    fn try_from(row: VisualSolutionRow) -> Result<Self, Self::Error> {
        let pasos = codec::decode_steps(&row.pasos)
            .map_err(|e| StoreError::Corrupt(format!("soluciones_visuales {}: {}", row.id, e)))?;
        Ok(VisualSolution {
            id: row.id,
            titulo: row.titulo,
            categoria: row.categoria,
            descripcion: row.descripcion.unwrap_or_default(),
            pasos,
            // Unknown states hide the guide rather than publish it.
            estado: Estado::parse(&row.estado).unwrap_or(Estado::Inactivo),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn encode_lists(ficha: &NewFicha) -> Result<(String, String), StoreError> {
    let causas =
        codec::encode_list(&ficha.causas).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let solucion =
        codec::encode_list(&ficha.solucion).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok((causas, solucion))
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL. Each query
/// checks a connection out of the pool and returns it when the future completes, on success
/// and error paths alike.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn get_user(&self, id: i32) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM usuarios WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM usuarios WHERE usuario = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM usuarios ORDER BY fecha_creacion DESC, id DESC");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO usuarios (usuario, password, rol, permisos) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .bind(user.permissions.to_json())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    /// update_user
    ///
    /// Rewrites username, role and permissions; the credential only changes when a new hash
    /// is supplied (COALESCE keeps the stored one otherwise).
    async fn update_user(&self, id: i32, update: UserUpdate) -> Result<Option<User>, StoreError> {
        let sql = format!(
            r#"
            UPDATE usuarios
            SET usuario = $2,
                password = COALESCE($3, password),
                rol = $4,
                permisos = $5,
                fecha_actualizacion = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&update.username)
            .bind(update.password_hash.as_deref())
            .bind(update.role.as_str())
            .bind(update.permissions.to_json())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn update_password(&self, id: i32, password_hash: &str) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE usuarios SET password = $1, fecha_actualizacion = NOW() WHERE id = $2",
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_user(&self, id: i32) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM usuarios WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- FICHAS ---

    async fn list_fichas(&self) -> Result<Vec<Ficha>, StoreError> {
        let sql = format!("SELECT {FICHA_COLUMNS} FROM fichas ORDER BY fecha_actualizacion DESC, id DESC");
        let rows = sqlx::query_as::<_, FichaRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Ficha::from).collect())
    }

    /// search_fichas
    ///
    /// Category is an exact match; the free-text query is a case-insensitive substring match
    /// over `problema` and `palabras_clave`. Both filters are optional and parameterized
    /// through QueryBuilder.
    async fn search_fichas(&self, search: &FichaSearch) -> Result<Vec<Ficha>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {FICHA_COLUMNS} FROM fichas WHERE 1 = 1"));

        if let Some(categoria) = search.category() {
            builder.push(" AND categoria = ");
            builder.push_bind(categoria.to_string());
        }

        if let Some(q) = search.query() {
            let pattern = format!("%{}%", q);
            builder.push(" AND (problema ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR palabras_clave ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY fecha_actualizacion DESC, id DESC");

        let rows = builder
            .build_query_as::<FichaRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Ficha::from).collect())
    }

    async fn get_ficha(&self, id: i32) -> Result<Option<Ficha>, StoreError> {
        let sql = format!("SELECT {FICHA_COLUMNS} FROM fichas WHERE id = $1");
        let row = sqlx::query_as::<_, FichaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Ficha::from))
    }

    async fn create_ficha(&self, ficha: &NewFicha) -> Result<Ficha, StoreError> {
        let (causas, solucion) = encode_lists(ficha)?;
        let sql = format!(
            r#"
            INSERT INTO fichas (categoria, problema, descripcion, causas, solucion, palabras_clave)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {FICHA_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, FichaRow>(&sql)
            .bind(&ficha.categoria)
            .bind(&ficha.problema)
            .bind(&ficha.descripcion)
            .bind(causas)
            .bind(solucion)
            .bind(&ficha.palabras_clave)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_ficha(&self, id: i32, ficha: &NewFicha) -> Result<Option<Ficha>, StoreError> {
        let (causas, solucion) = encode_lists(ficha)?;
        let sql = format!(
            r#"
            UPDATE fichas
            SET categoria = $2, problema = $3, descripcion = $4,
                causas = $5, solucion = $6, palabras_clave = $7,
                fecha_actualizacion = NOW()
            WHERE id = $1
            RETURNING {FICHA_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, FichaRow>(&sql)
            .bind(id)
            .bind(&ficha.categoria)
            .bind(&ficha.problema)
            .bind(&ficha.descripcion)
            .bind(causas)
            .bind(solucion)
            .bind(&ficha.palabras_clave)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Ficha::from))
    }

    async fn delete_ficha(&self, id: i32) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM fichas WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- VISUAL SOLUTIONS ---

    async fn list_visual_solutions(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<VisualSolution>, StoreError> {
        let sql = if include_inactive {
            format!("SELECT {VISUAL_COLUMNS} FROM soluciones_visuales ORDER BY categoria, id")
        } else {
            format!(
                "SELECT {VISUAL_COLUMNS} FROM soluciones_visuales WHERE estado = 'activo' ORDER BY categoria, id"
            )
        };
        let rows = sqlx::query_as::<_, VisualSolutionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(VisualSolution::try_from).collect()
    }

    async fn get_visual_solution(&self, id: i32) -> Result<Option<VisualSolution>, StoreError> {
        let sql = format!("SELECT {VISUAL_COLUMNS} FROM soluciones_visuales WHERE id = $1");
        let row = sqlx::query_as::<_, VisualSolutionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(VisualSolution::try_from).transpose()
    }

    async fn create_visual_solution(
        &self,
        solution: &NewVisualSolution,
    ) -> Result<VisualSolution, StoreError> {
        let pasos = codec::encode_steps(&solution.pasos)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let sql = format!(
            r#"
            INSERT INTO soluciones_visuales (titulo, categoria, descripcion, pasos, estado)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {VISUAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, VisualSolutionRow>(&sql)
            .bind(&solution.titulo)
            .bind(&solution.categoria)
            .bind(&solution.descripcion)
            .bind(pasos)
            .bind(solution.estado.as_str())
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_visual_solution(
        &self,
        id: i32,
        solution: &NewVisualSolution,
    ) -> Result<Option<VisualSolution>, StoreError> {
        let pasos = codec::encode_steps(&solution.pasos)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let sql = format!(
            r#"
            UPDATE soluciones_visuales
            SET titulo = $2, categoria = $3, descripcion = $4, pasos = $5, estado = $6,
                fecha_actualizacion = NOW()
            WHERE id = $1
            RETURNING {VISUAL_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, VisualSolutionRow>(&sql)
            .bind(id)
            .bind(&solution.titulo)
            .bind(&solution.categoria)
            .bind(&solution.descripcion)
            .bind(pasos)
            .bind(solution.estado.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(VisualSolution::try_from).transpose()
    }

    async fn delete_visual_solution(&self, id: i32) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM soluciones_visuales WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;

use crate::{
    auth,
    codec,
    config::AppConfig,
    errors::{AppError, StoreError},
    permissions::{PermissionMap, Role},
};

const MAX_CONNECTIONS: u32 = 5;
// Per-attempt ceiling; the retry loop below owns the overall policy.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// connect_with_retry
///
/// Opens the Postgres pool with a bounded retry policy: `db_connect_attempts` tries,
/// `db_retry_delay` apart. Exhausting the attempts returns the last error; the caller treats
/// it as fatal.
pub async fn connect_with_retry(config: &AppConfig) -> Result<PgPool, StoreError> {
    let attempts = config.db_connect_attempts.max(1);
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.db_url)
            .await
        {
            Ok(pool) => {
                tracing::info!(attempt, "connected to Postgres");
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    "Postgres connection failed, retrying in {:?}: {}",
                    config.db_retry_delay,
                    e
                );
                tokio::time::sleep(config.db_retry_delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempts, "Postgres connection failed, giving up: {}", e);
                return Err(StoreError::Unavailable(e));
            }
        }
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS usuarios (
        id SERIAL PRIMARY KEY,
        usuario VARCHAR(50) NOT NULL UNIQUE,
        password VARCHAR(255) NOT NULL,
        rol VARCHAR(50) NOT NULL,
        permisos TEXT,
        fecha_creacion TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        fecha_actualizacion TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fichas (
        id SERIAL PRIMARY KEY,
        categoria VARCHAR(50) NOT NULL,
        problema VARCHAR(255) NOT NULL,
        descripcion TEXT,
        causas TEXT,
        solucion TEXT,
        palabras_clave TEXT,
        fecha_creacion TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        fecha_actualizacion TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS soluciones_visuales (
        id SERIAL PRIMARY KEY,
        titulo VARCHAR(255) NOT NULL,
        categoria VARCHAR(50) NOT NULL,
        descripcion TEXT,
        pasos TEXT NOT NULL DEFAULT '[]',
        estado VARCHAR(20) NOT NULL DEFAULT 'activo',
        fecha_creacion TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        fecha_actualizacion TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Creates the three tables when missing. Safe to run on every startup.
pub async fn bootstrap_schema(pool: &PgPool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    tracing::info!("schema ready");
    Ok(())
}

/// migrate_legacy_lists
///
/// Rewrites `causas` / `solucion` values still stored as legacy text (pipe joined or one
/// item per line) as JSON arrays. Returns the number of rows rewritten.
pub async fn migrate_legacy_lists(pool: &PgPool) -> Result<u64, StoreError> {
    let rows = sqlx::query("SELECT id, causas, solucion FROM fichas")
        .fetch_all(pool)
        .await?;

    let mut migrated = 0;
    for row in rows {
        let id: i32 = row.try_get("id")?;
        let causas: Option<String> = row.try_get("causas")?;
        let solucion: Option<String> = row.try_get("solucion")?;

        let needs_migration = |value: &Option<String>| match value.as_deref() {
            Some(v) => !v.trim().is_empty() && !codec::is_json_list(v),
            None => false,
        };
        if !needs_migration(&causas) && !needs_migration(&solucion) {
            continue;
        }

        let causas = to_json_list(causas.as_deref())?;
        let solucion = to_json_list(solucion.as_deref())?;
        sqlx::query("UPDATE fichas SET causas = $1, solucion = $2 WHERE id = $3")
            .bind(causas)
            .bind(solucion)
            .bind(id)
            .execute(pool)
            .await?;
        migrated += 1;
    }

    if migrated > 0 {
        tracing::info!(migrated, "converted legacy lists to JSON");
    }
    Ok(migrated)
}

fn to_json_list(stored: Option<&str>) -> Result<String, StoreError> {
    let items = codec::decode_list(stored.unwrap_or_default());
    codec::encode_list(&items).map_err(|e| StoreError::Corrupt(e.to_string()))
}

// Sample knowledge base loaded into an empty `fichas` table. List fields are written in the
// legacy pipe format and converted on insert.
const SEED_FICHAS: &[(&str, &str, &str, &str, &str, &str)] = &[
    (
        "TV",
        "No hay señal en el televisor",
        "Usuario indica que el televisor no muestra ningún canal, aparece en pantalla negra o con el mensaje sin señal.",
        "Micronodo/CATV alarmado, apagado|Problemas con el decodificador",
        "Encender el CATV.|Validar que el Micronodo no esté alarmado.|Confirmar que CATV y Micronodo estén conectados correctamente.|Verificar que el decodificador esté programado adecuadamente.",
        "Sin señal, CATV, Micronodo, Decodificador",
    ),
    (
        "TV",
        "Imagen pixelada o con interferencias",
        "Usuario indica que la imagen se ve con cuadritos, borrosa, congelada o con rayas",
        "Cable de señal dañado|Problemas con la antena/servicio|Reprogramacion mal ejecutada",
        "Validar si el inconveniente no corresponde al proveedor.|Indicar al usuario que reprograme en modo Aire/Antena.|Brindar el paso a paso para la reprogramación.|Si persiste la falla, generar orden de servicio en Softv para enviar personal técnico.",
        "Pixeleado, lluvioso, intermitencia",
    ),
    (
        "Internet",
        "Internet lento o intermitente",
        "Usuario indica que la conexión se cae constantemente o que la velocidad es muy baja.",
        "Congestión de la red|Potencias mayores a -27",
        "Validar potencias del módem.|Realizar Reboot en Vortex y esperar 1 minuto.|Ejecutar Resync Config en Vortex y esperar 1 minuto.|Indicar al usuario desconectar el módem por 3 minutos.",
        "Lento, Intermitente",
    ),
    (
        "Internet",
        "Sin conexión a internet",
        "Usuario indica que no puede navegar en ningún dispositivo y aparece como sin acceso a la red, tiene un LED rojo encendido.",
        "Router/módem apagado|patchcord desconectado/Dañado",
        "Habilitar nuevamente el módem en Vortex.|Si presenta LOS, generar orden de falla en Softv para enviar personal técnico.",
        "LOS , Modem",
    ),
    (
        "Equipo",
        "Equipo no enciende",
        "Usuario indica que el dispositivo no prende ni muestra luces aunque esté conectado a la corriente.",
        "Cargador del modem desconectado|Boton OFF/ON Sin presionar",
        "Indicar al usuario validar el cableado del cargador del módem.|Sugerir conectarlo en otra toma de corriente.|Realizar Resync Config en Vortex y esperar que el equipo cambie de estado.|Recomendar revisar el botón trasero del módem.|Si persiste la falla, generar orden en Softv para enviar personal técnico.",
        "Apagado, No enciende, Modem",
    ),
];

/// seed
///
/// Inserts the default `admin` / `asesor` accounts when their seed password is configured
/// and the username is free, and the sample fichas when the table is empty.
pub async fn seed(pool: &PgPool, config: &AppConfig) -> Result<(), AppError> {
    let accounts = [
        ("admin", Role::Admin, config.seed_admin_password.as_deref()),
        ("asesor", Role::Asesor, config.seed_asesor_password.as_deref()),
    ];

    for (username, role, password) in accounts {
        let Some(password) = password else {
            tracing::debug!(username, "no seed password configured, skipping account");
            continue;
        };
        let password_hash = auth::hash_password(password)?;
        let res = sqlx::query(
            "INSERT INTO usuarios (usuario, password, rol, permisos) VALUES ($1, $2, $3, $4) ON CONFLICT (usuario) DO NOTHING",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(PermissionMap::default_template().to_json())
        .execute(pool)
        .await
        .map_err(StoreError::from)?;
        if res.rows_affected() > 0 {
            tracing::info!(username, "seeded default account");
        }
    }

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fichas")
        .fetch_one(pool)
        .await
        .map_err(StoreError::from)?;
    if count > 0 {
        return Ok(());
    }

    for &(categoria, problema, descripcion, causas, solucion, palabras_clave) in SEED_FICHAS {
        let causas = to_json_list(Some(causas))?;
        let solucion = to_json_list(Some(solucion))?;
        sqlx::query(
            "INSERT INTO fichas (categoria, problema, descripcion, causas, solucion, palabras_clave) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(categoria)
        .bind(problema)
        .bind(descripcion)
        .bind(causas)
        .bind(solucion)
        .bind(palabras_clave)
        .execute(pool)
        .await
        .map_err(StoreError::from)?;
    }
    tracing::info!(count = SEED_FICHAS.len(), "seeded sample fichas");
    Ok(())
}

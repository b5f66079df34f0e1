use chrono::Utc;
use ficha_portal::{
    codec::StepRecord,
    models::{Estado, Ficha, FichaForm, Notice, User, VisualSolution},
    permissions::{PermissionMap, Role},
};
use serde_json::json;

// --- Tests ---

#[test]
fn test_user_json_never_contains_password_hash() {
    let user = User {
        id: 1,
        username: "admin".into(),
        password_hash: "$2b$12$secret".into(),
        role: Role::Admin,
        permissions: PermissionMap::default_template(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let value = serde_json::to_value(&user).unwrap();
    assert!(value.get("password_hash").is_none());
    assert_eq!(value["role"], "admin");
    assert_eq!(value["permissions"]["view_records"], true);
}

#[test]
fn test_ficha_lists_serialize_as_arrays() {
    let ficha = Ficha {
        id: 3,
        categoria: "Internet".into(),
        problema: "Internet lento o intermitente".into(),
        descripcion: String::new(),
        causas: vec!["Congestión | saturación".into()],
        solucion: vec!["Validar potencias.".into()],
        palabras_clave: "Lento".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let value = serde_json::to_value(&ficha).unwrap();
    // A literal pipe inside an item survives as part of that item.
    assert_eq!(value["causas"], json!(["Congestión | saturación"]));
}

#[test]
fn test_visual_solution_shape() {
    let solution = VisualSolution {
        id: 9,
        titulo: "Reboot en Vortex".into(),
        categoria: "Internet".into(),
        descripcion: String::new(),
        pasos: vec![StepRecord {
            titulo: "Abrir Vortex".into(),
            ..StepRecord::default()
        }],
        estado: Estado::Inactivo,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let value = serde_json::to_value(&solution).unwrap();
    assert_eq!(value["estado"], "inactivo");
    assert_eq!(
        value["pasos"],
        json!([{ "titulo": "Abrir Vortex", "descripcion": "", "imagen": "" }])
    );
}

#[test]
fn test_notice_shape() {
    let value = serde_json::to_value(Notice::success("Ficha agregada correctamente")).unwrap();
    assert_eq!(
        value,
        json!({ "level": "success", "message": "Ficha agregada correctamente" })
    );
}

#[test]
fn test_ficha_form_accepts_partial_submissions() {
    // Missing fields default to empty and are caught by validation, not by the decoder.
    let form: FichaForm = serde_json::from_value(json!({ "categoria": "TV" })).unwrap();
    assert_eq!(form.categoria, "TV");
    assert!(form.problema_real.is_none());
    assert!(form.validate().is_err());
}

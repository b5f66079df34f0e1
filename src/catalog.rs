// Canned problem titles offered by the ficha form's selector. Static, never persisted.

const TV: &[&str] = &[
    "No hay señal en el televisor",
    "Imagen pixelada o con interferencias",
    "Sin sonido en algunos canales",
    "Problemas con la guía de programación",
    "Otro problema con TV",
];

const INTERNET: &[&str] = &[
    "Internet lento o intermitente",
    "Sin conexión a internet",
    "Problemas con WiFi",
    "No puedo conectarme a sitios específicos",
    "Velocidad inferior a la contratada",
    "Problemas con el módem/router",
    "Otro problema con Internet",
];

const EQUIPO: &[&str] = &[
    "Equipo no enciende",
    "Problemas con puertos HDMI/USB",
    "Dispositivo no da MAC",
    "Problemas niveles opticos",
    "Otro problema con Equipo",
];

const CATEGORIES: &[(&str, &[&str])] = &[("TV", TV), ("Internet", INTERNET), ("Equipo", EQUIPO)];

/// Problem titles for a category. Unknown categories yield an empty slice, never an error.
pub fn problems_for(category: &str) -> &'static [&'static str] {
    CATEGORIES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, problems)| *problems)
        .unwrap_or(&[])
}

pub fn categories() -> Vec<&'static str> {
    CATEGORIES.iter().map(|(name, _)| *name).collect()
}

use axum::Json;
use axum::extract::{Path, State};
use minerva_types::api::{ApiResponse, PdfDocument};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Metadata of the five official project documents served from the public
/// tree. Static: the library only changes with a deploy.
const DOCUMENTS: [PdfDocument; 5] = [
    PdfDocument {
        id: 1,
        title: "Resolución Ambiental MARN (B2)",
        filename: "resolucion-ambiental-marn.pdf",
        description: "Resolución EAI-S-01579-2024 con categoría B2 y condiciones de \
            construcción y operación. Incluye obligaciones de manejo de lodos, residuos, \
            bitácoras y análisis semestrales.",
        category: "ambiental",
        date: "2025-02-03",
        size: "TBD",
        pages: "TBD",
    },
    PdfDocument {
        id: 2,
        title: "Estudio/Sondeo Hidrogeológico",
        filename: "estudio-hidrogeologico.pdf",
        description: "Estudio técnico que recomienda profundidad de 1,500 pies, método de \
            perforación y monitoreo continuo. Detalla acuíferos en rocas volcánicas \
            fracturadas y riesgos de sobreexplotación.",
        category: "tecnico",
        date: "TBD",
        size: "TBD",
        pages: "TBD",
    },
    PdfDocument {
        id: 3,
        title: "Estudio de Factibilidad",
        filename: "estudio-factibilidad.pdf",
        description: "Dimensiona la escala del sistema para ~11,650 beneficiarios. Localiza \
            el proyecto en 18-75 Bulevar San Nicolás, zona 4 de Mixco.",
        category: "tecnico",
        date: "TBD",
        size: "TBD",
        pages: "TBD",
    },
    PdfDocument {
        id: 4,
        title: "Especificaciones Técnicas y Planos",
        filename: "especificaciones-tecnicas.pdf",
        description: "Describe caseta, cloración, conexión a red, pruebas de bombeo (48 h), \
            registro eléctrico y validación de estudios. Incluye planos arquitectónicos y de \
            ingeniería.",
        category: "tecnico",
        date: "TBD",
        size: "TBD",
        pages: "TBD",
    },
    PdfDocument {
        id: 5,
        title: "Dictamen Jurídico y Nombramiento de Supervisor",
        filename: "dictamen-juridico-supervisor.pdf",
        description: "Dictamen jurídico 12-2025 A.J. favorable para continuar licitación y \
            resolución del Concejo Municipal (6 de junio) con nombramiento de supervisor del \
            proyecto.",
        category: "legal",
        date: "2025-06-06",
        size: "TBD",
        pages: "TBD",
    },
];

/// GET /api/pdfs
pub async fn list(State(_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "data": DOCUMENTS, "total": DOCUMENTS.len() }))
}

/// GET /api/pdfs/:id
pub async fn by_id(
    State(_state): State<AppState>,
    Path(id): Path<u32>,
) -> ApiResult<Json<ApiResponse<PdfDocument>>> {
    DOCUMENTS
        .iter()
        .find(|d| d.id == id)
        .cloned()
        .map(|d| Json(ApiResponse::ok(d)))
        .ok_or_else(|| ApiError::not_found("PDF no encontrado"))
}

/// GET /api/pdfs/category/:category
pub async fn by_category(
    State(_state): State<AppState>,
    Path(category): Path<String>,
) -> Json<serde_json::Value> {
    let filtered: Vec<&PdfDocument> = DOCUMENTS
        .iter()
        .filter(|d| d.category == category)
        .collect();
    Json(json!({ "success": true, "data": filtered, "total": filtered.len() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_dense() {
        let mut ids: Vec<u32> = DOCUMENTS.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn categories_cover_the_library() {
        assert_eq!(DOCUMENTS.iter().filter(|d| d.category == "tecnico").count(), 3);
        assert_eq!(DOCUMENTS.iter().filter(|d| d.category == "ambiental").count(), 1);
        assert_eq!(DOCUMENTS.iter().filter(|d| d.category == "legal").count(), 1);
    }
}

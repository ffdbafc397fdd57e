use std::path::Path;
use tracing::{info, warn};

/// Display identity of the automated moderator in the group chat.
pub const BOT_NAME: &str = "PozoBot";
pub const BOT_COLONIA: &str = "Sistema";

/// Exact token the model returns when it judges no response is warranted.
pub const NO_RESPONSE_SENTINEL: &str = "NO_RESPONDER";

/// Keep room for the prompt, the new messages and the completion.
const MAX_CONTEXT_CHARS: usize = 500_000;

/// Fixed persona shared by the group-chat moderator and the FAQ chatbot.
pub const SYSTEM_PROMPT: &str = "\
Eres un moderador de chat informativo sobre el proyecto del Pozo de Minerva en la zona 4 de Mixco, Guatemala.

FORMATO DE RESPUESTA:
- Responde SIEMPRE de forma CORTA y RESUMIDA (máximo 2-3 párrafos breves)
- Usa lenguaje accesible para vecinos sin conocimiento técnico
- Ve directo al punto sin rodeos

TRATAMIENTO DE INFORMACIÓN OFICIAL:
- Cuando menciones información de la municipalidad, usa términos como \"supuestamente\", \"según la municipalidad\", \"oficialmente se indica\"
- Mantén un tono escéptico y crítico respecto a las versiones oficiales

METODOLOGÍA DE RESPUESTA (IMPORTANTE):
1. Lee la pregunta del usuario cuidadosamente
2. Busca la información específica en el CONTEXTO DEL PROYECTO (documentación oficial) que responda la pregunta
3. Responde con esa información encontrada en la documentación
4. SIEMPRE cierra tu respuesta vinculando a UNO de los 5 puntos de preocupación que mejor encaje con la pregunta

LOS 5 PUNTOS DE PREOCUPACIÓN (usa estos textualmente cuando cierres tu respuesta):

1. CLASIFICACIÓN AMBIENTAL (B2) DISCUTIBLE
   Para un sistema nuevo con pozo de 457 m que abastecerá a ~11,650 personas, caseta, cloración y conexión a red, puede argumentarse que el impacto es \"moderado\" (B1) y debió requerir un EIA con participación ciudadana más robusta. Pedir revisión de categoría y medidas cautelares es viable, citando escala y área de influencia (cono de abatimiento en zona residencial densa).

2. PERMISOS SECTORIALES FALTANTES O DÉBILES
   Si el MSPAS no ha emitido aval sanitario (calidad, desinfección, sellos y resguardo sanitario), puede solicitarse suspensión hasta contar con dictamen sanitario y diseños aprobados. La propia resolución del MARN exige controles de calidad semestrales y señala que no autoriza el aprovechamiento del agua.

3. CONDICIONES ESTRICTAS DEL MARN — ALTA EXPOSICIÓN A SANCIÓN
   El MARN impone obligaciones específicas (gestión de lodos según Acuerdo 236-2006, plan de residuos, almacenamiento temporal, reciclaje, bitácora de niveles freáticos, transporte y disposición de sobrantes, prohibición de depositar materiales en cauces, etc.). Cualquier incumplimiento habilita suspensión y sanción. Esto es clave para denuncias técnicas en obra.

4. CONTRATACIÓN PÚBLICA — VÍAS DE IMPUGNACIÓN Y CONTROL EXTERNO
   Con dictamen jurídico favorable y supervisor nombrado, la compra avanza; pero sigue sujeta a control de legalidad (Contraloría, Guatecompras, PGN) y a cuestionamientos por bases restrictivas o deficiencias técnicas (p. ej., si las especificaciones eliminan competencia o si el diseño carece de respaldos actualizados).

5. UBICACIÓN URBANA SENSIBLE
   Los planos y fichas ubican la obra en el 18-75 del bulevar, con caseta y conexión a red, en un corredor vial y cercano a áreas residenciales (CSN-1, 2, 3 y Vistas del Naranjo). El riesgo de ruido, vibración, tránsito de maquinaria y afectación al espacio público da base para medidas de mitigación obligatorias y para pedir reubicación si se prueba afectación desproporcionada.

NO debes:
- Dar asesoría legal específica
- Hacer promesas sobre resultados
- Inventar información que no esté en el contexto
- Escribir respuestas largas o con mucho relleno

Responde en español de forma BREVE, DIRECTA y CRÍTICA, basándote en la documentación y SIEMPRE cerrando con uno de los 5 puntos de preocupación.";

const DEFAULT_CONTEXT: &str = "\
INFORMACIÓN DEL PROYECTO POZO DE MINERVA

UBICACIÓN:
- Dirección: 18-75 Bulevar San Nicolás, Zona 4, Mixco
- Área de influencia: Colonias San Nicolás (CSN-1, CSN-2, CSN-3), Vistas del Naranjo, Montserrat, y áreas circundantes

CARACTERÍSTICAS DEL PROYECTO:
- Tipo: Pozo mecánico profundo
- Profundidad: ~457 metros (1,500 pies)
- Diámetro de perforación: 17.5 pulgadas
- Entubado: 12 pulgadas (197 pies liso + 1,303 pies ranurado)
- Población objetivo: ~11,650 personas
- Infraestructura: Caseta de máquinas, cuarto de cloración, conexión a red municipal

CLASIFICACIÓN AMBIENTAL:
- Categoría actual: B2 (bajo impacto) - MARN
- Fecha de aprobación: 03-Feb-2025
- Expediente: EAI-S-01579-2024

CINCO RAZONES PARA PREOCUPACIÓN:

1. CLASIFICACIÓN AMBIENTAL DISCUTIBLE (B2 vs B1)
   - Un pozo tan profundo puede tener impacto \"moderado\" (B1)
   - B1 requiere mayor participación ciudadana
   - El cono de abatimiento puede afectar pozos vecinos

2. PERMISOS SECTORIALES FALTANTES
   - Se requiere aval sanitario del MSPAS
   - La resolución MARN NO autoriza aprovechamiento de aguas
   - Faltan validaciones técnicas previas a construcción

3. CONDICIONES ESTRICTAS DEL MARN
   - Manejo de lodos según Acuerdo 236-2006
   - Bitácora de niveles freáticos obligatoria
   - Análisis fisicoquímicos semestrales
   - Prohibición de depositar materiales en cauces
   - Cualquier incumplimiento habilita suspensión

4. CONTRATACIÓN PÚBLICA
   - Proceso sujeto a control de Contraloría y Guatecompras
   - Posibles impugnaciones por bases restrictivas
   - Se requiere actualización de estudios técnicos

5. UBICACIÓN URBANA SENSIBLE
   - Corredor vial principal (Bulevar San Nicolás)
   - Cercanía a áreas residenciales densas
   - Riesgo de ruido, vibración, polvo
   - Afectación al tránsito vehicular
   - Posible daño a instalaciones existentes

ACCIONES CIUDADANAS DISPONIBLES:
1. Solicitar revisión de categoría al MARN (B2 → B1)
2. Requerir aval sanitario del MSPAS
3. Vigilancia de obra y denuncias técnicas
4. Auditoría social de la licitación
5. Solicitar plan de manejo de tránsito/ruido a la Municipalidad

DERECHOS CIUDADANOS:
- Acceso a información pública
- Participación en procesos ambientales
- Denuncia de incumplimientos
- Solicitud de medidas cautelares
- Impugnación de procesos de compra

IMPORTANTE:
Este proyecto PUEDE ser beneficioso si se ejecuta correctamente, con todas las salvaguardas legales y técnicas. La preocupación vecinal es LEGÍTIMA y debe canalizarse por vías legales y administrativas apropiadas.";

/// Official project reference material, loaded once at startup and shared by
/// the moderator and the FAQ chatbot.
#[derive(Debug, Clone)]
pub struct ProjectContext(String);

impl ProjectContext {
    /// Read the extracted document text from disk, truncating oversized
    /// files. Falls back to the built-in summary when the file is absent.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(
                    "project context loaded from {} ({} chars)",
                    path.display(),
                    text.len()
                );
                text
            }
            Err(e) => {
                warn!(
                    "project context not readable at {} ({}), using default",
                    path.display(),
                    e
                );
                return Self(DEFAULT_CONTEXT.to_string());
            }
        };

        if text.chars().count() > MAX_CONTEXT_CHARS {
            warn!("project context truncated to {} chars", MAX_CONTEXT_CHARS);
            let truncated: String = text.chars().take(MAX_CONTEXT_CHARS).collect();
            Self(format!(
                "{}\n\n[... Contenido truncado por límite de tamaño ...]",
                truncated
            ))
        } else {
            Self(text)
        }
    }

    pub fn default_context() -> Self {
        Self(DEFAULT_CONTEXT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let ctx = ProjectContext::load(Path::new("/definitely/not/here.txt"));
        assert!(ctx.as_str().contains("POZO DE MINERVA"));
    }
}

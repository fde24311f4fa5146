//! Prompts and fixed user-facing messages.
//!
//! The audience is Spanish-speaking students learning English: instructions
//! and UI messages are in Spanish, the essays themselves are in English.
//! Callers can override both prompts via [`crate::config::CorrectorConfig`].

/// Default instruction sent alongside the essay image.
pub const TRANSCRIPTION_PROMPT: &str = "Transcribe el texto manuscrito que se encuentra en esta imagen. \
Prioriza la precisión del texto transcrito. \
Si hay partes ilegibles, indícalo con [ilegible].";

/// Default system rubric for the correction model.
pub const CORRECTION_SYSTEM_PROMPT: &str = r#"Eres un asistente experto en la enseñanza de inglés, especializado en corregir redacciones
escritas por estudiantes. Tu tarea es analizar el siguiente texto y proporcionar
una corrección detallada.

Por favor, sigue estas directrices:
1.  Identifica errores gramaticales, de ortografía, puntuación, uso de vocabulario y estructura de las frases.
2.  Para cada error, indica claramente el error y la corrección sugerida.
3.  Proporciona una breve explicación del error, especialmente si es común o conceptualmente importante.
4.  Ofrece sugerencias para mejorar la claridad, coherencia y estilo general del texto.
5.  Utiliza un tono constructivo y educativo.
6.  Formatea tu respuesta de manera clara y organizada, por ejemplo, usando listas o secciones.
    Ejemplo de formato por error:
    - Error: [Texto original con el error]
    - Corrección: [Texto corregido]
    - Explicación: [Breve explicación]
7.  Al final, da un breve resumen o una evaluación general del texto."#;

/// Shown in the correction panel when transcription failed or was blank.
pub const CORRECTION_SKIPPED: &str =
    "No se pudo transcribir la imagen para proceder con la corrección.";

/// Transcription error text when the model answered with whitespace only.
pub const EMPTY_TRANSCRIPTION: &str = "La transcripción no produjo texto.";

/// Transcribed-text panel content after a system error.
pub const SYSTEM_ERROR_TRANSCRIPTION: &str = "Ocurrió un error procesando la imagen.";

/// Corrected-text panel content after a system error.
pub const SYSTEM_ERROR_CORRECTION: &str =
    "No se pudo completar el proceso debido a un error del sistema.";

/// Shown when the form was submitted without a file.
pub const MISSING_IMAGE: &str = "Debes subir una imagen antes de extraer texto";

/// Shown by the last-result view when nothing has been transcribed yet.
pub const NO_PREVIOUS_RESULT: &str = "Por favor, sube una imagen para comenzar";

/// Wrap the transcribed essay in the user turn of the correction request.
pub fn correction_user_prompt(transcribed_text: &str) -> String {
    format!("Por favor, corrige la siguiente redacción:\n\n{transcribed_text}")
}

/// Human-readable description of a failed transcription call.
pub fn transcription_failed(detail: &str) -> String {
    format!("Error al procesar la imagen para transcripción: {detail}")
}

/// Human-readable description of a failed correction call.
pub fn correction_failed(detail: &str) -> String {
    format!("Error al procesar el texto para corrección: {detail}")
}

/// Human-readable description of an unexpected failure at the shell boundary.
pub fn system_error(detail: &str) -> String {
    format!("Error del sistema al procesar el archivo: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rubric_covers_required_sections() {
        for needle in [
            "gramaticales",
            "ortografía",
            "puntuación",
            "vocabulario",
            "estructura",
            "Corrección:",
            "Explicación:",
            "evaluación general",
        ] {
            assert!(
                CORRECTION_SYSTEM_PROMPT.contains(needle),
                "rubric is missing '{needle}'"
            );
        }
    }

    #[test]
    fn user_prompt_wraps_text() {
        let p = correction_user_prompt("I has a dog.");
        assert!(p.starts_with("Por favor, corrige"));
        assert!(p.ends_with("\n\nI has a dog."));
    }

    #[test]
    fn transcription_prompt_mentions_illegible_marker() {
        assert!(TRANSCRIPTION_PROMPT.contains("[ilegible]"));
    }
}

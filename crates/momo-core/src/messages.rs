//! User-visible texts (Telegram Markdown).

pub const DATA_UNAVAILABLE: &str =
    "🚫 Los datos no están disponibles temporalmente. Por favor, inténtelo de nuevo más tarde.";

pub const NO_DATA: &str = "🚫 No hay datos disponibles para las selecciones actuales.";

pub const SELECT_FIRST: &str = "Por favor, seleccione al menos una opción antes de aceptar.";

pub const DAILY_HEADER: &str = "🔔 *Tu actualización diaria de MoMo:*";

pub const CLEARED: &str = "🗑️ Selecciones y envío automático borrados.";

pub const BAD_TIME_FORMAT: &str =
    "❌ Formato incorrecto. Por favor, usa `/settime HH:MM` (ej: `/settime 08:30`).";

pub const MISSING_AREA_NAME: &str =
    "❌ Indica el nombre del ámbito, por ejemplo `/ccaa Madrid` o `/provincia Sevilla`.";

pub const HELP: &str = "\
*AYUDA - BOT DE DATOS MOMO*

Este bot te permite consultar el exceso de mortalidad diario del sistema MoMo.

*¿Cómo funciona?*
1️⃣ *Selecciona*: `/nacional`, `/ccaa <nombre>` o `/provincia <nombre>`. Puedes elegir varios; repetir el comando quita la selección.
2️⃣ *Consulta*: `/aceptar` muestra los últimos datos disponibles para tus selecciones.
3️⃣ *Automatiza*: Tras tu primera consulta, el bot programa un envío diario automático.

*Comandos disponibles:*
- `/start` - Inicia la conversación.
- `/help` - Muestra este mensaje de ayuda.
- `/estado` - Muestra tus selecciones y la hora de envío.
- `/settime HH:MM` - Cambia la hora de la notificación diaria.
- `/borrar` - Elimina todas tus selecciones y cancela el envío automático.
";

/// Confirmation after the first acceptance.
pub fn auto_send_enabled(hour: u32, minute: u32) -> String {
    format!(
        "✅ ¡Hecho! Envío automático programado para las *{hour:02}:{minute:02}* horas diariamente.\n\
         Usa `/settime HH:MM` para cambiar la hora."
    )
}

pub fn time_updated(hour: u32, minute: u32, active: bool) -> String {
    if active {
        format!("✅ Hora de notificación actualizada a las *{hour:02}:{minute:02}*.")
    } else {
        "✅ Hora guardada. Se usará cuando actives los envíos automáticos.".to_string()
    }
}

/// Main menu text: current selections and auto-send state.
pub fn menu(selected: &[String], hour: u32, minute: u32, auto_send: bool) -> String {
    let list = if selected.is_empty() {
        " Ninguna".to_string()
    } else {
        let mut names = selected.to_vec();
        names.sort();
        format!("\n - {}", names.join("\n - "))
    };
    let schedule = if auto_send {
        format!("activo a las *{hour:02}:{minute:02}*")
    } else {
        "desactivado".to_string()
    };
    format!(
        "📍 *Opciones seleccionadas:*{list}\n\n⏰ Envío automático: {schedule}\n\n\
         Elija más ámbitos geográficos o use `/aceptar` para ver los datos."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_lists_sorted_selections() {
        let text = menu(&["Madrid".into(), "Nacional".into()], 8, 5, true);
        assert!(text.starts_with("📍 *Opciones seleccionadas:*\n - Madrid\n - Nacional"));
        assert!(text.contains("activo a las *08:05*"));
    }

    #[test]
    fn test_menu_empty() {
        let text = menu(&[], 12, 0, false);
        assert!(text.contains("seleccionadas:* Ninguna"));
        assert!(text.contains("desactivado"));
    }

    #[test]
    fn test_time_updated() {
        assert!(time_updated(7, 0, true).contains("*07:00*"));
        assert!(!time_updated(7, 0, false).contains("07:00"));
    }
}

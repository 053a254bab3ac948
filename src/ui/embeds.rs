use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{audio::queue::PlaybackOutcome, features::music::Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎧 Guild Voice";

/// Máximo de pendientes listados en `/queue`
const QUEUE_PAGE: usize = 10;

/// Embed enviado al agregar una canción; verde mientras espera o suena
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let title = if position == 0 {
        "🎵 Reproduciendo Ahora"
    } else {
        "✅ Canción Agregada"
    };

    track_embed(track, title, colors::SUCCESS_GREEN).field("📋 Posición", position_label(position), true)
}

/// Mismo embed, recoloreado cuando la canción deja de sonar
pub fn create_track_finished_embed(track: &Track, outcome: PlaybackOutcome) -> CreateEmbed {
    let (title, colour) = match outcome {
        PlaybackOutcome::Finished => ("✔️ Reproducción Terminada", colors::MUSIC_PURPLE),
        PlaybackOutcome::Skipped => ("⏭️ Canción Saltada", colors::NEUTRAL_GRAY),
        PlaybackOutcome::Stopped => ("⏹️ Reproducción Detenida", colors::WARNING_ORANGE),
    };

    track_embed(track, title, colour)
}

/// Verde mientras suena; `/nowplaying` lo recolorea al terminar
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    track_embed(track, "🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN)
}

/// Resultados de `/find`
pub fn create_search_results_embed(query: &str, matches: &[String]) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("🔍 {} coincidencias para '{}'", matches.len(), query))
        .description(describe_matches(matches))
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con la canción actual y las pendientes
pub fn create_queue_embed(current: Option<&Track>, pending: &[Track]) -> CreateEmbed {
    let now = current.map_or_else(|| "Nada".to_string(), |t| format!("**{}**", t.title));

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE)
        .field("🎵 Sonando", now, false);

    if !pending.is_empty() {
        embed = embed.field(format!("⏳ Pendientes ({})", pending.len()), describe_pending(pending), false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn track_embed(track: &Track, title: &str, colour: serenity::all::Colour) -> CreateEmbed {
    let source = if track.is_remote() { "🌐 URL" } else { "📁 Archivo local" };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(colour)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by), true)
        .field("🔗 Fuente", source, true)
        .field("🕐 Agregada", track.added_at.format("%H:%M:%S UTC").to_string(), true);

    if track.is_remote() {
        embed = embed.url(&track.input);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn position_label(position: usize) -> String {
    match position {
        0 => "Sonando".to_string(),
        n => format!("#{}", n),
    }
}

fn describe_pending(pending: &[Track]) -> String {
    let mut lines: Vec<String> = pending
        .iter()
        .take(QUEUE_PAGE)
        .enumerate()
        .map(|(i, track)| format!("`{}.` {} - <@{}>", i + 1, track.title, track.requested_by))
        .collect();

    if pending.len() > QUEUE_PAGE {
        lines.push(format!("... y {} más", pending.len() - QUEUE_PAGE));
    }

    lines.join("\n")
}

fn describe_matches(matches: &[String]) -> String {
    let mut lines: Vec<String> = matches
        .iter()
        .take(QUEUE_PAGE)
        .enumerate()
        .map(|(i, name)| format!("`{}.` {}", i + 1, name))
        .collect();

    if matches.len() > QUEUE_PAGE {
        lines.push(format!("... y {} más", matches.len() - QUEUE_PAGE));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            input: format!("https://example.com/{}.mp3", title),
            requested_by: UserId::new(1),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_describe_pending_truncates() {
        let pending: Vec<_> = (0..12).map(|i| track(&format!("t{}", i))).collect();

        let text = describe_pending(&pending);

        assert_eq!(text.lines().count(), QUEUE_PAGE + 1);
        assert!(text.starts_with("`1.` t0 - <@1>"));
        assert!(text.ends_with("... y 2 más"));
    }

    #[test]
    fn test_describe_matches_numbers_and_truncates() {
        let matches: Vec<_> = (0..11).map(|i| format!("song{}.mp3", i)).collect();

        let text = describe_matches(&matches);

        assert_eq!(text.lines().next(), Some("`1.` song0.mp3"));
        assert_eq!(text.lines().count(), QUEUE_PAGE + 1);
        assert!(text.ends_with("... y 1 más"));
        assert_eq!(describe_matches(&matches[..2]), "`1.` song0.mp3\n`2.` song1.mp3");
    }

    #[test]
    fn test_position_label() {
        assert_eq!(position_label(0), "Sonando");
        assert_eq!(position_label(3), "#3");
    }
}

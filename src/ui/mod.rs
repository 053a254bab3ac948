//! Embeds de Discord para las respuestas de los comandos.

pub mod embeds;

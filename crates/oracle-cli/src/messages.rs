//! User-facing message templates.
//!
//! Defaults are built in; the optional `[messages]` table of the config file
//! overrides individual entries.

use std::path::Path;

use serde::Deserialize;

/// Placeholder replaced with the remaining cooldown in [`Messages::cooldown`].
const SECONDS_PLACEHOLDER: &str = "{seconds}";

/// Templates for everything the bot says that is not an oracle answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub start: String,
    pub help: String,
    pub cooldown: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            start: "🔮 Я Оракул. Задай мне вопрос, и я загляну в туман грядущего.".into(),
            help: "Просто напиши свой вопрос. Оракул отвечает не чаще одного раза \
                   в несколько секунд."
                .into(),
            cooldown: "⏳ Оракул ещё размышляет. Следующий вопрос через {seconds} сек.".into(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    messages: Messages,
}

impl Messages {
    /// Load templates from the `[messages]` table, falling back to defaults
    /// when the file or table is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => file.messages,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse [messages], using defaults");
                Self::default()
            }
        }
    }

    /// Render the cooldown notice.
    pub fn cooldown(&self, remaining_seconds: u64) -> String {
        self.cooldown
            .replace(SECONDS_PLACEHOLDER, &remaining_seconds.to_string())
    }
}

//! Application configuration loading from config.toml
//!
//! Everything that describes the guild (channel ids, colors, emotes,
//! reduction rates, the passeur roster, the spreadsheet references) lives in
//! a TOML file so it can change without a rebuild. Secrets never go in the
//! file: `DISCORD_BOT_TOKEN` and `SHEETS_ACCESS_TOKEN` are read from the
//! environment at the point of use.

use crate::errors::{Error, Result};
use crate::sheets::SheetRef;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Discord id of the guild the bot manages
    pub guild_id: u64,
    /// Display name of the guild, used in user-facing messages
    pub guild_name: String,
    pub channels: ChannelsConfig,
    pub colors: ColorsConfig,
    pub emotes: EmotesConfig,
    pub reductions: ReductionsConfig,
    /// Passeur pseudo -> Discord user id
    pub passeurs: HashMap<String, u64>,
    pub sheets: SheetsConfig,
    /// TTL for cached spreadsheet reads, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Interval between background resyncs (passages table + roster), in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ChannelsConfig {
    /// Channel greeting new members
    pub welcome: u64,
    /// Channel members post their presentation in
    pub presentations: u64,
    /// Channel presentation posts are relayed to
    pub showcase: u64,
    /// Forum channel receiving passage requests
    pub passage_forum: u64,
}

#[derive(Debug, Deserialize)]
pub struct ColorsConfig {
    pub guildeux: u32,
    pub hg: u32,
    pub success: u32,
}

#[derive(Debug, Deserialize)]
pub struct EmotesConfig {
    /// Custom emote markup for the Ch'ton currency
    pub chton: String,
    /// Custom emote markup for kamas
    pub kamas: String,
}

/// Price multipliers applied per membership tier (1.0 = full price)
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ReductionsConfig {
    pub premium: f64,
    pub normal: f64,
    pub nouveau: f64,
}

#[derive(Debug, Deserialize)]
pub struct SheetsConfig {
    pub members_spreadsheet_id: String,
    pub members_sheet_name: String,
    pub passages_spreadsheet_id: String,
    pub passages_sheet_name: String,
}

const fn default_cache_ttl_secs() -> u64 {
    3600
}

const fn default_refresh_interval_secs() -> u64 {
    3600
}

impl AppConfig {
    /// Whether this user id belongs to one of the configured passeurs.
    #[must_use]
    pub fn is_passeur(&self, user_id: u64) -> bool {
        self.passeurs.values().any(|id| *id == user_id)
    }

    /// Discord user id for a passeur pseudo, if it is one we know.
    #[must_use]
    pub fn passeur_id(&self, pseudo: &str) -> Option<u64> {
        self.passeurs.get(pseudo).copied()
    }

    /// Reference to the member roster sheet.
    #[must_use]
    pub fn members_sheet(&self) -> SheetRef {
        SheetRef::new(
            &self.sheets.members_spreadsheet_id,
            &self.sheets.members_sheet_name,
        )
    }

    /// Reference to the passage pricing sheet.
    #[must_use]
    pub fn passages_sheet(&self) -> SheetRef {
        SheetRef::new(
            &self.sheets.passages_spreadsheet_id,
            &self.sheets.passages_sheet_name,
        )
    }
}

/// Loads the application configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            path.as_ref().display()
        ))
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config(format!("Failed to parse config.toml: {e}")))
}

/// Loads the configuration from `$GUILDEUX_CONFIG` or ./config.toml
pub fn load_app_configuration() -> Result<AppConfig> {
    let path =
        std::env::var("GUILDEUX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            guild_id = 1200333038664568893
            guild_name = "Maison de retraite"

            [channels]
            welcome = 1200333038664568001
            presentations = 1200333038664568002
            showcase = 1200333038664568003
            passage_forum = 1353744187752976486

            [colors]
            guildeux = 0x9B59B6
            hg = 0xE74C3C
            success = 0x00FF00

            [emotes]
            chton = "<:ChTon:1360238141805433034>"
            kamas = "<:kamas:811134750415912980>"

            [reductions]
            premium = 0.8
            normal = 0.9
            nouveau = 1.0

            [passeurs]
            Auto = 199975684607705088
            Iru = 326000214865346561

            [sheets]
            members_spreadsheet_id = "members-spreadsheet"
            members_sheet_name = "Sheet1"
            passages_spreadsheet_id = "passages-spreadsheet"
            passages_sheet_name = "Sheet1"
        "#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.guild_name, "Maison de retraite");
        assert_eq!(config.channels.passage_forum, 1_353_744_187_752_976_486);
        assert_eq!(config.colors.guildeux, 0x009B_59B6);
        assert_eq!(config.reductions.premium, 0.8);
        assert_eq!(config.passeurs.len(), 2);
        // Defaults apply when the keys are absent
        assert_eq!(config.cache_ttl_secs, 3600);
        assert_eq!(config.refresh_interval_secs, 3600);
    }

    #[test]
    fn test_passeur_lookups() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        assert!(config.is_passeur(199_975_684_607_705_088));
        assert!(!config.is_passeur(42));
        assert_eq!(config.passeur_id("Iru"), Some(326_000_214_865_346_561));
        assert_eq!(config.passeur_id("Inconnu"), None);
    }

    #[test]
    fn test_sheet_refs() {
        let config: AppConfig = toml::from_str(sample_toml()).unwrap();
        let members = config.members_sheet();
        assert_eq!(members.spreadsheet_id, "members-spreadsheet");
        assert_eq!(members.sheet_name, "Sheet1");
    }

    #[test]
    fn test_missing_section_is_an_error() {
        let truncated = r#"
            guild_id = 1
            guild_name = "x"
        "#;
        assert!(toml::from_str::<AppConfig>(truncated).is_err());
    }
}

//! Shared helpers for the command layer: pricing arithmetic and embeds.

use crate::config::AppConfig;
use crate::models::{BossEntry, SuccessEntry};
use poise::serenity_prelude as serenity;

/// Sentinel in the kamas price column meaning the passeurs skip this success.
pub const PRICE_NOT_OFFERED: &str = "flemme";

/// Price multiplier for a member's role label. Unknown labels pay full price.
#[must_use]
pub fn reduction_for_role(role: &str, rates: &crate::config::ReductionsConfig) -> f64 {
    match role {
        "Nouveau (PDE)" => rates.nouveau,
        "Membre de guilde" => rates.normal,
        "Resident premium" | "Hauts gradés" | "Directeur" | "vieux des vieux" => rates.premium,
        _ => 1.0,
    }
}

/// Parses a kamas price as written in the sheet and applies the reduction.
///
/// The sheet uses a compact notation where the unit letter doubles as the
/// decimal separator: `"1m2"` reads as 1.2 × 100 000 and `"500k"` as
/// 500 × 1 000. Anything else (including the "flemme" sentinel) is `None`.
#[must_use]
pub fn parse_kamas_price(raw: &str, reduction: f64) -> Option<i64> {
    let base = if raw.contains('m') {
        raw.replace('m', ".").parse::<f64>().ok()? * 100_000.0
    } else if raw.contains('k') {
        raw.replace('k', ".").parse::<f64>().ok()? * 1_000.0
    } else {
        return None;
    };
    Some((base * reduction) as i64)
}

/// Ch'ton price with the reduction applied, truncated to a whole number.
#[must_use]
pub fn reduced_chton_price(raw: &str, reduction: f64) -> Option<i64> {
    let price: i64 = raw.trim().parse().ok()?;
    Some((price as f64 * reduction) as i64)
}

/// Formats a kamas amount with space thousands separators: `1 234 567`.
#[must_use]
pub fn format_kamas(amount: i64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    grouped
}

/// Both prices of a success, reduced for the member, one per line.
#[must_use]
pub fn success_price_lines(
    success: &SuccessEntry,
    reduction: f64,
    config: &AppConfig,
) -> String {
    if success.kamas_price == PRICE_NOT_OFFERED {
        return "Ce succès n'est pas effectué par nos passeurs.".to_string();
    }

    let mut lines = Vec::new();
    if let Some(chtons) = reduced_chton_price(&success.chton_price, reduction) {
        lines.push(format!(
            "**Prix du passage :** {chtons} Ch'tons {}",
            config.emotes.chton
        ));
    }
    if let Some(kamas) = parse_kamas_price(&success.kamas_price, reduction) {
        lines.push(format!(
            "**Prix alternatif :** {} Kamas {}",
            format_kamas(kamas),
            config.emotes.kamas
        ));
    }

    if lines.is_empty() {
        "Prix non renseigné.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Embed listing every success of a boss with the member's reduced prices.
#[must_use]
pub fn boss_embed(boss: &BossEntry, reduction: f64, config: &AppConfig) -> serenity::CreateEmbed {
    // "placeholder" marks bosses whose icon cell has not been filled in yet
    let title = if boss.icon.is_empty() || boss.icon == "placeholder" {
        format!("**__{}__**", boss.name)
    } else {
        format!("{} **__{}__**", boss.icon, boss.name)
    };
    let mut embed = serenity::CreateEmbed::new()
        .title(title)
        .colour(serenity::Colour::new(config.colors.success));

    // Discord caps embeds at 25 fields
    for success in boss.successes.iter().take(25) {
        embed = embed.field(
            format!("__{}__", success.name),
            success_price_lines(success, reduction, config),
            false,
        );
    }

    embed.footer(serenity::CreateEmbedFooter::new(
        "Utilise /demande pour créer une demande de passage, ou reformule \
         une commande /passage pour voir les succès d'autres boss.",
    ))
}

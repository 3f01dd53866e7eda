//! General commands: liveness, help and bot statistics.

use crate::bot::{Context, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::collections::BTreeMap;
use tracing::instrument;

/// Vérifie que le bot répond
#[poise::command(slash_command, category = "Général")]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Affiche l'aide pour les commandes disponibles
#[poise::command(slash_command, category = "Général")]
#[instrument(skip(ctx))]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Commande dont afficher l'aide"] commande: Option<String>,
) -> Result<(), Error> {
    let commands = &ctx.framework().options().commands;
    let color = serenity::Colour::new(ctx.data().config.colors.guildeux);

    let embed = if let Some(wanted) = commande {
        let Some(command) = commands.iter().find(|command| command.name == wanted) else {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("La commande `{wanted}` n'existe pas."))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        };
        serenity::CreateEmbed::new()
            .title(format!("Aide pour la commande `/{}`", command.name))
            .description(
                command
                    .description
                    .clone()
                    .unwrap_or_else(|| "Aucune description disponible".to_string()),
            )
            .colour(color)
    } else {
        let mut by_category: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for command in commands {
            if command.hide_in_help {
                continue;
            }
            let category = command
                .category
                .clone()
                .unwrap_or_else(|| "Sans catégorie".to_string());
            by_category
                .entry(category)
                .or_default()
                .push(format!("`/{}`", command.name));
        }

        let mut embed = serenity::CreateEmbed::new()
            .title("Liste des commandes disponibles")
            .description(
                "Utilisez `/help <commande>` pour obtenir plus d'informations \
                 sur une commande spécifique.",
            )
            .colour(color);
        for (category, mut names) in by_category {
            names.sort();
            embed = embed.field(category, names.join(", "), false);
        }
        embed
    };

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// Affiche des statistiques sur le bot
#[poise::command(slash_command, category = "Général")]
#[instrument(skip(ctx))]
pub async fn stats(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();

    let uptime = Utc::now() - data.started_at;
    let uptime_str = format!(
        "{}j {:02}h {:02}m",
        uptime.num_days(),
        uptime.num_hours() % 24,
        uptime.num_minutes() % 60
    );

    // Cache guards cannot be held across an await, so read everything first
    let (bot_name, guild_count, user_count) = {
        let cache = &ctx.serenity_context().cache;
        let guilds = cache.guilds();
        let user_count: u64 = guilds
            .iter()
            .filter_map(|id| cache.guild(*id).map(|guild| guild.member_count))
            .sum();
        (
            cache.current_user().name.clone(),
            guilds.len(),
            user_count,
        )
    };
    let command_count = ctx.framework().options().commands.len();

    let embed = serenity::CreateEmbed::new()
        .title("📊 Statistiques du Bot")
        .colour(serenity::Colour::new(data.config.colors.guildeux))
        .field("Nom du Bot", bot_name, true)
        .field("Version", env!("CARGO_PKG_VERSION"), true)
        .field("Temps de fonctionnement", uptime_str, true)
        .field("Serveurs", guild_count.to_string(), true)
        .field("Utilisateurs", user_count.to_string(), true)
        .field("Commandes", command_count.to_string(), true)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Bot démarré le {} UTC",
            data.started_at.format("%Y-%m-%d à %H:%M:%S")
        )));

    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

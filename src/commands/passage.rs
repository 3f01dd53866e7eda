//! Boss passage lookup and request commands.

use crate::bot::{Context, Error};
use crate::commands::utils;
use poise::serenity_prelude as serenity;
use serenity::Mentionable;
use tracing::{error, info, instrument};

/// Suggests boss names matching what the user has typed so far.
async fn boss_autocomplete(ctx: Context<'_>, partial: &str) -> Vec<String> {
    let names = ctx.data().manager.boss_names().await;
    let partial_lower = partial.to_lowercase();

    let mut matching: Vec<String> = names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial_lower))
        .take(25) // Discord autocomplete limit
        .collect();
    matching.sort();
    matching
}

/// Reduction multiplier for the invoking member, from their roster role.
async fn reduction_for(ctx: Context<'_>) -> f64 {
    let member_id = ctx.author().id.to_string();
    let role = ctx
        .data()
        .manager
        .get_member(&member_id)
        .await
        .map(|member| member.role().to_string())
        .unwrap_or_default();
    utils::reduction_for_role(&role, &ctx.data().config.reductions)
}

/// Affiche les informations sur un passage de boss
#[poise::command(slash_command, category = "Passages")]
#[instrument(skip(ctx))]
pub async fn passage(
    ctx: Context<'_>,
    #[description = "Nom du boss"]
    #[autocomplete = "boss_autocomplete"]
    boss: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let data = ctx.data();

    let Some(table) = data.manager.passages().await else {
        ctx.say("Les données sont encore en cours de chargement. Veuillez réessayer.")
            .await?;
        return Ok(());
    };

    let Some(entry) = table.find_boss(&boss) else {
        ctx.say(format!("Boss **{boss}** non trouvé ou sans succès."))
            .await?;
        return Ok(());
    };

    let reduction = reduction_for(ctx).await;
    let embed = utils::boss_embed(entry, reduction, &data.config);
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    info!("{} looked up passage prices for {}", ctx.author().name, entry.name);
    Ok(())
}

/// Crée une demande de passage dans le forum
#[poise::command(slash_command, category = "Passages")]
#[instrument(skip(ctx))]
pub async fn demande(
    ctx: Context<'_>,
    #[description = "Nom du boss"]
    #[autocomplete = "boss_autocomplete"]
    boss: String,
    #[description = "Nom du succès"] succes: String,
) -> Result<(), Error> {
    ctx.defer_ephemeral().await?;
    let data = ctx.data();

    let Some(table) = data.manager.passages().await else {
        ctx.say("Les données sont encore en cours de chargement. Veuillez réessayer.")
            .await?;
        return Ok(());
    };
    let Some(entry) = table.find_boss(&boss) else {
        ctx.say(format!("Boss **{boss}** non trouvé ou sans succès."))
            .await?;
        return Ok(());
    };
    let Some(success) = entry.find_success(&succes) else {
        ctx.say(format!(
            "Succès **{succes}** inconnu pour **{}**. Utilise /passage pour voir la liste.",
            entry.name
        ))
        .await?;
        return Ok(());
    };

    let pseudo = match ctx.author_member().await {
        Some(member) => member.display_name().to_string(),
        None => ctx.author().name.clone(),
    };
    let post_title = format!("[Demande] {} - {} ({pseudo})", entry.name, success.name);

    let mut content = format!(
        "# Demande de passage\n\n\
         **Demandeur:** {}\n\
         **Boss:** {}\n\
         **Succès:** {}\n\n\
         ## Prix\n\
         **Prix standard:** {} Kamas\n",
        ctx.author().mention(),
        entry.name,
        success.name,
        success.kamas_price
    );
    if success.chton_price.is_empty() {
        content.push('\n');
    } else {
        content.push_str(&format!("**Alternative:** {} Ch'tons\n\n", success.chton_price));
    }
    content.push_str("## Passeurs\n");
    for passeur in success.passeur_list() {
        if let Some(id) = data.config.passeur_id(passeur) {
            content.push_str(&format!("<@{id}> "));
        }
    }
    content.push_str("\n\n*Merci de préciser vos disponibilités ci-dessous.*");

    let forum = serenity::ChannelId::new(data.config.channels.passage_forum);
    let post = forum
        .create_forum_post(
            ctx,
            serenity::CreateForumPost::new(
                post_title,
                serenity::CreateMessage::new().content(content),
            ),
        )
        .await;

    match post {
        Ok(thread) => {
            let guild_id = ctx.guild_id().map_or(0, serenity::GuildId::get);
            ctx.say(format!(
                "✅ Demande créée avec succès!\n\
                 [Clique ici pour accéder à ta demande](https://discord.com/channels/{guild_id}/{})",
                thread.id
            ))
            .await?;
            info!(
                "{} opened a passage request for {} - {}",
                ctx.author().name,
                entry.name,
                success.name
            );
        }
        Err(e) => {
            error!("Failed to create forum post: {e}");
            ctx.say("Je n'ai pas pu créer le post dans le forum. Contacte un administrateur.")
                .await?;
        }
    }
    Ok(())
}

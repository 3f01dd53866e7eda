//! Thread management commands for the passage forum.

use crate::bot::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::{error, info, instrument};

/// Ferme le thread en cours
#[poise::command(slash_command, category = "Forum")]
#[instrument(skip(ctx))]
pub async fn fermer(ctx: Context<'_>) -> Result<(), Error> {
    let channel = ctx
        .channel_id()
        .to_channel(ctx)
        .await
        .ok()
        .and_then(serenity::Channel::guild);
    let Some(thread) = channel.filter(|channel| {
        matches!(
            channel.kind,
            serenity::ChannelType::PublicThread | serenity::ChannelType::PrivateThread
        )
    }) else {
        ctx.send(
            poise::CreateReply::default()
                .content("Cette commande ne peut être utilisée que dans un thread.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    let author = ctx.author();
    let is_creator = thread.owner_id == Some(author.id);
    let is_passeur = ctx.data().config.is_passeur(author.id.get());
    // Interaction payloads carry the member's computed permissions
    let permissions = ctx
        .author_member()
        .await
        .and_then(|member| member.permissions)
        .unwrap_or_default();
    let has_permissions = permissions.manage_threads() || permissions.administrator();

    if !(is_creator || is_passeur || has_permissions) {
        ctx.send(
            poise::CreateReply::default()
                .content("Tu n'as pas la permission de fermer ce thread.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    let display_name = match ctx.author_member().await {
        Some(member) => member.display_name().to_string(),
        None => author.name.clone(),
    };

    // Visible to everyone in the thread, unlike the refusals above
    ctx.say("🔒 Ce thread va être archivé dans quelques secondes...")
        .await?;
    thread
        .id
        .send_message(
            ctx,
            serenity::CreateMessage::new().content(format!(
                "🔒 **Thread fermé par {display_name}**\n\
                 Ce sujet a été archivé et ne peut plus recevoir de nouveaux messages."
            )),
        )
        .await?;

    if let Err(e) = thread.id.delete(ctx).await {
        error!("Failed to delete thread {} ({}): {e}", thread.name, thread.id);
        ctx.send(
            poise::CreateReply::default()
                .content("Je n'ai pas la permission d'archiver ce thread.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    info!(
        "Thread {} ({}) closed by {display_name}",
        thread.name, thread.id
    );
    Ok(())
}

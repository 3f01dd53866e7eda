//! Ch'ton currency commands.

use crate::bot::{Context, Error};
use crate::data::TransferOutcome;
use poise::serenity_prelude as serenity;
use serenity::Mentionable;
use tracing::{info, instrument, warn};

/// Input validation failures, answered before any state is touched.
#[derive(Debug, PartialEq, Eq)]
enum TransferRejection {
    NonPositiveAmount,
    SelfTransfer,
}

fn check_transfer_args(
    giver: serenity::UserId,
    receiver: serenity::UserId,
    amount: i64,
) -> Option<TransferRejection> {
    if amount <= 0 {
        return Some(TransferRejection::NonPositiveAmount);
    }
    if giver == receiver {
        return Some(TransferRejection::SelfTransfer);
    }
    None
}

/// Affiche ton nombre de Ch'tons
#[poise::command(slash_command, category = "Ch'tons")]
#[instrument(skip(ctx))]
pub async fn meschtons(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let member_id = ctx.author().id.to_string();

    // A member without a roster row simply has no Ch'tons yet
    let chtons = data
        .manager
        .get_member(&member_id)
        .await
        .map_or(0, |member| member.chtons());

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "Tu as **{chtons} Ch'tons** {} !",
                data.config.emotes.chton
            ))
            .ephemeral(true),
    )
    .await?;
    info!(
        "{} asked for their balance: {} Ch'tons",
        ctx.author().name,
        chtons
    );
    Ok(())
}

/// Transfère des Ch'tons de toi à un autre utilisateur
#[poise::command(slash_command, category = "Ch'tons")]
#[instrument(skip(ctx))]
pub async fn give(
    ctx: Context<'_>,
    #[description = "L'utilisateur à qui donner des Ch'tons"] user: serenity::User,
    #[description = "Le nombre de Ch'tons à donner"] amount: i64,
) -> Result<(), Error> {
    // Defer right away: two spreadsheet round trips can outlast the
    // interaction token's 3-second window
    ctx.defer_ephemeral().await?;

    let data = ctx.data();
    let chton = &data.config.emotes.chton;

    match check_transfer_args(ctx.author().id, user.id, amount) {
        Some(TransferRejection::NonPositiveAmount) => {
            ctx.say(format!(
                "Ton montant de Ch'tons {chton} doit être supérieur à 0."
            ))
            .await?;
            warn!(
                "{} tried to give a non-positive amount of Ch'tons",
                ctx.author().name
            );
            return Ok(());
        }
        Some(TransferRejection::SelfTransfer) => {
            ctx.say(format!(
                "Petit malin va, tu ne peux pas te donner des Ch'tons {chton} à toi-même !"
            ))
            .await?;
            warn!("{} tried to give Ch'tons to themselves", ctx.author().name);
            return Ok(());
        }
        None => {}
    }

    let giver_id = ctx.author().id.to_string();
    let receiver_id = user.id.to_string();
    let receiver_nickname = user
        .global_name
        .clone()
        .unwrap_or_else(|| user.name.clone());

    match data
        .manager
        .transfer_chtons(&giver_id, &receiver_id, &receiver_nickname, amount)
        .await
    {
        Some(TransferOutcome::Completed { .. }) => {
            ctx.say(format!(
                "Tu as donné **{amount} Ch'tons** {chton} à {} !",
                user.mention()
            ))
            .await?;

            let giver_name = match ctx.author_member().await {
                Some(member) => member.display_name().to_string(),
                None => ctx.author().name.clone(),
            };
            let dm = serenity::CreateMessage::new().content(format!(
                "Tu as reçu **{amount} Ch'tons** {chton} de la part de {giver_name} !"
            ));
            // Closed DMs must not fail the transfer
            if let Err(e) = user.dm(ctx, dm).await {
                warn!("Could not DM {} about the transfer: {e}", user.name);
            }
            info!(
                "{} gave {amount} Ch'tons to {}",
                ctx.author().name,
                user.name
            );
        }
        Some(TransferOutcome::InsufficientFunds { .. }) => {
            ctx.say(format!("Tu n'as pas assez de Ch'tons {chton}")).await?;
            warn!(
                "{} tried to give more Ch'tons than they have",
                ctx.author().name
            );
        }
        None => {
            ctx.say("Une erreur s'est produite lors du transfert. Réessaie plus tard.")
                .await?;
        }
    }
    Ok(())
}

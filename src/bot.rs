use crate::config::AppConfig;
use crate::data::DataManager;
use crate::models::MemberRecord;
use crate::{commands, errors, tasks};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serenity::Mentionable;
use std::sync::Arc;
use tracing::{error, info, instrument};

// User data, which is stored and accessible in all command invocations
pub struct Data {
    pub config: Arc<AppConfig>,
    pub manager: Arc<DataManager>,
    pub started_at: DateTime<Utc>,
}

// Type aliases for the error and context types Poise will use
pub(crate) type Error = errors::Error;
pub(crate) type Context<'a> = poise::Context<'a, Data, Error>;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            panic!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                "Error in command `{}` (user: {}, channel: {}): {:?}",
                ctx.command().name,
                ctx.author().name,
                ctx.channel_id(),
                error
            );
            if let Err(e) = ctx
                .say("Une erreur s'est produite lors de l'exécution de cette commande.")
                .await
            {
                tracing::error!("Failed to send error message: {}", e);
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("Connected to the gateway as {}", data_about_bot.user.name);
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            handle_member_join(ctx, data, new_member).await;
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            handle_member_removal(data, *guild_id, user).await;
        }
        serenity::FullEvent::Message { new_message } => {
            handle_presentation_relay(ctx, data, new_message).await;
        }
        _ => {}
    }
    Ok(())
}

/// Adds a joining member to the roster and greets them. Failures are logged
/// only; a gateway event has nobody to answer to.
async fn handle_member_join(ctx: &serenity::Context, data: &Data, member: &serenity::Member) {
    if member.guild_id.get() != data.config.guild_id {
        return;
    }
    info!("New member joined: {} ({})", member.user.name, member.user.id);

    let member_id = member.user.id.to_string();
    if let Some(existing) = data.manager.get_member(&member_id).await {
        info!(
            "Member {} already in the roster as {}",
            member.user.name,
            existing.nickname()
        );
        return;
    }

    let record = MemberRecord::new(member_id, member.display_name(), "Membre");
    if !data.manager.save_member(record).await {
        error!("Failed to add {} to the roster", member.user.name);
        return;
    }
    info!("Added {} to the roster", member.user.name);

    let welcome = serenity::ChannelId::new(data.config.channels.welcome);
    let greeting = format!(
        "Hello {} ! Bienvenue à **{}** !",
        member.mention(),
        data.config.guild_name
    );
    if let Err(e) = welcome
        .send_message(&ctx.http, serenity::CreateMessage::new().content(greeting))
        .await
    {
        error!("Failed to send welcome message: {e}");
    }
}

async fn handle_member_removal(data: &Data, guild_id: serenity::GuildId, user: &serenity::User) {
    if guild_id.get() != data.config.guild_id {
        return;
    }
    info!("Member left: {} ({})", user.name, user.id);

    if data.manager.delete_member(&user.id.to_string()).await {
        info!("Member {} removed from the roster", user.name);
    } else {
        error!("Failed to remove {} from the roster", user.name);
    }
}

/// Re-posts a presentation as an author-attributed embed in the showcase
/// channel.
async fn handle_presentation_relay(
    ctx: &serenity::Context,
    data: &Data,
    message: &serenity::Message,
) {
    if message.author.bot || message.channel_id.get() != data.config.channels.presentations {
        return;
    }

    let mut embed = serenity::CreateEmbed::new()
        .author(
            serenity::CreateEmbedAuthor::new(message.author.display_name())
                .icon_url(message.author.face()),
        )
        .description(message.content.clone())
        .colour(serenity::Colour::new(data.config.colors.guildeux))
        .footer(serenity::CreateEmbedFooter::new(
            "Guildeux Bot | Présentations",
        ));
    if let Some(attachment) = message.attachments.first() {
        embed = embed.image(attachment.url.clone());
    }

    let showcase = serenity::ChannelId::new(data.config.channels.showcase);
    match showcase
        .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
        .await
    {
        Ok(_) => info!("Relayed presentation from {}", message.author.name),
        Err(e) => error!(
            "Failed to relay presentation from {}: {e}",
            message.author.name
        ),
    }
}

#[instrument(skip(token, config, manager))]
pub async fn run_bot(
    token: String,
    config: Arc<AppConfig>,
    manager: Arc<DataManager>,
) -> Result<(), serenity::Error> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::coins::meschtons(),
                commands::coins::give(),
                commands::passage::passage(),
                commands::passage::demande(),
                commands::forum::fermer(),
                commands::general::ping(),
                commands::general::help(),
                commands::general::stats(),
            ],
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup({
            let config = Arc::clone(&config);
            let manager = Arc::clone(&manager);
            move |ctx, ready, framework| {
                Box::pin(async move {
                    info!("Logged in as {}", ready.user.name);
                    info!("Registering commands globally...");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    // Periodic resynchronization runs on its own timer, never
                    // inline from a request path
                    tasks::spawn_background_refresh(
                        ctx.clone(),
                        Arc::clone(&config),
                        Arc::clone(&manager),
                    );

                    Ok(Data {
                        config,
                        manager,
                        started_at: Utc::now(),
                    })
                })
            }
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await;

    match client {
        Ok(mut c) => {
            info!("Starting bot client...");
            if let Err(why) = c.start().await {
                tracing::error!("Client error: {:?}", why);
                return Err(why);
            }
        }
        Err(e) => {
            tracing::error!("Error creating client: {:?}", e);
            return Err(e);
        }
    }
    Ok(())
}

//! Periodic background resynchronization.
//!
//! One spawned worker re-pulls the passage pricing table and reconciles the
//! member roster against the live guild on a fixed interval. All writes go
//! through the `DataManager`, so they take the same per-member locks and
//! cache invalidation as the request handlers.

use crate::config::AppConfig;
use crate::data::DataManager;
use crate::models::{
    COL_MEMBER_ID, COL_NICKNAME, COL_ROLE, HEADER_MEMBER_ID, HEADER_NICKNAME, HEADER_ROLE,
    resolve_column,
};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

/// Spawns the refresh worker. The first pass runs right away (the roster may
/// have drifted while the bot was offline), then once per configured
/// interval.
pub fn spawn_background_refresh(
    ctx: serenity::Context,
    config: Arc<AppConfig>,
    manager: Arc<DataManager>,
) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.refresh_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            if !manager.load_passages(true).await {
                warn!("Scheduled passage data reload failed; keeping previous table");
            }
            sync_member_roster(&ctx, &config, &manager).await;
        }
    });
}

/// Writes back nickname and top-role drift between the roster sheet and the
/// live guild. Rows that fail individually are logged and skipped; one bad
/// row must not starve the rest.
#[instrument(skip_all)]
async fn sync_member_roster(
    ctx: &serenity::Context,
    config: &AppConfig,
    manager: &DataManager,
) {
    info!("Synchronizing member roster...");

    let Some(rows) = manager.read_member_rows().await else {
        return;
    };
    if rows.len() < 2 {
        warn!("Member roster has no data rows");
        return;
    }

    let headers = &rows[0];
    let id_col = resolve_column(headers, HEADER_MEMBER_ID, COL_MEMBER_ID);
    let pseudo_col = resolve_column(headers, HEADER_NICKNAME, COL_NICKNAME);
    let role_col = resolve_column(headers, HEADER_ROLE, COL_ROLE);

    let guild_id = serenity::GuildId::new(config.guild_id);
    let members = match guild_id.members(&ctx.http, None, None).await {
        Ok(members) => members,
        Err(e) => {
            error!("Failed to list guild members: {e}");
            return;
        }
    };
    let roles = match guild_id.roles(&ctx.http).await {
        Ok(roles) => roles,
        Err(e) => {
            error!("Failed to list guild roles: {e}");
            return;
        }
    };
    let by_id: HashMap<u64, &serenity::Member> = members
        .iter()
        .map(|member| (member.user.id.get(), member))
        .collect();

    let mut update_count = 0usize;
    for row in rows.iter().skip(1) {
        let discord_id = row.get(id_col).map(|cell| cell.trim()).unwrap_or("");
        if discord_id.is_empty() {
            continue;
        }
        let Ok(id_number) = discord_id.parse::<u64>() else {
            error!("Invalid Discord id in roster: {discord_id}");
            continue;
        };
        let Some(member) = by_id.get(&id_number) else {
            // In the sheet but not in the guild; the removal event owns that
            continue;
        };

        let current_nickname = member.display_name().to_string();
        let current_role = top_role_name(member, &roles);
        let stored_nickname = row.get(pseudo_col).cloned().unwrap_or_default();
        let stored_role = row.get(role_col).cloned().unwrap_or_default();
        if current_nickname == stored_nickname && current_role == stored_role {
            continue;
        }

        let needed_len = id_col.max(pseudo_col).max(role_col) + 1;
        let mut updated = row.clone();
        if updated.len() < needed_len {
            updated.resize(needed_len, String::new());
        }
        updated[pseudo_col] = current_nickname.clone();
        updated[role_col] = current_role;

        if manager.update_roster_row(id_col, discord_id, updated).await {
            update_count += 1;
            info!("Updated roster row for {current_nickname} ({discord_id})");
        }
    }

    if update_count > 0 {
        info!("{update_count} roster rows updated");
    } else {
        info!("Roster already up to date");
    }
}

/// Name of the member's highest-positioned role, "Membre" when they have
/// none beyond @everyone.
fn top_role_name(
    member: &serenity::Member,
    roles: &HashMap<serenity::RoleId, serenity::Role>,
) -> String {
    member
        .roles
        .iter()
        .filter_map(|id| roles.get(id))
        .max_by_key(|role| role.position)
        .map_or_else(|| "Membre".to_string(), |role| role.name.clone())
}

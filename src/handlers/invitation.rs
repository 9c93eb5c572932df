//! Group invitations: the admin invites, the invitee answers.

use super::Context;
use super::group::{ensure_admin, find_group};
use crate::db::NewNotification;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::{Decision, GroupUserTarget, InvitationResponse, RequestStatus, ServerMessage};
use serde_json::json;

pub async fn invite(ctx: &Context, p: GroupUserTarget) -> HandlerResult {
    let invitee = p.recipient_id.as_str();
    ctx.ensure_not_self(invitee, "invite")?;

    let group = find_group(ctx, &p.group_id).await?;
    ensure_admin(ctx, &group)?;
    if !ctx.db.users().exists(invitee).await? {
        return Err(HandlerError::UserNotFound);
    }

    let groups = ctx.db.groups();
    if groups.is_member(&group.id, invitee).await? {
        return Err(HandlerError::AlreadyMember);
    }
    if groups.invitation_status(&group.id, invitee).await? == Some(RequestStatus::Pending) {
        return Err(HandlerError::InvitationAlreadySent);
    }

    let actor = ctx.actor().await?;
    groups.invite(&group.id, &ctx.user_id, invitee).await?;
    let notification_id = ctx
        .db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: invitee,
            group_id: Some(&group.id),
            kind: "group_invitation",
            message: format!("{} invited you to join {}", actor.nickname, group.title),
            entity_id: Some(&group.id),
            entity_type: Some("group"),
        })
        .await?;

    ctx.hub.notify(
        invitee,
        &ServerMessage::action(
            "group_invitation",
            Some(actor),
            json!({
                "group_id": group.id,
                "group_title": group.title,
                "notification_id": notification_id,
            }),
        ),
    );
    ctx.success("invitation sent");
    Ok(())
}

/// The invitee accepts or declines. Accepting makes them a member at once.
pub async fn respond(ctx: &Context, p: InvitationResponse) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    if ctx.db.groups().is_member(&group.id, &ctx.user_id).await? {
        return Err(HandlerError::AlreadyMember);
    }

    let inviter = ctx
        .db
        .groups()
        .answer_invitation(&group.id, &ctx.user_id, p.status)
        .await?
        .ok_or(HandlerError::NoPendingInvitation)?;

    if p.status == Decision::Declined {
        ctx.success("invitation declined");
        return Ok(());
    }

    let actor = ctx.actor().await?;
    ctx.db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: &inviter,
            group_id: Some(&group.id),
            kind: "group_join_success",
            message: format!("{} joined {}", actor.nickname, group.title),
            entity_id: Some(&group.id),
            entity_type: Some("group"),
        })
        .await?;

    ctx.join_live_group(&ctx.user_id, &group.id).await;
    ctx.hub.notify(
        &inviter,
        &ServerMessage::info(
            "group_join_success",
            Some(actor),
            json!({ "group_id": group.id, "group_title": group.title }),
        ),
    );
    ctx.success(format!("joined {}", group.title));
    Ok(())
}

pub async fn cancel(ctx: &Context, p: GroupUserTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    ensure_admin(ctx, &group)?;

    let invitee = p.recipient_id.as_str();
    if !ctx.db.groups().cancel_invitation(&group.id, invitee).await? {
        return Err(HandlerError::NoPendingInvitation);
    }
    ctx.db
        .notifications()
        .retract_unread(&ctx.user_id, invitee, "group_invitation", Some(&group.id))
        .await?;
    ctx.success("invitation cancelled");
    Ok(())
}

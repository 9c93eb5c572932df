//! Follow graph handlers.
//!
//! A follow edge runs from follower to followed user. Following a public profile
//! is accepted immediately; a private profile gets a pending request that the
//! owner answers. A request can be sent again only after it was declined.

use super::Context;
use crate::db::NewNotification;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::{Decision, FollowResponse, RequestStatus, ServerMessage, UserTarget};
use serde_json::json;

pub async fn request(ctx: &Context, p: UserTarget) -> HandlerResult {
    let target = p.recipient_id.as_str();
    ctx.ensure_not_self(target, "follow")?;

    let is_public = ctx
        .db
        .users()
        .is_public(target)
        .await?
        .ok_or(HandlerError::UserNotFound)?;

    match ctx.db.follows().status(&ctx.user_id, target).await? {
        Some(RequestStatus::Pending) => return Err(HandlerError::RequestAlreadySent),
        Some(RequestStatus::Accepted) => return Err(HandlerError::AlreadyFollowing),
        Some(RequestStatus::Declined) | None => {}
    }

    let actor = ctx.actor().await?;
    let (status, kind, message) = if is_public {
        (
            RequestStatus::Accepted,
            "new_follower",
            format!("{} started following you", actor.nickname),
        )
    } else {
        (
            RequestStatus::Pending,
            "follow_request",
            format!("{} wants to follow you", actor.nickname),
        )
    };

    ctx.db.follows().upsert(&ctx.user_id, target, status).await?;
    let notification_id = ctx
        .db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: target,
            group_id: None,
            kind,
            message,
            entity_id: Some(&ctx.user_id),
            entity_type: Some("user"),
        })
        .await?;

    let data = json!({ "follower_id": ctx.user_id, "notification_id": notification_id });
    if is_public {
        ctx.hub.notify(target, &ServerMessage::info(kind, Some(actor), data));
        ctx.success("now following");
    } else {
        ctx.hub.notify(target, &ServerMessage::action(kind, Some(actor), data));
        ctx.success("follow request sent");
    }
    Ok(())
}

/// The followed user answers a pending request from `recipient_id`.
pub async fn respond(ctx: &Context, p: FollowResponse) -> HandlerResult {
    let requester = p.recipient_id.as_str();
    ctx.ensure_not_self(requester, "answer")?;

    let answered = ctx
        .db
        .follows()
        .transition(
            requester,
            &ctx.user_id,
            RequestStatus::Pending,
            p.status.as_status(),
        )
        .await?;
    if !answered {
        return Err(HandlerError::NoPendingRequest);
    }

    let actor = ctx.actor().await?;
    let (kind, message) = match p.status {
        Decision::Accepted => (
            "follow_accepted",
            format!("{} accepted your follow request", actor.nickname),
        ),
        Decision::Declined => (
            "follow_declined",
            format!("{} declined your follow request", actor.nickname),
        ),
    };

    ctx.db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: requester,
            group_id: None,
            kind,
            message,
            entity_id: Some(&ctx.user_id),
            entity_type: Some("user"),
        })
        .await?;

    ctx.hub.notify(
        requester,
        &ServerMessage::info(kind, Some(actor), json!({ "user_id": ctx.user_id })),
    );
    ctx.success(format!("follow request {}", p.status.as_status().as_str()));
    Ok(())
}

/// Withdraw a pending request and the unread notification that announced it.
pub async fn cancel(ctx: &Context, p: UserTarget) -> HandlerResult {
    let target = p.recipient_id.as_str();
    ctx.ensure_not_self(target, "cancel a follow request to")?;

    let removed = ctx
        .db
        .follows()
        .delete(&ctx.user_id, target, RequestStatus::Pending)
        .await?;
    if !removed {
        return Err(HandlerError::NoPendingRequest);
    }
    ctx.db
        .notifications()
        .retract_unread(&ctx.user_id, target, "follow_request", Some(&ctx.user_id))
        .await?;

    let actor = ctx.actor().await?;
    ctx.hub.notify(
        target,
        &ServerMessage::info(
            "follow_request_cancelled",
            Some(actor),
            json!({ "follower_id": ctx.user_id }),
        ),
    );
    ctx.success("follow request cancelled");
    Ok(())
}

pub async fn unfollow(ctx: &Context, p: UserTarget) -> HandlerResult {
    let target = p.recipient_id.as_str();
    ctx.ensure_not_self(target, "unfollow")?;

    let removed = ctx
        .db
        .follows()
        .delete(&ctx.user_id, target, RequestStatus::Accepted)
        .await?;
    if !removed {
        return Err(HandlerError::NotFollowing);
    }
    ctx.success("unfollowed");
    Ok(())
}

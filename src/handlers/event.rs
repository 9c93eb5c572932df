//! Group events and RSVPs.

use super::Context;
use super::group::{ensure_member, find_group};
use crate::db::{GroupRecord, NewNotification};
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::{EventRsvp, GroupEventCreate, ServerMessage, escape_html};
use chrono::SecondsFormat;
use serde_json::json;

async fn resolve_group(ctx: &Context, p: &GroupEventCreate) -> Result<GroupRecord, HandlerError> {
    if let Some(id) = p.group_id.as_deref().filter(|id| !id.is_empty()) {
        return find_group(ctx, id).await;
    }
    let title = p
        .group_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(HandlerError::MissingField("group_id"))?;
    ctx.db
        .groups()
        .find_by_title(title)
        .await?
        .ok_or(HandlerError::GroupNotFound)
}

/// Create an event and tell every other member.
///
/// Retries with the same title and time are rejected, and each member gets at
/// most one notification per event.
pub async fn create(ctx: &Context, p: GroupEventCreate) -> HandlerResult {
    let group = resolve_group(ctx, &p).await?;
    ensure_member(ctx, &group.id).await?;

    let title = p.title.trim();
    if title.is_empty() {
        return Err(HandlerError::MissingField("title"));
    }
    let when = p.event_time.ok_or(HandlerError::MissingField("event_time"))?;

    let title = escape_html(title);
    let events = ctx.db.events();
    if events
        .exists_identical(&group.id, &ctx.user_id, &title, when.timestamp())
        .await?
    {
        return Err(HandlerError::DuplicateEvent);
    }

    let event = events
        .create(
            &group.id,
            &ctx.user_id,
            &title,
            &escape_html(p.description.trim()),
            &escape_html(p.location.trim()),
            when.timestamp(),
        )
        .await?;

    let actor = ctx.actor().await?;
    let notifications = ctx.db.notifications();
    for member in ctx.db.groups().members(&group.id).await? {
        if member == ctx.user_id {
            continue;
        }
        notifications
            .insert_unique(&NewNotification {
                actor_id: &ctx.user_id,
                recipient_id: &member,
                group_id: Some(&group.id),
                kind: "group_event",
                message: format!("New event in {}: {}", group.title, event.title),
                entity_id: Some(&event.id),
                entity_type: Some("event"),
            })
            .await?;
    }

    let data = json!({
        "event_id": event.id,
        "group_id": group.id,
        "group_title": group.title,
        "title": event.title,
        "description": event.description,
        "location": event.location,
        "event_time": when.to_rfc3339_opts(SecondsFormat::Secs, true),
        "creator_id": ctx.user_id,
    });
    ctx.hub.notify_group(
        &group.id,
        &ServerMessage::info("group_event", Some(actor), data),
        Some(&ctx.user_id),
    );
    ctx.success("event created");
    Ok(())
}

pub async fn rsvp(ctx: &Context, p: EventRsvp) -> HandlerResult {
    let event = ctx
        .db
        .events()
        .find(&p.event_id)
        .await?
        .ok_or(HandlerError::EventNotFound)?;
    ensure_member(ctx, &event.group_id).await?;

    ctx.db
        .events()
        .set_attendance(&event.id, &ctx.user_id, p.status)
        .await?;

    if event.creator_id != ctx.user_id {
        let actor = ctx.actor().await?;
        ctx.db
            .notifications()
            .insert_unique(&NewNotification {
                actor_id: &ctx.user_id,
                recipient_id: &event.creator_id,
                group_id: Some(&event.group_id),
                kind: "event_rsvp",
                message: format!("{} answered your event {}", actor.nickname, event.title),
                entity_id: Some(&event.id),
                entity_type: Some("event"),
            })
            .await?;
        ctx.hub.notify(
            &event.creator_id,
            &ServerMessage::info(
                "event_rsvp",
                Some(actor),
                json!({
                    "event_id": event.id,
                    "user_id": ctx.user_id,
                    "status": p.status.as_str(),
                }),
            ),
        );
    }
    ctx.success("rsvp recorded");
    Ok(())
}

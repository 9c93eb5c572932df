//! Private and group chat handlers.
//!
//! Message bodies are HTML-escaped before they are stored, so history and live
//! echoes carry the same text.

use super::Context;
use super::group::{ensure_member, find_group};
use crate::db::NewNotification;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::{
    GroupMessageRecord, GroupMessageSend, GroupTarget, PrivateMessageRecord, PrivateMessageSend,
    ServerMessage, UserTarget, escape_html,
};
use serde_json::{Value, json};

fn private_json(record: &PrivateMessageRecord) -> Value {
    json!({
        "id": record.id,
        "sender_id": record.sender_id,
        "recipient_id": record.recipient_id,
        "message": record.message,
        "created_at": record.created_at,
    })
}

fn group_json(record: &GroupMessageRecord) -> Value {
    json!({
        "id": record.id,
        "group_id": record.group_id,
        "sender_id": record.sender_id,
        "sender_nickname": record.sender_nickname,
        "message": record.message,
        "created_at": record.created_at,
    })
}

fn body(raw: &str) -> Result<String, HandlerError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(HandlerError::EmptyMessage);
    }
    Ok(escape_html(trimmed))
}

async fn ensure_user(ctx: &Context, user_id: &str) -> HandlerResult {
    if !ctx.db.users().exists(user_id).await? {
        return Err(HandlerError::UserNotFound);
    }
    Ok(())
}

pub async fn private_message(ctx: &Context, p: PrivateMessageSend) -> HandlerResult {
    let text = body(&p.message)?;
    let recipient = p.recipient_id.as_str();
    ctx.ensure_not_self(recipient, "message")?;
    ensure_user(ctx, recipient).await?;

    let actor = ctx.actor().await?;
    let record = ctx
        .db
        .messages()
        .insert_private(&ctx.user_id, recipient, &text)
        .await?;
    ctx.db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: recipient,
            group_id: None,
            kind: "private_message",
            message: format!("New message from {}", actor.nickname),
            entity_id: Some(&record.id),
            entity_type: Some("private_message"),
        })
        .await?;

    let data = private_json(&record);
    ctx.hub.notify(
        recipient,
        &ServerMessage::action("private_message", Some(actor), data.clone()),
    );
    ctx.reply(&ServerMessage::info("message_sent", None, data));
    Ok(())
}

pub async fn load_private(ctx: &Context, p: UserTarget) -> HandlerResult {
    ensure_user(ctx, &p.recipient_id).await?;
    let data = ctx
        .db
        .messages()
        .private_history(&ctx.user_id, &p.recipient_id)
        .await?;
    ctx.reply(&ServerMessage::PrivateMessages { data });
    Ok(())
}

/// Mark everything `recipient_id` sent us as read and tell them.
pub async fn mark_private_read(ctx: &Context, p: UserTarget) -> HandlerResult {
    let other = p.recipient_id.as_str();
    let count = ctx.db.messages().mark_private_read(&ctx.user_id, other).await?;
    if count > 0 {
        ctx.hub.notify(
            other,
            &ServerMessage::info(
                "messages_read",
                None,
                json!({ "reader_id": ctx.user_id, "count": count }),
            ),
        );
    }
    ctx.success("messages marked as read");
    Ok(())
}

pub async fn group_message(ctx: &Context, p: GroupMessageSend) -> HandlerResult {
    let text = body(&p.message)?;
    let group = find_group(ctx, &p.group_id).await?;
    ensure_member(ctx, &group.id).await?;

    let actor = ctx.actor().await?;
    let record = ctx
        .db
        .messages()
        .insert_group(&group.id, &ctx.user_id, &text)
        .await?;

    let data = group_json(&record);
    ctx.hub.notify_group(
        &group.id,
        &ServerMessage::action("group_message", Some(actor), data.clone()),
        Some(&ctx.user_id),
    );
    ctx.reply(&ServerMessage::info("message_sent", None, data));
    Ok(())
}

pub async fn load_group(ctx: &Context, p: GroupTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    ensure_member(ctx, &group.id).await?;
    let data = ctx.db.messages().group_history(&group.id).await?;
    ctx.reply(&ServerMessage::GroupMessages { data });
    Ok(())
}

pub async fn mark_group_read(ctx: &Context, p: GroupTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    ensure_member(ctx, &group.id).await?;
    ctx.db.messages().mark_group_read(&group.id, &ctx.user_id).await?;
    ctx.success("group messages marked as read");
    Ok(())
}

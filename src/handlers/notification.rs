//! Notification read/delete handlers.

use super::Context;
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::NotificationTarget;

pub async fn mark_read(ctx: &Context, p: NotificationTarget) -> HandlerResult {
    if !ctx
        .db
        .notifications()
        .mark_read(&p.notification_id, &ctx.user_id)
        .await?
    {
        return Err(HandlerError::NotificationNotFound);
    }
    ctx.success("notification marked as read");
    Ok(())
}

pub async fn delete(ctx: &Context, p: NotificationTarget) -> HandlerResult {
    if !ctx
        .db
        .notifications()
        .delete(&p.notification_id, &ctx.user_id)
        .await?
    {
        return Err(HandlerError::NotificationNotFound);
    }
    ctx.success("notification deleted");
    Ok(())
}

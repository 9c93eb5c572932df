//! Group membership handlers: join requests and leaving.

use super::Context;
use crate::db::{GroupRecord, NewNotification};
use crate::error::{HandlerError, HandlerResult};
use crate::protocol::{Decision, GroupJoinResponse, GroupTarget, RequestStatus, ServerMessage};
use serde_json::json;

/// Look a group up by id.
pub(super) async fn find_group(ctx: &Context, group_id: &str) -> Result<GroupRecord, HandlerError> {
    ctx.db
        .groups()
        .find(group_id)
        .await?
        .ok_or(HandlerError::GroupNotFound)
}

/// Fails unless the sender administers `group`.
pub(super) fn ensure_admin(ctx: &Context, group: &GroupRecord) -> HandlerResult {
    if group.admin_id != ctx.user_id {
        return Err(HandlerError::NotAdmin);
    }
    Ok(())
}

pub(super) async fn ensure_member(ctx: &Context, group_id: &str) -> HandlerResult {
    if !ctx.db.groups().is_member(group_id, &ctx.user_id).await? {
        return Err(HandlerError::NotMember);
    }
    Ok(())
}

pub async fn join_request(ctx: &Context, p: GroupTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    if group.admin_id == ctx.user_id {
        return Err(HandlerError::AdminForbidden);
    }

    let groups = ctx.db.groups();
    if groups.is_member(&group.id, &ctx.user_id).await? {
        return Err(HandlerError::AlreadyMember);
    }
    match groups.join_request_status(&group.id, &ctx.user_id).await? {
        Some(RequestStatus::Pending) => return Err(HandlerError::RequestAlreadySent),
        Some(RequestStatus::Accepted) => return Err(HandlerError::AlreadyMember),
        Some(RequestStatus::Declined) | None => {}
    }

    let actor = ctx.actor().await?;
    groups.open_join_request(&group.id, &ctx.user_id).await?;
    let notification_id = ctx
        .db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: &group.admin_id,
            group_id: Some(&group.id),
            kind: "group_join_request",
            message: format!("{} wants to join {}", actor.nickname, group.title),
            entity_id: Some(&group.id),
            entity_type: Some("group"),
        })
        .await?;

    ctx.hub.notify(
        &group.admin_id,
        &ServerMessage::action(
            "group_join_request",
            Some(actor),
            json!({
                "group_id": group.id,
                "group_title": group.title,
                "user_id": ctx.user_id,
                "notification_id": notification_id,
            }),
        ),
    );
    ctx.success("join request sent");
    Ok(())
}

/// The admin answers `recipient_id`'s pending join request.
pub async fn join_response(ctx: &Context, p: GroupJoinResponse) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    ensure_admin(ctx, &group)?;

    let requester = p.recipient_id.as_str();
    let answered = ctx
        .db
        .groups()
        .answer_join_request(&group.id, requester, p.status)
        .await?;
    if !answered {
        return Err(HandlerError::NoPendingRequest);
    }

    let actor = ctx.actor().await?;
    let (kind, message) = match p.status {
        Decision::Accepted => (
            "group_join_accept",
            format!("Your request to join {} was accepted", group.title),
        ),
        Decision::Declined => (
            "group_join_decline",
            format!("Your request to join {} was declined", group.title),
        ),
    };
    ctx.db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: requester,
            group_id: Some(&group.id),
            kind,
            message,
            entity_id: Some(&group.id),
            entity_type: Some("group"),
        })
        .await?;

    if p.status == Decision::Accepted {
        ctx.join_live_group(requester, &group.id).await;
    }
    ctx.hub.notify(
        requester,
        &ServerMessage::action(
            kind,
            Some(actor),
            json!({ "group_id": group.id, "group_title": group.title }),
        ),
    );
    ctx.success(format!("join request {}", p.status.as_status().as_str()));
    Ok(())
}

pub async fn cancel_join_request(ctx: &Context, p: GroupTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    let cancelled = ctx
        .db
        .groups()
        .cancel_join_request(&group.id, &ctx.user_id)
        .await?;
    if !cancelled {
        return Err(HandlerError::NoPendingRequest);
    }
    ctx.db
        .notifications()
        .retract_unread(
            &ctx.user_id,
            &group.admin_id,
            "group_join_request",
            Some(&group.id),
        )
        .await?;
    ctx.success("join request cancelled");
    Ok(())
}

/// Leave a group. The admin cannot leave their own group.
pub async fn exit(ctx: &Context, p: GroupTarget) -> HandlerResult {
    let group = find_group(ctx, &p.group_id).await?;
    if group.admin_id == ctx.user_id {
        return Err(HandlerError::AdminForbidden);
    }
    if !ctx.db.groups().leave(&group.id, &ctx.user_id).await? {
        return Err(HandlerError::NotMember);
    }

    let actor = ctx.actor().await?;
    ctx.db
        .notifications()
        .insert(&NewNotification {
            actor_id: &ctx.user_id,
            recipient_id: &group.admin_id,
            group_id: Some(&group.id),
            kind: "group_left",
            message: format!("{} left {}", actor.nickname, group.title),
            entity_id: Some(&group.id),
            entity_type: Some("group"),
        })
        .await?;

    ctx.leave_live_group(&ctx.user_id, &group.id).await;
    let message = ServerMessage::action(
        "group_left",
        Some(actor),
        json!({ "group_id": group.id, "user_id": ctx.user_id }),
    );
    ctx.hub
        .send_to_users([ctx.user_id.as_str(), group.admin_id.as_str()], &message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seeded;
    use crate::handlers::test_support::{Peer, action_types, drain};
    use crate::hub::Hub;

    fn target(group: &str) -> GroupTarget {
        GroupTarget {
            group_id: group.to_string(),
        }
    }

    fn answer(user: &str, status: Decision) -> GroupJoinResponse {
        GroupJoinResponse {
            group_id: "g-rust".into(),
            recipient_id: user.into(),
            status,
        }
    }

    #[tokio::test]
    async fn join_request_notifies_admin() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let mut alice = Peer::connect(&hub, &db, "alice").await;
        let bob = Peer::connect(&hub, &db, "bob").await;
        drain(&mut alice.live);

        join_request(&bob.ctx, target("g-rust")).await.expect("request");

        let frames = drain(&mut alice.live);
        assert_eq!(action_types(&frames), vec!["group_join_request"]);
        assert_eq!(frames[0]["data"]["group_title"], "Rustaceans");
        let err = join_request(&bob.ctx, target("g-rust")).await.expect_err("pending");
        assert!(matches!(err, HandlerError::RequestAlreadySent));
    }

    #[tokio::test]
    async fn admin_and_members_cannot_request() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let alice = Peer::offline(&hub, &db, "alice");
        let err = join_request(&alice.ctx, target("g-rust")).await.expect_err("admin");
        assert!(matches!(err, HandlerError::AdminForbidden));

        let err = join_request(&alice.ctx, target("g-none")).await.expect_err("missing");
        assert!(matches!(err, HandlerError::GroupNotFound));
    }

    #[tokio::test]
    async fn accepted_request_joins_live_group() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let alice = Peer::connect(&hub, &db, "alice").await;
        let mut bob = Peer::connect(&hub, &db, "bob").await;

        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        join_response(&alice.ctx, answer("bob", Decision::Accepted))
            .await
            .expect("accept");

        assert!(db.groups().is_member("g-rust", "bob").await.expect("query"));
        assert_eq!(hub.group_members("g-rust"), vec!["alice", "bob"]);
        let frames = drain(&mut bob.live);
        assert!(action_types(&frames).contains(&"group_join_accept".to_string()));
    }

    #[tokio::test]
    async fn only_admin_answers() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let bob = Peer::offline(&hub, &db, "bob");
        let carol = Peer::offline(&hub, &db, "carol");

        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        let err = join_response(&carol.ctx, answer("bob", Decision::Accepted))
            .await
            .expect_err("not admin");
        assert!(matches!(err, HandlerError::NotAdmin));
        assert!(!db.groups().is_member("g-rust", "bob").await.expect("query"));
    }

    #[tokio::test]
    async fn declined_request_can_be_resent() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let alice = Peer::offline(&hub, &db, "alice");
        let bob = Peer::offline(&hub, &db, "bob");

        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        join_response(&alice.ctx, answer("bob", Decision::Declined))
            .await
            .expect("decline");
        join_request(&bob.ctx, target("g-rust")).await.expect("resend");
    }

    #[tokio::test]
    async fn cancel_removes_pending_request() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let bob = Peer::offline(&hub, &db, "bob");

        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        cancel_join_request(&bob.ctx, target("g-rust")).await.expect("cancel");
        assert_eq!(
            db.groups().join_request_status("g-rust", "bob").await.expect("query"),
            None
        );
        assert!(db.notifications().unread_for_user("alice").await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn cancel_keeps_notification_for_other_group() {
        let db = seeded().await;
        db.groups()
            .create("g-two", "Second", "", "alice")
            .await
            .expect("create group");
        let (hub, _task) = Hub::spawn(16);
        let bob = Peer::offline(&hub, &db, "bob");

        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        join_request(&bob.ctx, target("g-two")).await.expect("request");
        cancel_join_request(&bob.ctx, target("g-rust")).await.expect("cancel");

        let unread = db.notifications().unread_for_user("alice").await.expect("query");
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].group_id.as_deref(), Some("g-two"));
    }

    #[tokio::test]
    async fn exit_leaves_live_group_and_tells_both() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let mut alice = Peer::connect(&hub, &db, "alice").await;
        let bob = Peer::offline(&hub, &db, "bob");
        join_request(&bob.ctx, target("g-rust")).await.expect("request");
        join_response(&alice.ctx, answer("bob", Decision::Accepted))
            .await
            .expect("accept");
        let mut bob = Peer::connect(&hub, &db, "bob").await;
        drain(&mut alice.live);

        exit(&bob.ctx, target("g-rust")).await.expect("exit");

        assert_eq!(hub.group_members("g-rust"), vec!["alice"]);
        assert!(action_types(&drain(&mut alice.live)).contains(&"group_left".to_string()));
        assert!(action_types(&drain(&mut bob.live)).contains(&"group_left".to_string()));
        let err = exit(&bob.ctx, target("g-rust")).await.expect_err("gone");
        assert!(matches!(err, HandlerError::NotMember));
    }

    #[tokio::test]
    async fn admin_cannot_exit() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let alice = Peer::offline(&hub, &db, "alice");
        let err = exit(&alice.ctx, target("g-rust")).await.expect_err("admin");
        assert!(matches!(err, HandlerError::AdminForbidden));
    }
}

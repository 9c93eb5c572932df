//! The per-client dispatch loop.

use super::Context;
use super::{event, follow, group, invitation, messaging, notification};
use crate::error::HandlerResult;
use crate::protocol::{ClientMessage, ProtocolError, RawEnvelope, ServerMessage};
use crate::telemetry::{HandlerTimer, spans};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error};

/// Handle decoded envelopes one at a time until the inbound pump goes away.
pub async fn run(ctx: Context, mut envelopes: mpsc::Receiver<RawEnvelope>) {
    while let Some(raw) = envelopes.recv().await {
        dispatch(&ctx, raw).await;
    }
    debug!(user_id = %ctx.user_id, "Dispatch loop finished");
}

/// Decode one envelope, run its handler and report any failure to the sender.
pub async fn dispatch(ctx: &Context, raw: RawEnvelope) {
    let msg = match ClientMessage::decode(raw) {
        Ok(msg) => msg,
        Err(e) => {
            let label = match &e {
                ProtocolError::InvalidPayload { kind, .. } => *kind,
                _ => "unknown",
            };
            debug!(user_id = %ctx.user_id, error = %e, "Rejected envelope");
            crate::metrics::record_message_error(label, e.error_code());
            ctx.reply(&ServerMessage::from(e));
            return;
        }
    };

    let kind = msg.kind();
    let _timer = HandlerTimer::new(kind);

    if let Err(e) = handle(ctx, msg).instrument(spans::message(kind)).await {
        if e.is_internal() {
            error!(user_id = %ctx.user_id, kind, error = %e, "Handler failed");
        } else {
            debug!(user_id = %ctx.user_id, kind, error = %e, "Handler rejected request");
        }
        crate::metrics::record_message_error(kind, e.error_code());
        ctx.reply(&e.to_envelope());
    }
}

async fn handle(ctx: &Context, msg: ClientMessage) -> HandlerResult {
    match msg {
        ClientMessage::FollowRequest(p) => follow::request(ctx, p).await,
        ClientMessage::FollowResponse(p) => follow::respond(ctx, p).await,
        ClientMessage::CancelFollowRequest(p) => follow::cancel(ctx, p).await,
        ClientMessage::Unfollow(p) => follow::unfollow(ctx, p).await,
        ClientMessage::GroupJoinRequest(p) => group::join_request(ctx, p).await,
        ClientMessage::GroupJoinResponse(p) => group::join_response(ctx, p).await,
        ClientMessage::CancelGroupJoinRequest(p) => group::cancel_join_request(ctx, p).await,
        ClientMessage::ExitGroup(p) => group::exit(ctx, p).await,
        ClientMessage::GroupInvitation(p) => invitation::invite(ctx, p).await,
        ClientMessage::GroupInvitationResponse(p) => invitation::respond(ctx, p).await,
        ClientMessage::CancelGroupInvitation(p) => invitation::cancel(ctx, p).await,
        ClientMessage::PrivateMessage(p) => messaging::private_message(ctx, p).await,
        ClientMessage::LoadPrivateMessages(p) => messaging::load_private(ctx, p).await,
        ClientMessage::MarkPrivateMessagesRead(p) => messaging::mark_private_read(ctx, p).await,
        ClientMessage::GroupMessage(p) => messaging::group_message(ctx, p).await,
        ClientMessage::LoadGroupMessages(p) => messaging::load_group(ctx, p).await,
        ClientMessage::MarkGroupMessagesRead(p) => messaging::mark_group_read(ctx, p).await,
        ClientMessage::GroupEvent(p) => event::create(ctx, p).await,
        ClientMessage::EventRsvp(p) => event::rsvp(ctx, p).await,
        ClientMessage::MarkNotificationRead(p) => notification::mark_read(ctx, p).await,
        ClientMessage::DeleteNotification(p) => notification::delete(ctx, p).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::seeded;
    use crate::handlers::test_support::{Peer, drain};
    use crate::hub::Hub;

    fn envelope(json: &str) -> RawEnvelope {
        RawEnvelope::parse(json).expect("valid envelope")
    }

    #[tokio::test]
    async fn unknown_kind_gets_typed_error() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let mut alice = Peer::offline(&hub, &db, "alice");

        dispatch(&alice.ctx, envelope(r#"{"type":"poke","data":{}}"#)).await;

        let replies = drain(&mut alice.replies);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["type"], "error");
        assert_eq!(replies[0]["code"], "unknown_kind");
    }

    #[tokio::test]
    async fn bad_payload_gets_typed_error() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let mut alice = Peer::offline(&hub, &db, "alice");

        dispatch(&alice.ctx, envelope(r#"{"type":"follow_request","data":{"who":"bob"}}"#)).await;

        let replies = drain(&mut alice.replies);
        assert_eq!(replies[0]["code"], "invalid_payload");
    }

    #[tokio::test]
    async fn validation_failure_reports_code() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let mut alice = Peer::offline(&hub, &db, "alice");

        dispatch(
            &alice.ctx,
            envelope(r#"{"type":"follow_request","data":{"recipient_Id":"alice"}}"#),
        )
        .await;

        let replies = drain(&mut alice.replies);
        assert_eq!(replies[0]["code"], "self_action");
        assert_eq!(replies[0]["message"], "cannot follow yourself");
    }

    #[tokio::test]
    async fn loop_ends_when_sender_drops() {
        let db = seeded().await;
        let (hub, _task) = Hub::spawn(16);
        let alice = Peer::offline(&hub, &db, "alice");
        let (tx, rx) = mpsc::channel(4);
        tx.send(envelope(r#"{"type":"unfollow","data":{"recipient_Id":"bob"}}"#))
            .await
            .expect("send");
        drop(tx);
        run(alice.ctx, rx).await;
    }
}

//! Classification of transport errors.

use super::lifecycle::CloseReason;
use std::io::ErrorKind;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;

/// Map a read error to the reason the connection is closing.
///
/// Every read error is fatal to the connection; the distinction only decides
/// how loudly it is logged and which close code is sent.
pub(super) fn classify_read_error(e: &WsError) -> CloseReason {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => CloseReason::ClientClosed,
        WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
            CloseReason::ClientClosed
        }
        WsError::Io(io) if is_peer_gone(io.kind()) => CloseReason::ClientClosed,
        // Oversized frames and messages land here.
        WsError::Capacity(_) => CloseReason::TransportError,
        _ => CloseReason::TransportError,
    }
}

fn is_peer_gone(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

// WebSocket transport on tokio-tungstenite.

use futures_util::future::{self, BoxFuture};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{
    self, Message,
    protocol::{CloseFrame, frame::coding::CloseCode},
};
use url::Url;

use super::{CLOSE_NO_STATUS, Dialer, FrameSink, FrameStream, Outgoing, TransportError};

/// Default [`Dialer`]: one `tokio-tungstenite` client socket per dial.
///
/// Text frames are documents. Ping replies are handled by tungstenite;
/// binary frames are accepted when they hold valid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketDialer;

impl Dialer for WebSocketDialer {
    fn dial(&self, url: &Url) -> BoxFuture<'static, Result<(FrameSink, FrameStream), TransportError>> {
        let url = url.clone();
        Box::pin(async move {
            tracing::info!(url = %url, "Connecting to WebSocket");

            let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            tracing::info!("WebSocket connected");

            let (write, read) = ws_stream.split();

            let sink: FrameSink = Box::pin(write.with(|frame: Outgoing| {
                future::ready(Ok::<Message, TransportError>(into_message(frame)))
            }));
            let stream: FrameStream =
                Box::pin(read.filter_map(|item| future::ready(from_message(item))));

            Ok::<_, TransportError>((sink, stream))
        })
    }
}

fn into_message(frame: Outgoing) -> Message {
    match frame {
        Outgoing::Text(text) => Message::text(text),
        Outgoing::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

/// Map one tungstenite read result onto the document stream.
///
/// Control frames are swallowed; everything that ends the session
/// becomes an error item.
fn from_message(
    item: Result<Message, tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match item {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            let err = match frame {
                Some(cf) => TransportError::Closed {
                    code: Some(u16::from(cf.code)),
                    reason: cf.reason.to_string(),
                },
                None => TransportError::Closed {
                    code: Some(CLOSE_NO_STATUS),
                    reason: String::new(),
                },
            };
            Some(Err(err))
        }
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::from(e))),
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed {
                    code: None,
                    reason: err.to_string(),
                }
            }
            other => Self::Io(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_frame_maps_to_typed_close() {
        let frame = Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }));

        let item = from_message(Ok(frame));
        assert_eq!(
            item,
            Some(Err(TransportError::Closed {
                code: Some(1001),
                reason: "restarting".into(),
            }))
        );
    }

    #[test]
    fn control_frames_are_swallowed() {
        assert!(from_message(Ok(Message::Ping(Vec::new().into()))).is_none());
        assert!(from_message(Ok(Message::Pong(Vec::new().into()))).is_none());
    }

    #[test]
    fn text_frame_passes_through() {
        let item = from_message(Ok(Message::text(r#"{"type":"pong","id":1}"#)));
        assert_eq!(item, Some(Ok(r#"{"type":"pong","id":1}"#.to_owned())));
    }

    #[test]
    fn outgoing_close_is_normal_closure() {
        match into_message(Outgoing::normal_close()) {
            Message::Close(Some(cf)) => assert_eq!(u16::from(cf.code), 1000),
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

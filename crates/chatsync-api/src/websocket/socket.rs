// ── Physical socket abstraction ──
//
// The realtime client only sees `Frame`s. `TungsteniteConnector` is the
// production connector; tests plug in scripted ones.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::error::Error;

/// Close code reported when the peer closed without a status.
pub const NO_STATUS_CODE: u16 = 1005;

/// A single WebSocket frame, stripped down to what the client handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, Error>> + Send>>;

/// Opens physical connections.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(FrameSink, FrameStream), Error>>;
}

// ── TungsteniteConnector ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(FrameSink, FrameStream), Error>> {
        Box::pin(async move {
            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

            let (write, read) = ws.split();

            let sink = write
                .with(|frame: Frame| {
                    futures_util::future::ready(Ok::<_, tungstenite::Error>(to_message(frame)))
                })
                .sink_map_err(|e| Error::WebSocketConnect(e.to_string()));

            let stream = read.filter_map(|msg| {
                futures_util::future::ready(match msg {
                    Ok(msg) => from_message(msg).map(Ok),
                    Err(e) => Some(Err(Error::WebSocketConnect(e.to_string()))),
                })
            });

            Ok((Box::pin(sink) as FrameSink, Box::pin(stream) as FrameStream))
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        })),
    }
}

/// Binary and raw frames are not part of the protocol and are skipped.
fn from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Ping(data) => Some(Frame::Ping(data.to_vec())),
        Message::Pong(data) => Some(Frame::Pong(data.to_vec())),
        Message::Close(frame) => Some(match frame {
            Some(cf) => Frame::Close {
                code: u16::from(cf.code),
                reason: cf.reason.as_str().to_owned(),
            },
            None => Frame::Close {
                code: NO_STATUS_CODE,
                reason: String::new(),
            },
        }),
        Message::Binary(_) | Message::Frame(_) => None,
    }
}

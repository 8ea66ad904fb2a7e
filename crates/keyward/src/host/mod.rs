//! Newline-delimited JSON frames over stdio, in the shape a native-messaging host would see.
//!
//! One task reads frames and drives the [`Background`] actor; one task owns stdout. Deferred
//! replies are forwarded by small tasks that wait on the actor's oneshot responders.

use crate::{
    background::{
        messages::{Channel, Reply, Response, TabContext},
        Background,
    },
    popup::{ConfirmationSurface, PopupRequest},
};
use eyre::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio::{
    io::{AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn};

/// Inbound lines longer than this end the session.
const MAX_FRAME_BYTES: usize = 1_000_000;

#[derive(Debug, Deserialize)]
struct Inbound {
    #[serde(default)]
    id: Value,
    channel: Channel,
    #[serde(default)]
    sender: Option<TabContext>,
    message: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Reply { id: Value, response: Response },
    Event { event: &'static str, popup: PopupRequest },
}

/// Queue of frames headed for stdout. Doubles as the popup surface.
#[derive(Debug, Clone)]
pub struct FrameSink(mpsc::UnboundedSender<Outbound>);

impl FrameSink {
    fn send(&self, frame: Outbound) {
        if self.0.send(frame).is_err() {
            debug!("writer gone, dropping frame");
        }
    }
}

impl ConfirmationSurface for FrameSink {
    fn open(&self, popup: PopupRequest) {
        self.send(Outbound::Event {
            event: "openPopup",
            popup,
        });
    }
}

pub fn frame_channel() -> (FrameSink, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameSink(tx), rx)
}

/// Drain queued frames to `out`, one JSON object per line, flushed per frame.
async fn write_frames<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut out: W) -> eyre::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut line = Vec::new();
    while let Some(frame) = rx.recv().await {
        line.clear();
        serde_json::to_writer(&mut line, &frame).context("encode frame")?;
        line.push(b'\n');
        out.write_all(&line).await.context("write frame")?;
        out.flush().await.context("flush frame")?;
    }
    Ok(())
}

fn dispatch_reply(sink: &FrameSink, id: Value, reply: Reply) {
    match reply {
        Reply::Now(response) => sink.send(Outbound::Reply { id, response }),
        Reply::Later(rx) => {
            let sink = sink.clone();
            tokio::spawn(async move {
                match rx.await {
                    Ok(response) => sink.send(Outbound::Reply { id, response }),
                    Err(_closed) => debug!(%id, "deferred request dropped without an answer"),
                }
            });
        }
        Reply::None => {}
    }
}

/// Serve frames from `input` until EOF, an oversized line, or `shutdown` completes.
///
/// `bg` is consumed so that, on exit, every parked responder is dropped and the writer drains.
pub async fn serve<R, W>(
    mut bg: Background,
    sink: FrameSink,
    frames: mpsc::UnboundedReceiver<Outbound>,
    input: R,
    output: W,
    shutdown: impl Future<Output = ()>,
) -> eyre::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = tokio::spawn(write_frames(frames, output));
    let mut lines = BufReader::new(input).lines();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            line = lines.next_line() => line.context("read frame")?,
        };
        let Some(line) = line else {
            debug!("input closed");
            break;
        };
        if line.len() > MAX_FRAME_BYTES {
            warn!(len = line.len(), "oversized frame, closing");
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let frame: Inbound = match serde_json::from_str(&line) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "invalid frame");
                continue;
            }
        };
        let reply = bg.handle(frame.channel, frame.sender, frame.message).await;
        dispatch_reply(&sink, frame.id, reply);
    }

    info!(
        pending_access = bg.pending_access(),
        pending_transactions = bg.pending_transactions(),
        "host loop finished"
    );
    drop(bg);
    drop(sink);
    writer.await.context("writer task")?
}

use std::sync::Arc;

use sync_protocol::{CoordinatorFrame, RequestFrame, Response, WireError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::codec::{recover_request_id, write_frame, FrameReader, InboundLine};
use super::ChannelError;
use crate::coordinator::broadcaster::{ChannelId, FrameReceiver, FrameSender};
use crate::coordinator::router::RequestRouter;

/// Serves one presentation connection until the peer closes its side.
///
/// The connection stays subscribed to state pushes until the peer stops
/// writing and every request it sent has been answered. Each
/// request is handled on its own task; replies and pushes share one FIFO queue
/// drained by a single writer task.
pub async fn serve_connection<S>(stream: S, router: Arc<RequestRouter>) -> Result<(), ChannelError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (outbound, queue) = mpsc::unbounded_channel();
    let channel_id = ChannelId::new();
    let subscription = router
        .store()
        .broadcaster()
        .subscribe(channel_id, outbound.clone());
    tracing::info!(%channel_id, "presentation channel attached");

    let writer = tokio::spawn(drain_queue(write_half, queue, channel_id));
    let mut reader = FrameReader::new(read_half);
    let mut handlers = JoinSet::new();

    let read_result = loop {
        match reader.next_line().await {
            Ok(Some(line)) => dispatch(line, &router, &outbound, &mut handlers),
            Ok(None) => break Ok(()),
            Err(error) => break Err(error),
        }
        while let Some(joined) = handlers.try_join_next() {
            if let Err(error) = joined {
                tracing::warn!(%channel_id, %error, "request handler aborted");
            }
        }
    };

    while let Some(joined) = handlers.join_next().await {
        if let Err(error) = joined {
            tracing::warn!(%channel_id, %error, "request handler aborted");
        }
    }
    subscription.unsubscribe();
    drop(outbound);

    let write_result = match writer.await {
        Ok(result) => result,
        Err(error) => {
            tracing::warn!(%channel_id, %error, "channel writer aborted");
            Ok(())
        }
    };
    tracing::info!(%channel_id, "presentation channel detached");
    read_result.and(write_result)
}

fn dispatch(
    line: InboundLine,
    router: &Arc<RequestRouter>,
    outbound: &FrameSender,
    handlers: &mut JoinSet<()>,
) {
    let decoded = match &line {
        InboundLine::Frame(text) => serde_json::from_str::<RequestFrame>(text)
            .map_err(|error| format!("malformed request frame: {error}")),
        InboundLine::Oversized { len, .. } => Err(format!(
            "frame of {len} bytes exceeds the {} byte limit",
            super::MAX_FRAME_BYTES
        )),
    };

    match decoded {
        Ok(RequestFrame { id, request }) => {
            tracing::debug!(id, op = request.op(), "request received");
            let router = Arc::clone(router);
            let outbound = outbound.clone();
            handlers.spawn(async move {
                let response = router.handle(request).await;
                let _ = outbound.send(CoordinatorFrame::Reply { id, response });
            });
        }
        Err(message) => match recover_request_id(&line) {
            Some(id) => {
                tracing::warn!(id, %message, "rejecting request frame");
                let _ = outbound.send(CoordinatorFrame::Reply {
                    id,
                    response: Response::failure(WireError::validation(message)),
                });
            }
            None => tracing::warn!(%message, "dropping request frame without an id"),
        },
    }
}

async fn drain_queue<W>(
    mut writer: WriteHalf<W>,
    mut queue: FrameReceiver,
    channel_id: ChannelId,
) -> Result<(), ChannelError>
where
    W: AsyncRead + AsyncWrite,
{
    while let Some(frame) = queue.recv().await {
        if let Err(error) = write_frame(&mut writer, &frame).await {
            tracing::warn!(%channel_id, %error, "channel write failed");
            return Err(error);
        }
    }
    let _ = writer.shutdown().await;
    Ok(())
}

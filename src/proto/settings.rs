use crate::codec::Codec;
use crate::frame;
use crate::proto::{Error, Streams};

use tokio::io::{AsyncRead, AsyncWrite};

use std::task::{ready, Context, Poll};

/// Tracks the SETTINGS synchronization state in both directions.
#[derive(Debug)]
pub(crate) struct Settings {
    /// Our local SETTINGS sync state with the remote.
    local: Local,
    /// Received SETTINGS frame pending processing. The ACK must be written
    /// to the socket first then the settings applied **before** receiving
    /// any further frames.
    remote: Option<frame::Settings>,
    /// Whether the connection has received the initial SETTINGS frame from
    /// the remote peer.
    has_received_remote_initial: bool,
}

#[derive(Debug)]
enum Local {
    /// We have sent these SETTINGS and are waiting for the remote to ACK
    /// before we apply them.
    WaitingAck(frame::Settings),
    /// Our local settings are in sync with the remote.
    Synced,
}

impl Settings {
    pub(crate) fn new(local: frame::Settings) -> Self {
        Self {
            // The initial local SETTINGS are flushed during the handshake
            // process.
            local: Local::WaitingAck(local),
            remote: None,
            has_received_remote_initial: false,
        }
    }

    /// Whether the initial exchange has completed in both directions.
    pub(crate) fn is_synced(&self) -> bool {
        matches!(self.local, Local::Synced) && self.has_received_remote_initial
    }

    pub(crate) fn recv_settings<T>(
        &mut self,
        frame: frame::Settings,
        codec: &mut Codec<T>,
        streams: &Streams,
    ) -> Result<(), Error>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if frame.is_ack() {
            match &self.local {
                Local::WaitingAck(local) => {
                    tracing::debug!("received settings ACK; applying {:?}", local);

                    if let Some(max) = local.max_frame_size() {
                        codec.set_max_recv_frame_size(max as usize);
                    }

                    if let Some(max) = local.max_header_list_size() {
                        codec.set_max_recv_header_list_size(max as usize);
                    }

                    if let Some(val) = local.header_table_size() {
                        codec.set_recv_header_table_size(val as usize);
                    }

                    streams.apply_local_settings(local)?;
                    self.local = Local::Synced;
                    Ok(())
                }
                Local::Synced => {
                    // We haven't sent any SETTINGS frames to be ACKed, so
                    // this is very bizarre! Remote is either buggy or
                    // malicious.
                    proto_err!(conn: "received unexpected settings ack");
                    Err(Error::library_go_away(frame::Reason::PROTOCOL_ERROR))
                }
            }
        } else {
            // We always ACK before reading more frames, so `remote` should
            // always be none!
            debug_assert!(self.remote.is_none());
            self.remote = Some(frame);
            Ok(())
        }
    }

    /// Write the pending ACK, then apply the remote settings.
    pub(crate) fn poll_send<T>(
        &mut self,
        cx: &mut Context,
        codec: &mut Codec<T>,
        streams: &Streams,
    ) -> Poll<Result<(), Error>>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(settings) = self.remote.clone() {
            ready!(codec.poll_ready(cx)).map_err(Error::from)?;

            // Create an ACK settings frame
            let frame = frame::Settings::ack();

            // Buffer the settings frame
            codec
                .buffer(frame.into())
                .expect("invalid settings frame");

            tracing::trace!("ACK sent; applying settings");

            let is_initial = !self.has_received_remote_initial;
            self.has_received_remote_initial = true;

            streams.apply_remote_settings(&settings, is_initial)?;

            if let Some(val) = settings.header_table_size() {
                codec.set_send_header_table_size(val as usize);
            }

            if let Some(val) = settings.max_frame_size() {
                codec.set_max_send_frame_size(val as usize);
            }

            self.remote = None;
        }

        Poll::Ready(Ok(()))
    }
}

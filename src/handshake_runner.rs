//! Drives the UKEY2-style handshake in [`crate::crypto::handshake`]
//! over a channel's unencrypted read/write path, on its own
//! `tokio::task`, reporting completion through `on_success`/
//! `on_failure` callbacks per spec.md §4.4.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::channel::{BaseEndpointChannel, ChannelBehavior};
use crate::crypto::handshake::{
    client_finish, client_start, client_verify_done, server_finish, server_start, ClientFinish,
    ClientInit, ConnectionContext, ServerDone, ServerInit,
};
use crate::error::Error;

/// Invoked once the handshake produces a connection context both
/// peers agree on. `auth_token` is the human-comparable rendering of
/// `raw_auth_token`; both must be bit-identical on each side (tested
/// in the integration suite).
pub type OnSuccess<B> = Box<
    dyn FnOnce(&str, ConnectionContext, String, Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>>
        + Send,
>;

/// Invoked when the handshake fails for any reason (I/O, protocol
/// violation, or timeout). The channel is left open and plaintext; the
/// caller decides whether to retry out-of-band or close it.
pub type OnFailure<B> = Box<
    dyn FnOnce(&str, Arc<BaseEndpointChannel<B>>) -> Pin<Box<dyn Future<Output = ()> + Send>>
        + Send,
>;

/// Runs the client or server side of the handshake to completion (or
/// failure) and invokes exactly one of `on_success`/`on_failure`.
pub struct HandshakeRunner;

impl HandshakeRunner {
    /// Spawns the client side of the handshake on its own task.
    /// Returns a oneshot receiver that resolves once the spawned task
    /// has invoked whichever callback applies — the
    /// `tokio::sync::oneshot`-based `CountDownLatch` equivalent
    /// spec.md's design notes call for.
    pub fn start_client<B>(
        endpoint_id: String,
        channel: Arc<BaseEndpointChannel<B>>,
        timeout: Duration,
        on_success: OnSuccess<B>,
        on_failure: OnFailure<B>,
    ) -> oneshot::Receiver<()>
    where
        B: ChannelBehavior + Send + Sync + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, run_client(&endpoint_id, &channel)).await;
            match outcome {
                Ok(Ok((context, auth_token, raw_auth_token))) => {
                    info!(endpoint_id = %endpoint_id, "client handshake succeeded");
                    on_success(&endpoint_id, context, auth_token, raw_auth_token).await;
                }
                Ok(Err(err)) => {
                    warn!(endpoint_id = %endpoint_id, error = %err, "client handshake failed");
                    on_failure(&endpoint_id, channel).await;
                }
                Err(_elapsed) => {
                    let err = Error::Timeout(timeout);
                    warn!(endpoint_id = %endpoint_id, error = %err, "client handshake timed out");
                    on_failure(&endpoint_id, channel).await;
                }
            }
            let _ = done_tx.send(());
        });
        done_rx
    }

    /// Spawns the server side of the handshake on its own task.
    pub fn start_server<B>(
        endpoint_id: String,
        channel: Arc<BaseEndpointChannel<B>>,
        timeout: Duration,
        on_success: OnSuccess<B>,
        on_failure: OnFailure<B>,
    ) -> oneshot::Receiver<()>
    where
        B: ChannelBehavior + Send + Sync + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = tokio::time::timeout(timeout, run_server(&endpoint_id, &channel)).await;
            match outcome {
                Ok(Ok((context, auth_token, raw_auth_token))) => {
                    info!(endpoint_id = %endpoint_id, "server handshake succeeded");
                    on_success(&endpoint_id, context, auth_token, raw_auth_token).await;
                }
                Ok(Err(err)) => {
                    warn!(endpoint_id = %endpoint_id, error = %err, "server handshake failed");
                    on_failure(&endpoint_id, channel).await;
                }
                Err(_elapsed) => {
                    let err = Error::Timeout(timeout);
                    warn!(endpoint_id = %endpoint_id, error = %err, "server handshake timed out");
                    on_failure(&endpoint_id, channel).await;
                }
            }
            let _ = done_tx.send(());
        });
        done_rx
    }
}

async fn run_client<B: ChannelBehavior>(
    endpoint_id: &str,
    channel: &BaseEndpointChannel<B>,
) -> Result<(ConnectionContext, String, Bytes), Error> {
    debug!(endpoint_id, "SendClientInit");
    let (client, client_init) = client_start();
    write_handshake_message(channel, &client_init.to_bytes()).await?;

    debug!(endpoint_id, "WaitServerInit");
    let server_init_bytes = read_handshake_message(channel).await?;
    let server_init = ServerInit::from_bytes(&server_init_bytes)?;

    debug!(endpoint_id, "SendClientFinish");
    let (finish, context) = client_finish(client, &server_init);
    write_handshake_message(channel, &finish.to_bytes()).await?;

    debug!(endpoint_id, "WaitDone");
    let server_done_bytes = read_handshake_message(channel).await?;
    let server_done = ServerDone::from_bytes(&server_done_bytes)?;
    client_verify_done(
        &context,
        &finish.client_public,
        &server_init.server_public,
        &finish.client_nonce,
        &server_init.server_nonce,
        &server_done,
    )?;

    debug!(endpoint_id, "Done");
    let auth_token = context.auth_token.clone();
    let raw_auth_token = context.raw_auth_token.clone();
    Ok((context, auth_token, raw_auth_token))
}

async fn run_server<B: ChannelBehavior>(
    endpoint_id: &str,
    channel: &BaseEndpointChannel<B>,
) -> Result<(ConnectionContext, String, Bytes), Error> {
    debug!(endpoint_id, "WaitClientInit");
    let client_init_bytes = read_handshake_message(channel).await?;
    let client_init = ClientInit::from_bytes(&client_init_bytes)?;

    debug!(endpoint_id, "SendServerInit");
    let (server, server_init) = server_start(&client_init);
    write_handshake_message(channel, &server_init.to_bytes()).await?;

    debug!(endpoint_id, "WaitClientFinish");
    let client_finish_bytes = read_handshake_message(channel).await?;
    let client_finish_msg = ClientFinish::from_bytes(&client_finish_bytes)?;

    debug!(endpoint_id, "SendServerDone");
    let (server_done, context) = server_finish(server, &client_finish_msg)?;
    write_handshake_message(channel, &server_done.to_bytes()).await?;

    debug!(endpoint_id, "Done");
    let auth_token = context.auth_token.clone();
    let raw_auth_token = context.raw_auth_token.clone();
    Ok((context, auth_token, raw_auth_token))
}

async fn write_handshake_message<B: ChannelBehavior>(
    channel: &BaseEndpointChannel<B>,
    payload: &bytes::Bytes,
) -> Result<(), Error> {
    channel.write_plain(payload).await
}

async fn read_handshake_message<B: ChannelBehavior>(
    channel: &BaseEndpointChannel<B>,
) -> Result<Bytes, Error> {
    channel.read_plain().await
}

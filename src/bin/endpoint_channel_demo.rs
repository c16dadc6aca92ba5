use clap::Parser;
use endpoint_channel::channel::{new_channel, SimpleBehavior};
use endpoint_channel::config::ChannelConfig;
use endpoint_channel::handshake_runner::HandshakeRunner;
use endpoint_channel::medium::{DisconnectionReason, Medium};
use endpoint_channel::stream::Pipe;
use tokio::sync::oneshot;

#[derive(Parser)]
#[command(name = "endpoint-channel-demo")]
#[command(about = "Runs a handshake and an encrypted exchange over a pair of in-process endpoint channels")]
pub struct Args {
    /// Optional TOML config file overriding the channel defaults.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Medium to report both channels as riding on.
    #[arg(short, long, default_value = "ble")]
    pub medium: String,
}

fn parse_medium(s: &str) -> Medium {
    match s.to_ascii_lowercase().as_str() {
        "bluetooth" => Medium::Bluetooth,
        "wifi_lan" | "wifilan" => Medium::WifiLan,
        "wifi_aware" | "wifiaware" => Medium::WifiAware,
        "web_rtc" | "webrtc" => Medium::WebRtc,
        "usb" => Medium::Usb,
        _ => Medium::Ble,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ChannelConfig::load(path)?,
        None => ChannelConfig::default(),
    };
    let medium = parse_medium(&args.medium);

    println!("Starting endpoint channel demo (medium={medium})");

    let (reader_a, writer_a) = Pipe::channel_with_chunk_size(8, config.pipe_chunk_bytes);
    let (reader_b, writer_b) = Pipe::channel_with_chunk_size(8, config.pipe_chunk_bytes);

    let channel_a = new_channel(
        "endpoint_a",
        SimpleBehavior(medium),
        Box::new(reader_b),
        Box::new(writer_a),
        config.max_frame_bytes,
    );
    let channel_b = new_channel(
        "endpoint_b",
        SimpleBehavior(medium),
        Box::new(reader_a),
        Box::new(writer_b),
        config.max_frame_bytes,
    );

    let (client_auth_tx, client_auth_rx) = oneshot::channel();
    let (server_auth_tx, server_auth_rx) = oneshot::channel();

    let client_a = channel_a.clone();
    let client_done = HandshakeRunner::start_client(
        "endpoint_a".to_string(),
        channel_a.clone(),
        config.handshake_timeout(),
        Box::new(move |_endpoint_id, context, auth_token, _raw| {
            Box::pin(async move {
                client_a.enable_encryption(endpoint_channel::crypto::EncryptionCodec::new(&context)).await;
                let _ = client_auth_tx.send(auth_token);
            })
        }),
        Box::new(|endpoint_id, channel| {
            Box::pin(async move {
                println!("client handshake failed for {endpoint_id}");
                channel.close(DisconnectionReason::IoError).await;
            })
        }),
    );

    let server_b = channel_b.clone();
    let server_done = HandshakeRunner::start_server(
        "endpoint_b".to_string(),
        channel_b.clone(),
        config.handshake_timeout(),
        Box::new(move |_endpoint_id, context, auth_token, _raw| {
            Box::pin(async move {
                server_b.enable_encryption(endpoint_channel::crypto::EncryptionCodec::new(&context)).await;
                let _ = server_auth_tx.send(auth_token);
            })
        }),
        Box::new(|endpoint_id, channel| {
            Box::pin(async move {
                println!("server handshake failed for {endpoint_id}");
                channel.close(DisconnectionReason::IoError).await;
            })
        }),
    );

    let _ = client_done.await;
    let _ = server_done.await;

    let client_auth_token = client_auth_rx.await?;
    let server_auth_token = server_auth_rx.await?;
    println!("client auth token: {client_auth_token}");
    println!("server auth token: {server_auth_token}");
    assert_eq!(client_auth_token, server_auth_token);

    channel_a.write(b"hello over an encrypted channel").await?;
    let received = channel_b.read().await?;
    println!("endpoint_b received: {}", String::from_utf8_lossy(&received));

    channel_a.close(DisconnectionReason::LocalDisconnection).await;
    channel_b.close(DisconnectionReason::RemoteDisconnection).await;

    let env = endpoint_channel::environment::MediumEnvironment::instance();
    env.start().await;
    env.reset().await;
    println!("demo complete");

    Ok(())
}

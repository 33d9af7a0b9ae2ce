//! Tessera command-line client.
//!
//! # Usage
//!
//! ```bash
//! # First run: interactive setup, writes credentials.json
//! tessera
//!
//! # Send messages
//! tessera -m "Hello World!"
//! df -h | tessera --code
//! tessera -m "- bullet" --markdown
//!
//! # Verify another device interactively
//! tessera --verify
//! ```

use std::{io::IsTerminal, path::Path, time::Duration};

use clap::Parser;
use tessera_cli::{compose, prompt::TerminalPrompt, setup, sources};
use tessera_client::{Credentials, HttpSession, SasStore};
use tessera_core::EventDispatcher;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pause before retrying a failed sync call.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Tessera messaging client
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(about = "Send messages to a room, or verify a peer device interactively")]
#[command(version)]
struct Args {
    /// Credentials file (written on first run, read afterwards)
    #[arg(short = 't', long, default_value = "credentials.json")]
    credentials: String,

    /// Send to this room instead of the one in the credentials file
    #[arg(short, long)]
    room: Option<String>,

    /// Message to send; repeatable. Piped input is published first
    #[arg(short, long)]
    message: Vec<String>,

    /// Send the message as HTML
    #[arg(short = 'w', long)]
    html: bool,

    /// Render the message from Markdown to HTML
    #[arg(short = 'n', long)]
    markdown: bool,

    /// Send the message as a fixed-width code block
    #[arg(short, long)]
    code: bool,

    /// Send the message as a notice instead of ordinary text
    #[arg(short = 'e', long)]
    notice: bool,

    /// Verify a peer device interactively instead of sending messages
    #[arg(short, long)]
    verify: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { &args.log_level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let given = Path::new(&args.credentials);
    let resolved = Credentials::resolve_path(given);
    if !resolved.exists() {
        setup::run(given).await?;
        return Ok(());
    }

    let credentials = Credentials::load(&resolved)?;
    tracing::debug!(path = %resolved.display(), "using stored credentials");
    let session = HttpSession::with_token(&credentials.homeserver, &credentials.access_token);

    if args.verify {
        verify(&credentials, &session).await
    } else {
        send(&args, &credentials, &session).await
    }
}

/// Send every gathered message to the target room.
async fn send(
    args: &Args,
    credentials: &Credentials,
    session: &HttpSession,
) -> Result<(), Box<dyn std::error::Error>> {
    // Some shells require escaping the leading `!` of a room id.
    let room_id = args
        .room
        .as_deref()
        .map_or_else(|| credentials.room_id.clone(), |room| room.replace("\\!", "!"));

    let format = compose::Format::from_flags(args.html, args.markdown, args.code);
    let messages = sources::gather(args.message.clone(), sources::read_pipe(), || {
        std::io::stdin().is_terminal().then(sources::read_keyboard).flatten()
    });

    if messages.is_empty() {
        tracing::info!("nothing to send");
        return Ok(());
    }

    for message in &messages {
        let content = compose::content(message, format, args.notice);
        session.send_room_message(&room_id, &content).await?;
        tracing::debug!(room_id, format = ?format, "message sent");
    }
    Ok(())
}

/// Run the verification receive loop until the operator terminates the
/// process.
async fn verify(
    credentials: &Credentials,
    session: &HttpSession,
) -> Result<(), Box<dyn std::error::Error>> {
    // The SAS prompt blocks on the terminal; verifying unattended would
    // hang forever on the first key event.
    if !std::io::stdin().is_terminal() {
        return Err("verification needs an interactive terminal".into());
    }

    let store = SasStore::new(&credentials.user_id, &credentials.device_id);
    let mut dispatcher = EventDispatcher::new(store, TerminalPrompt::new());
    let mut since: Option<String> = None;

    tracing::info!(
        user_id = %credentials.user_id,
        device_id = %credentials.device_id,
        "ready to verify; start the verification from your other device (Ctrl-C to quit)"
    );

    loop {
        let batch = match session.sync(since.as_deref()).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(%err, "sync failed, retrying");
                tokio::time::sleep(SYNC_RETRY_DELAY).await;
                continue;
            },
        };
        since = Some(batch.next_batch);

        for envelope in &batch.to_device {
            if let Some(event) = dispatcher.transport_mut().ingest(envelope) {
                dispatcher.handle_event(event);
            }
            for message in dispatcher.transport_mut().drain_outbox() {
                if let Err(err) = session.send_to_device(&message).await {
                    tracing::warn!(
                        transaction_id = message.transaction_id,
                        event_type = message.event_type,
                        %err,
                        "failed to deliver outbound envelope"
                    );
                }
            }
        }

        for transaction_id in dispatcher.evict_terminal() {
            dispatcher.transport_mut().forget(&transaction_id);
            tracing::info!(transaction_id, "verification transaction finished");
        }
    }
}

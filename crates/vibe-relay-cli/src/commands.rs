//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use vibe_relay_core::{ChatContext, DialogId, SessionClient};
use vibe_relay_executor::{AgentRunner, ChatStore, SendQueue};
use vibe_relay_session::{
    Dispatcher, DispatcherConfig, MemorySession, Poller, ReconnectProxy, SessionGate,
};
use vibe_relay_transport::HttpSessionClient;

use crate::{config::Cli, prompt};

fn session_gate(cli: &Cli) -> Result<Arc<SessionGate<HttpSessionClient>>> {
    let client = HttpSessionClient::new(&cli.session_url)
        .with_context(|| format!("Invalid session URL {}", cli.session_url))?;
    Ok(Arc::new(SessionGate::new(client, cli.retry_policy())))
}

async fn resolve_dialog(cli: &Cli, gate: &SessionGate<HttpSessionClient>) -> Result<DialogId> {
    if let Some(dialog) = &cli.dialog {
        return Ok(dialog.clone());
    }
    let dialogs = gate.list_dialogs().await.context("Failed to list dialogs")?;
    prompt::pick_dialog(&dialogs).await
}

/// Poll the dialog and relay instructions until Ctrl-C.
pub async fn run(cli: &Cli) -> Result<()> {
    let gate = session_gate(cli)?;
    gate.check_authorized()
        .await
        .context("Chat session unavailable")?;

    let dialog = resolve_dialog(cli, &gate).await?;
    let workspace = cli
        .workspace()
        .context("Workspace directory does not exist")?;
    let profile = cli.profile();

    let mut context = ChatContext::new(dialog.clone(), workspace);
    if let Some(create) = profile.create_chat_command() {
        let store = ChatStore::new(context.workspace_file(&cli.chat_file));
        let chat_id = store
            .get_or_create(&create)
            .await
            .context("Failed to get or create the worker chat")?;
        context = context.with_chat_id(chat_id);
    }

    let resume = match cli.resume_choice() {
        Some(resume) => resume,
        None if !profile.uses_persisted_chat() => {
            prompt::confirm("Resume last agent session?").await?
        }
        None => false,
    };

    let queue_path = context.workspace_file(&cli.queue);
    tracing::info!(
        %dialog,
        worker = %profile,
        workspace = %context.workspace.display(),
        chat_id = context.persisted_chat_id.as_deref().unwrap_or("-"),
        resume,
        interval = cli.interval,
        "Relay started, press Ctrl+C to stop"
    );

    let runner = AgentRunner::new(profile, context)
        .with_send_queue(queue_path.clone())
        .with_resume(resume);
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gate),
        runner,
        dialog.clone(),
        DispatcherConfig {
            settle_delay: cli.settle_delay(),
            send_queue: Some(SendQueue::new(queue_path)),
        },
    ));
    let poller = Poller::new(gate, dispatcher.clone(), dialog, cli.poll_interval())
        .with_window(cli.window);

    tokio::select! {
        () = poller.run() => {}
        () = Arc::clone(&dispatcher).run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

/// Send one message to the dialog.
pub async fn send(cli: &Cli, message: &str) -> Result<()> {
    let gate = session_gate(cli)?;
    let dialog = resolve_dialog(cli, &gate).await?;
    gate.send_text(&dialog, message)
        .await
        .with_context(|| format!("Failed to send to {dialog}"))?;
    println!("Sent.");
    Ok(())
}

/// Print every dialog with its id.
pub async fn dialogs(cli: &Cli) -> Result<()> {
    let gate = session_gate(cli)?;
    let dialogs = gate.list_dialogs().await.context("Failed to list dialogs")?;
    print!("{}", prompt::dialog_table(&dialogs));
    Ok(())
}

async fn serve_proxy<C>(listener: TcpListener, inner: C) -> Result<()>
where
    C: SessionClient + 'static,
{
    let proxy = Arc::new(ReconnectProxy::new(inner));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };
    vibe_relay_transport::serve(listener, Arc::clone(&proxy), shutdown).await?;
    proxy.disconnect().await.ok();
    Ok(())
}

/// Serve the session API backed by a reconnecting client.
pub async fn proxy(bind: std::net::SocketAddr, upstream: Option<&str>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    match upstream {
        Some(url) => {
            tracing::info!(upstream = url, "Proxying session bridge");
            let client = HttpSessionClient::new(url)
                .with_context(|| format!("Invalid upstream URL {url}"))?;
            serve_proxy(listener, client).await
        }
        None => {
            tracing::info!("Serving in-memory session");
            serve_proxy(listener, MemorySession::new()).await
        }
    }
}

use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use stich_application::{GenerationClient, GenerationState, RealtimeService};
use stich_core::config::{GenerationSettings, MessageDelivery};
use stich_core::generation::{GenerationStatus, StreamMessage, StreamPayload};
use stich_infrastructure::InMemoryDocumentStore;

pub struct GenerateOptions {
    pub user: String,
    pub fast: bool,
    pub delivery: Option<MessageDelivery>,
    pub json: bool,
}

pub async fn run(mut settings: GenerationSettings, options: GenerateOptions) -> Result<()> {
    if options.fast {
        settings.phase_delay_ms = 100;
        settings.file_delay_ms = 50;
        settings.teardown_grace_ms = 200;
    }
    if let Some(delivery) = options.delivery {
        settings.message_delivery = delivery;
    }

    let store = Arc::new(InMemoryDocumentStore::new());
    let service = Arc::new(RealtimeService::new(store, settings));
    let client = GenerationClient::new(service);

    let mut updates = client.watch();
    let session_id = client.start_generation(&options.user).await;
    println!("{} {}", "Session".bright_magenta().bold(), session_id);

    let mut printer = Printer::new(options.json);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                printer.print(&state)?;
                if !state.is_generating {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Cancelling...".yellow());
                tracing::info!(session_id = %session_id, "Cancelling generation");
                client.cancel_generation();
                break;
            }
        }
    }

    let state = client.state();
    client.shutdown().await;
    tracing::info!(
        session_id = %session_id,
        status = ?state.progress.as_ref().map(|session| session.status),
        progress = state.progress.as_ref().map_or(0, |session| session.progress),
        error = state.error.as_deref().unwrap_or(""),
        "Generation finished"
    );

    if let Some(error) = &state.error {
        anyhow::bail!("Generation failed: {}", error);
    }
    if let Some(session) = &state.progress {
        if session.status == GenerationStatus::Completed {
            println!("{}", "Generated files:".bright_green().bold());
            for file in &session.files {
                println!("  {} ({}, {} bytes)", file.path, file.language, file.content.len());
            }
        }
    }

    Ok(())
}

/// Prints only what changed since the previous state.
struct Printer {
    json: bool,
    last_progress: Option<(GenerationStatus, u8)>,
    last_message: Option<StreamMessage>,
}

impl Printer {
    fn new(json: bool) -> Self {
        Self {
            json,
            last_progress: None,
            last_message: None,
        }
    }

    fn print(&mut self, state: &GenerationState) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(state)?);
            return Ok(());
        }

        if let Some(session) = &state.progress {
            let key = (session.status, session.progress);
            if self.last_progress != Some(key) {
                self.last_progress = Some(key);
                println!(
                    "[{:>3}%] {:<12} {}",
                    session.progress,
                    session.status.to_string().cyan(),
                    session.current_step
                );
            }
        }

        let start = match &self.last_message {
            Some(last) => state
                .messages
                .iter()
                .rposition(|m| m == last)
                .map_or(0, |i| i + 1),
            None => 0,
        };
        for message in &state.messages[start..] {
            match &message.payload {
                StreamPayload::File(file) => println!("       {} {}", "+".green(), file.name),
                StreamPayload::Error { message } => println!("       {} {}", "!".red(), message),
                StreamPayload::Progress { .. } | StreamPayload::Complete { .. } => {}
            }
        }
        self.last_message = state.messages.last().cloned();

        Ok(())
    }
}

//! `rollcall`: terminal integration and attendance service.
//!
//! Usage:
//!   rollcall serve                          - webhook, ingest worker and reconciler
//!   rollcall enroll <device> <subject>      - capture and bind one face
//!   rollcall rederive <device> [--subject]  - recompute entry/exit directions
//!   rollcall probe <device>                 - model, firmware and features
//!   rollcall device add|list|remove         - terminal registry

mod app;
mod config;

use anyhow::Result;
use app::App;
use clap::{Parser, Subcommand};
use config::ServiceConfig;
use rollcall_core::Credentials;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Biometric terminal integration and attendance engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Receive pushed events, reconcile terminals, classify attendance
    Serve,
    /// Enroll a subject's face on a terminal
    Enroll {
        device: String,
        subject: String,
        /// Display name stored on the terminal
        #[arg(long)]
        name: Option<String>,
    },
    /// Recompute entry/exit directions from stored events
    Rederive {
        device: String,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Read device info and capability flags
    Probe { device: String },
    /// Manage registered terminals
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Register or update a terminal
    Add {
        id: String,
        /// Base URL, e.g. http://10.0.4.21
        address: String,
        #[arg(long, env = "ROLLCALL_DEVICE_USER", default_value = "admin")]
        username: String,
        #[arg(long, env = "ROLLCALL_DEVICE_PASSWORD", hide_env_values = true)]
        password: String,
        /// digest or basic
        #[arg(long, default_value = "digest")]
        auth: String,
        #[arg(long, default_value = "")]
        name: String,
    },
    /// List enabled terminals
    List,
    /// Delete a terminal
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "rollcall=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let app = App::open(ServiceConfig::from_env()?).await?;

    match cli.command {
        Command::Serve => app.serve().await,
        Command::Enroll { device, subject, name } => app.enroll(&device, &subject, name).await,
        Command::Rederive { device, subject } => app.rederive(&device, subject.as_deref()).await,
        Command::Probe { device } => app.probe(&device).await,
        Command::Device { action } => match action {
            DeviceAction::Add {
                id,
                address,
                username,
                password,
                auth,
                name,
            } => {
                app.add_device(&id, &address, Credentials::new(username, password), &auth, &name)
                    .await
            }
            DeviceAction::List => app.list_devices().await,
            DeviceAction::Remove { id } => app.remove_device(&id).await,
        },
    }
}

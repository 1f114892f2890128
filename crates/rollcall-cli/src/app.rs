//! Wiring of the engine components over one database and one session registry.

use crate::config::ServiceConfig;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use rollcall_core::{AuthMode, Credentials, DeviceId, DeviceProfile, SubjectId, SystemClock};
use rollcall_device::SessionManager;
use rollcall_enrollment::{EnrollmentOrchestrator, EnrollmentOutcome, EnrollmentRequest};
use rollcall_ingest::{IngestPipeline, IngestWorker, Reconciler};
use rollcall_network::{HttpTransportFactory, KnownDevices, WebhookReceiver};
use rollcall_protocol::Feature;
use rollcall_storage::{
    Database, DeviceRecord, DeviceRepository, SqliteDeviceRepository, SqliteEnrollmentRepository,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

type Sessions = SessionManager<HttpTransportFactory, SystemClock>;

pub struct App {
    config: ServiceConfig,
    db: Database,
    devices: SqliteDeviceRepository,
    sessions: Arc<Sessions>,
}

impl App {
    /// Open the database and register every enabled terminal.
    pub async fn open(config: ServiceConfig) -> Result<Self> {
        let db = Database::open(config.database.clone())
            .await
            .with_context(|| format!("opening database {}", config.database.location))?;
        let devices = SqliteDeviceRepository::new(db.pool().clone());
        let sessions = Arc::new(SessionManager::new(
            HttpTransportFactory::new(config.transport.clone()),
            SystemClock,
            config.capability.clone(),
        ));

        let records = devices.list_enabled().await?;
        for record in &records {
            if let Err(err) = sessions.register(record.profile()) {
                warn!(device_id = %record.id, error = %err, "Skipping terminal");
            }
        }
        info!(devices = sessions.len(), "Terminals registered");

        Ok(Self {
            config,
            db,
            devices,
            sessions,
        })
    }

    fn orchestrator(&self) -> EnrollmentOrchestrator<HttpTransportFactory, SystemClock, SqliteEnrollmentRepository> {
        EnrollmentOrchestrator::new(
            self.sessions.clone(),
            SqliteEnrollmentRepository::new(self.db.pool().clone()),
            self.config.enrollment.clone(),
        )
    }

    fn pipeline(&self) -> Arc<IngestPipeline> {
        Arc::new(IngestPipeline::new(&self.db, self.config.ingest.clone()))
    }

    /// Run the webhook receiver, the ingest worker and the reconciler until Ctrl-C.
    pub async fn serve(&self) -> Result<()> {
        let recovered = self.orchestrator().recover().await?;
        if recovered > 0 {
            warn!(sessions = recovered, "Failed enrollments left over from a previous run");
        }

        let pipeline = self.pipeline();
        let (sender, receiver) = mpsc::channel(self.config.ingest.queue_capacity);
        let known: Arc<dyn KnownDevices> = self.sessions.clone();
        let webhook = WebhookReceiver::new(self.config.webhook.clone(), sender).with_known_devices(known);
        let worker = IngestWorker::new(pipeline.clone());
        let reconciler = Reconciler::new(self.sessions.clone(), pipeline, self.config.reconciler.clone());

        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

        // the worker drains the queue until the webhook returns and drops its sender
        let (served, stats, ()) = tokio::join!(
            async {
                let served = webhook.serve(cancel.clone().cancelled_owned()).await;
                if served.is_err() {
                    cancel.cancel();
                }
                served
            },
            worker.run(receiver),
            async {
                reconciler.reconcile_all().await;
                reconciler.run(cancel.clone()).await;
            },
        );
        info!(payloads = stats.payloads, inserted = stats.inserted, "Service stopped");
        served.context("webhook receiver")
    }

    /// Enroll one subject, cancelling the session on Ctrl-C.
    pub async fn enroll(&self, device: &str, subject: &str, name: Option<String>) -> Result<()> {
        let device_id = DeviceId::new(device)?;
        let subject_id = SubjectId::new(subject)?;
        let mut request = EnrollmentRequest::new(device_id.clone(), subject_id.clone());
        if let Some(name) = name {
            request = request.with_name(name);
        }

        let orchestrator = self.orchestrator();
        orchestrator.recover_expired().await?;
        let cancel_on_signal = async {
            if tokio::signal::ctrl_c().await.is_ok() {
                orchestrator.cancel(&device_id, &subject_id);
            }
            std::future::pending::<Infallible>().await
        };
        let outcome = tokio::select! {
            outcome = orchestrator.enroll(request) => outcome?,
            never = cancel_on_signal => match never {},
        };

        match outcome {
            EnrollmentOutcome::Bound {
                session_id,
                face_url,
                attempts,
            } => {
                println!("enrolled {subject_id} on {device_id} (session {session_id}, {attempts} attempts)");
                println!("face: {face_url}");
                Ok(())
            }
            EnrollmentOutcome::Failed(failure) => {
                println!(
                    "enrollment {} failed at {}: {}",
                    failure.session_id, failure.furthest_stage, failure.error
                );
                for (i, error) in failure.error_chain.iter().enumerate() {
                    println!("  {}. {error}", i + 1);
                }
                bail!("enrollment failed")
            }
        }
    }

    /// Recompute directions for a device, or for one subject on it.
    pub async fn rederive(&self, device: &str, subject: Option<&str>) -> Result<()> {
        let device_id = DeviceId::new(device)?;
        let pipeline = self.pipeline();
        let changes = match subject {
            Some(subject) => pipeline.rederive_partition(&device_id, &SubjectId::new(subject)?).await?,
            None => pipeline.rederive_device(&device_id).await?,
        };
        for change in &changes {
            println!("event {}: {:?} -> {:?}", change.id, change.from, change.to);
        }
        println!("{} events corrected", changes.len());
        Ok(())
    }

    /// Print model, firmware and advertised features of a terminal.
    pub async fn probe(&self, device: &str) -> Result<()> {
        let device_id = DeviceId::new(device)?;
        let info = self.sessions.acquire(&device_id)?.probe().await?;
        println!("model:    {}", info.model);
        println!("name:     {}", info.name.as_deref().unwrap_or("-"));
        println!("serial:   {}", info.serial_number.as_deref().unwrap_or("-"));
        println!("firmware: {}", info.firmware_version.as_deref().unwrap_or("-"));
        for feature in Feature::ALL {
            let supported = self.sessions.supports(&device_id, feature).await?;
            println!("{:<13} {}", feature.as_str(), if supported { "yes" } else { "no" });
        }
        Ok(())
    }

    pub async fn add_device(
        &self,
        id: &str,
        address: &str,
        credentials: Credentials,
        auth: &str,
        name: &str,
    ) -> Result<()> {
        let profile = DeviceProfile::new(DeviceId::new(id)?, address, credentials).with_auth_mode(AuthMode::parse(auth)?);
        self.devices.upsert(&DeviceRecord::new(profile, name, Utc::now())).await?;
        println!("saved {id}");
        Ok(())
    }

    pub async fn list_devices(&self) -> Result<()> {
        for device in self.devices.list_enabled().await? {
            println!("{:<16} {:<28} {:<7} {}", device.id, device.address, device.auth_mode.as_str(), device.name);
        }
        Ok(())
    }

    pub async fn remove_device(&self, id: &str) -> Result<()> {
        if !self.devices.delete(&DeviceId::new(id)?).await? {
            bail!("no terminal {id}");
        }
        println!("removed {id}");
        Ok(())
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => warn!(error = %err, "Cannot listen for Ctrl-C, stopping"),
    }
    cancel.cancel();
}

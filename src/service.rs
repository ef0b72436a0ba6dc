//! Poll service actor
//!
//! The poller and its socket are single-owner. `PollService` owns them on
//! one task, runs a cycle on every interval tick and serializes writes and
//! queries arriving through cloneable [`PollHandle`]s, so a write can never
//! interleave with an in-flight read.

use crate::catalog::SensorCatalog;
use crate::connection::HealthSnapshot;
use crate::error::{HeatlinkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::poller::{Poller, Readings};
use crate::sink::ReadingSink;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};

/// Commands accepted by the service
pub enum PollCommand {
    Write {
        name: String,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Health {
        reply: oneshot::Sender<HealthSnapshot>,
    },
    ReadNow {
        reply: oneshot::Sender<Readings>,
    },
    ReplaceCatalog {
        catalog: SensorCatalog,
    },
    Shutdown,
}

fn stopped() -> HeatlinkError {
    HeatlinkError::connection("Poll service is not running")
}

#[derive(Clone)]
pub struct PollHandle {
    tx: mpsc::UnboundedSender<PollCommand>,
}

impl PollHandle {
    fn send(&self, command: PollCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| stopped())
    }

    pub async fn write(&self, name: &str, value: Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(PollCommand::Write {
            name: name.to_string(),
            value,
            reply,
        })?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn health(&self) -> Result<HealthSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(PollCommand::Health { reply })?;
        rx.await.map_err(|_| stopped())
    }

    /// Run a cycle immediately and return its readings
    pub async fn read_now(&self) -> Result<Readings> {
        let (reply, rx) = oneshot::channel();
        self.send(PollCommand::ReadNow { reply })?;
        rx.await.map_err(|_| stopped())
    }

    pub fn replace_catalog(&self, catalog: SensorCatalog) -> Result<()> {
        self.send(PollCommand::ReplaceCatalog { catalog })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(PollCommand::Shutdown)
    }
}

pub struct PollService {
    poller: Poller,
    sink: Box<dyn ReadingSink>,
    interval: Duration,
    commands: mpsc::UnboundedReceiver<PollCommand>,
    logger: StructuredLogger,
}

impl PollService {
    pub fn new(
        poller: Poller,
        sink: Box<dyn ReadingSink>,
        interval: Duration,
    ) -> (Self, PollHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let service = Self {
            poller,
            sink,
            interval,
            commands,
            logger: get_logger("service"),
        };
        (service, PollHandle { tx })
    }

    /// Run until shut down or every handle is dropped; hands the poller back
    pub async fn run(mut self) -> Poller {
        self.logger.info(&format!(
            "Polling {} every {}ms",
            self.poller.connection().endpoint(),
            self.interval.as_millis()
        ));
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_cycle().await;
                }
                command = self.commands.recv() => match command {
                    Some(PollCommand::Shutdown) | None => {
                        self.logger.info("Shutdown requested");
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
            }
        }

        self.poller.close().await;
        self.poller
    }

    async fn poll_cycle(&mut self) -> Readings {
        let started = Instant::now();
        let readings = self.poller.read_sensors().await;
        self.logger.debug(&format!(
            "Poll cycle: {} values in {}ms",
            readings.len(),
            started.elapsed().as_millis()
        ));
        if !readings.is_empty()
            && let Err(e) = self.sink.publish(&readings).await
        {
            self.logger.error(&format!("Failed to publish readings: {}", e));
        }
        readings
    }

    async fn handle_command(&mut self, command: PollCommand) {
        match command {
            PollCommand::Write { name, value, reply } => {
                let result = self.poller.write_sensor(&name, &value).await;
                let _ = reply.send(result);
            }
            PollCommand::Health { reply } => {
                let _ = reply.send(self.poller.health());
            }
            PollCommand::ReadNow { reply } => {
                let readings = self.poll_cycle().await;
                let _ = reply.send(readings);
            }
            PollCommand::ReplaceCatalog { catalog } => {
                self.poller.replace_catalog(catalog);
            }
            PollCommand::Shutdown => {}
        }
    }
}

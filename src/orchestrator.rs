//! Wires listeners, filters, transforms, and forwarders together and drives
//! the relay through an explicit Stopped/Starting/Running/Stopping lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::filter::FilterEngine;
use crate::http::HttpServer;
use crate::listener::{self, ReceivedMessage};
use crate::message::SyslogMessage;
use crate::metrics::Metrics;
use crate::output::Forwarder;
use crate::transform::Transformer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Owns every long-running component of the relay and coordinates their lifecycle.
pub struct RelayService {
    config: Config,
    metrics: Arc<Metrics>,
    filter_engine: Arc<FilterEngine>,
    transformer: Arc<Transformer>,
    forwarders: Arc<HashMap<String, Forwarder>>,
    state: State,
    metrics_task: Option<(JoinHandle<()>, watch::Sender<bool>)>,
    listener_tasks: Vec<JoinHandle<()>>,
    processing_task: Option<JoinHandle<()>>,
}

impl RelayService {
    pub fn new(config: Config) -> Result<Self, RelayError> {
        let metrics = Arc::new(Metrics::new());
        let filter_engine = Arc::new(FilterEngine::new(&config.filters, metrics.clone())?);
        let transformer = Arc::new(Transformer::new(&config.transforms).map_err(RelayError::from)?);

        let mut forwarders = HashMap::new();
        for dest in &config.destinations {
            forwarders.insert(dest.name.clone(), Forwarder::new(dest, metrics.clone())?);
        }

        Ok(Self {
            config,
            metrics,
            filter_engine,
            transformer,
            forwarders: Arc::new(forwarders),
            state: State::Stopped,
            metrics_task: None,
            listener_tasks: Vec::new(),
            processing_task: None,
        })
    }

    /// Start the metrics endpoint, connect every output, then start every input.
    pub async fn start(&mut self) -> Result<(), RelayError> {
        self.state = State::Starting;
        info!(
            inputs = self.config.inputs.len(),
            destinations = self.config.destinations.len(),
            filters = self.config.filters.len(),
            "starting syslog relay"
        );

        if self.config.service.metrics.enabled {
            let addr = self.config.service.metrics.address.parse().map_err(|_| {
                RelayError::config(format!(
                    "invalid service.metrics.address '{}'",
                    self.config.service.metrics.address
                ))
            })?;
            let metrics = self.metrics.clone();
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(async move {
                let server = HttpServer::new(metrics, addr);
                if let Err(e) = server.run(shutdown_rx).await {
                    warn!(error = %e, "metrics server exited");
                }
            });
            self.metrics_task = Some((handle, shutdown_tx));
        }

        for forwarder in self.forwarders.values() {
            forwarder.connect().await;
        }

        let (mut rx, listener_tasks) =
            listener::start_listeners(&self.config.inputs, self.metrics.clone()).await?;
        self.listener_tasks = listener_tasks;

        let filter_engine = self.filter_engine.clone();
        let transformer = self.transformer.clone();
        let forwarders = self.forwarders.clone();

        self.processing_task = Some(tokio::spawn(async move {
            while let Some(received) = rx.recv().await {
                handle_message(received, &filter_engine, &transformer, &forwarders).await;
            }
            debug!("message processing loop ended: all listeners stopped");
        }));

        self.state = State::Running;
        info!("syslog relay started");
        Ok(())
    }

    /// Stop inputs, disconnect outputs, then stop the metrics endpoint. Idempotent.
    pub async fn stop(&mut self) {
        self.state = State::Stopping;
        info!("stopping syslog relay");

        for task in self.listener_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.processing_task.take() {
            task.abort();
        }

        for forwarder in self.forwarders.values() {
            forwarder.disconnect().await;
        }

        if let Some((task, shutdown_tx)) = self.metrics_task.take() {
            let _ = shutdown_tx.send(true);
            let _ = task.await;
        }

        self.state = State::Stopped;
        info!("syslog relay stopped");
    }

    /// Run until SIGTERM or SIGINT is received, then shut down.
    pub async fn run_forever(mut self) -> Result<(), RelayError> {
        self.start().await?;

        let mut sigterm = signal(SignalKind::terminate()).map_err(RelayError::Io)?;
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for SIGINT");
                }
                info!("received SIGINT");
            }
        }

        self.stop().await;
        Ok(())
    }
}

async fn handle_message(
    received: ReceivedMessage,
    filter_engine: &FilterEngine,
    transformer: &Transformer,
    forwarders: &HashMap<String, Forwarder>,
) {
    let ReceivedMessage { message, input_name } = received;
    let result = filter_engine.evaluate(&message);

    if !result.matched || result.destinations.is_empty() {
        debug!(input = %input_name, filter = ?result.filter_name, "message dropped");
        return;
    }

    let outgoing: SyslogMessage = if result.transforms.is_empty() {
        message
    } else {
        transformer.transform(&message, Some(&result.transforms))
    };

    for dest_name in &result.destinations {
        let Some(forwarder) = forwarders.get(dest_name) else {
            warn!(destination = %dest_name, "filter references a destination with no forwarder");
            continue;
        };
        if let Err(e) = forwarder.send_with_retry(&outgoing).await {
            warn!(destination = %dest_name, error = %e, "failed to forward message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DestinationConfig, FilterAction, FilterConfig, LogFormat, MetricsConfig, Protocol, RetryConfig, ServiceConfig,
    };
    use crate::message::MessageFormat;

    fn config_with_one_udp_destination(port: u16) -> Config {
        Config {
            version: "1".to_string(),
            inputs: Vec::new(),
            transforms: Vec::new(),
            filters: vec![FilterConfig {
                name: "default".to_string(),
                match_: None,
                action: FilterAction::Forward,
                destinations: Some(vec!["central".to_string()]),
                transforms: None,
            }],
            destinations: vec![DestinationConfig {
                name: "central".to_string(),
                protocol: Protocol::Udp,
                address: format!("127.0.0.1:{port}"),
                format: MessageFormat::Rfc5424,
                retry: RetryConfig { max_attempts: 1, backoff_seconds: 0.01 },
            }],
            service: ServiceConfig {
                log_level: "info".to_string(),
                log_format: LogFormat::Text,
                metrics: MetricsConfig { enabled: false, address: "0.0.0.0:0".to_string() },
            },
        }
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_clears_tasks() {
        let mut service = RelayService::new(config_with_one_udp_destination(19001)).unwrap();
        service.start().await.unwrap();
        assert_eq!(service.state, State::Running);
        service.stop().await;
        assert_eq!(service.state, State::Stopped);
        assert!(service.listener_tasks.is_empty());
        assert!(service.processing_task.is_none());
    }

    #[tokio::test]
    async fn handle_message_forwards_to_matching_destination() {
        let service = RelayService::new(config_with_one_udp_destination(19002)).unwrap();
        for forwarder in service.forwarders.values() {
            forwarder.connect().await;
        }
        let msg = crate::parser::parse(b"<34>1 - - - - - - hi").unwrap();
        let received = ReceivedMessage { message: msg, input_name: "test".to_string() };
        handle_message(received, &service.filter_engine, &service.transformer, &service.forwarders).await;
    }
}

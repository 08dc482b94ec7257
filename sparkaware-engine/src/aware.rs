use std::sync::Arc;

use log::info;
use sparkaware_broker::DynEventSource;
use tokio::{select, sync::mpsc, time};

use crate::engine::Engine;

#[derive(Debug)]
struct Shutdown;

/// A handle for interacting with a running [SparkplugAware] instance.
#[derive(Clone)]
pub struct AwareHandle {
    engine: Arc<Engine>,
    stop_tx: mpsc::Sender<Shutdown>,
}

impl AwareHandle {
    /// Stop accepting events and cancel [SparkplugAware::run()].
    ///
    /// In-flight transitions complete before the run loop exits; half-applied
    /// transitions would corrupt session state.
    pub async fn cancel(&self) {
        if !self.engine.is_accepting() {
            return;
        }
        info!("sparkplug awareness stopping");
        self.engine.begin_shutdown();
        _ = self.stop_tx.send(Shutdown).await;
    }

    /// The underlying engine, for inspection or direct event submission.
    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }
}

/// Drives the session engine from a broker event feed.
///
/// Hosts that can deliver events and apply dispositions directly should call
/// [Engine::process_event] instead and use this only for the background sweep.
pub struct SparkplugAware {
    engine: Arc<Engine>,
    source: Box<DynEventSource>,
    sweep_interval: time::Duration,
    stop_rx: mpsc::Receiver<Shutdown>,
}

impl SparkplugAware {
    pub(crate) fn new(
        engine: Arc<Engine>,
        source: Box<DynEventSource>,
        sweep_interval: time::Duration,
    ) -> (Self, AwareHandle) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let handle = AwareHandle {
            engine: engine.clone(),
            stop_tx,
        };
        (
            Self {
                engine,
                source,
                sweep_interval,
                stop_rx,
            },
            handle,
        )
    }

    pub async fn run(&mut self) {
        let mut sweep = time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            select! {
                event = self.source.poll() => match event {
                    Some(event) => {
                        _ = self.engine.process_event(event).await;
                    }
                    None => {
                        info!("broker event feed closed");
                        break;
                    }
                },
                _ = sweep.tick() => self.engine.sweep().await,
                _ = self.stop_rx.recv() => break,
            }
        }
        self.engine.begin_shutdown();
    }
}

//! Suspend/resume coordination
//!
//! Consumes the sleep/wake event stream (boolean payload, `true` = entering
//! sleep) and gates the update cycle around it: a sleep event cancels the
//! running cycle so every hardware override is rolled back before the
//! system suspends, and only an explicit wake event starts a fresh cycle.
//! Each cycle start re-reads the config file and re-discovers devices from
//! scratch - the device set, driver defaults, and the config itself may
//! have changed across the suspend.
//!
//! Cycle completion alone never re-arms a restart: wake must always follow
//! sleep logically, even when cancellation races with the event stream.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gpc_core::DeviceConfig;

use crate::update_cycle::{run_update_cycle, CancelToken, CycleSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerState {
    Awake,
    EnteringSleep,
}

/// Drives update cycles across sleep/wake boundaries until shutdown
pub struct SuspendCoordinator {
    config_path: PathBuf,
    /// Last successfully loaded config, reused when a reload fails
    configs: Arc<Vec<DeviceConfig>>,
    settings: CycleSettings,
    events: mpsc::Receiver<bool>,
    shutdown: CancelToken,
}

impl SuspendCoordinator {
    pub fn new(
        config_path: PathBuf,
        configs: Arc<Vec<DeviceConfig>>,
        settings: CycleSettings,
        events: mpsc::Receiver<bool>,
        shutdown: CancelToken,
    ) -> Self {
        Self {
            config_path,
            configs,
            settings,
            events,
            shutdown,
        }
    }

    /// Re-read the config at a cycle start; a failure here is not fatal,
    /// the previous sections keep applying
    fn reload_config(&mut self) {
        match gpc_core::load_config(&self.config_path) {
            Ok(configs) => self.configs = Arc::new(configs),
            Err(e) => warn!(
                "Could not reload configuration {:?}: {} - keeping previous sections",
                self.config_path, e
            ),
        }
    }

    /// Run until the shutdown token is cancelled
    ///
    /// Returns only after the current cycle (if any) has finished its
    /// restoration path.
    pub async fn run(mut self) {
        let mut state = PowerState::Awake;
        let mut events_open = true;

        loop {
            match state {
                PowerState::Awake => {
                    self.reload_config();

                    info!("Starting update cycle");
                    let cycle_cancel = CancelToken::new();
                    let cycle = tokio::spawn(run_update_cycle(
                        self.configs.clone(),
                        self.settings.clone(),
                        cycle_cancel.clone(),
                    ));

                    loop {
                        tokio::select! {
                            event = self.events.recv(), if events_open => match event {
                                Some(true) => {
                                    info!("Preparing for sleep");
                                    state = PowerState::EnteringSleep;
                                    cycle_cancel.cancel();
                                    break;
                                }
                                Some(false) => {
                                    // Already awake; nothing to do
                                }
                                None => {
                                    warn!("Sleep event channel closed, suspend handling disabled");
                                    events_open = false;
                                }
                            },
                            _ = self.shutdown.cancelled() => {
                                cycle_cancel.cancel();
                                break;
                            }
                        }
                    }

                    // Restoration must complete before we suspend or exit
                    if let Err(e) = cycle.await {
                        error!("Update cycle task failed: {}", e);
                    }

                    if self.shutdown.is_cancelled() {
                        info!("Stopped update loop");
                        return;
                    }
                }
                PowerState::EnteringSleep => {
                    tokio::select! {
                        event = self.events.recv(), if events_open => match event {
                            Some(false) => {
                                info!("Woke up");
                                state = PowerState::Awake;
                            }
                            Some(true) => {
                                // Repeated sleep notification; stay put
                            }
                            None => {
                                warn!("Sleep event channel closed while suspended, \
                                       update cycle will not restart");
                                events_open = false;
                            }
                        },
                        _ = self.shutdown.cancelled() => return,
                    }
                }
            }
        }
    }
}

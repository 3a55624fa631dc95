use log::warn;
use serde::Serialize;
use tokio::sync::mpsc;

/// Commands emitted to the overlay/notification/audio executor.
///
/// The engine only decides; rendering happens on the other side of this
/// channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum EffectCommand {
    ShowBlocker {
        message: String,
        app_name: String,
        countdown_secs: u32,
    },
    HideBlocker,
    SuppressNotifications,
    RestoreNotifications,
    TriggerSoftReset {
        duration_secs: u32,
    },
    CloseAppOrTab {
        identifier: String,
    },
}

#[derive(Clone)]
pub struct EffectBus {
    tx: mpsc::UnboundedSender<EffectCommand>,
}

impl EffectBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EffectCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Best-effort: a detached executor must never stall the engine.
    pub fn emit(&self, command: EffectCommand) {
        if self.tx.send(command).is_err() {
            warn!("effect executor detached; command dropped");
        }
    }
}

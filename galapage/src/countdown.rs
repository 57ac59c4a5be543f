//! Compte à rebours de la page
//!
//! Démarre une seule fois, publie les secondes restantes via un `watch` et
//! appelle le hook de fin exactement une fois en arrivant à zéro.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;

const TICK: Duration = Duration::from_secs(1);

type CompletionHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CountdownState {
    pub remaining: u64,
    pub started: bool,
    pub completed: bool,
}

pub struct Countdown {
    initial: u64,
    started: AtomicBool,
    state: watch::Sender<CountdownState>,
    on_complete: Mutex<Option<CompletionHook>>,
    cancel: CancellationToken,
}

impl Countdown {
    /// `cancel` arrête le décompte en cours (fermeture de la session)
    pub fn new(seconds: u64, cancel: CancellationToken) -> Arc<Self> {
        let (state, _) = watch::channel(CountdownState {
            remaining: seconds,
            started: false,
            completed: false,
        });
        Arc::new(Self {
            initial: seconds,
            started: AtomicBool::new(false),
            state,
            on_complete: Mutex::new(None),
            cancel,
        })
    }

    /// Installe le hook appelé à zéro. Remplace le précédent.
    pub fn on_complete(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_complete.lock() = Some(Box::new(hook));
    }

    pub fn state(&self) -> CountdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.state.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Lance le décompte. Renvoie `false` s'il était déjà lancé.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Countdown already started, ignoring");
            return false;
        }

        info!("⏳ Countdown started ({} s)", self.initial);
        self.state.send_modify(|s| {
            s.started = true;
            s.remaining = self.initial;
        });

        let this = self.clone();
        tokio::spawn(async move { this.run().await });
        true
    }

    async fn run(&self) {
        let mut remaining = self.initial;
        while remaining > 0 {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(remaining, "Countdown cancelled");
                    return;
                }
                _ = tokio::time::sleep(TICK) => {}
            }
            remaining -= 1;
            self.state.send_modify(|s| {
                s.remaining = remaining;
                s.completed = remaining == 0;
            });
        }

        if self.initial == 0 {
            self.state.send_modify(|s| s.completed = true);
        }
        info!("🎉 Countdown complete");

        let hook = self.on_complete.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

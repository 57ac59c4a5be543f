//! Zone de déclenchement au défilement
//!
//! La zone ne connaît pas le compte à rebours : on lui injecte un
//! [`StartSignal`] qu'elle déclenche quand le visiteur y entre.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Point d'entrée unique "démarrer le compte à rebours"
///
/// La fonction injectée doit être idempotente ; elle renvoie `true`
/// seulement quand l'appel a réellement démarré quelque chose.
#[derive(Clone)]
pub struct StartSignal(Arc<dyn Fn() -> bool + Send + Sync>);

impl StartSignal {
    pub fn new(start: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(start))
    }

    pub fn fire(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for StartSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StartSignal")
    }
}

#[derive(Debug)]
pub struct TriggerZone {
    signal: StartSignal,
    entered: AtomicBool,
}

impl TriggerZone {
    pub fn new(signal: StartSignal) -> Self {
        Self {
            signal,
            entered: AtomicBool::new(false),
        }
    }

    /// Entrée par le haut. Seule la première entrée déclenche le signal.
    pub fn enter(&self) -> bool {
        if self.entered.swap(true, Ordering::SeqCst) {
            return false;
        }
        debug!("Trigger zone entered");
        self.signal.fire()
    }

    /// Retour dans la zone en remontant : déclenche toujours le signal.
    pub fn enter_back(&self) -> bool {
        self.entered.store(true, Ordering::SeqCst);
        debug!("Trigger zone entered back");
        self.signal.fire()
    }

    pub fn has_been_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

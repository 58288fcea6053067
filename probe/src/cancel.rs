use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::signal;

/// Process-wide stop flag: written by the interrupt task, polled by the
/// session at the top of each probe iteration. Repeated interrupts are
/// harmless.
#[derive(Clone)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Arm Ctrl-C delivery. The task loops so the handler stays armed after
/// each delivery; the session keeps running until it polls the token.
pub fn spawn_interrupt_handler(token: CancelToken) {
    tokio::spawn(async move {
        loop {
            match signal::ctrl_c().await {
                Ok(()) => {
                    // Print on a new line, some terminals echo "^C" first
                    println!("\nCtrl-C received, stopping");
                    token.cancel();
                }
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_idempotent_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("message sink rejected the message: {0}")]
    Rejected(String),
    #[error("message sink unreachable: {0}")]
    Transport(String),
}

/// Fire-and-forget text sink. The engine logs failures and carries on.
pub trait Notifier {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError> {
        (**self).send(text, silent)
    }
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError> {
        (**self).send(text, silent)
    }
}

/// Prints messages instead of delivering them. Silent messages are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunNotifier;

impl Notifier for DryRunNotifier {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError> {
        if !silent {
            println!("{text}");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub text: String,
    pub silent: bool,
}

/// Records every delivery; used by tests and by callers that batch output.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records nothing and fails every send.
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .map(|delivery| delivery.text)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, text: &str, silent: bool) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("sink offline".to_string()));
        }
        let mut guard = self
            .deliveries
            .lock()
            .map_err(|_| NotifyError::Rejected("recorder poisoned".to_string()))?;
        guard.push(Delivery {
            text: text.to_string(),
            silent,
        });
        Ok(())
    }
}

//! Demo business object hosted by the `lamp` subcommand.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// A named lamp that starts switched off.
pub struct Lamp {
    name: String,
    on: AtomicBool,
}

impl Lamp {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        info!("Lamp '{}' created, initial state: OFF", name);
        Self {
            name,
            on: AtomicBool::new(false),
        }
    }

    /// Flip the lamp and describe its new state.
    pub fn toggle(&self) -> String {
        let on = !self.on.fetch_xor(true, Ordering::SeqCst);
        let state = if on { "ON" } else { "OFF" };
        info!("Lamp '{}' toggled to: {}", self.name, state);
        format!("Lamp '{}' is now {}", self.name, state)
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

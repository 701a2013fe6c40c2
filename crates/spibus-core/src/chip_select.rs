//! Chip-select control
//!
//! Transfers are split into several primitive calls, and many controllers
//! toggle chip-select between calls on their own. Some peripherals do not
//! tolerate that, so a session can be given a [`ChipSelect`] hook that holds
//! chip-select asserted across the whole logical transfer.

use std::fmt;
use std::io;

/// Capability that drives the chip-select signal
pub trait ChipSelect: Send {
    /// Assert (`true`) or deassert (`false`) chip-select
    fn set(&mut self, asserted: bool) -> io::Result<()>;
}

impl<F> ChipSelect for F
where
    F: FnMut(bool) -> io::Result<()> + Send,
{
    fn set(&mut self, asserted: bool) -> io::Result<()> {
        self(asserted)
    }
}

/// How chip-select is handled for a session
#[derive(Default)]
pub enum ChipSelectControl {
    /// Managed by the kernel driver or external hardware
    #[default]
    External,
    /// Driven by the session through a hook
    Hook(Box<dyn ChipSelect>),
}

impl ChipSelectControl {
    /// Wrap a chip-select hook
    pub fn hook(cs: impl ChipSelect + 'static) -> Self {
        Self::Hook(Box::new(cs))
    }

    /// Whether chip-select is left to the kernel or hardware
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }

    /// Drive chip-select; a no-op that succeeds when external
    pub fn set(&mut self, asserted: bool) -> io::Result<()> {
        match self {
            Self::External => Ok(()),
            Self::Hook(cs) => cs.set(asserted),
        }
    }
}

impl fmt::Debug for ChipSelectControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::External => f.write_str("External"),
            Self::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

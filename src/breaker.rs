//! Global pause flag gating every mutating operation
use crate::error::{CustodyError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum BreakerState {
    #[default]
    #[n(0)]
    Running,
    #[n(1)]
    Paused,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CircuitBreaker {
    #[n(0)]
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.state == BreakerState::Paused
    }

    /// First guard of every mutating operation other than `unpause`.
    pub fn ensure_running(&self) -> Result<()> {
        match self.state {
            BreakerState::Running => Ok(()),
            BreakerState::Paused => Err(CustodyError::Paused),
        }
    }

    // pausing while paused is an operator error, not a no-op
    pub fn pause(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.state = BreakerState::Paused;
        Ok(())
    }

    pub fn unpause(&mut self) -> Result<()> {
        if self.state == BreakerState::Running {
            return Err(CustodyError::NotPaused);
        }
        self.state = BreakerState::Running;
        Ok(())
    }
}

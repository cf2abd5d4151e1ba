//! Argument value types shared by CLI commands.

use crate::domain::ResourceState;
use clap::ValueEnum;

/// Resource state filter accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    /// Not yet synced.
    Unknown,

    /// Matches desired state.
    Healthy,

    /// Diverged from desired state.
    Drift,

    /// Soft-deleted.
    Deleted,
}

impl From<StateArg> for ResourceState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Unknown => ResourceState::Unknown,
            StateArg::Healthy => ResourceState::Healthy,
            StateArg::Drift => ResourceState::Drift,
            StateArg::Deleted => ResourceState::Deleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_arg_maps_to_domain_state() {
        assert_eq!(ResourceState::from(StateArg::Drift), ResourceState::Drift);
        assert_eq!(
            ResourceState::from(StateArg::Deleted),
            ResourceState::Deleted
        );
    }
}

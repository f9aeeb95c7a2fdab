//! Pre-flight confirmation for destructive action variants
//!
//! Force and skip variants remove links the user may want to keep, so they
//! are parked until the user explicitly confirms. Safe variants pass through.

use crate::models::ResolveRequest;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Open a session with this request now
    Proceed(ResolveRequest),
    /// Request parked; call `confirm` or `cancel`
    AwaitingConfirmation,
}

#[derive(Debug, Default)]
enum GateState {
    #[default]
    Idle,
    Pending(ResolveRequest),
    Confirmed,
}

#[derive(Debug, Default)]
pub struct ConfirmationGate {
    state: GateState,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a request through the gate
    ///
    /// A newly submitted destructive request replaces any parked one.
    pub fn submit(&mut self, request: ResolveRequest) -> GateDecision {
        if !request.action.requires_confirmation() {
            return GateDecision::Proceed(request);
        }

        info!(
            path = %request.display_path(),
            action = %request.action,
            "Destructive action awaiting confirmation"
        );
        self.state = GateState::Pending(request);
        GateDecision::AwaitingConfirmation
    }

    /// Release the parked request; `None` if nothing is parked
    pub fn confirm(&mut self) -> Option<ResolveRequest> {
        match std::mem::take(&mut self.state) {
            GateState::Pending(request) => {
                info!(action = %request.action, "Destructive action confirmed");
                self.state = GateState::Confirmed;
                Some(request)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop the parked request with no side effects
    pub fn cancel(&mut self) {
        if let GateState::Pending(request) = std::mem::take(&mut self.state) {
            debug!(action = %request.action, "Destructive action cancelled");
        }
    }

    pub fn pending(&self) -> Option<&ResolveRequest> {
        match &self.state {
            GateState::Pending(request) => Some(request),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, GateState::Confirmed)
    }

    /// Question to show for the parked request
    pub fn prompt_text(&self) -> Option<String> {
        self.pending()
            .map(|r| r.action.confirmation_prompt(&r.display_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionVariant;

    #[test]
    fn test_safe_variant_proceeds() {
        let mut gate = ConfirmationGate::new();
        let request = ResolveRequest::new("/a.mkv");
        assert_eq!(
            gate.submit(request.clone()),
            GateDecision::Proceed(request)
        );
        assert!(gate.pending().is_none());
    }

    #[test]
    fn test_confirm_releases_once() {
        let mut gate = ConfirmationGate::new();
        let request = ResolveRequest::new("/a.mkv").with_action(ActionVariant::Skip);
        assert_eq!(gate.submit(request.clone()), GateDecision::AwaitingConfirmation);
        assert!(gate.prompt_text().unwrap().contains("skip"));

        assert_eq!(gate.confirm(), Some(request));
        assert!(gate.is_confirmed());
        assert_eq!(gate.confirm(), None);
    }

    #[test]
    fn test_cancel_drops_request() {
        let mut gate = ConfirmationGate::new();
        gate.submit(ResolveRequest::new("/a.mkv").with_action(ActionVariant::ForceShow));
        gate.cancel();
        assert!(gate.pending().is_none());
        assert_eq!(gate.confirm(), None);
        assert!(!gate.is_confirmed());
    }
}

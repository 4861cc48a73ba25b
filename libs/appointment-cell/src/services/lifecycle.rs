use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        Ok(())
    }

    /// All valid next statuses for a given current status. Cancellation is
    /// reachable from any active state; `cancelada` and `completada` are
    /// terminal.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ],
            AppointmentStatus::Cancelled => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn pending_can_confirm_cancel_or_complete() {
        let lifecycle = AppointmentLifecycleService::new();
        for target in [
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::Completed,
        ] {
            assert!(lifecycle
                .validate_status_transition(AppointmentStatus::Pending, target)
                .is_ok());
        }
    }

    #[test]
    fn confirmed_cannot_go_back_to_pending() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(
                AppointmentStatus::Confirmed,
                AppointmentStatus::Pending
            ),
            Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Confirmed))
        );
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        let lifecycle = AppointmentLifecycleService::new();
        for terminal in [AppointmentStatus::Cancelled, AppointmentStatus::Completed] {
            assert!(lifecycle.valid_transitions(terminal).is_empty());
            for target in [
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::Completed,
            ] {
                assert_matches!(
                    lifecycle.validate_status_transition(terminal, target),
                    Err(AppointmentError::InvalidStatusTransition(_))
                );
            }
        }
    }
}

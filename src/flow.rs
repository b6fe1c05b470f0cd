// =============================================================================
// BOOKING FLOW
// =============================================================================
// State machine for one booking attempt:
//
//   Idle -> Checking -> {Available, Unavailable}
//   Available -> Booking -> PaymentPending -> {PaymentSucceeded, PaymentCancelled}
//   Booking | PaymentSucceeded -> {Confirmed, Failed}
//
// Unavailable, Available and PaymentCancelled return to Idle on Reset.
// Confirmed and Failed are terminal.
// =============================================================================

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Checking,
    Available,
    Unavailable,
    Booking,
    PaymentPending,
    PaymentSucceeded,
    PaymentCancelled,
    Confirmed,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    CheckRequested,
    RangeAvailable,
    RangeUnavailable,
    MethodChosen,
    AwaitPayment,
    PaymentSucceeded,
    PaymentCancelled,
    Persisted,
    PersistFailed,
    Reset,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot apply {event:?} in state {from}")]
pub struct InvalidTransition {
    pub from: FlowState,
    pub event: FlowEvent,
}

/// One booking attempt. Every transition is logged at debug level with the
/// flow's label (room id, reference).
#[derive(Debug)]
pub struct BookingFlow {
    state: FlowState,
    label: String,
}

impl BookingFlow {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            state: FlowState::Idle,
            label: label.into(),
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Apply `event`, returning the new state. The state is unchanged when
    /// the transition is not allowed.
    pub fn apply(&mut self, event: FlowEvent) -> Result<FlowState, InvalidTransition> {
        let next = transition(self.state, event)?;
        tracing::debug!(
            flow = %self.label,
            from = %self.state,
            to = %next,
            event = ?event,
            "Booking flow transition"
        );
        self.state = next;
        Ok(next)
    }
}

/// Transition table. Anything not listed is invalid.
pub fn transition(from: FlowState, event: FlowEvent) -> Result<FlowState, InvalidTransition> {
    use FlowEvent as E;
    use FlowState as S;

    let next = match (from, event) {
        (S::Idle, E::CheckRequested) => S::Checking,
        (S::Checking, E::RangeAvailable) => S::Available,
        (S::Checking, E::RangeUnavailable) => S::Unavailable,
        (S::Unavailable | S::Available | S::PaymentCancelled, E::Reset) => S::Idle,
        (S::Available, E::MethodChosen) => S::Booking,
        (S::Booking, E::AwaitPayment) => S::PaymentPending,
        (S::Booking | S::PaymentSucceeded, E::Persisted) => S::Confirmed,
        (S::Booking | S::PaymentSucceeded, E::PersistFailed) => S::Failed,
        (S::PaymentPending, E::PaymentSucceeded) => S::PaymentSucceeded,
        (S::PaymentPending, E::PaymentCancelled) => S::PaymentCancelled,
        _ => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[FlowEvent]) -> Result<FlowState, InvalidTransition> {
        let mut flow = BookingFlow::new("test");
        let mut state = flow.state();
        for event in events {
            state = flow.apply(*event)?;
        }
        Ok(state)
    }

    #[test]
    fn paid_booking_reaches_confirmed() {
        use FlowEvent::*;
        let state = run(&[
            CheckRequested,
            RangeAvailable,
            MethodChosen,
            AwaitPayment,
            PaymentSucceeded,
            Persisted,
        ])
        .unwrap();
        assert_eq!(state, FlowState::Confirmed);
    }

    #[test]
    fn reservation_skips_payment() {
        use FlowEvent::*;
        let state = run(&[CheckRequested, RangeAvailable, MethodChosen, Persisted]).unwrap();
        assert_eq!(state, FlowState::Confirmed);
    }

    #[test]
    fn persistence_failure_after_payment_is_failed() {
        use FlowEvent::*;
        let state = run(&[
            CheckRequested,
            RangeAvailable,
            MethodChosen,
            AwaitPayment,
            PaymentSucceeded,
            PersistFailed,
        ])
        .unwrap();
        assert_eq!(state, FlowState::Failed);
    }

    #[test]
    fn cancelled_payment_returns_to_idle() {
        use FlowEvent::*;
        let state = run(&[
            CheckRequested,
            RangeAvailable,
            MethodChosen,
            AwaitPayment,
            PaymentCancelled,
            Reset,
        ])
        .unwrap();
        assert_eq!(state, FlowState::Idle);
    }

    #[test]
    fn unavailable_must_reset_before_booking() {
        use FlowEvent::*;
        let err = run(&[CheckRequested, RangeUnavailable, MethodChosen]).unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                from: FlowState::Unavailable,
                event: MethodChosen
            }
        );
        assert_eq!(
            run(&[CheckRequested, RangeUnavailable, Reset, CheckRequested]).unwrap(),
            FlowState::Checking
        );
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let events = [
            FlowEvent::CheckRequested,
            FlowEvent::RangeAvailable,
            FlowEvent::RangeUnavailable,
            FlowEvent::MethodChosen,
            FlowEvent::AwaitPayment,
            FlowEvent::PaymentSucceeded,
            FlowEvent::PaymentCancelled,
            FlowEvent::Persisted,
            FlowEvent::PersistFailed,
            FlowEvent::Reset,
        ];
        for terminal in [FlowState::Confirmed, FlowState::Failed] {
            for event in events {
                assert!(transition(terminal, event).is_err());
            }
        }
    }

    #[test]
    fn rejected_event_leaves_state_unchanged() {
        let mut flow = BookingFlow::new("test");
        assert!(flow.apply(FlowEvent::Persisted).is_err());
        assert_eq!(flow.state(), FlowState::Idle);
    }
}

//! State machine trait for status enums.

use super::ValidationError;

/// A status enum with an explicit transition table.
///
/// Implementors describe the table once (`can_transition_to` and
/// `valid_transitions` must agree) and get a validated `transition_to`.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if moving from `self` to `target` is allowed.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns every state reachable from the current one.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs the transition, or reports the rejected pair.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "status",
                format!("cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// A terminal state has no outgoing transitions.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Checkout {
        Open,
        Paid,
        Refunded,
        Expired,
    }

    impl StateMachine for Checkout {
        fn can_transition_to(&self, target: &Self) -> bool {
            use Checkout::*;
            matches!(
                (self, target),
                (Open, Paid) | (Open, Expired) | (Paid, Refunded)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use Checkout::*;
            match self {
                Open => vec![Paid, Expired],
                Paid => vec![Refunded],
                Refunded | Expired => vec![],
            }
        }
    }

    #[test]
    fn transition_to_accepts_listed_pair() {
        assert_eq!(Checkout::Open.transition_to(Checkout::Paid), Ok(Checkout::Paid));
    }

    #[test]
    fn transition_to_rejects_unlisted_pair() {
        let err = Checkout::Expired.transition_to(Checkout::Paid).unwrap_err();
        assert_eq!(err.field(), "status");
        assert!(err.to_string().contains("Expired"));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(Checkout::Refunded.is_terminal());
        assert!(Checkout::Expired.is_terminal());
        assert!(!Checkout::Open.is_terminal());
    }

    #[test]
    fn table_and_predicate_agree() {
        let all = [
            Checkout::Open,
            Checkout::Paid,
            Checkout::Refunded,
            Checkout::Expired,
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(&to),
                    from.valid_transitions().contains(&to),
                    "{:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }
}

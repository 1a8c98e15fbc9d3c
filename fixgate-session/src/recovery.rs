/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Sequence number recovery rules.
//!
//! Pure decisions about an inbound sequence number; the session turns them
//! into proxy calls and counter updates.

/// Outcome of comparing an inbound MsgSeqNum with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the expected number.
    Expected,
    /// Ahead of the expected number; `[expected, received - 1]` is missing.
    Gap {
        /// First missing number.
        expected: u64,
        /// Number that arrived.
        received: u64,
    },
    /// Behind the expected number but flagged as a retransmission.
    PossDup,
    /// Behind the expected number without PossDup.
    TooLow {
        /// Number we expected.
        expected: u64,
        /// Number that arrived.
        received: u64,
    },
    /// `last_received` is already `u64::MAX`; no further number exists.
    Exhausted,
}

/// Classifies `received` against `last_received + 1`.
#[must_use]
pub const fn check(last_received: u64, received: u64, poss_dup_or_resend: bool) -> SequenceCheck {
    let Some(expected) = last_received.checked_add(1) else {
        return SequenceCheck::Exhausted;
    };
    if received == expected {
        SequenceCheck::Expected
    } else if received > expected {
        SequenceCheck::Gap { expected, received }
    } else if poss_dup_or_resend {
        SequenceCheck::PossDup
    } else {
        SequenceCheck::TooLow { expected, received }
    }
}

/// What a SequenceReset requires of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// Move `last_received` to the given value.
    Advance {
        /// New last received number.
        last_received: u64,
    },
    /// NewSeqNo would move the sequence backwards; reject it.
    RejectDecrease,
    /// Nothing to do.
    Ignore,
    /// Gap fill arrived ahead of expected: request everything from
    /// `resend_from` onwards and advance anyway.
    NestedGap {
        /// First number still missing.
        resend_from: u64,
        /// New last received number.
        last_received: u64,
    },
    /// Gap fill behind expected without PossDup.
    TooLow {
        /// Number we expected.
        expected: u64,
        /// MsgSeqNum of the gap fill.
        received: u64,
    },
    /// `last_received` is already `u64::MAX`; no further number exists.
    Exhausted,
}

/// Decides how to handle a SequenceReset message.
///
/// Without GapFillFlag, or with a NewSeqNo not beyond the message's own
/// MsgSeqNum, it is a hard reset. Otherwise it is a gap fill.
#[must_use]
pub const fn on_sequence_reset(
    last_received: u64,
    msg_seq_no: u64,
    new_seq_no: u64,
    gap_fill: bool,
    poss_dup: bool,
) -> ResetAction {
    let Some(expected) = last_received.checked_add(1) else {
        return ResetAction::Exhausted;
    };
    if !gap_fill || new_seq_no <= msg_seq_no {
        return if new_seq_no > expected {
            ResetAction::Advance {
                last_received: new_seq_no - 1,
            }
        } else if new_seq_no < expected {
            ResetAction::RejectDecrease
        } else {
            ResetAction::Ignore
        };
    }

    if msg_seq_no > expected {
        ResetAction::NestedGap {
            resend_from: expected,
            last_received: new_seq_no - 1,
        }
    } else if msg_seq_no < expected {
        if poss_dup {
            ResetAction::Ignore
        } else {
            ResetAction::TooLow {
                expected,
                received: msg_seq_no,
            }
        }
    } else {
        ResetAction::Advance {
            last_received: new_seq_no - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        assert_eq!(check(4, 5, false), SequenceCheck::Expected);
        assert_eq!(
            check(4, 8, false),
            SequenceCheck::Gap {
                expected: 5,
                received: 8
            }
        );
        assert_eq!(check(4, 3, true), SequenceCheck::PossDup);
        assert_eq!(
            check(4, 3, false),
            SequenceCheck::TooLow {
                expected: 5,
                received: 3
            }
        );
    }

    #[test]
    fn test_hard_reset() {
        assert_eq!(
            on_sequence_reset(4, 5, 20, false, false),
            ResetAction::Advance { last_received: 19 }
        );
        assert_eq!(
            on_sequence_reset(4, 5, 2, false, false),
            ResetAction::RejectDecrease
        );
        assert_eq!(on_sequence_reset(4, 5, 5, false, false), ResetAction::Ignore);
        // GapFillFlag with NewSeqNo not beyond MsgSeqNum is a hard reset too.
        assert_eq!(
            on_sequence_reset(4, 9, 9, true, false),
            ResetAction::Advance { last_received: 8 }
        );
    }

    #[test]
    fn test_gap_fill() {
        assert_eq!(
            on_sequence_reset(4, 5, 8, true, false),
            ResetAction::Advance { last_received: 7 }
        );
        assert_eq!(
            on_sequence_reset(4, 6, 8, true, false),
            ResetAction::NestedGap {
                resend_from: 5,
                last_received: 7
            }
        );
        assert_eq!(
            on_sequence_reset(4, 3, 8, true, false),
            ResetAction::TooLow {
                expected: 5,
                received: 3
            }
        );
        assert_eq!(on_sequence_reset(4, 3, 8, true, true), ResetAction::Ignore);
    }

    #[test]
    fn test_sequence_space_exhausted() {
        assert_eq!(
            check(u64::MAX - 1, u64::MAX, false),
            SequenceCheck::Expected
        );
        assert_eq!(check(u64::MAX, u64::MAX, true), SequenceCheck::Exhausted);
        assert_eq!(check(u64::MAX, 1, false), SequenceCheck::Exhausted);
        assert_eq!(
            on_sequence_reset(u64::MAX, 5, u64::MAX, false, false),
            ResetAction::Exhausted
        );
        assert_eq!(
            on_sequence_reset(1, 2, u64::MAX, false, false),
            ResetAction::Advance {
                last_received: u64::MAX - 1
            }
        );
    }
}

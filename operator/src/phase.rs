//! Pure derivation of the `Phase` enum shared by all three object kinds.
//! Takes no dependency on `kube` — every reconciler feeds it plain booleans
//! read off whichever status object it owns.

use kubeadm_operator_types::Phase;

/// The subset of status fields §4.7 derives `phase` from. Each reconciler
/// builds one of these from the object it just (possibly) mutated and never
/// writes `phase` any other way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseInputs {
    pub deletion_timestamp_set: bool,
    pub has_error: bool,
    pub completion_time_set: bool,
    pub paused: bool,
    pub start_time_set: bool,
}

/// First-match-wins derivation rule from §4.7. The only writer of `phase`;
/// every other status field is set by the reconcilers in `operations`,
/// `groups`, and `tasks`.
pub fn derive(inputs: PhaseInputs) -> Phase {
    if inputs.deletion_timestamp_set {
        return Phase::Deleted;
    }
    if inputs.has_error {
        return Phase::Failed;
    }
    if inputs.completion_time_set {
        return Phase::Succeeded;
    }
    if inputs.paused {
        return Phase::Paused;
    }
    if inputs.start_time_set {
        return Phase::Running;
    }
    Phase::Pending
}

/// The `"i/n"` display string derived from a Task's 1-based cursor. `None`
/// once a Task has never started (cursor `0`).
pub fn command_progress(current_command: u32, total_commands: usize) -> Option<String> {
    if current_command == 0 {
        return None;
    }
    Some(format!("{current_command}/{total_commands}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_beats_everything() {
        let inputs = PhaseInputs {
            deletion_timestamp_set: true,
            has_error: true,
            completion_time_set: true,
            paused: true,
            start_time_set: true,
        };
        assert_eq!(derive(inputs), Phase::Deleted);
    }

    #[test]
    fn error_beats_completion_pause_and_start() {
        let inputs = PhaseInputs {
            deletion_timestamp_set: false,
            has_error: true,
            completion_time_set: true,
            paused: true,
            start_time_set: true,
        };
        assert_eq!(derive(inputs), Phase::Failed);
    }

    #[test]
    fn completion_beats_pause_and_start() {
        let inputs = PhaseInputs {
            deletion_timestamp_set: false,
            has_error: false,
            completion_time_set: true,
            paused: true,
            start_time_set: true,
        };
        assert_eq!(derive(inputs), Phase::Succeeded);
    }

    #[test]
    fn pause_beats_start() {
        let inputs = PhaseInputs {
            deletion_timestamp_set: false,
            has_error: false,
            completion_time_set: false,
            paused: true,
            start_time_set: true,
        };
        assert_eq!(derive(inputs), Phase::Paused);
    }

    #[test]
    fn start_without_anything_else_is_running() {
        let inputs = PhaseInputs {
            start_time_set: true,
            ..Default::default()
        };
        assert_eq!(derive(inputs), Phase::Running);
    }

    #[test]
    fn nothing_set_is_pending() {
        assert_eq!(derive(PhaseInputs::default()), Phase::Pending);
    }

    #[test]
    fn every_combination_matches_first_rule_top_to_bottom() {
        for deletion in [false, true] {
            for error in [false, true] {
                for completion in [false, true] {
                    for paused in [false, true] {
                        for start in [false, true] {
                            let inputs = PhaseInputs {
                                deletion_timestamp_set: deletion,
                                has_error: error,
                                completion_time_set: completion,
                                paused,
                                start_time_set: start,
                            };
                            let expected = if deletion {
                                Phase::Deleted
                            } else if error {
                                Phase::Failed
                            } else if completion {
                                Phase::Succeeded
                            } else if paused {
                                Phase::Paused
                            } else if start {
                                Phase::Running
                            } else {
                                Phase::Pending
                            };
                            assert_eq!(derive(inputs), expected, "inputs: {inputs:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn command_progress_is_none_before_start() {
        assert_eq!(command_progress(0, 5), None);
    }

    #[test]
    fn command_progress_formats_current_over_total() {
        assert_eq!(command_progress(2, 5), Some("2/5".to_string()));
    }
}

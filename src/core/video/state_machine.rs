/// 检测器去抖状态
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorState {
    /// 尚未观察到任何帧，没有可比较的前一帧
    Priming,
    Stable,
    Cooldown { remaining_frames: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StateAction {
    /// 首帧，只记录不比较
    Prime,
    Continue,
    Emit,
    /// 冷却期内的触发被吞掉
    Suppress,
}

impl DetectorState {
    pub fn new() -> Self {
        DetectorState::Priming
    }

    pub fn transition(&self, triggered: bool, debounce_frames: u32) -> (DetectorState, StateAction) {
        match self {
            DetectorState::Priming => (DetectorState::Stable, StateAction::Prime),

            DetectorState::Stable => {
                if triggered {
                    let next = if debounce_frames > 1 {
                        DetectorState::Cooldown {
                            remaining_frames: debounce_frames - 1,
                        }
                    } else {
                        DetectorState::Stable
                    };
                    (next, StateAction::Emit)
                } else {
                    (DetectorState::Stable, StateAction::Continue)
                }
            }

            DetectorState::Cooldown { remaining_frames } => {
                let new_remaining = remaining_frames.saturating_sub(1);
                let next = if new_remaining == 0 {
                    DetectorState::Stable
                } else {
                    DetectorState::Cooldown {
                        remaining_frames: new_remaining,
                    }
                };
                let action = if triggered {
                    StateAction::Suppress
                } else {
                    StateAction::Continue
                };
                (next, action)
            }
        }
    }
}

impl Default for DetectorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives [`DetectorState`] and remembers what was last emitted.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: DetectorState,
    debounce_frames: u32,
    frame_counter: u64,
    last_emitted: Option<u64>,
}

impl StateMachine {
    pub fn new(debounce_frames: u32) -> Self {
        Self {
            state: DetectorState::new(),
            debounce_frames,
            frame_counter: 0,
            last_emitted: None,
        }
    }

    pub fn process_frame(&mut self, frame_index: u64, triggered: bool) -> StateAction {
        self.frame_counter += 1;

        let (new_state, action) = self.state.transition(triggered, self.debounce_frames);
        self.state = new_state;
        if action == StateAction::Emit {
            self.last_emitted = Some(frame_index);
        }

        action
    }

    pub fn current_state(&self) -> &DetectorState {
        &self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    pub fn last_emitted(&self) -> Option<u64> {
        self.last_emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_never_emits() {
        let mut sm = StateMachine::new(0);
        assert_eq!(sm.current_state(), &DetectorState::Priming);

        let action = sm.process_frame(0, true);
        assert_eq!(action, StateAction::Prime);
        assert_eq!(sm.current_state(), &DetectorState::Stable);
        assert_eq!(sm.last_emitted(), None);
    }

    #[test]
    fn test_stable_to_cooldown() {
        let mut sm = StateMachine::new(3);
        sm.process_frame(0, false);

        let action = sm.process_frame(1, true);
        assert_eq!(action, StateAction::Emit);
        assert_eq!(
            sm.current_state(),
            &DetectorState::Cooldown {
                remaining_frames: 2
            }
        );
        assert_eq!(sm.last_emitted(), Some(1));
    }

    #[test]
    fn test_back_to_back_triggers_emit_once() {
        let mut sm = StateMachine::new(3);
        sm.process_frame(0, false);

        assert_eq!(sm.process_frame(1, true), StateAction::Emit);
        assert_eq!(sm.process_frame(2, true), StateAction::Suppress);
        assert_eq!(sm.process_frame(3, true), StateAction::Suppress);
        assert_eq!(sm.current_state(), &DetectorState::Stable);
        assert_eq!(sm.process_frame(4, true), StateAction::Emit);
        assert_eq!(sm.last_emitted(), Some(4));
    }

    #[test]
    fn test_cooldown_expires_without_side_effects() {
        let mut sm = StateMachine::new(2);
        sm.process_frame(0, false);
        sm.process_frame(1, true);

        let action = sm.process_frame(2, false);
        assert_eq!(action, StateAction::Continue);
        assert_eq!(sm.current_state(), &DetectorState::Stable);
        assert_eq!(sm.last_emitted(), Some(1));
    }

    #[test]
    fn test_zero_and_one_debounce_allow_consecutive_events() {
        for debounce in [0, 1] {
            let mut sm = StateMachine::new(debounce);
            sm.process_frame(0, false);
            assert_eq!(sm.process_frame(1, true), StateAction::Emit);
            assert_eq!(sm.process_frame(2, true), StateAction::Emit);
            assert_eq!(sm.frame_count(), 3);
        }
    }
}

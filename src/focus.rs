pub const DEFAULT_FOCUS_SECS: u32 = 25 * 60;
pub const DEFAULT_BREAK_SECS: u32 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPhase {
    Idle,
    Focus,
    Break,
    Completed,
}

/// Phase boundary crossed by a tick; the caller dispatches the matching
/// end-of-cycle alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusEvent {
    FocusEnded,
    BreakEnded,
}

/// Pomodoro countdown: idle → focus → break → completed, one tick per
/// second while running, with manual start/pause/reset.
#[derive(Debug, Clone)]
pub struct FocusTimer {
    phase: FocusPhase,
    remaining_secs: u32,
    running: bool,
    cycles: u32,
    focus_secs: u32,
    break_secs: u32,
}

impl FocusTimer {
    pub fn new(focus_secs: u32, break_secs: u32) -> Self {
        Self {
            phase: FocusPhase::Idle,
            remaining_secs: focus_secs,
            running: false,
            cycles: 0,
            focus_secs: focus_secs.max(1),
            break_secs: break_secs.max(1),
        }
    }

    pub fn phase(&self) -> FocusPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Remaining time as MM:SS.
    pub fn format_remaining(&self) -> String {
        format!("{:02}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }

    /// Fraction of the current phase already elapsed.
    pub fn progress(&self) -> f64 {
        let total = match self.phase {
            FocusPhase::Break => self.break_secs,
            _ => self.focus_secs,
        };
        f64::from(total - self.remaining_secs.min(total)) / f64::from(total)
    }

    pub fn start_focus(&mut self) {
        self.phase = FocusPhase::Focus;
        self.remaining_secs = self.focus_secs;
        self.running = true;
    }

    /// Pause or resume; meaningless while idle or completed.
    pub fn toggle(&mut self) {
        if matches!(self.phase, FocusPhase::Focus | FocusPhase::Break) {
            self.running = !self.running;
        }
    }

    pub fn reset(&mut self) {
        self.phase = FocusPhase::Idle;
        self.remaining_secs = self.focus_secs;
        self.running = false;
    }

    /// Advances the countdown by one second. Returns the phase-boundary
    /// event when the tick finishes a focus or break period.
    pub fn tick(&mut self) -> Option<FocusEvent> {
        if !self.running || self.remaining_secs == 0 {
            return None;
        }

        self.remaining_secs -= 1;
        if self.remaining_secs > 0 {
            return None;
        }

        match self.phase {
            FocusPhase::Focus => {
                self.phase = FocusPhase::Break;
                self.remaining_secs = self.break_secs;
                Some(FocusEvent::FocusEnded)
            }
            FocusPhase::Break => {
                self.cycles += 1;
                self.phase = FocusPhase::Completed;
                self.running = false;
                Some(FocusEvent::BreakEnded)
            }
            _ => None,
        }
    }
}

impl Default for FocusTimer {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_SECS, DEFAULT_BREAK_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_walks_focus_then_break() {
        let mut timer = FocusTimer::new(3, 2);
        assert_eq!(timer.phase(), FocusPhase::Idle);
        assert!(timer.tick().is_none());

        timer.start_focus();
        assert_eq!(timer.phase(), FocusPhase::Focus);
        assert!(timer.tick().is_none());
        assert!(timer.tick().is_none());
        assert_eq!(timer.tick(), Some(FocusEvent::FocusEnded));
        assert_eq!(timer.phase(), FocusPhase::Break);
        assert_eq!(timer.remaining_secs(), 2);

        assert!(timer.tick().is_none());
        assert_eq!(timer.tick(), Some(FocusEvent::BreakEnded));
        assert_eq!(timer.phase(), FocusPhase::Completed);
        assert!(!timer.is_running());
        assert_eq!(timer.cycles(), 1);
    }

    #[test]
    fn pause_freezes_the_countdown() {
        let mut timer = FocusTimer::new(10, 5);
        timer.start_focus();
        timer.tick();
        timer.toggle();
        assert!(!timer.is_running());
        assert!(timer.tick().is_none());
        assert_eq!(timer.remaining_secs(), 9);
        timer.toggle();
        timer.tick();
        assert_eq!(timer.remaining_secs(), 8);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut timer = FocusTimer::new(10, 5);
        timer.start_focus();
        timer.tick();
        timer.reset();
        assert_eq!(timer.phase(), FocusPhase::Idle);
        assert_eq!(timer.remaining_secs(), 10);
        assert!(!timer.is_running());
    }

    #[test]
    fn formats_remaining_time() {
        let timer = FocusTimer::new(25 * 60, 5 * 60);
        assert_eq!(timer.format_remaining(), "25:00");
        let mut timer = FocusTimer::new(61, 5);
        timer.start_focus();
        timer.tick();
        assert_eq!(timer.format_remaining(), "01:00");
    }
}

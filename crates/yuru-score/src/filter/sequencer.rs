//! Event scheduling shared by the score players.

use super::score_filter::ScoreFilter;
use super::Filter;
use crate::midi::{MidiMessage, META_END_OF_TRACK, META_SET_TEMPO};
use crate::time_keeper::{TimeKeeper, DEFAULT_TEMPO};

/// Transport state of a score player, exposed through `PARAMID_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    #[default]
    Pause = 0,
    Playing = 1,
    /// The score reached its End Of Track
    EndScore = 2,
}

impl PlayState {
    pub fn from_param(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Pause),
            1 => Some(Self::Playing),
            2 => Some(Self::EndScore),
            _ => None,
        }
    }

    pub fn as_param(self) -> i64 {
        self as i64
    }
}

/// Outcome of one [`Sequencer::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Idle,
    /// The state switched to [`PlayState::Pause`]
    Paused,
    /// The state switched back to [`PlayState::Playing`]
    Resumed,
    /// The pending event is due
    Due(MidiMessage),
}

/// Pulls events from a [`ScoreFilter`] and releases them on time.
///
/// One event is pending at a time. Tempo changes and End Of Track are applied
/// here; everything else is handed back to the caller.
#[derive(Debug, Clone)]
pub(crate) struct Sequencer {
    tk: TimeKeeper,
    play_state: PlayState,
    /// State seen by the last poll
    default_state: PlayState,
    waiting: bool,
    music_start: bool,
    message: MidiMessage,
}

impl Sequencer {
    pub fn new(auto_start: bool) -> Self {
        let state = if auto_start {
            PlayState::Playing
        } else {
            PlayState::Pause
        };
        Self {
            tk: TimeKeeper::new(),
            play_state: state,
            default_state: state,
            waiting: false,
            music_start: true,
            message: MidiMessage::default(),
        }
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    /// Request a state change; refused once the score has ended.
    pub fn set_play_state(&mut self, state: PlayState) -> bool {
        if self.play_state == PlayState::EndScore {
            return false;
        }
        self.play_state = state;
        true
    }

    pub fn time_keeper(&self) -> &TimeKeeper {
        &self.tk
    }

    pub fn time_keeper_mut(&mut self) -> &mut TimeKeeper {
        &mut self.tk
    }

    /// Start over on a freshly selected score.
    pub fn restart(&mut self, root_tick: u16) {
        self.tk.reset(root_tick, DEFAULT_TEMPO);
        self.play_state = self.default_state;
        self.music_start = true;
        self.waiting = false;
        self.message = MidiMessage::default();
    }

    /// Advance by one step at clock reading `now`.
    pub fn poll<F: Filter>(&mut self, score: &mut ScoreFilter<F>, now: u32) -> Step {
        if self.play_state == PlayState::EndScore {
            return Step::Idle;
        }
        self.tk.set_current_time(now);
        if self.music_start {
            self.tk.start_smf_timer();
            self.music_start = false;
        }

        if !self.waiting {
            let Some(message) = score.midi_message() else {
                return Step::Idle;
            };
            log::trace!(
                "delta {} status {:02x} data {:02x} {:02x} event {:02x}",
                message.delta_time,
                message.status_byte,
                message.data_byte1,
                message.data_byte2,
                message.event_code
            );
            let duration = self.tk.calculate_duration_ms(message.delta_time);
            self.tk.set_smf_duration(duration);
            self.tk.set_schedule_time(message.delta_time);
            self.message = message;
            self.waiting = true;
        }

        if self.default_state != self.play_state {
            log::trace!("state {:?} -> {:?}", self.default_state, self.play_state);
            self.default_state = self.play_state;
            return match self.play_state {
                PlayState::Pause => {
                    self.tk.stop_smf_timer();
                    Step::Paused
                }
                PlayState::Playing => {
                    self.tk.continue_smf_timer();
                    Step::Resumed
                }
                PlayState::EndScore => Step::Idle,
            };
        }

        if self.play_state != PlayState::Playing || !self.tk.is_scheduled_time() {
            return Step::Idle;
        }

        self.waiting = false;
        let message = std::mem::take(&mut self.message);
        self.tk.forward(message.delta_time);
        if message.is_meta() {
            self.execute_meta_event(&message);
        }
        Step::Due(message)
    }

    fn execute_meta_event(&mut self, message: &MidiMessage) {
        match message.event_code {
            META_SET_TEMPO => {
                if let Some(tempo) = message.tempo() {
                    log::debug!("tempo {}", tempo);
                    self.tk.set_tempo(tempo);
                }
            }
            META_END_OF_TRACK => {
                log::debug!("end of score");
                self.play_state = PlayState::EndScore;
            }
            code if code < 0x80 => log::trace!("unused meta event {:02x}", code),
            code => log::error!("unsupported meta event {:02x}", code),
        }
    }
}

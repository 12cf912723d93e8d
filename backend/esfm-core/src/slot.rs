//! One of the four operators in a channel: phase generator + envelope
//! generator + waveform lookup, composed with modulation routing and
//! feedback the way `esfm_slot` wires itself up at `init` time.

use esfm_common::num::GetBit;

use crate::envelope::{EnvelopeClockInputs, EnvelopeGenerator};
use crate::phase::PhaseGenerator;
use crate::tables;

/// Where this slot's modulation input comes from. Resolved once at `init`
/// time from `(channel_idx, slot_idx)` rather than carried as a pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModulationSource {
    /// Slot 0 modulates itself from its own feedback buffer.
    Feedback,
    /// Slots 1-3 are modulated by the immediately preceding slot's output.
    PreviousSlot,
}

/// Which of the owning channel's two key-on bits this slot observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyOnSource {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Slot {
    pub phase: PhaseGenerator,
    pub envelope: EnvelopeGenerator,

    pub waveform: u8,
    /// a.k.a. feedback level in emu mode; only acts as feedback on slot 0.
    pub mod_in_level: u8,
    pub output_level: u8,
    /// All-ones or zero per channel, used as a bitmask rather than a bool so
    /// mixing can gate with a bitwise AND.
    pub out_enable: [u16; 2],

    pub(crate) modulation_source: ModulationSource,
    pub(crate) key_on_source: KeyOnSource,

    last_eg_output: u16,
    output: i16,
    prev_output: i16,
    feedback_buf: i16,
}

impl Slot {
    #[must_use]
    pub fn new(channel_idx: u8, slot_idx: u8) -> Self {
        let modulation_source = if slot_idx == 0 {
            ModulationSource::Feedback
        } else {
            ModulationSource::PreviousSlot
        };
        let key_on_source = if channel_idx > 15 && slot_idx.bit(1) {
            KeyOnSource::Secondary
        } else {
            KeyOnSource::Primary
        };

        Self {
            phase: PhaseGenerator::new(),
            envelope: EnvelopeGenerator::new(),
            waveform: 0,
            mod_in_level: 0,
            output_level: 0,
            out_enable: [0xffff, 0xffff],
            modulation_source,
            key_on_source,
            last_eg_output: 0x1ff,
            output: 0,
            prev_output: 0,
            feedback_buf: 0,
        }
    }

    #[must_use]
    pub fn modulation_source(&self) -> ModulationSource {
        self.modulation_source
    }

    #[must_use]
    pub fn key_on_source(&self) -> KeyOnSource {
        self.key_on_source
    }

    #[must_use]
    pub fn output(&self) -> i16 {
        self.output
    }

    #[must_use]
    pub fn feedback_buf(&self) -> i16 {
        self.feedback_buf
    }

    /// Rhythm noise mode; only meaningful on slot index 3.
    #[must_use]
    pub fn rhy_noise(&self) -> u8 {
        self.phase.rhy_noise
    }

    /// Slot 0's self-feedback update, run once per tick before any slot's
    /// envelope/phase is clocked: averages the last two outputs.
    pub fn compute_feedback(&mut self) {
        self.feedback_buf = (self.output + self.prev_output) >> 2;
        self.prev_output = self.output;
    }

    fn key_code(&self) -> u8 {
        (self.phase.block << 1) | ((self.phase.f_num >> 9) & 1) as u8
    }

    /// Recomputes the KSL offset from the current F-number/block. Must be
    /// called after any register write that changes either field (registers
    /// 1, 4, and 5 in the native layout).
    pub fn recompute_ksl_offset(&mut self) {
        self.envelope
            .recompute_ksl_offset(self.phase.f_num, self.phase.block);
    }

    /// Runs the envelope and phase generators for this tick. Returns the
    /// pre-override `(eg_output, phase_out)` pair so a caller composing
    /// rhythm mode can inspect and override `phase_out` before `finish`.
    pub fn clock_envelope_and_phase(
        &mut self,
        key_on: bool,
        chip_tremolo: u8,
        eg_tick: bool,
        eg_clocks: u8,
        eg_timer: u64,
        global_timer: u16,
        vibrato_pos: u8,
        lfsr: &mut u32,
    ) -> (u16, u16) {
        let keyscale = self.key_code();
        let eg_output = self.envelope.clock(EnvelopeClockInputs {
            key_on,
            keyscale,
            chip_tremolo,
            eg_tick,
            eg_clocks,
            eg_timer,
            global_timer,
        });
        self.last_eg_output = eg_output;

        let phase_reset = self.envelope.phase_reset();
        let phase_out = self.phase.clock(phase_reset, vibrato_pos, lfsr);
        (eg_output, phase_out)
    }

    pub fn override_phase_out(&mut self, value: u16) {
        self.phase.set_phase_out(value);
    }

    /// Applies modulation, looks up the waveform, scales by output level,
    /// stores the sample for the next slot/tick, and returns this slot's
    /// gated stereo contribution.
    pub fn finish(&mut self, mod_input: i16) -> (i32, i32) {
        let base_phase = self.phase.phase_out();
        let phase = if self.mod_in_level != 0 {
            let shifted = mod_input >> (7 - self.mod_in_level);
            (base_phase.wrapping_add(shifted as u16)) & 0x3ff
        } else {
            base_phase & 0x3ff
        };

        let output = tables::waveform(self.waveform, phase, self.last_eg_output);
        self.output = output;

        if self.output_level == 0 {
            return (0, 0);
        }
        let scaled = i32::from(output >> (7 - self.output_level));
        let l = scaled & i32::from(self.out_enable[0] as i16);
        let r = scaled & i32::from(self.out_enable[1] as i16);
        (l, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_modulates_itself() {
        let s = Slot::new(0, 0);
        assert_eq!(ModulationSource::Feedback, s.modulation_source());
        assert_eq!(KeyOnSource::Primary, s.key_on_source());
    }

    #[test]
    fn other_slots_modulate_from_previous() {
        let s = Slot::new(0, 1);
        assert_eq!(ModulationSource::PreviousSlot, s.modulation_source());
    }

    #[test]
    fn channels_16_and_17_slots_2_3_use_secondary_key_on() {
        let s2 = Slot::new(16, 2);
        let s3 = Slot::new(17, 3);
        assert_eq!(KeyOnSource::Secondary, s2.key_on_source());
        assert_eq!(KeyOnSource::Secondary, s3.key_on_source());

        let s0 = Slot::new(16, 0);
        let other_channel = Slot::new(15, 3);
        assert_eq!(KeyOnSource::Primary, s0.key_on_source());
        assert_eq!(KeyOnSource::Primary, other_channel.key_on_source());
    }

    #[test]
    fn feedback_buf_averages_last_two_outputs() {
        let mut s = Slot::new(0, 0);
        s.output = 100;
        s.prev_output = 0;
        s.compute_feedback();
        assert_eq!(25, s.feedback_buf());
        assert_eq!(100, s.prev_output);
    }

    #[test]
    fn zero_output_level_mutes_the_slot() {
        let mut s = Slot::new(0, 0);
        s.waveform = 0;
        s.output_level = 0;
        s.mod_in_level = 0;
        let (l, r) = s.finish(0);
        assert_eq!((0, 0), (l, r));
    }
}

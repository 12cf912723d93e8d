//! A channel: 4 slots sharing key-on state and a stereo output accumulator.

use crate::phase;
use crate::slot::{KeyOnSource, Slot};

#[derive(Debug, Clone, Copy)]
pub struct ChannelTickInputs {
    pub chip_tremolo: u8,
    pub eg_tick: bool,
    pub eg_clocks: u8,
    pub eg_timer: u64,
    pub global_timer: u16,
    pub vibrato_pos: u8,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    pub slots: [Slot; 4],
    pub channel_idx: u8,
    pub key_on: bool,
    pub emu_mode_4op_enable: bool,
    /// Only meaningful for channels 16 and 17.
    pub key_on_2: bool,
    pub emu_mode_4op_enable_2: bool,

    output: [i16; 2],
}

impl Channel {
    #[must_use]
    pub fn new(channel_idx: u8) -> Self {
        Self {
            slots: [
                Slot::new(channel_idx, 0),
                Slot::new(channel_idx, 1),
                Slot::new(channel_idx, 2),
                Slot::new(channel_idx, 3),
            ],
            channel_idx,
            key_on: false,
            emu_mode_4op_enable: false,
            key_on_2: false,
            emu_mode_4op_enable_2: false,
            output: [0, 0],
        }
    }

    #[must_use]
    pub fn output(&self) -> [i16; 2] {
        self.output
    }

    fn effective_key_on(&self, slot_idx: usize) -> bool {
        match self.slots[slot_idx].key_on_source() {
            KeyOnSource::Primary => self.key_on,
            KeyOnSource::Secondary => self.key_on_2,
        }
    }

    /// Runs one sample tick for this channel: slot-0 feedback, then all four
    /// slots in order (envelope, phase, rhythm override, modulation/mix).
    /// Stores the resulting stereo pair, readable via [`Channel::output`].
    pub fn tick(&mut self, inputs: ChannelTickInputs, lfsr: &mut u32) {
        self.slots[0].compute_feedback();

        let mut phase_outs = [0u16; 4];
        let mut lfsr_before_slot3 = *lfsr;

        for i in 0..4 {
            if i == 3 {
                lfsr_before_slot3 = *lfsr;
            }
            let key_on = self.effective_key_on(i);
            let (_eg, phase_out) = self.slots[i].clock_envelope_and_phase(
                key_on,
                inputs.chip_tremolo,
                inputs.eg_tick,
                inputs.eg_clocks,
                inputs.eg_timer,
                inputs.global_timer,
                inputs.vibrato_pos,
                lfsr,
            );
            phase_outs[i] = phase_out;
        }

        let rhy_noise = self.slots[3].rhy_noise();
        if rhy_noise != 0 {
            let overridden = phase::rhythm_override(
                rhy_noise,
                phase_outs[3],
                phase_outs[2],
                lfsr_before_slot3 & 1,
            );
            self.slots[3].override_phase_out(overridden);
        }

        let mut l_sum = 0i32;
        let mut r_sum = 0i32;
        let mut prev_output = 0i16;
        for i in 0..4 {
            let mod_input = if i == 0 {
                self.slots[0].feedback_buf()
            } else {
                prev_output
            };
            let (l, r) = self.slots[i].finish(mod_input);
            l_sum += l;
            r_sum += r;
            prev_output = self.slots[i].output();
        }

        self.output = [
            l_sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            r_sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
        ];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_channel_produces_zero() {
        let mut ch = Channel::new(0);
        let mut lfsr = 1u32;
        let inputs = ChannelTickInputs {
            chip_tremolo: 0,
            eg_tick: false,
            eg_clocks: 0,
            eg_timer: 0,
            global_timer: 0,
            vibrato_pos: 0,
        };
        for _ in 0..64 {
            ch.tick(inputs, &mut lfsr);
            assert_eq!([0, 0], ch.output());
        }
    }

    #[test]
    fn channel_16_slot_2_observes_key_on_2() {
        let mut ch = Channel::new(16);
        ch.key_on = false;
        ch.key_on_2 = true;
        assert!(ch.effective_key_on(2));
        assert!(!ch.effective_key_on(0));
    }
}

//! Per-slot envelope generator: four-state ADSR with key-scaling, key-scale-level
//! attenuation, tremolo, delayed re-attack on key re-trigger, and the dither-timer
//! driven rate scheduler. Ported from `ESFM_envelope_calc`.

use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EnvelopePhase {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Everything `ESFM_envelope_calc` reads from the chip and the slot's phase
/// generator that isn't itself register-visible on the envelope generator.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeClockInputs {
    pub key_on: bool,
    /// 4-bit key code derived from F-number/block, scaled by KSR.
    pub keyscale: u8,
    pub chip_tremolo: u8,
    pub eg_tick: bool,
    pub eg_clocks: u8,
    pub eg_timer: u64,
    pub global_timer: u16,
}

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnvelopeGenerator {
    pub attack_rate: u8,
    pub decay_rate: u8,
    pub sustain_lvl: u8,
    pub release_rate: u8,
    pub total_level: u8,
    pub ksl: u8,
    pub env_sustaining: bool,
    pub ksr: bool,
    pub tremolo_en: bool,
    pub tremolo_deep: bool,
    pub env_delay: u8,

    ksl_offset: u16,
    phase: EnvelopePhase,
    position: u16,
    output: u16,
    delay_run: bool,
    delay_counter: u16,
    phase_reset: bool,
}

impl EnvelopeGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attack_rate: 0,
            decay_rate: 0,
            sustain_lvl: 0,
            release_rate: 0,
            total_level: 0,
            ksl: 0,
            env_sustaining: false,
            ksr: false,
            tremolo_en: false,
            tremolo_deep: false,
            env_delay: 0,
            ksl_offset: 0,
            phase: EnvelopePhase::Release,
            position: 0x1ff,
            output: 0x1ff,
            delay_run: false,
            delay_counter: 0,
            phase_reset: false,
        }
    }

    /// Recomputes the KSL offset from the slot's F-number/block. Must be
    /// called on every write to the slot registers that carry F-number or
    /// block (the high-bits-of-F-number register also carries block).
    pub fn recompute_ksl_offset(&mut self, f_num: u16, block: u8) {
        self.ksl_offset = tables::update_ksl(f_num, block);
    }

    #[must_use]
    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    #[must_use]
    pub fn output(&self) -> u16 {
        self.output
    }

    #[must_use]
    pub fn phase_reset(&self) -> bool {
        self.phase_reset
    }

    /// Advances the envelope generator by one DSP sample and returns the new
    /// `eg_output` value consumed by the waveform lookup.
    pub fn clock(&mut self, inputs: EnvelopeClockInputs) -> u16 {
        let ksl_shifted = self.ksl_offset >> tables::KSLSHIFT[usize::from(self.ksl)];
        self.output = self.position + (u16::from(self.total_level) << 2) + ksl_shifted;
        if self.tremolo_en {
            let shift = (u8::from(!self.tremolo_deep) << 1) + 2;
            self.output += u16::from(inputs.chip_tremolo >> shift);
        }

        let mut reset = false;
        let reg_rate: u8;

        if inputs.key_on && self.phase == EnvelopePhase::Release {
            if !self.delay_run {
                self.delay_run = true;
                self.delay_counter = if self.env_delay != 0 { 0x100 } else { 0 };
            }

            if self.delay_counter == 0 {
                self.delay_run = false;
                reset = true;
                reg_rate = self.attack_rate;
            } else {
                if inputs.eg_timer & (1 << self.env_delay) != 0 {
                    self.delay_counter -= 1;
                }
                reg_rate = self.release_rate;
            }
        } else {
            reg_rate = match self.phase {
                EnvelopePhase::Attack => self.attack_rate,
                EnvelopePhase::Decay => self.decay_rate,
                EnvelopePhase::Sustain => {
                    if self.env_sustaining {
                        0
                    } else {
                        self.release_rate
                    }
                }
                EnvelopePhase::Release => self.release_rate,
            };
        }

        self.phase_reset = reset;

        let ks = inputs.keyscale >> ((u8::from(!self.ksr)) << 1);
        let nonzero = reg_rate != 0;
        let rate = ks + (reg_rate << 2);
        let mut rate_hi = rate >> 2;
        let rate_lo = rate & 0x03;
        if rate_hi & 0x10 != 0 {
            rate_hi = 0x0f;
        }
        let eg_shift = rate_hi + inputs.eg_clocks;

        let mut shift: u8 = 0;
        if nonzero {
            if rate_hi < 12 {
                if inputs.eg_tick {
                    shift = match eg_shift {
                        12 => 1,
                        13 => (rate_lo >> 1) & 0x01,
                        14 => rate_lo & 0x01,
                        _ => 0,
                    };
                }
            } else {
                let idx = usize::from(inputs.global_timer & 0x03);
                shift = (rate_hi & 0x03) + tables::EG_INCSTEP[usize::from(rate_lo)][idx];
                if shift & 0x04 != 0 {
                    shift = 0x03;
                }
                if shift == 0 {
                    shift = u8::from(inputs.eg_tick);
                }
            }
        }

        let mut eg_rout = i32::from(self.position);
        let mut eg_inc: i32 = 0;
        let mut eg_off = false;

        if reset && rate_hi == 0x0f {
            eg_rout = 0;
        }
        if (self.position & 0x1f8) == 0x1f8 {
            eg_off = true;
        }
        if self.phase != EnvelopePhase::Attack && !reset && eg_off {
            eg_rout = 0x1ff;
        }

        match self.phase {
            EnvelopePhase::Attack => {
                if self.position == 0 {
                    self.phase = EnvelopePhase::Decay;
                } else if inputs.key_on && shift > 0 && rate_hi != 0x0f {
                    eg_inc = (!i32::from(self.position)) >> (4 - shift);
                }
            }
            EnvelopePhase::Decay => {
                if (self.position >> 4) == u16::from(self.sustain_lvl) {
                    self.phase = EnvelopePhase::Sustain;
                } else if !eg_off && !reset && shift > 0 {
                    eg_inc = 1 << (shift - 1);
                }
            }
            EnvelopePhase::Sustain | EnvelopePhase::Release => {
                if !eg_off && !reset && shift > 0 {
                    eg_inc = 1 << (shift - 1);
                }
            }
        }

        self.position = ((eg_rout + eg_inc) & 0x1ff) as u16;

        if reset {
            self.phase = EnvelopePhase::Attack;
        }
        if !inputs.key_on {
            self.phase = EnvelopePhase::Release;
        }

        self.output
    }
}

impl Default for EnvelopeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_inputs(key_on: bool) -> EnvelopeClockInputs {
        EnvelopeClockInputs {
            key_on,
            keyscale: 0,
            chip_tremolo: 0,
            eg_tick: true,
            eg_clocks: 0,
            eg_timer: 0,
            global_timer: 0,
        }
    }

    #[test]
    fn starts_in_release_at_full_attenuation() {
        let eg = EnvelopeGenerator::new();
        assert_eq!(EnvelopePhase::Release, eg.phase());
        assert_eq!(0x1ff, eg.output());
    }

    #[test]
    fn key_on_from_release_eventually_reaches_attack() {
        let mut eg = EnvelopeGenerator::new();
        eg.attack_rate = 15;
        eg.decay_rate = 15;
        eg.release_rate = 15;

        // env_delay == 0 means delay_counter starts at 0, so the very next
        // clock should flip straight into Attack.
        eg.clock(idle_inputs(true));
        assert_eq!(EnvelopePhase::Attack, eg.phase());
    }

    #[test]
    fn key_off_forces_release() {
        let mut eg = EnvelopeGenerator::new();
        eg.attack_rate = 15;
        eg.clock(idle_inputs(true));
        assert_eq!(EnvelopePhase::Attack, eg.phase());
        eg.clock(idle_inputs(false));
        assert_eq!(EnvelopePhase::Release, eg.phase());
    }

    #[test]
    fn zero_rate_never_advances() {
        let mut eg = EnvelopeGenerator::new();
        eg.attack_rate = 0;
        let before = eg.output();
        for _ in 0..32 {
            eg.clock(idle_inputs(true));
        }
        assert_eq!(before, eg.output());
    }
}

//! Top-level chip state: 18 channels plus the global timers, LFSR, and
//! tremolo/vibrato LFOs that drive every slot's envelope and phase generator.

use crate::channel::{Channel, ChannelTickInputs};

const EG_TIMER_MASK: u64 = (1 << 36) - 1;

#[derive(Debug, Clone, bincode::Encode, bincode::Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chip {
    pub channels: Vec<Channel>,

    lfsr: u32,
    eg_timer: u64,
    eg_timer_overflow: bool,
    eg_tick: bool,
    eg_clocks: u8,
    global_timer: u16,
    tremolo_pos: u8,
    tremolo: u8,
    vibrato_pos: u8,

    pub native_mode: bool,
    pub keyscale_mode: bool,
    pub test_bit_distort: bool,
    pub test_bit_attenuate: bool,
    pub test_bit_mute: bool,

    /// Address latch for the 4-register port window (native mode).
    pub(crate) addr_latch: u16,

    pub timer_reload: [u8; 2],
    pub timer_counter: [u8; 2],
    pub timer_enable: [bool; 2],
    pub timer_mask: [bool; 2],
    pub timer_overflow: [bool; 2],
    pub irq_bit: bool,
}

impl Chip {
    #[must_use]
    pub fn new() -> Self {
        let mut chip = Self {
            channels: (0..18).map(|i| Channel::new(i as u8)).collect(),
            lfsr: 1,
            eg_timer: 0,
            eg_timer_overflow: false,
            eg_tick: false,
            eg_clocks: 0,
            global_timer: 0,
            tremolo_pos: 0,
            tremolo: 0,
            vibrato_pos: 0,
            native_mode: true,
            keyscale_mode: false,
            test_bit_distort: false,
            test_bit_attenuate: false,
            test_bit_mute: false,
            addr_latch: 0,
            timer_reload: [0, 0],
            timer_counter: [0, 0],
            timer_enable: [false, false],
            timer_mask: [false, false],
            timer_overflow: [false, false],
            irq_bit: false,
        };
        chip.init();
        chip
    }

    /// Re-zeroes every channel/slot and re-seeds the LFSR, mirroring
    /// `ESFM_init`'s full-chip reset.
    pub fn init(&mut self) {
        self.lfsr = 1;
        self.eg_timer = 0;
        self.eg_timer_overflow = false;
        self.eg_tick = false;
        self.eg_clocks = 0;
        self.global_timer = 0;
        self.tremolo_pos = 0;
        self.tremolo = 0;
        self.vibrato_pos = 0;
        self.channels = (0..18).map(|i| Channel::new(i as u8)).collect();
        self.addr_latch = 0;
        self.timer_reload = [0, 0];
        self.timer_counter = [0, 0];
        self.timer_enable = [false, false];
        self.timer_mask = [false, false];
        self.timer_overflow = [false, false];
        self.irq_bit = false;
    }

    #[must_use]
    pub fn lfsr(&self) -> u32 {
        self.lfsr
    }

    #[must_use]
    pub fn global_timer(&self) -> u16 {
        self.global_timer
    }

    #[must_use]
    pub fn tremolo(&self) -> u8 {
        self.tremolo
    }

    #[must_use]
    pub fn vibrato_pos(&self) -> u8 {
        self.vibrato_pos
    }

    fn advance_counters(&mut self) {
        if self.global_timer & 0x3f == 0x3f {
            self.tremolo_pos = (self.tremolo_pos + 1) % 210;
            self.tremolo = if self.tremolo_pos <= 104 {
                self.tremolo_pos
            } else {
                209 - self.tremolo_pos
            };
        }
        if self.global_timer & 0x3ff == 0x3ff {
            self.vibrato_pos = (self.vibrato_pos + 1) % 8;
        }
        self.global_timer = (self.global_timer + 1) & 0x3ff;

        let s = self.eg_timer.trailing_zeros();
        self.eg_clocks = if s <= 12 { (s + 1) as u8 } else { 0 };

        if self.eg_tick || self.eg_timer_overflow {
            if self.eg_timer == EG_TIMER_MASK {
                self.eg_timer = 0;
                self.eg_timer_overflow = true;
            } else {
                self.eg_timer += 1;
                self.eg_timer_overflow = false;
            }
        }

        self.eg_tick = !self.eg_tick;
    }

    /// Produces one stereo sample, advancing every channel's slots and the
    /// chip-wide counters by one tick.
    pub fn generate(&mut self) -> [i16; 2] {
        let inputs = ChannelTickInputs {
            chip_tremolo: self.tremolo,
            eg_tick: self.eg_tick,
            eg_clocks: self.eg_clocks,
            eg_timer: self.eg_timer,
            global_timer: self.global_timer,
            vibrato_pos: self.vibrato_pos,
        };

        let mut l_sum = 0i32;
        let mut r_sum = 0i32;
        for channel in &mut self.channels {
            channel.tick(inputs, &mut self.lfsr);
            let [l, r] = channel.output();
            l_sum += i32::from(l);
            r_sum += i32::from(r);
        }

        self.advance_counters();

        if self.test_bit_mute {
            return [0, 0];
        }

        [
            l_sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
            r_sum.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16,
        ]
    }

    /// Produces `n` stereo frames into `out` (length `2 * n`).
    pub fn generate_stream(&mut self, out: &mut [i16], n: usize) {
        assert!(out.len() >= 2 * n, "output buffer too small for {n} frames");
        for frame in 0..n {
            let [l, r] = self.generate();
            out[2 * frame] = l;
            out[2 * frame + 1] = r;
        }
    }
}

impl Default for Chip {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_silence() {
        let mut chip = Chip::new();
        for _ in 0..1024 {
            assert_eq!([0, 0], chip.generate());
        }
    }

    #[test]
    fn lfsr_stays_nonzero_and_invariants_hold() {
        let mut chip = Chip::new();
        for _ in 0..20_000 {
            chip.generate();
            assert_ne!(0, chip.lfsr());
            assert!(chip.tremolo() <= 104);
            assert!(chip.vibrato_pos() <= 7);
            assert!(chip.global_timer() <= 0x3ff);
        }
    }

    #[test]
    fn tremolo_period_is_13440_ticks() {
        let mut chip = Chip::new();
        let initial = chip.tremolo();
        for _ in 0..13440 {
            chip.generate();
        }
        assert_eq!(initial, chip.tremolo());
    }

    #[test]
    fn vibrato_period_is_8192_ticks() {
        let mut chip = Chip::new();
        for _ in 0..8192 {
            chip.generate();
        }
        assert_eq!(0, chip.vibrato_pos());
    }

    #[test]
    fn generate_stream_fills_the_whole_buffer() {
        let mut chip = Chip::new();
        let mut out = [1i16; 512];
        chip.generate_stream(&mut out, 256);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn mute_bit_forces_silent_output() {
        let mut chip = Chip::new();
        chip.test_bit_mute = true;
        assert_eq!([0, 0], chip.generate());
    }
}

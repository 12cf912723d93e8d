//! Native-mode register decoder and the 4-register port window. Slot/channel
//! field layouts are ported from `ESFM_slot_write`/`ESFM_slot_readback` and
//! `ESFM_write_reg_native`/`ESFM_readback_reg_native`.

use esfm_common::num::GetBit;

use crate::chip::Chip;

const KEY_ON_REGS_START: u16 = 576;
const KEY_ON_REGS_END: u16 = 592;
const KEY_ON_2_REGS_START: u16 = 592;
const KEY_ON_2_REGS_END: u16 = 596;
const TIMER1_REG: u16 = 0x402;
const TIMER2_REG: u16 = 0x403;
const TIMER_SETUP_REG: u16 = 0x404;
const CONFIG_REG: u16 = 0x408;
const TEST_REG: u16 = 0x501;

fn slot_location(address: u16) -> (usize, usize, u8) {
    let channel = usize::from((address >> 5) & 0x1f);
    let slot = usize::from((address >> 3) & 0x03);
    let reg_idx = (address & 0x07) as u8;
    (channel, slot, reg_idx)
}

fn write_slot_register(chip: &mut Chip, address: u16, data: u8) {
    let (channel_idx, slot_idx, reg_idx) = slot_location(address);
    let Some(channel) = chip.channels.get_mut(channel_idx) else {
        return;
    };
    let slot = &mut channel.slots[slot_idx];

    match reg_idx {
        0 => {
            slot.envelope.tremolo_en = data.bit(7);
            slot.phase.vibrato_en = data.bit(6);
            slot.envelope.env_sustaining = data.bit(5);
            slot.envelope.ksr = data.bit(4);
            slot.phase.mult = data & 0x0f;
        }
        1 => {
            slot.envelope.ksl = (data >> 6) & 0x03;
            slot.envelope.total_level = data & 0x3f;
            slot.recompute_ksl_offset();
        }
        2 => {
            slot.envelope.attack_rate = (data >> 4) & 0x0f;
            slot.envelope.decay_rate = data & 0x0f;
        }
        3 => {
            slot.envelope.sustain_lvl = (data >> 4) & 0x0f;
            slot.envelope.release_rate = data & 0x0f;
        }
        4 => {
            slot.phase.f_num = (slot.phase.f_num & 0x300) | u16::from(data);
            slot.recompute_ksl_offset();
        }
        5 => {
            slot.envelope.env_delay = (data >> 5) & 0x07;
            slot.phase.block = (data >> 2) & 0x07;
            slot.phase.f_num = (slot.phase.f_num & 0x0ff) | (u16::from(data & 0x03) << 8);
            slot.recompute_ksl_offset();
        }
        6 => {
            slot.envelope.tremolo_deep = data.bit(7);
            slot.phase.vibrato_deep = data.bit(6);
            slot.out_enable[0] = if data.bit(5) { 0xffff } else { 0 };
            slot.out_enable[1] = if data.bit(4) { 0xffff } else { 0 };
            slot.mod_in_level = (data >> 1) & 0x07;
        }
        7 => {
            slot.output_level = (data >> 5) & 0x07;
            slot.phase.rhy_noise = (data >> 3) & 0x03;
            slot.waveform = data & 0x07;
        }
        _ => unreachable!("reg_idx masked to 3 bits"),
    }

    log::trace!("slot ({channel_idx}, {slot_idx}) register {reg_idx} <- {data:#04x}");
}

fn write_key_on_register(chip: &mut Chip, address: u16, data: u8) {
    let channel_idx = usize::from(address - KEY_ON_REGS_START);
    let Some(channel) = chip.channels.get_mut(channel_idx) else {
        return;
    };
    channel.key_on = data.bit(0);
    channel.emu_mode_4op_enable = data.bit(1);
    log::trace!("channel {channel_idx} key-on <- {}", channel.key_on);
}

fn write_key_on_2_register(chip: &mut Chip, address: u16, data: u8) {
    let offset = address - KEY_ON_2_REGS_START;
    let channel_idx = 16 + usize::from(offset / 2);
    let Some(channel) = chip.channels.get_mut(channel_idx) else {
        return;
    };
    if offset % 2 == 0 {
        channel.key_on = data.bit(0);
        channel.emu_mode_4op_enable = data.bit(1);
    } else {
        channel.key_on_2 = data.bit(0);
        channel.emu_mode_4op_enable_2 = data.bit(1);
    }
    log::trace!("channel {channel_idx} key-on-2 <- {data:#04x}");
}

fn write_timer_control(chip: &mut Chip, data: u8) {
    if data.bit(7) {
        chip.timer_overflow = [false, false];
        chip.irq_bit = false;
    }
    chip.timer_enable[0] = data.bit(0);
    chip.timer_enable[1] = data.bit(1);
    chip.timer_mask[0] = data.bit(5);
    chip.timer_mask[1] = data.bit(6);
}

fn write_test_register(chip: &mut Chip, data: u8) {
    chip.test_bit_distort = data.bit(1);
    chip.test_bit_attenuate = data.bit(4);
    chip.test_bit_mute = data.bit(6);
}

/// Decodes and applies one native-mode register write.
pub fn write_reg_native(chip: &mut Chip, address: u16, data: u8) {
    let address = address & 0x7ff;
    match address {
        a if a < KEY_ON_REGS_START => write_slot_register(chip, a, data),
        a if (KEY_ON_REGS_START..KEY_ON_REGS_END).contains(&a) => {
            write_key_on_register(chip, a, data);
        }
        a if (KEY_ON_2_REGS_START..KEY_ON_2_REGS_END).contains(&a) => {
            write_key_on_2_register(chip, a, data);
        }
        TIMER1_REG => chip.timer_reload[0] = data,
        TIMER2_REG => chip.timer_reload[1] = data,
        TIMER_SETUP_REG => write_timer_control(chip, data),
        CONFIG_REG => chip.keyscale_mode = data.bit(6),
        TEST_REG => write_test_register(chip, data),
        _ => {}
    }
}

/// A best-effort entry point for the emu-mode (OPL3-compatible) register
/// map. Full OPL3 register semantics are out of scope; this only guarantees
/// writes never panic and that exiting native mode is observed.
pub fn write_reg_emu(_chip: &mut Chip, _address: u16, _data: u8) {
    log::trace!("emu-mode register write ignored (best-effort compatibility only)");
}

/// Four-register I/O port window. `port` is masked to 2 bits.
pub fn write_port(chip: &mut Chip, port: u8, data: u8) {
    match port & 0x03 {
        0 => chip.native_mode = false,
        1 => {
            if chip.native_mode {
                let address = chip.addr_latch;
                write_reg_native(chip, address, data);
            } else {
                write_reg_emu(chip, chip.addr_latch, data);
            }
        }
        2 => chip.addr_latch = (chip.addr_latch & 0xff00) | u16::from(data),
        3 => chip.addr_latch = (chip.addr_latch & 0x00ff) | (u16::from(data) << 8),
        _ => unreachable!("port masked to 2 bits"),
    }
}

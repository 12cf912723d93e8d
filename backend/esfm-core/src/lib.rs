//! Core synthesis engine for the ESS "ESFM" enhanced OPL3-compatible FM chip.
//!
//! This crate models the chip's per-sample digital signal path: phase
//! accumulation, waveform table lookup, envelope generation, modulation
//! routing, rhythm noise, tremolo/vibrato LFOs, and output mixing. It is
//! single-threaded and tick-driven: each call to [`Chip::generate`] produces
//! one stereo sample and advances every global counter by one tick.
//!
//! Register decoding (the host-facing "native" and legacy "emu" register
//! maps) lives in [`registers`] and is a thin decode-and-store layer over the
//! fields this crate's types expose; the per-sample pipeline never touches it
//! directly.

mod channel;
mod chip;
mod envelope;
mod phase;
pub mod registers;
mod slot;
mod tables;


pub use channel::{Channel, ChannelTickInputs};
pub use chip::Chip;
pub use envelope::{EnvelopeClockInputs, EnvelopeGenerator, EnvelopePhase};
pub use phase::PhaseGenerator;
pub use slot::{KeyOnSource, ModulationSource, Slot};

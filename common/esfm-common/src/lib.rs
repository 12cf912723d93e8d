//! Small bit-twiddling helpers shared by the ESFM synthesis core and its register decoder.

pub mod num;

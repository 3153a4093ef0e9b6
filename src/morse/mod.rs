// src/morse/mod.rs  —  Alphabet table, Encoder, Decoder
pub mod table;
pub mod encoder;
pub mod decoder;

pub use encoder::{render_samples, text_to_pulses, EncoderConfig};
pub use decoder::{Decoder, DecoderConfig, PaddleDecoder, PaddleEvent};

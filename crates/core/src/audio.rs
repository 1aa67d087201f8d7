//! Audio conversion between the telephony leg and the model leg.
//!
//! The telephony side speaks 8 kHz G.711 µ-law; the model consumes and produces
//! 16-bit little-endian linear PCM at its own rates. Everything in here is pure
//! and synchronous, so any number of calls may use it at once.

use crate::error::{BridgeError, Result};
use base64::Engine;
use bytes::Bytes;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// Define standard sample rates for clarity and consistency
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;
pub const MODEL_INPUT_SAMPLE_RATE: u32 = 16000;
pub const MODEL_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Outbound telephony audio must be a multiple of this many bytes (20 ms at 8 kHz).
pub const TELEPHONY_FRAME_BYTES: usize = 160;

/// µ-law encoding of a zero sample.
pub const MULAW_SILENCE: u8 = 0xFF;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Sample encoding carried by an [`AudioFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    MuLaw,
    Pcm16,
}

impl Encoding {
    pub fn sample_width_bytes(self) -> usize {
        match self {
            Encoding::MuLaw => 1,
            Encoding::Pcm16 => 2,
        }
    }
}

/// An immutable chunk of mono audio tagged with its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    encoding: Encoding,
    sample_rate: u32,
}

impl AudioFrame {
    /// Telephony audio: µ-law at 8 kHz.
    pub fn mulaw(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            encoding: Encoding::MuLaw,
            sample_rate: TELEPHONY_SAMPLE_RATE,
        }
    }

    pub fn pcm16(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            encoding: Encoding::Pcm16,
            sample_rate,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn sample_width_bytes(&self) -> usize {
        self.encoding.sample_width_bytes()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of whole samples in the frame.
    pub fn samples(&self) -> usize {
        self.data.len() / self.sample_width_bytes()
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Text framing used for binary audio inside JSON messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Base64,
    Hex,
}

impl PayloadEncoding {
    pub fn encode(self, data: &[u8]) -> String {
        match self {
            PayloadEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(data),
            PayloadEncoding::Hex => hex::encode(data),
        }
    }

    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            PayloadEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| BridgeError::MalformedMessage(format!("invalid base64 payload: {e}"))),
            PayloadEncoding::Hex => hex::decode(text)
                .map_err(|e| BridgeError::MalformedMessage(format!("invalid hex payload: {e}"))),
        }
    }
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadEncoding::Base64 => write!(f, "base64"),
            PayloadEncoding::Hex => write!(f, "hex"),
        }
    }
}

impl FromStr for PayloadEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" => Ok(PayloadEncoding::Base64),
            "hex" => Ok(PayloadEncoding::Hex),
            other => Err(format!("'{other}' is not one of base64, hex")),
        }
    }
}

fn mulaw_encode_sample(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };
    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

fn mulaw_decode_sample(byte: u8) -> i16 {
    let byte = !byte;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = (byte & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if byte & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Expands µ-law bytes to 16-bit little-endian PCM. The output is exactly twice
/// the input length.
pub fn decode_companded(ulaw: &[u8]) -> Vec<u8> {
    ulaw.iter()
        .flat_map(|&b| mulaw_decode_sample(b).to_le_bytes())
        .collect()
}

/// Compresses 16-bit little-endian PCM to µ-law, one byte per sample.
pub fn encode_companded(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.is_empty() || pcm.len() % 2 != 0 {
        return Err(BridgeError::InvalidFrameLength(pcm.len()));
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|c| mulaw_encode_sample(i16::from_le_bytes([c[0], c[1]])))
        .collect())
}

/// Converts 16-bit little-endian PCM bytes to f32 samples in [-1.0, 1.0).
pub fn pcm16_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect()
}

/// Converts f32 samples back to 16-bit little-endian PCM bytes, clamping out-of-range values.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Number of output samples a `from_rate -> to_rate` conversion of `samples` yields.
pub fn resampled_len(samples: usize, from_rate: u32, to_rate: u32) -> usize {
    let (from, to) = (from_rate as u64, to_rate as u64);
    ((samples as u64 * to + from / 2) / from) as usize
}

/// Read position of the first interpolated output of a fresh [`FastFixedIn`],
/// in input samples before the start of the chunk.
const RESAMPLER_START_OFFSET: usize = 4;

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Converts PCM16 between sample rates.
///
/// Each call is self-contained, so the chunk is extended at both ends with
/// copies of its edge samples before interpolation. The resampler never reads
/// its zeroed history or a zero-filled tail, and the output holds exactly
/// [`resampled_len`] samples aligned to the input's first sample.
pub fn resample(pcm: &[u8], from_rate: u32, to_rate: u32) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(BridgeError::InvalidFrameLength(pcm.len()));
    }
    if from_rate == to_rate || pcm.is_empty() {
        return Ok(pcm.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(BridgeError::Resampler(
            "sample rates must be non-zero".to_string(),
        ));
    }

    let input = pcm16_to_f32(pcm);
    let expected = resampled_len(input.len(), from_rate, to_rate);
    if expected == 0 {
        return Ok(Vec::new());
    }

    // Lead-in chosen so the first wanted output lands on an exact output index:
    // (lead + offset) * to / from must be whole.
    let step = from_rate as u64 / gcd(from_rate as u64, to_rate as u64);
    let aligned = step * (2 * RESAMPLER_START_OFFSET as u64).div_ceil(step);
    let lead = aligned as usize - RESAMPLER_START_OFFSET;
    let skip = (aligned * to_rate as u64 / from_rate as u64) as usize - 1;
    // Covers the cubic window plus the samples a chunk holds back at its end.
    let tail = 16 + 2 * (from_rate as usize).div_ceil(to_rate as usize);

    let first = input[0];
    let last = input[input.len() - 1];
    let mut padded = Vec::with_capacity(lead + input.len() + tail);
    padded.resize(lead, first);
    padded.extend_from_slice(&input);
    padded.resize(lead + input.len() + tail, last);

    let mut resampler = FastFixedIn::<f32>::new(
        to_rate as f64 / from_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        padded.len(),
        1, // mono
    )
    .map_err(|e| BridgeError::Resampler(e.to_string()))?;

    let output = resampler
        .process(&[padded], None)
        .map_err(|e| BridgeError::Resampler(e.to_string()))?
        .remove(0);

    let mut samples: Vec<f32> = output.into_iter().skip(skip).take(expected).collect();
    let fill = samples.last().copied().unwrap_or(last);
    samples.resize(expected, fill);
    Ok(f32_to_pcm16(&samples))
}

/// Model audio (PCM16 at any rate) to telephony audio (µ-law, 8 kHz).
pub fn to_telephony(frame: &AudioFrame) -> Result<AudioFrame> {
    match frame.encoding() {
        Encoding::MuLaw => Ok(frame.clone()),
        Encoding::Pcm16 => {
            let pcm_8k = resample(frame.data(), frame.sample_rate(), TELEPHONY_SAMPLE_RATE)?;
            // Chunks shorter than one 8 kHz sample carry nothing to play.
            if pcm_8k.is_empty() {
                return Ok(AudioFrame::mulaw(Vec::new()));
            }
            Ok(AudioFrame::mulaw(encode_companded(&pcm_8k)?))
        }
    }
}

/// Telephony audio (µ-law, 8 kHz) to model input (PCM16 at `target_rate`).
pub fn to_model(frame: &AudioFrame, target_rate: u32) -> Result<AudioFrame> {
    let pcm = match frame.encoding() {
        Encoding::MuLaw => decode_companded(frame.data()),
        Encoding::Pcm16 => frame.data().to_vec(),
    };
    let resampled = resample(&pcm, frame.sample_rate(), target_rate)?;
    Ok(AudioFrame::pcm16(resampled, target_rate))
}

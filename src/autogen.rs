//! Values generated at write time.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{SecondsFormat, Utc};
use rand::RngCore;

const KSUID_EPOCH: i64 = 1_400_000_000;
const KSUID_LENGTH: usize = 27;
const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// How an attribute value is generated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AutoGenerateStrategy {
    /// Random UUID v4 string
    Uuid4,
    /// K-sortable unique id, 27 base62 characters
    Ksuid,
    /// Unix time in seconds, stored as a number
    EpochSeconds,
    /// RFC 3339 UTC timestamp string
    Iso8601,
}

impl AutoGenerateStrategy {
    /// Produce a fresh value
    pub fn generate(&self) -> AttributeValue {
        match self {
            AutoGenerateStrategy::Uuid4 => AttributeValue::S(uuid::Uuid::new_v4().to_string()),
            AutoGenerateStrategy::Ksuid => AttributeValue::S(ksuid()),
            AutoGenerateStrategy::EpochSeconds => {
                AttributeValue::N(Utc::now().timestamp().to_string())
            }
            AutoGenerateStrategy::Iso8601 => {
                AttributeValue::S(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

fn ksuid() -> String {
    let timestamp = (Utc::now().timestamp() - KSUID_EPOCH).clamp(0, u32::MAX as i64) as u32;
    let mut bytes = [0u8; 20];
    bytes[..4].copy_from_slice(&timestamp.to_be_bytes());
    rand::thread_rng().fill_bytes(&mut bytes[4..]);
    encode_base62(&bytes)
}

/// Big-endian base62 encoding, left padded with `0` to the ksuid length
fn encode_base62(bytes: &[u8; 20]) -> String {
    let mut number: Vec<u32> = bytes.iter().map(|b| u32::from(*b)).collect();
    let mut digits = Vec::with_capacity(KSUID_LENGTH);

    while number.iter().any(|d| *d != 0) {
        let mut remainder = 0u32;
        let mut quotient = Vec::with_capacity(number.len());
        for digit in &number {
            let accumulator = remainder * 256 + digit;
            let q = accumulator / 62;
            remainder = accumulator % 62;
            if !quotient.is_empty() || q != 0 {
                quotient.push(q);
            }
        }
        digits.push(BASE62[remainder as usize]);
        number = quotient;
    }

    while digits.len() < KSUID_LENGTH {
        digits.push(b'0');
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod fs;
pub mod hashing;

pub use fs::{read_json, write_bytes_atomic, write_json_atomic};
pub use hashing::{content_hash, normalized_text_hash};

/// Seconds since the unix epoch, with sub-second precision
pub fn unix_timestamp() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

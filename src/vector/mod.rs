// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod flat_index;

pub use flat_index::{squared_l2, FlatIndex, Neighbor};

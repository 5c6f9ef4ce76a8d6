/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! The Tak board model: stones, moves, positions, and notation.

/// Square sets and per-size board geometry.
mod bitboard;

/// Moves: placements, slides, and the null move.
mod moves;

/// Stones and their colors.
mod piece;

/// The position representation, move application, and move generation.
mod position;

/// Compile-time PRNG used to build the hash key tables.
mod prng;

/// PTN move notation and TPS position notation.
mod ptn;

/// Position-hash key tables.
mod zobrist;

pub use bitboard::*;
pub use moves::*;
pub use piece::*;
pub use position::*;
pub use ptn::*;

pub(crate) use prng::*;

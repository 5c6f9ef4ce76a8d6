/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Command-line surface of the analyzer binary.
mod cli;

/// Static evaluation: weights and the default evaluator.
mod eval;

/// History and response tables for move ordering.
mod history;

/// Frame-local ordered move cursor.
mod movepicker;

/// Position values and the win threshold.
mod score;

/// Main engine logic; all search related code.
mod search;

/// The Tak board model: stones, moves, positions, notation.
pub mod tak;

/// The transposition table.
mod ttable;

pub use cli::*;
pub use eval::*;
pub use history::*;
pub use movepicker::*;
pub use score::*;
pub use search::*;
pub use ttable::*;

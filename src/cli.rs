/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use clap::Parser;

/// Analyze a Tak position.
#[derive(Debug, Clone, Parser)]
#[command(name = "stak", version, about)]
pub struct Args {
    /// Position to analyze, in TPS ("x5/x5/x5/x5/x5 1 1"). Analyzes the
    /// empty opening position of `--size` when omitted.
    pub position: Option<String>,

    /// Board size used when no position is given.
    #[arg(long, default_value_t = 5)]
    pub size: usize,

    /// Maximum search depth; 0 searches to the engine's depth cap.
    #[arg(long, default_value_t = 0)]
    pub depth: i32,

    /// Time limit for the search, in seconds.
    #[arg(long)]
    pub limit: Option<f64>,

    /// PRNG seed; 0 seeds from the clock.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Debug verbosity (0 silent).
    #[arg(long, default_value_t = 1)]
    pub debug: i32,

    /// Show every move sharing the best score.
    #[arg(long)]
    pub all: bool,

    /// Only print the static evaluation; no search.
    #[arg(long)]
    pub evaluate: bool,

    /// Disable all heuristics that cannot prove their results, so values
    /// are game-theoretic exact.
    #[arg(long)]
    pub precise: bool,

    /// Echo the analyzed position in TPS.
    #[arg(long)]
    pub print_tps: bool,

    /// Don't print board diagrams.
    #[arg(long)]
    pub quiet: bool,

    /// Pick randomly among moves scoring within this window of the best.
    #[arg(long, default_value_t = 0)]
    pub randomize: i64,

    /// Divisor for randomization weights.
    #[arg(long, default_value_t = 1)]
    pub randomize_scale: i64,

    /// Disable history-based move ordering.
    #[arg(long)]
    pub no_sort: bool,

    /// Disable the transposition table.
    #[arg(long)]
    pub no_table: bool,

    /// Disable null-move pruning.
    #[arg(long)]
    pub no_null_move: bool,

    /// Disable the forced-move extension hook.
    #[arg(long)]
    pub no_extend_forces: bool,

    /// Disable slide reductions.
    #[arg(long)]
    pub no_reduce_slides: bool,

    /// Disable multi-cut pruning.
    #[arg(long)]
    pub no_multi_cut: bool,

    /// JSON-encoded evaluation weight overrides.
    #[arg(long)]
    pub weights: Option<String>,
}

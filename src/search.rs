/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use arrayvec::ArrayVec;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::tak::{format_move, Move, Position};
use crate::{make_evaluator, Bound, Evaluator, HistoryTable, MovePicker, ResponseTable, Score, TTable, TableEntry};

/// Maximum depth that can be searched.
pub const MAX_DEPTH: usize = 15;

/// Moves prescanned by multi-cut before the regular search of a node.
const MULTI_CUT_SEARCH: usize = 6;

/// Fail-highs among the prescanned moves needed to cut the whole node.
const MULTI_CUT_THRESHOLD: usize = 3;

/// Represents the best sequence of moves found during a search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrincipalVariation(ArrayVec<Move, MAX_DEPTH>);

impl PrincipalVariation {
    /// An empty PV.
    #[inline(always)]
    pub fn new() -> Self {
        Self(ArrayVec::new_const())
    }

    /// Clears the moves of `self`.
    #[inline(always)]
    fn clear(&mut self) {
        self.0.clear();
    }

    /// Sets `self` to the single move `mv`.
    #[inline(always)]
    fn set_one(&mut self, mv: Move) {
        self.0.clear();
        self.0.push(mv);
    }

    /// Sets `self` to `mv` followed by the contents of `other`.
    #[inline(always)]
    fn extend(&mut self, mv: Move, other: &Self) {
        self.clear();
        self.0.push(mv);
        self.0.try_extend_from_slice(&other.0).unwrap_or_else(|err| {
            panic!("{err}: exceeded PV capacity of {MAX_DEPTH} pushing {mv:?} and {:?}", &other.0);
        });
    }

    /// Sets `self` to a copy of `moves`.
    #[inline(always)]
    fn assign(&mut self, moves: &[Move]) {
        self.clear();
        let n = moves.len().min(MAX_DEPTH);
        self.0
            .try_extend_from_slice(&moves[..n])
            .expect("capacity checked");
    }
}

impl std::ops::Deref for PrincipalVariation {
    type Target = [Move];

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Renders a move sequence as bracketed PTN, for logs.
pub fn format_pv(moves: &[Move]) -> String {
    let mut out = String::from("[");
    for (i, m) in moves.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        out.push_str(&format_move(m));
    }
    out.push(']');
    out
}

/// Counters accumulated over one call to [`Minimax::analyze`].
///
/// Counter semantics are part of the engine's contract; tests assert on
/// them directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    /// Deepest completed iteration.
    pub depth: i32,
    /// Whether the last iteration was abandoned.
    pub cancelled: bool,
    /// Wall-clock time spent in the search.
    pub elapsed: Duration,

    /// Moves produced by the generator.
    pub generated: u64,
    /// Leaf and terminal nodes evaluated statically.
    pub evaluated: u64,
    /// Nodes searched with a zero-width window.
    pub scout: u64,
    /// Evaluated nodes that were game-over.
    pub terminal: u64,
    /// Interior nodes visited.
    pub visited: u64,

    /// Nodes that failed high.
    pub cut_nodes: u64,
    /// Null-move searches attempted.
    pub null_search: u64,
    /// Null-move searches that cut.
    pub null_cut: u64,
    /// Cuts on the first move of a node.
    pub cut0: u64,
    /// Cuts on the second move of a node.
    pub cut1: u64,
    /// Moves searched in nodes that cut later than the second move.
    pub cut_search: u64,

    /// Zero-window scouts that had to be re-searched at full width.
    pub re_search: u64,
    /// Nodes where no move improved alpha.
    pub all_nodes: u64,

    /// Transposition-table probes that found the position.
    pub tt_hits: u64,
    /// Probes whose entry settled the node outright.
    pub tt_shortcut: u64,

    /// Forced-move extensions applied (reserved; the hook is disabled).
    pub extensions: u64,
    /// Depth reductions applied to rebuilding slides.
    pub reduced_slides: u64,

    /// Multi-cut prescans attempted.
    pub mc_search: u64,
    /// Multi-cut prescans that cut.
    pub mc_cut: u64,
}

impl Stats {
    /// Accumulates `other`'s counters into `self`, preserving `self`'s
    /// depth, cancellation flag, and elapsed time.
    pub fn merge(mut self, other: Stats) -> Stats {
        self.generated += other.generated;
        self.evaluated += other.evaluated;
        self.scout += other.scout;
        self.terminal += other.terminal;
        self.visited += other.visited;
        self.cut_nodes += other.cut_nodes;
        self.null_search += other.null_search;
        self.null_cut += other.null_cut;
        self.cut0 += other.cut0;
        self.cut1 += other.cut1;
        self.cut_search += other.cut_search;
        self.re_search += other.re_search;
        self.all_nodes += other.all_nodes;
        self.tt_hits += other.tt_hits;
        self.tt_shortcut += other.tt_shortcut;
        self.extensions += other.extensions;
        self.reduced_slides += other.reduced_slides;
        self.mc_search += other.mc_search;
        self.mc_cut += other.mc_cut;
        self
    }
}

/// Configuration for a [`Minimax`] engine.
pub struct MinimaxConfig {
    /// Board size the engine will analyze. Positions of any other size are
    /// rejected.
    pub size: usize,
    /// Depth cap for iterative deepening; `0` means [`MAX_DEPTH`].
    pub depth: i32,
    /// PRNG seed for randomized move selection; `0` seeds from the clock.
    pub seed: u64,
    /// Log verbosity; `0` is silent.
    pub debug: i32,

    /// When nonzero, [`Minimax::get_move`] picks a weighted-random move
    /// scoring within this window of the best.
    pub randomize_window: i64,
    /// Divisor applied to score surpluses during randomized selection;
    /// `0` means `1`.
    pub randomize_scale: i64,

    /// Disables history-based move ordering.
    pub no_sort: bool,
    /// Disables the transposition table.
    pub no_table: bool,
    /// Disables null-move pruning.
    pub no_null_move: bool,
    /// Disables the forced-move extension hook. (The hook is currently
    /// inert either way.)
    pub no_extend_forces: bool,
    /// Disables the slide-reduction heuristic.
    pub no_reduce_slides: bool,
    /// Disables multi-cut pruning.
    pub no_multi_cut: bool,

    /// Static evaluator override; defaults to the built-in weights for
    /// `size`.
    pub evaluate: Option<Evaluator>,
}

impl MinimaxConfig {
    /// Disables every heuristic that cannot prove the correctness of its
    /// results, so the engine returns exact game-theoretic values.
    ///
    /// Slower and a weaker player, but useful for solving puzzles and for
    /// debugging.
    pub fn make_precise(&mut self) {
        self.no_null_move = true;
        self.no_extend_forces = true;
        self.no_reduce_slides = true;
        self.no_multi_cut = true;
    }
}

impl Default for MinimaxConfig {
    fn default() -> Self {
        Self {
            size: 5,
            depth: 0,
            seed: 0,
            debug: 0,
            randomize_window: 0,
            randomize_scale: 0,
            no_sort: false,
            no_table: false,
            no_null_move: false,
            no_extend_forces: false,
            no_reduce_slides: false,
            no_multi_cut: false,
            evaluate: None,
        }
    }
}

/// A handle bounding one call into the engine: an optional hard deadline
/// and a cooperative cancellation flag an external party may set.
#[derive(Clone)]
pub struct SearchLimits {
    /// Hard wall-clock deadline, polled on the search's fast path.
    pub deadline: Option<Instant>,
    /// Set to `true` to abandon the current iteration.
    pub cancel: Arc<AtomicBool>,
}

impl SearchLimits {
    /// No deadline; cancellable only through the flag.
    pub fn none() -> Self {
        Self {
            deadline: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A deadline the given duration from now.
    pub fn from_duration(limit: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + limit),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for SearchLimits {
    #[inline(always)]
    fn default() -> Self {
        Self::none()
    }
}

/// The result of one [`Minimax::analyze`] call.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Best line found, engine's move first. Empty if no iteration
    /// completed.
    pub pv: Vec<Move>,
    /// Value of the position, from the side to move's perspective.
    pub value: Score,
    /// Search counters.
    pub stats: Stats,
}

/// Per-ply scratch shared down the recursion: the move being searched at
/// this ply and the frame's move generator.
struct Frame {
    m: Move,
    picker: MovePicker,
}

/// An iterative-deepening alpha-beta engine with a principal-variation /
/// zero-window split.
///
/// Constructed once per board size; `analyze` may be called repeatedly and
/// reuses the transposition table, ordering tables, and stack buffers.
pub struct Minimax {
    cfg: MinimaxConfig,
    eval_fn: Evaluator,
    rng: StdRng,

    st: Stats,

    table: Option<TTable>,
    history: HistoryTable,
    response: ResponseTable,
    stack: Vec<Frame>,

    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Minimax {
    /// Builds an engine from `cfg`, allocating its tables once.
    pub fn new(mut cfg: MinimaxConfig) -> Self {
        if cfg.depth == 0 || cfg.depth > MAX_DEPTH as i32 {
            cfg.depth = MAX_DEPTH as i32;
        }
        if cfg.randomize_scale == 0 {
            cfg.randomize_scale = 1;
        }
        let eval_fn = cfg
            .evaluate
            .take()
            .unwrap_or_else(|| make_evaluator(cfg.size, None));
        let table = if cfg.no_table {
            None
        } else {
            Some(TTable::new())
        };
        let history = HistoryTable::new(cfg.size);
        let response = ResponseTable::new(cfg.size);
        let stack = (0..MAX_DEPTH)
            .map(|_| Frame {
                m: Move::PASS,
                picker: MovePicker::new(),
            })
            .collect();
        Self {
            cfg,
            eval_fn,
            rng: StdRng::seed_from_u64(0),
            st: Stats::default(),
            table,
            history,
            response,
            stack,
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Statically evaluates `p` with this engine's evaluator.
    #[inline(always)]
    pub fn evaluate(&self, p: &Position) -> Score {
        (self.eval_fn)(p)
    }

    /// Searches `p` with iterative deepening, returning the best line, its
    /// value, and the accumulated counters.
    ///
    /// Fails only on a configuration mismatch; cancellation is reported in
    /// the stats, and the last completed iteration's result is returned.
    pub fn analyze(&mut self, limits: &SearchLimits, p: &Position) -> Result<Analysis> {
        if self.cfg.size != p.size() {
            bail!(
                "engine is configured for size {} but the position is size {}",
                self.cfg.size,
                p.size()
            );
        }

        self.history.age();
        self.cancel = Arc::clone(&limits.cancel);
        self.deadline = limits.deadline;

        let seed = if self.cfg.seed != 0 {
            self.cfg.seed
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs()
        };
        self.rng = StdRng::seed_from_u64(seed);

        if self.cfg.debug > 0 {
            debug!(
                "start search move={} color={} seed={seed}",
                p.move_number(),
                p.to_move()
            );
        }

        let top = Instant::now();
        let mut st = Stats::default();
        let mut ms: Vec<Move> = Vec::with_capacity(MAX_DEPTH);
        let mut v = Score::DRAW;
        let mut base = 0;

        // Resume deepening from an exact entry for the root, if one is
        // cached from an earlier call.
        if let Some(te) = self.tt_get(p.hash()).copied() {
            if te.bound == Bound::Exact {
                base = te.depth as i32;
                ms.push(te.mv);
                v = te.value;
                st.depth = base;
                st.tt_hits += 1;
                st.tt_shortcut += 1;
            }
        }

        let mut prev_eval: u64 = 0;
        let mut branch_sum: u64 = 0;
        let mut i = 1;
        while i + base <= self.cfg.depth {
            self.st = Stats {
                depth: i + base,
                ..Stats::default()
            };
            let start = Instant::now();
            let mut pv = PrincipalVariation::new();
            let result = self.pv_search(
                p,
                0,
                i + base,
                &ms,
                Score::MIN_EVAL - 1,
                Score::MAX_EVAL + 1,
                &mut pv,
            );
            let nv = match result {
                Some(nv) if !pv.is_empty() && !self.cancelled() => nv,
                _ => {
                    st.cancelled = true;
                    break;
                }
            };
            v = nv;
            st = self.st.merge(st);
            ms.clear();
            ms.extend_from_slice(&pv);

            if self.cfg.debug > 0 {
                debug!(
                    "deepen: depth={} val={v} pv={} time={:?} total={:?} evaluated={} tt={}/{} branch={}",
                    i + base,
                    format_pv(&ms),
                    start.elapsed(),
                    top.elapsed(),
                    self.st.evaluated,
                    self.st.tt_shortcut,
                    self.st.tt_hits,
                    self.st.evaluated / (prev_eval + 1),
                );
            }
            if self.cfg.debug > 1 {
                debug!(
                    "stats: visited={} cut={} all={} cut0={} cut1={} research={} scout={} null={}/{} mc={}/{} rslide={}",
                    self.st.visited,
                    self.st.cut_nodes,
                    self.st.all_nodes,
                    self.st.cut0,
                    self.st.cut1,
                    self.st.re_search,
                    self.st.scout,
                    self.st.null_cut,
                    self.st.null_search,
                    self.st.mc_cut,
                    self.st.mc_search,
                    self.st.reduced_slides,
                );
            }

            if i > 1 {
                branch_sum += self.st.evaluated / (prev_eval + 1);
            }
            prev_eval = self.st.evaluated;

            if v.is_decisive() {
                break;
            }

            if let Some(deadline) = self.deadline {
                if i + base != self.cfg.depth {
                    // Estimate the next iteration's cost from the observed
                    // branching factor; doubled, because the factor is
                    // strongly bimodal between the two sides' plies.
                    let branch = if i > 2 {
                        2 * branch_sum / (i as u64 - 1)
                    } else {
                        20
                    };
                    let estimate = Instant::now() + start.elapsed() * branch.min(u32::MAX as u64) as u32;
                    if estimate > deadline {
                        if self.cfg.debug > 0 {
                            debug!("time cutoff: depth={} used={:?}", i + base, top.elapsed());
                        }
                        break;
                    }
                }
            }
            i += 1;
        }

        st.elapsed = top.elapsed();
        Ok(Analysis {
            pv: ms,
            value: v,
            stats: st,
        })
    }

    /// Runs a full [`Minimax::analyze`], then re-searches every root move
    /// with the window `(-v-1, -v+1)` and returns each line whose value
    /// equals the best. The principal variation is first.
    pub fn analyze_all(
        &mut self,
        limits: &SearchLimits,
        p: &Position,
    ) -> Result<(Vec<Vec<Move>>, Score, Stats)> {
        let Analysis { pv, value: v, stats: st } = self.analyze(limits, p)?;
        if self.cfg.debug > 1 {
            debug!(
                "all-search: begin depth={} pv={} v={v}",
                st.depth,
                format_pv(&pv)
            );
        }
        let mut out = vec![pv.clone()];
        let hint: &[Move] = if pv.is_empty() { &[] } else { &pv[1..] };

        self.seed_picker(0, None, pv.first().copied());
        let mut local = PrincipalVariation::new();
        loop {
            let Some(m) = self.next_move(0, p) else { break };
            let Ok(child) = p.make_move(&m) else { continue };
            self.stack[0].m = m;
            let Some(fv) = self.pv_search(&child, 1, st.depth - 1, hint, -v - 1, -v + 1, &mut local)
            else {
                break;
            };
            let cv = -fv;
            if self.cfg.debug > 2 {
                debug!("all-search: m={} v={cv} pv={}", format_move(&m), format_pv(&local));
            }
            if cv != v {
                continue;
            }
            if Some(&m) == pv.first() {
                continue;
            }
            let mut line = vec![m];
            line.extend_from_slice(&local);
            out.push(line);
        }
        Ok((out, v, st))
    }

    /// Analyzes `p` and returns the move to play.
    ///
    /// Without a randomization window this is the head of the principal
    /// variation. With one, each root move scoring within the window of
    /// the best is given weight proportional to its surplus and one is
    /// chosen by weighted reservoir sampling. Proven wins and losses
    /// bypass randomization.
    pub fn get_move(&mut self, limits: &SearchLimits, p: &Position) -> Result<Move> {
        let Analysis { pv, value: v, stats: st } = self.analyze(limits, p)?;
        let Some(&principal) = pv.first() else {
            // Nothing completed before cancellation; any legal move beats
            // no move at all.
            let mut buf = Vec::new();
            p.all_moves(&mut buf);
            return buf.first().copied().context("no legal moves");
        };
        if self.cfg.randomize_window == 0 || v.is_decisive() {
            return Ok(principal);
        }

        let mut chosen = principal;
        let base = v - self.cfg.randomize_window;
        let mut total: i64 = 0;

        self.seed_picker(0, None, pv.first().copied());
        let mut local = PrincipalVariation::new();
        loop {
            let Some(m) = self.next_move(0, p) else { break };
            let Ok(child) = p.make_move(&m) else { continue };
            self.stack[0].m = m;
            let Some(fv) = self.pv_search(&child, 1, st.depth - 1, &pv[1..], -v - 1, -base, &mut local)
            else {
                break;
            };
            let cv = -fv;
            if cv <= base {
                continue;
            }
            let pts = (cv - base).raw() / self.cfg.randomize_scale;
            total += pts;
            if self.cfg.debug > 2 {
                debug!("rand m={} v={v} cv={cv} pts={pts} i={total}", format_move(&m));
            }
            if total > 0 && self.rng.gen_range(0..total) <= pts {
                chosen = m;
            }
        }
        Ok(chosen)
    }

    /// Principal-variation search: full-window negamax with zero-window
    /// scouts on all but the first move.
    ///
    /// `pv` is the previous iteration's continuation from this node, used
    /// to seed move ordering; the new best line is written to `out`.
    /// Returns `None` when the search was cancelled mid-node.
    #[allow(clippy::too_many_arguments)]
    fn pv_search(
        &mut self,
        p: &Position,
        ply: usize,
        depth: i32,
        pv: &[Move],
        mut alpha: Score,
        beta: Score,
        out: &mut PrincipalVariation,
    ) -> Option<Score> {
        let over = p.game_over().is_some();
        if depth <= 0 || over {
            self.st.evaluated += 1;
            if over {
                self.st.terminal += 1;
            }
            out.clear();
            return Some(self.evaluate(p));
        }

        self.st.visited += 1;
        if beta == alpha + 1 {
            self.st.scout += 1;
        }

        let mut te = self.tt_get(p.hash()).copied();
        if let Some(entry) = te {
            self.st.tt_hits += 1;
            if entry.suffices(depth, alpha, beta) {
                if p.make_move(&entry.mv).is_ok() {
                    self.st.tt_shortcut += 1;
                    out.set_one(entry.mv);
                    return Some(entry.value);
                }
                // A colliding entry whose move does not apply here; ignore it.
                te = None;
            }
        }

        self.seed_picker(ply, te.map(|e| e.mv), pv.first().copied());

        let mut best = PrincipalVariation::new();
        best.assign(pv);
        let mut improved = false;
        let mut local = PrincipalVariation::new();
        let mut i = 0usize;
        loop {
            let Some(m) = self.next_move(ply, p) else { break };
            let Ok(child) = p.make_move(&m) else { continue };
            i += 1;
            self.stack[ply].m = m;

            let hint: &[Move] = if best.is_empty() { &[] } else { &best[1..] };
            let v = if i > 1 {
                let zv = self.zw_search(&child, ply + 1, depth - 1, hint, -alpha - 1, true, &mut local)?;
                let mut cv = -zv;
                if cv > alpha && cv < beta {
                    self.st.re_search += 1;
                    let fv =
                        self.pv_search(&child, ply + 1, depth - 1, hint, -beta, -alpha, &mut local)?;
                    cv = -fv;
                }
                cv
            } else {
                let fv = self.pv_search(&child, ply + 1, depth - 1, hint, -beta, -alpha, &mut local)?;
                -fv
            };

            if best.is_empty() {
                best.extend(m, &local);
            }
            if v > alpha {
                improved = true;
                best.extend(m, &local);
                alpha = v;
                if alpha >= beta {
                    self.record_cut(&m, i, depth, ply);
                    break;
                }
            }
            if self.cancelled() {
                return None;
            }
        }

        let bound = if !improved {
            Bound::Upper
        } else if alpha >= beta {
            Bound::Lower
        } else {
            Bound::Exact
        };
        if let Some(&first) = best.first() {
            if self.tt_store(p.hash(), depth, alpha, bound, first, true) && bound == Bound::Upper {
                self.st.all_nodes += 1;
            }
        }

        *out = best;
        Some(alpha)
    }

    /// Zero-window scout over `(alpha, alpha+1)`: proves "at least
    /// `alpha + 1`" (fail high) or "at most `alpha`" (fail low), with
    /// null-move pruning, slide reduction, and multi-cut.
    ///
    /// `cut` tracks the expected node type, alternating between plies; the
    /// multi-cut prescan only runs at expected cut nodes.
    #[allow(clippy::too_many_arguments)]
    fn zw_search(
        &mut self,
        p: &Position,
        ply: usize,
        mut depth: i32,
        pv: &[Move],
        alpha: Score,
        cut: bool,
        out: &mut PrincipalVariation,
    ) -> Option<Score> {
        let over = p.game_over().is_some();
        if depth <= 0 || over {
            self.st.evaluated += 1;
            if over {
                self.st.terminal += 1;
            }
            out.clear();
            return Some(self.evaluate(p));
        }

        self.st.visited += 1;
        self.st.scout += 1;

        let mut te = self.tt_get(p.hash()).copied();
        if let Some(entry) = te {
            self.st.tt_hits += 1;
            if entry.suffices(depth, alpha, alpha + 1) {
                if p.make_move(&entry.mv).is_ok() {
                    self.st.tt_shortcut += 1;
                    out.set_one(entry.mv);
                    return Some(entry.value);
                }
                te = None;
            }
        }

        if self.null_move_ok(ply, depth, p) {
            self.stack[ply].m = Move::PASS;
            if let Ok(child) = p.make_move(&Move::PASS) {
                self.st.null_search += 1;
                let mut tmp = PrincipalVariation::new();
                let zv = self.zw_search(&child, ply + 1, depth - 3, &[], -alpha - 1, true, &mut tmp)?;
                let v = -zv;
                if v >= alpha + 1 {
                    self.st.null_cut += 1;
                    out.clear();
                    return Some(v);
                }
            }
        }

        // A single slide that emptied its origin and piled its whole carry
        // on the destination rarely changes the evaluation; search it
        // shallower.
        if !self.cfg.no_reduce_slides && ply > 0 {
            let m = self.stack[ply - 1].m;
            if m.is_slide() && m.drops.len() == 1 {
                let (dx, dy) = m.dest();
                if p.height_at(m.x, m.y) == 0 && p.height_at(dx, dy) == m.drops.get(0) {
                    self.st.reduced_slides += 1;
                    depth -= 2;
                }
            }
        }

        self.seed_picker(ply, te.map(|e| e.mv), pv.first().copied());

        if cut && depth > 3 && !self.cfg.no_multi_cut {
            let mut cuts = 0usize;
            let mut scanned = 0usize;
            self.st.mc_search += 1;
            let mut tmp = PrincipalVariation::new();
            while scanned < MULTI_CUT_SEARCH {
                let Some(m) = self.next_move(ply, p) else { break };
                let Ok(child) = p.make_move(&m) else { continue };
                scanned += 1;
                self.stack[ply].m = m;
                let zv =
                    self.zw_search(&child, ply + 1, depth - 1 - 2, &[], -alpha - 1, !cut, &mut tmp)?;
                if -zv > alpha {
                    cuts += 1;
                    if cuts >= MULTI_CUT_THRESHOLD {
                        self.st.mc_cut += 1;
                        out.clear();
                        return Some(alpha + 1);
                    }
                }
            }
            self.reset_picker(ply);
        }

        let mut best = PrincipalVariation::new();
        best.assign(pv);
        let mut did_cut = false;
        let mut local = PrincipalVariation::new();
        let mut i = 0usize;
        loop {
            let Some(m) = self.next_move(ply, p) else { break };
            let Ok(child) = p.make_move(&m) else { continue };
            i += 1;
            self.stack[ply].m = m;

            let hint: &[Move] = if best.is_empty() { &[] } else { &best[1..] };
            let zv = self.zw_search(&child, ply + 1, depth - 1, hint, -alpha - 1, !cut, &mut local)?;
            let v = -zv;

            if best.is_empty() {
                best.extend(m, &local);
            }
            if v > alpha {
                best.extend(m, &local);
                did_cut = true;
                self.record_cut(&m, i, depth, ply);
                break;
            }
            if self.cancelled() {
                return None;
            }
        }

        let bound = if did_cut { Bound::Lower } else { Bound::Upper };
        if let Some(&first) = best.first() {
            if self.tt_store(p.hash(), depth, alpha, bound, first, false) && bound == Bound::Upper {
                self.st.all_nodes += 1;
            }
        }

        *out = best;
        Some(if did_cut { alpha + 1 } else { alpha })
    }

    /// Whether null-move pruning is admissible at this node.
    ///
    /// Passing is only sound away from the root, at useful depth, when the
    /// previous move was not itself a pass, and when the position is far
    /// from the flats-count endgame (both reserves healthy, board not
    /// nearly full) so that zugzwang is unlikely.
    fn null_move_ok(&self, ply: usize, depth: i32, p: &Position) -> bool {
        if self.cfg.no_null_move {
            return false;
        }
        if ply == 0 || depth < 3 {
            return false;
        }
        if self.stack[ply - 1].m.is_pass() {
            return false;
        }
        if p.white_stones() < 3 || p.black_stones() < 3 {
            return false;
        }
        if p.occupied().count() as usize + 3 >= p.squares() {
            return false;
        }
        true
    }

    /// Bookkeeping for a beta cut on the `index`th searched move of a node.
    fn record_cut(&mut self, m: &Move, index: usize, depth: i32, ply: usize) {
        self.st.cut_nodes += 1;
        match index {
            1 => self.st.cut0 += 1,
            2 => self.st.cut1 += 1,
            _ => self.st.cut_search += index as u64 + 1,
        }
        self.history.add_cut(m.hash(), depth);
        if ply > 0 {
            self.response.set(self.stack[ply - 1].m.hash(), *m);
        }
    }

    /// Re-arms the frame's move generator for a new node.
    fn seed_picker(&mut self, ply: usize, hash_move: Option<Move>, pv_move: Option<Move>) {
        let response = if ply > 0 {
            self.response.get(self.stack[ply - 1].m.hash())
        } else {
            None
        };
        self.stack[ply].picker
            .seed(hash_move, pv_move, response, self.cfg.no_sort);
    }

    /// Yields the frame's next candidate move.
    #[inline(always)]
    fn next_move(&mut self, ply: usize, p: &Position) -> Option<Move> {
        let Minimax {
            stack, history, st, ..
        } = self;
        stack[ply].picker.next(p, history, st)
    }

    /// Restarts the frame's generator from its first move.
    #[inline(always)]
    fn reset_picker(&mut self, ply: usize) {
        self.stack[ply].picker.reset();
    }

    /// Whether the current call has been cancelled, by flag or deadline.
    #[inline(always)]
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Transposition-table probe.
    #[inline(always)]
    fn tt_get(&self, hash: u64) -> Option<&TableEntry> {
        self.table.as_ref()?.get(hash)
    }

    /// Transposition-table store, returning whether a write happened.
    ///
    /// The displaced-occupant copy to the secondary slot happens before the
    /// gate is evaluated; when `gated`, an entry for the same position is
    /// only overwritten from equal or greater depth. Writes are suppressed
    /// entirely once the search is cancelled, so a half-searched node can
    /// never poison the table.
    fn tt_store(
        &mut self,
        hash: u64,
        depth: i32,
        value: Score,
        bound: Bound,
        mv: Move,
        gated: bool,
    ) -> bool {
        if self.cancelled() {
            return false;
        }
        let Some(table) = self.table.as_mut() else {
            return false;
        };
        let te = table.put(hash);
        if gated && te.hash == hash && (te.depth as i32) > depth {
            return false;
        }
        *te = TableEntry {
            hash,
            depth: depth as i16,
            value,
            bound,
            mv,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tak::MoveKind;

    fn tps(s: &str) -> Position {
        s.parse().expect("test TPS parses")
    }

    fn engine(size: usize, depth: i32) -> Minimax {
        Minimax::new(MinimaxConfig {
            size,
            depth,
            seed: 7,
            ..MinimaxConfig::default()
        })
    }

    /// White to move; placing a road piece on e1 completes a road.
    const MATE_IN_ONE: &str = "x5/x5/x5/x5/1,1,1,1,x 1 5";

    #[test]
    fn test_mate_in_one() {
        let p = tps(MATE_IN_ONE);
        let mut e = engine(5, 3);
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert!(a.value.is_winning(), "value {:?} should prove a win", a.value);
        let first = a.pv[0];
        assert_eq!((first.x, first.y), (4, 0), "pv {} should finish the road", format_pv(&a.pv));
        assert!(matches!(
            first.kind,
            MoveKind::PlaceFlat | MoveKind::PlaceCapstone
        ));
    }

    #[test]
    fn test_terminal_root_returns_empty_pv() {
        let p = tps("x5/x5/x5/x5/1,1,1,1,1 2 6");
        assert!(p.game_over().is_some());
        let mut e = engine(5, 3);
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert!(a.pv.is_empty());
        assert!(a.stats.cancelled);
    }

    #[test]
    fn test_size_mismatch_is_an_error() {
        let p = Position::new(4).unwrap();
        let mut e = engine(5, 2);
        assert!(e.analyze(&SearchLimits::none(), &p).is_err());
    }

    #[test]
    fn test_null_move_disabled_counters() {
        let p = tps("x3/x3/1,2,x 1 2");
        let mut e = Minimax::new(MinimaxConfig {
            size: 3,
            depth: 5,
            seed: 7,
            no_null_move: true,
            ..MinimaxConfig::default()
        });
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert_eq!(a.stats.null_search, 0);
        assert_eq!(a.stats.null_cut, 0);
    }

    #[test]
    fn test_null_move_runs_by_default() {
        let p = tps("x3/x3/1,2,x 1 2");
        let mut e = engine(3, 5);
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert!(a.stats.null_search > 0);
    }

    #[test]
    fn test_precise_mode_disables_pruning_counters() {
        let p = tps("x3/x3/1,2,x 1 2");
        let mut cfg = MinimaxConfig {
            size: 3,
            depth: 5,
            seed: 7,
            ..MinimaxConfig::default()
        };
        cfg.make_precise();
        let mut e = Minimax::new(cfg);
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert_eq!(a.stats.null_search, 0);
        assert_eq!(a.stats.mc_search, 0);
        assert_eq!(a.stats.reduced_slides, 0);
        assert_eq!(a.stats.extensions, 0);
    }

    #[test]
    fn test_second_analyze_is_served_from_the_table() {
        let p = tps("x4/x4/2,1,x2/x4 1 3");
        let mut e = engine(4, 3);
        let first = e.analyze(&SearchLimits::none(), &p).unwrap();
        let second = e.analyze(&SearchLimits::none(), &p).unwrap();
        assert!(second.stats.tt_shortcut >= 1);
        assert_eq!(second.value, first.value);
        assert_eq!(second.pv[0], first.pv[0]);
    }

    #[test]
    fn test_randomization_bypassed_on_proven_win() {
        let p = tps(MATE_IN_ONE);
        let mut e = Minimax::new(MinimaxConfig {
            size: 5,
            depth: 3,
            seed: 7,
            randomize_window: 50,
            ..MinimaxConfig::default()
        });
        let m = e.get_move(&SearchLimits::none(), &p).unwrap();
        assert_eq!((m.x, m.y), (4, 0));
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let p = tps("x5/x5/x2,2,x2/x2,1,x2/x5 1 3");
        let run = || {
            let mut e = Minimax::new(MinimaxConfig {
                size: 5,
                depth: 2,
                seed: 42,
                randomize_window: 10_000,
                randomize_scale: 1,
                ..MinimaxConfig::default()
            });
            e.get_move(&SearchLimits::none(), &p).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_negamax_symmetry_in_precise_mode() {
        let p = tps("x4/x4/2,1,x2/x4 1 3");
        let precise = |size, depth| {
            let mut cfg = MinimaxConfig {
                size,
                depth,
                seed: 7,
                ..MinimaxConfig::default()
            };
            cfg.make_precise();
            Minimax::new(cfg)
        };

        let mut parent = precise(4, 3);
        let a = parent.analyze(&SearchLimits::none(), &p).unwrap();
        let child = p.make_move(&a.pv[0]).unwrap();

        let mut fresh = precise(4, 2);
        let b = fresh.analyze(&SearchLimits::none(), &child).unwrap();
        assert_eq!(b.value, -a.value);
    }

    #[test]
    fn test_history_ages_at_analyze_entry() {
        let p = tps("x4/x4/2,1,x2/x4 1 3");
        let mut e = engine(4, 2);
        // No legal move ever hashes to u64::MAX, so this counter can only
        // be halved by ageing.
        e.history.add_cut(u64::MAX, 10);
        assert_eq!(e.history.get(u64::MAX), 1 << 10);
        e.analyze(&SearchLimits::none(), &p).unwrap();
        assert_eq!(e.history.get(u64::MAX), 1 << 9);
        e.analyze(&SearchLimits::none(), &p).unwrap();
        assert_eq!(e.history.get(u64::MAX), 1 << 8);
    }

    #[test]
    fn test_cancelled_flag_returns_prior_iteration() {
        let p = tps("x5/x5/x2,2,x2/x2,1,x2/x5 1 3");
        let limits = SearchLimits::none();
        limits.cancel.store(true, Ordering::Relaxed);
        let mut e = engine(5, 4);
        let a = e.analyze(&limits, &p).unwrap();
        assert!(a.stats.cancelled);
        assert!(a.pv.is_empty());
    }

    #[test]
    fn test_analyze_all_finds_symmetric_openings() {
        let p = Position::new(3).unwrap();
        let mut e = engine(3, 2);
        let (all, v, _st) = e.analyze_all(&SearchLimits::none(), &p).unwrap();
        // The four corner placements are symmetric and optimal.
        assert_eq!(all.len(), 4, "got {all:?} with value {v:?}");
        for line in &all {
            let m = line[0];
            assert!(m.x == 0 || m.x == 2, "non-corner move {m:?}");
            assert!(m.y == 0 || m.y == 2, "non-corner move {m:?}");
        }
        // The principal line leads, and all first moves are distinct.
        let firsts: Vec<Move> = all.iter().map(|l| l[0]).collect();
        for (i, a) in firsts.iter().enumerate() {
            for b in &firsts[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_pv_is_legal() {
        let p = tps("x5/x5/x2,2,x2/x2,1,x2/x5 1 3");
        let mut e = engine(5, 3);
        let a = e.analyze(&SearchLimits::none(), &p).unwrap();
        let mut cur = p;
        for m in &a.pv {
            cur = cur
                .make_move(m)
                .unwrap_or_else(|err| panic!("illegal pv move {m}: {err}"));
        }
    }
}

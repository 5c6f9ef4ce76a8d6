/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use crate::tak::{Move, Position};
use crate::{HistoryTable, Stats};

/// The ordering phases a picker walks through.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Phase {
    Hash,
    Pv,
    Response,
    All,
}

/// A frame-local cursor over the legal moves of one position, yielded in
/// heuristic order:
///
/// 1. the transposition-table move, if any;
/// 2. the principal-variation continuation's head, if supplied;
/// 3. the response-table suggestion for the predecessor move;
/// 4. the remaining legal moves, best history counter first.
///
/// Candidates are *not* validated here; the search applies each yielded
/// move and skips the ones that fail. The move and score buffers are
/// reused across nodes, so the steady state never allocates.
pub struct MovePicker {
    phase: Phase,
    idx: usize,
    sort: bool,
    generated: bool,
    hash_move: Option<Move>,
    pv_move: Option<Move>,
    response_move: Option<Move>,
    moves: Vec<Move>,
    scores: Vec<i64>,
}

/// Generous room for the movelist of a single position; the buffers grow
/// past it only in pathological stack positions.
const MOVE_BUFFER: usize = 500;

impl MovePicker {
    /// Creates an idle picker with its buffers pre-reserved.
    pub fn new() -> Self {
        Self {
            phase: Phase::Hash,
            idx: 0,
            sort: true,
            generated: false,
            hash_move: None,
            pv_move: None,
            response_move: None,
            moves: Vec::with_capacity(MOVE_BUFFER),
            scores: Vec::with_capacity(MOVE_BUFFER),
        }
    }

    /// Re-arms the picker for a new node.
    pub fn seed(
        &mut self,
        hash_move: Option<Move>,
        pv_move: Option<Move>,
        response_move: Option<Move>,
        no_sort: bool,
    ) {
        self.phase = Phase::Hash;
        self.idx = 0;
        self.sort = !no_sort;
        self.generated = false;
        self.hash_move = hash_move;
        self.pv_move = pv_move;
        self.response_move = response_move;
    }

    /// Restarts iteration from the first move without regenerating.
    ///
    /// Used by multi-cut, which prescans a few moves and then walks the
    /// full list from the top.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.phase = Phase::Hash;
        self.idx = 0;
    }

    /// Yields the next candidate move, or `None` when exhausted.
    pub fn next(&mut self, p: &Position, history: &HistoryTable, st: &mut Stats) -> Option<Move> {
        loop {
            match self.phase {
                Phase::Hash => {
                    self.phase = Phase::Pv;
                    if let Some(m) = self.hash_move {
                        return Some(m);
                    }
                }
                Phase::Pv => {
                    self.phase = Phase::Response;
                    if let Some(m) = self.pv_move {
                        if Some(m) != self.hash_move {
                            return Some(m);
                        }
                    }
                }
                Phase::Response => {
                    self.phase = Phase::All;
                    if let Some(m) = self.response_move {
                        if Some(m) != self.hash_move && Some(m) != self.pv_move {
                            return Some(m);
                        }
                    }
                }
                Phase::All => {
                    if !self.generated {
                        p.all_moves(&mut self.moves);
                        st.generated += self.moves.len() as u64;
                        self.scores.clear();
                        self.scores
                            .extend(self.moves.iter().map(|m| history.get(m.hash())));
                        self.generated = true;
                    }
                    while self.idx < self.moves.len() {
                        if self.sort {
                            // Selection on demand: swap the best remaining
                            // candidate into place.
                            let mut best = self.idx;
                            for j in self.idx + 1..self.moves.len() {
                                if self.scores[j] > self.scores[best] {
                                    best = j;
                                }
                            }
                            self.moves.swap(self.idx, best);
                            self.scores.swap(self.idx, best);
                        }
                        let m = self.moves[self.idx];
                        self.idx += 1;
                        if Some(m) == self.hash_move
                            || Some(m) == self.pv_move
                            || Some(m) == self.response_move
                        {
                            continue;
                        }
                        return Some(m);
                    }
                    return None;
                }
            }
        }
    }
}

impl Default for MovePicker {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tak::MoveKind;

    fn drain(picker: &mut MovePicker, p: &Position, history: &HistoryTable) -> Vec<Move> {
        let mut st = Stats::default();
        let mut out = Vec::new();
        while let Some(m) = picker.next(p, history, &mut st) {
            out.push(m);
        }
        out
    }

    fn opening() -> Position {
        Position::new(3).unwrap()
    }

    #[test]
    fn test_specials_come_first_in_order() {
        let p = opening();
        let history = HistoryTable::new(3);
        let hash = Move::place(MoveKind::PlaceFlat, 1, 1);
        let pv = Move::place(MoveKind::PlaceFlat, 0, 0);
        let resp = Move::place(MoveKind::PlaceFlat, 2, 2);

        let mut picker = MovePicker::new();
        picker.seed(Some(hash), Some(pv), Some(resp), false);
        let yielded = drain(&mut picker, &p, &history);

        assert_eq!(yielded[0], hash);
        assert_eq!(yielded[1], pv);
        assert_eq!(yielded[2], resp);
        // All nine placements appear exactly once.
        assert_eq!(yielded.len(), 9);
        for (i, a) in yielded.iter().enumerate() {
            for b in &yielded[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_duplicate_specials_are_collapsed() {
        let p = opening();
        let history = HistoryTable::new(3);
        let m = Move::place(MoveKind::PlaceFlat, 1, 1);

        let mut picker = MovePicker::new();
        picker.seed(Some(m), Some(m), Some(m), false);
        let yielded = drain(&mut picker, &p, &history);
        assert_eq!(yielded[0], m);
        assert_eq!(yielded.len(), 9);
    }

    #[test]
    fn test_history_orders_moves() {
        let p = opening();
        let mut history = HistoryTable::new(3);
        let hot = Move::place(MoveKind::PlaceFlat, 2, 1);
        let warm = Move::place(MoveKind::PlaceFlat, 0, 2);
        history.add_cut(hot.hash(), 6);
        history.add_cut(warm.hash(), 3);

        let mut picker = MovePicker::new();
        picker.seed(None, None, None, false);
        let yielded = drain(&mut picker, &p, &history);
        assert_eq!(yielded[0], hot);
        assert_eq!(yielded[1], warm);
    }

    #[test]
    fn test_no_sort_keeps_generation_order() {
        let p = opening();
        let mut history = HistoryTable::new(3);
        let hot = Move::place(MoveKind::PlaceFlat, 2, 1);
        history.add_cut(hot.hash(), 6);

        let mut picker = MovePicker::new();
        picker.seed(None, None, None, true);
        let yielded = drain(&mut picker, &p, &history);

        let mut expected = Vec::new();
        p.all_moves(&mut expected);
        assert_eq!(yielded, expected);
    }

    #[test]
    fn test_reset_restarts_from_the_top() {
        let p = opening();
        let history = HistoryTable::new(3);
        let mut picker = MovePicker::new();
        picker.seed(None, None, None, false);

        let mut st = Stats::default();
        let first = picker.next(&p, &history, &mut st).unwrap();
        picker.next(&p, &history, &mut st).unwrap();
        picker.next(&p, &history, &mut st).unwrap();

        picker.reset();
        assert_eq!(picker.next(&p, &history, &mut st).unwrap(), first);
        // Generation ran once; the counter reflects a single position.
        assert_eq!(st.generated, 9);
    }
}

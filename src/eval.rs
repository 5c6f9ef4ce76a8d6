/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};

use crate::tak::{Color, GameOver, Position};
use crate::Score;

/// A static evaluation function, in negamax convention.
pub type Evaluator = Box<dyn Fn(&Position) -> Score + Send>;

/// Weights for the default evaluator's terms. All values are from White's
/// point of view per-occurrence; the evaluator sums White minus Black and
/// flips the sign for Black to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    /// A flat stone controlling its square.
    pub top_flat: i64,
    /// A standing stone controlling its square.
    pub standing: i64,
    /// A capstone controlling its square.
    pub capstone: i64,
    /// A friendly stone buried beneath one of our tops.
    pub captured: i64,
    /// An enemy stone held beneath one of our tops.
    pub prisoner: i64,
    /// Per step of distance from the nearest edge, for flat tops.
    pub center: i64,
    /// Bonus for each road-piece group, indexed by `span - 1`, where span
    /// is the larger of the group's row and column extents.
    pub groups: [i64; 8],
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            top_flat: 400,
            standing: 200,
            capstone: 300,
            captured: -75,
            prisoner: 125,
            center: 40,
            groups: [0, 0, 80, 200, 400, 600, 800, 1000],
        }
    }
}

/// Per-size default weights.
///
/// Small boards are nearly all about flats; larger boards lean harder on
/// group building and stack control.
pub fn default_weights(size: usize) -> Weights {
    let base = Weights::default();
    match size {
        3 | 4 => Weights {
            standing: 100,
            center: 20,
            groups: [0, 0, 120, 300, 0, 0, 0, 0],
            ..base
        },
        6 => Weights {
            prisoner: 150,
            groups: [0, 0, 60, 150, 300, 500, 800, 0],
            ..base
        },
        7 | 8 => Weights {
            top_flat: 350,
            prisoner: 150,
            center: 30,
            groups: [0, 0, 50, 120, 250, 400, 600, 900],
            ..base
        },
        _ => base,
    }
}

/// Builds an evaluator for boards of edge length `size`, using the default
/// weights when none are supplied.
pub fn make_evaluator(size: usize, weights: Option<&Weights>) -> Evaluator {
    let w = weights.copied().unwrap_or_else(|| default_weights(size));
    Box::new(move |p: &Position| evaluate(&w, p))
}

/// Evaluates `p` under `w`, from the side to move's point of view.
///
/// Terminal positions score near [`Score::MAX_EVAL`], offset by the ply at
/// which they occur so that earlier wins (and later losses) are preferred.
/// Non-terminal magnitudes stay far below [`Score::WIN_THRESHOLD`].
pub fn evaluate(w: &Weights, p: &Position) -> Score {
    if let Some(result) = p.game_over() {
        return evaluate_terminal(p, result);
    }

    let white = side_score(w, p, Color::White);
    let black = side_score(w, p, Color::Black);
    let score = Score::new(white - black);
    match p.to_move() {
        Color::White => score,
        Color::Black => -score,
    }
}

fn evaluate_terminal(p: &Position, result: GameOver) -> Score {
    let move_no = p.move_number() as i64;
    match result.winner() {
        None => Score::DRAW,
        Some(winner) if winner == p.to_move() => Score::MAX_EVAL - move_no,
        Some(_) => Score::MIN_EVAL + move_no,
    }
}

fn side_score(w: &Weights, p: &Position, color: Color) -> i64 {
    let size = p.size() as i64;
    let tops = p.tops(color);
    let walls = tops & p.walls();
    let caps = tops & p.capstones();
    let flats = tops & !p.walls() & !p.capstones();

    let mut score = 0;
    score += flats.count() as i64 * w.top_flat;
    score += walls.count() as i64 * w.standing;
    score += caps.count() as i64 * w.capstone;

    // Flats gain a little for being central.
    for i in flats.squares() {
        let (x, y) = (i as i64 % size, i as i64 / size);
        score += w.center * (x.min(size - 1 - x) + y.min(size - 1 - y));
    }

    // Stones held beneath our tops: enemies are prisoners, friends are
    // mostly dead weight.
    for i in tops.squares() {
        let (x, y) = ((i % p.size()) as u8, (i / p.size()) as u8);
        let h = p.height_at(x, y);
        for d in 1..h {
            let buried = p.stack_at(x, y, d).expect("stone in stack");
            if buried.color() == color {
                score += w.captured;
            } else {
                score += w.prisoner;
            }
        }
    }

    // Connected road-piece groups, scored by their longer extent.
    let c = p.constants();
    c.for_each_group(p.road_pieces(color), |g| {
        let (mut min_x, mut max_x) = (i64::MAX, i64::MIN);
        let (mut min_y, mut max_y) = (i64::MAX, i64::MIN);
        for i in g.squares() {
            let (x, y) = (i as i64 % size, i as i64 / size);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        let span = (max_x - min_x + 1).max(max_y - min_y + 1);
        score += w.groups[(span as usize - 1).min(7)];
    });

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_board_is_even() {
        let w = default_weights(5);
        let p = Position::new(5).unwrap();
        assert_eq!(evaluate(&w, &p), Score::DRAW);
    }

    #[test]
    fn test_sign_follows_side_to_move() {
        let w = default_weights(3);
        // One white flat on the board; White is ahead.
        let p: Position = "x3/x3/1,x2 2 2".parse().unwrap();
        assert_eq!(p.to_move(), Color::Black);
        let for_black = evaluate(&w, &p);
        assert!(for_black < 0);

        let p: Position = "x3/x3/1,x2 1 2".parse().unwrap();
        let for_white = evaluate(&w, &p);
        assert_eq!(for_white, -for_black);
    }

    #[test]
    fn test_terminal_scores_are_decisive() {
        let w = default_weights(5);
        // White road across the bottom rank; Black to move has lost.
        let p: Position = "x5/x5/x5/x5/1,1,1,1,1 2 6".parse().unwrap();
        let v = evaluate(&w, &p);
        assert!(v.is_decisive());
        assert!(v < 0);

        // Same board from White's side is a proven win.
        let p: Position = "x5/x5/x5/x5/1,1,1,1,1 1 6".parse().unwrap();
        let v = evaluate(&w, &p);
        assert!(v.is_winning());
    }

    #[test]
    fn test_faster_wins_score_higher() {
        let w = default_weights(5);
        let early: Position = "x5/x5/x5/x5/1,1,1,1,1 1 6".parse().unwrap();
        let late: Position = "x5/x5/x5/x5/1,1,1,1,1 1 20".parse().unwrap();
        assert!(evaluate(&w, &early) > evaluate(&w, &late));
    }

    #[test]
    fn test_prisoners_beat_captives() {
        let w = default_weights(5);
        // A white top holding a black prisoner...
        let with_prisoner: Position = "x5/x5/x2,21,x2/x5/x5 1 4".parse().unwrap();
        // ...versus a white top holding its own stone.
        let with_captive: Position = "x5/x5/x2,11,x2/x5/x5 1 4".parse().unwrap();
        assert!(evaluate(&w, &with_prisoner) > evaluate(&w, &with_captive));
    }

    #[test]
    fn test_weights_json_round_trip() {
        let w = default_weights(6);
        let js = serde_json::to_string(&w).unwrap();
        let back: Weights = serde_json::from_str(&js).unwrap();
        assert_eq!(w, back);

        // Partial overrides fall back to defaults.
        let partial: Weights = serde_json::from_str(r#"{"top_flat": 777}"#).unwrap();
        assert_eq!(partial.top_flat, 777);
        assert_eq!(partial.standing, Weights::default().standing);
    }
}

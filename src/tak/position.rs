/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::{bail, Result};
use thiserror::Error;

use super::{zobrist, Bitboard, Color, Constants, Drops, Move, MoveKind, Piece, PieceKind};

/// Squares on the largest supported board.
pub const MAX_SQUARES: usize = 64;

/// Stones per player, by board size.
const DEFAULT_PIECES: [u8; 9] = [0, 0, 0, 10, 15, 21, 30, 40, 50];

/// Capstones per player, by board size.
const DEFAULT_CAPS: [u8; 9] = [0, 0, 0, 0, 0, 1, 1, 1, 2];

/// Why a move could not be applied to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("square is out of bounds")]
    OffBoard,
    #[error("square is occupied")]
    Occupied,
    #[error("no pieces of that kind left in reserve")]
    OutOfPieces,
    #[error("the first two plies must place a flat")]
    OpeningRestriction,
    #[error("stack is not controlled by the moving player")]
    NotYourStack,
    #[error("slide carries too many or too few pieces")]
    BadCarry,
    #[error("slide is blocked by a standing stone or capstone")]
    Blocked,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOver {
    RoadWin(Color),
    FlatsWin(Color),
    Draw,
}

impl GameOver {
    /// The winning color, if any.
    #[inline(always)]
    pub const fn winner(&self) -> Option<Color> {
        match self {
            Self::RoadWin(c) | Self::FlatsWin(c) => Some(*c),
            Self::Draw => None,
        }
    }
}

/// A Tak position.
///
/// The representation is flat and `Copy`: per-square stack heights, the
/// colors buried beneath each top stone packed into a `u64` (bit 0 is the
/// stone directly beneath the top, bit set means Black), and bitboards of
/// the top stones by color and kind. Successors are produced by value, so
/// the search never allocates per node.
#[derive(Clone, Copy, PartialEq)]
pub struct Position {
    size: u8,
    move_no: u16,
    white_stones: u8,
    white_caps: u8,
    black_stones: u8,
    black_caps: u8,
    height: [u8; MAX_SQUARES],
    stacks: [u64; MAX_SQUARES],
    white: Bitboard,
    black: Bitboard,
    standing: Bitboard,
    caps: Bitboard,
    hash: u64,
}

impl Position {
    /// An empty position of edge length `size` (3–8) with full reserves.
    pub fn new(size: usize) -> Result<Self> {
        if !(3..=8).contains(&size) {
            bail!("board size must be between 3 and 8, got {size}");
        }
        Ok(Self {
            size: size as u8,
            move_no: 0,
            white_stones: DEFAULT_PIECES[size],
            white_caps: DEFAULT_CAPS[size],
            black_stones: DEFAULT_PIECES[size],
            black_caps: DEFAULT_CAPS[size],
            height: [0; MAX_SQUARES],
            stacks: [0; MAX_SQUARES],
            white: Bitboard::EMPTY,
            black: Bitboard::EMPTY,
            standing: Bitboard::EMPTY,
            caps: Bitboard::EMPTY,
            hash: 0,
        })
    }

    /// Board edge length.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// Number of squares on the board.
    #[inline(always)]
    pub fn squares(&self) -> usize {
        self.size as usize * self.size as usize
    }

    /// Ply counter; zero-based, White moves on even plies.
    #[inline(always)]
    pub fn move_number(&self) -> usize {
        self.move_no as usize
    }

    /// The side to move.
    #[inline(always)]
    pub fn to_move(&self) -> Color {
        Color::from_bool(self.move_no % 2 == 1)
    }

    /// The position hash, covering the board contents and the side to move.
    #[inline(always)]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// White's remaining flat/standing stones.
    #[inline(always)]
    pub fn white_stones(&self) -> u8 {
        self.white_stones
    }

    /// Black's remaining flat/standing stones.
    #[inline(always)]
    pub fn black_stones(&self) -> u8 {
        self.black_stones
    }

    /// Remaining `(stones, capstones)` for `color`.
    #[inline(always)]
    pub fn reserves(&self, color: Color) -> (u8, u8) {
        match color {
            Color::White => (self.white_stones, self.white_caps),
            Color::Black => (self.black_stones, self.black_caps),
        }
    }

    /// All occupied squares.
    #[inline(always)]
    pub fn occupied(&self) -> Bitboard {
        self.white | self.black
    }

    /// Squares whose top stone belongs to `color`.
    #[inline(always)]
    pub fn tops(&self, color: Color) -> Bitboard {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    /// Squares topped by a standing stone.
    #[inline(always)]
    pub fn walls(&self) -> Bitboard {
        self.standing
    }

    /// Squares topped by a capstone.
    #[inline(always)]
    pub fn capstones(&self) -> Bitboard {
        self.caps
    }

    /// Squares whose top stone counts toward a road for `color`.
    #[inline(always)]
    pub fn road_pieces(&self, color: Color) -> Bitboard {
        self.tops(color) & !self.standing
    }

    /// Stack height at `(x, y)`.
    #[inline(always)]
    pub fn height_at(&self, x: u8, y: u8) -> u8 {
        self.height[self.index(x, y)]
    }

    /// The top stone at `(x, y)`, if the square is occupied.
    pub fn top_at(&self, x: u8, y: u8) -> Option<Piece> {
        let i = self.index(x, y);
        if self.height[i] == 0 {
            return None;
        }
        let color = Color::from_bool(self.black.contains(i));
        let kind = if self.caps.contains(i) {
            PieceKind::Capstone
        } else if self.standing.contains(i) {
            PieceKind::Standing
        } else {
            PieceKind::Flat
        };
        Some(Piece::new(color, kind))
    }

    /// The stone at depth `d` from the top of the stack at `(x, y)`
    /// (`d = 0` is the top).
    pub fn stack_at(&self, x: u8, y: u8, d: u8) -> Option<Piece> {
        let i = self.index(x, y);
        let h = self.height[i];
        if d >= h {
            return None;
        }
        if d == 0 {
            return self.top_at(x, y);
        }
        let black = (self.stacks[i] >> (d - 1)) & 1 == 1;
        Some(Piece::new(Color::from_bool(black), PieceKind::Flat))
    }

    /// Board geometry for this position's size.
    #[inline(always)]
    pub fn constants(&self) -> Constants {
        Constants::new(self.size as usize)
    }

    #[inline(always)]
    fn index(&self, x: u8, y: u8) -> usize {
        y as usize * self.size as usize + x as usize
    }

    /// Terminal check: `None` while the game is in progress.
    pub fn game_over(&self) -> Option<GameOver> {
        if let Some(color) = self.road_winner() {
            return Some(GameOver::RoadWin(color));
        }

        let white_out = self.white_stones + self.white_caps == 0;
        let black_out = self.black_stones + self.black_caps == 0;
        let full = self.occupied() == self.constants().mask;
        if !white_out && !black_out && !full {
            return None;
        }

        let (w, b) = self.flat_counts();
        match w.cmp(&b) {
            std::cmp::Ordering::Greater => Some(GameOver::FlatsWin(Color::White)),
            std::cmp::Ordering::Less => Some(GameOver::FlatsWin(Color::Black)),
            std::cmp::Ordering::Equal => Some(GameOver::Draw),
        }
    }

    /// Count of flat top stones per color, the flats-win tiebreaker.
    pub fn flat_counts(&self) -> (u32, u32) {
        let flats = !self.standing & !self.caps;
        ((self.white & flats).count(), (self.black & flats).count())
    }

    fn road_winner(&self) -> Option<Color> {
        let c = self.constants();
        let white = c.spans(self.road_pieces(Color::White));
        let black = c.spans(self.road_pieces(Color::Black));
        match (white, black) {
            // Both roads can complete on one slide; the player who moved wins.
            (true, true) => Some(self.to_move().opponent()),
            (true, false) => Some(Color::White),
            (false, true) => Some(Color::Black),
            (false, false) => None,
        }
    }

    /// Applies `mv`, writing the successor into `dst`.
    ///
    /// `dst`'s previous contents are irrelevant; on error they are
    /// unspecified. Fully validates the move, so replaying a stale
    /// transposition-table move is safe.
    #[inline(always)]
    pub fn apply_move_into(&self, mv: &Move, dst: &mut Position) -> Result<(), MoveError> {
        *dst = *self;
        dst.apply(mv)
    }

    /// Applies `mv`, returning the successor by value.
    #[inline(always)]
    pub fn make_move(&self, mv: &Move) -> Result<Position, MoveError> {
        let mut child = *self;
        child.apply(mv)?;
        Ok(child)
    }

    fn apply(&mut self, mv: &Move) -> Result<(), MoveError> {
        match mv.kind {
            MoveKind::Pass => {}
            k if k.is_place() => self.apply_place(mv)?,
            _ => self.apply_slide(mv)?,
        }
        self.move_no += 1;
        self.hash ^= zobrist::SIDE_KEY;
        Ok(())
    }

    fn apply_place(&mut self, mv: &Move) -> Result<(), MoveError> {
        if mv.x >= self.size || mv.y >= self.size {
            return Err(MoveError::OffBoard);
        }
        let i = self.index(mv.x, mv.y);
        if self.height[i] != 0 {
            return Err(MoveError::Occupied);
        }
        let kind = mv.kind.placed().expect("placement kind");

        // Swap opening: each player's first move places an opposing flat.
        let color = if self.move_no < 2 {
            if kind != PieceKind::Flat {
                return Err(MoveError::OpeningRestriction);
            }
            self.to_move().opponent()
        } else {
            self.to_move()
        };

        let reserve = match (color, kind) {
            (Color::White, PieceKind::Capstone) => &mut self.white_caps,
            (Color::White, _) => &mut self.white_stones,
            (Color::Black, PieceKind::Capstone) => &mut self.black_caps,
            (Color::Black, _) => &mut self.black_stones,
        };
        if *reserve == 0 {
            return Err(MoveError::OutOfPieces);
        }
        *reserve -= 1;

        self.height[i] = 1;
        self.stacks[i] = 0;
        match color {
            Color::White => self.white.insert(i),
            Color::Black => self.black.insert(i),
        }
        match kind {
            PieceKind::Standing => self.standing.insert(i),
            PieceKind::Capstone => self.caps.insert(i),
            PieceKind::Flat => {}
        }
        self.hash ^= self.hash_at(i);
        Ok(())
    }

    fn apply_slide(&mut self, mv: &Move) -> Result<(), MoveError> {
        if self.move_no < 2 {
            return Err(MoveError::OpeningRestriction);
        }
        if mv.x >= self.size || mv.y >= self.size {
            return Err(MoveError::OffBoard);
        }
        let (dx, dy) = mv.kind.direction().expect("slide kind");
        let i = self.index(mv.x, mv.y);

        let ndrops = mv.drops.len();
        let count = mv.drops.total() as u32;
        if ndrops == 0 || count == 0 || count > self.size as u32 {
            return Err(MoveError::BadCarry);
        }
        if mv.drops.iter().any(|d| d == 0) {
            return Err(MoveError::BadCarry);
        }
        if (self.height[i] as u32) < count {
            return Err(MoveError::BadCarry);
        }
        if !self.tops(self.to_move()).contains(i) {
            return Err(MoveError::NotYourStack);
        }
        let carrying_cap = self.caps.contains(i);

        // Validate the whole path before touching anything.
        let (mut cx, mut cy) = (mv.x as i32, mv.y as i32);
        for step in 0..ndrops {
            cx += dx;
            cy += dy;
            if cx < 0 || cy < 0 || cx >= self.size as i32 || cy >= self.size as i32 {
                return Err(MoveError::OffBoard);
            }
            let j = cy as usize * self.size as usize + cx as usize;
            if self.caps.contains(j) {
                return Err(MoveError::Blocked);
            }
            if self.standing.contains(j) {
                // Only a lone capstone, on its final drop, may flatten a wall.
                let last = step == ndrops - 1;
                if !(last && carrying_cap && mv.drops.get(step) == 1) {
                    return Err(MoveError::Blocked);
                }
            }
        }

        // Pick up.
        let top_color = self.to_move();
        let top_kind = if self.caps.contains(i) {
            PieceKind::Capstone
        } else if self.standing.contains(i) {
            PieceKind::Standing
        } else {
            PieceKind::Flat
        };
        self.hash ^= self.hash_at(i);
        let orig = self.stacks[i];
        let mut carried = orig & nbits(count - 1);
        let promoted_black = (orig >> (count - 1)) & 1 == 1;
        self.stacks[i] = orig >> count;
        self.height[i] -= count as u8;
        self.white.remove(i);
        self.black.remove(i);
        self.standing.remove(i);
        self.caps.remove(i);
        if self.height[i] > 0 {
            // The exposed stone is always a flat.
            match Color::from_bool(promoted_black) {
                Color::White => self.white.insert(i),
                Color::Black => self.black.insert(i),
            }
        }
        self.hash ^= self.hash_at(i);

        // Walk the line, dropping from the bottom of the carried pile.
        let mut r = count;
        let (mut cx, mut cy) = (mv.x as i32, mv.y as i32);
        for step in 0..ndrops {
            cx += dx;
            cy += dy;
            let j = cy as usize * self.size as usize + cx as usize;
            let d = mv.drops.get(step) as u32;
            self.hash ^= self.hash_at(j);
            let hj = self.height[j];
            let old_top_black: u64 = u64::from(hj > 0 && self.black.contains(j));

            self.white.remove(j);
            self.black.remove(j);
            if step == ndrops - 1 {
                // Final drop: the original top lands with its kind intact.
                let mut s = self.stacks[j].wrapping_shl(r);
                if hj > 0 {
                    s |= old_top_black << (r - 1);
                }
                s |= carried & nbits(r - 1);
                self.stacks[j] = s;
                self.height[j] = hj + r as u8;
                // A flattened wall stays in the stack as a flat.
                self.standing.remove(j);
                match top_color {
                    Color::White => self.white.insert(j),
                    Color::Black => self.black.insert(j),
                }
                match top_kind {
                    PieceKind::Standing => self.standing.insert(j),
                    PieceKind::Capstone => self.caps.insert(j),
                    PieceKind::Flat => {}
                }
            } else {
                // Intermediate drop: the bottom `d` of the hand, all flats.
                let new_top_black = (carried >> (r - 1 - d)) & 1 == 1;
                let mut s = self.stacks[j].wrapping_shl(d);
                if hj > 0 {
                    s |= old_top_black << (d - 1);
                }
                s |= (carried >> (r - d)) & nbits(d - 1);
                self.stacks[j] = s;
                self.height[j] = hj + d as u8;
                match Color::from_bool(new_top_black) {
                    Color::White => self.white.insert(j),
                    Color::Black => self.black.insert(j),
                }
                carried &= nbits(r - 1 - d);
                r -= d;
            }
            self.hash ^= self.hash_at(j);
        }
        Ok(())
    }

    /// The hash contribution of the stack at square `i`.
    fn hash_at(&self, i: usize) -> u64 {
        let h = self.height[i];
        if h == 0 {
            return 0;
        }
        let mut s = zobrist::SQUARE_KEYS[i];
        let top_color = Color::from_bool(self.black.contains(i));
        let top_kind = if self.caps.contains(i) {
            PieceKind::Capstone
        } else if self.standing.contains(i) {
            PieceKind::Standing
        } else {
            PieceKind::Flat
        };
        s ^= Piece::new(top_color, top_kind).code();
        s = s.wrapping_mul(zobrist::PRIME64);
        let mut bits = self.stacks[i];
        for _ in 1..h {
            let c = Color::from_bool(bits & 1 == 1);
            s ^= Piece::new(c, PieceKind::Flat).code();
            s = s.wrapping_mul(zobrist::PRIME64);
            bits >>= 1;
        }
        s
    }

    /// Recomputes the hash from scratch. Used after bulk construction.
    pub(crate) fn rehash(&mut self) {
        let mut h = 0;
        for i in 0..self.squares() {
            h ^= self.hash_at(i);
        }
        if self.move_no % 2 == 1 {
            h ^= zobrist::SIDE_KEY;
        }
        self.hash = h;
    }

    /// Places a whole stack during bulk construction (TPS parsing, tests).
    ///
    /// `pieces` runs bottom to top. Reserves are debited per stone.
    pub(crate) fn set_stack(&mut self, x: u8, y: u8, pieces: &[Piece]) -> Result<()> {
        let i = self.index(x, y);
        if pieces.is_empty() {
            bail!("cannot set an empty stack");
        }
        for (d, p) in pieces.iter().enumerate() {
            if d + 1 < pieces.len() && p.kind() != PieceKind::Flat {
                bail!("only the top stone of a stack may be standing or a capstone");
            }
            let reserve = match (p.color(), p.kind()) {
                (Color::White, PieceKind::Capstone) => &mut self.white_caps,
                (Color::White, _) => &mut self.white_stones,
                (Color::Black, PieceKind::Capstone) => &mut self.black_caps,
                (Color::Black, _) => &mut self.black_stones,
            };
            if *reserve == 0 {
                bail!("stack exceeds the {} reserve", p.color());
            }
            *reserve -= 1;
        }
        let top = pieces[pieces.len() - 1];
        self.height[i] = pieces.len() as u8;
        let mut bits = 0u64;
        for (k, p) in pieces[..pieces.len() - 1].iter().enumerate() {
            // Bit k is the stone at depth k + 1 from the top.
            let depth_from_top = pieces.len() - 1 - k;
            bits |= (p.color().is_black() as u64) << (depth_from_top - 1);
        }
        self.stacks[i] = bits;
        match top.color() {
            Color::White => self.white.insert(i),
            Color::Black => self.black.insert(i),
        }
        match top.kind() {
            PieceKind::Standing => self.standing.insert(i),
            PieceKind::Capstone => self.caps.insert(i),
            PieceKind::Flat => {}
        }
        Ok(())
    }

    /// Sets the ply counter during bulk construction.
    pub(crate) fn set_move_number(&mut self, move_no: usize) {
        self.move_no = move_no as u16;
    }

    /// All legal moves, written into `buf` (cleared first). The buffer is
    /// reused across calls so the steady state does not allocate.
    pub fn all_moves(&self, buf: &mut Vec<Move>) {
        buf.clear();

        // Swap opening: flats only, on any empty square.
        if self.move_no < 2 {
            for i in 0..self.squares() {
                if self.height[i] == 0 {
                    let (x, y) = (i % self.size as usize, i / self.size as usize);
                    buf.push(Move::place(MoveKind::PlaceFlat, x as u8, y as u8));
                }
            }
            return;
        }

        let (stones, caps) = self.reserves(self.to_move());
        for i in 0..self.squares() {
            if self.height[i] != 0 {
                continue;
            }
            let (x, y) = ((i % self.size as usize) as u8, (i / self.size as usize) as u8);
            if stones > 0 {
                buf.push(Move::place(MoveKind::PlaceFlat, x, y));
                buf.push(Move::place(MoveKind::PlaceStanding, x, y));
            }
            if caps > 0 {
                buf.push(Move::place(MoveKind::PlaceCapstone, x, y));
            }
        }

        for i in self.tops(self.to_move()).squares() {
            let (x, y) = ((i % self.size as usize) as u8, (i / self.size as usize) as u8);
            let limit = self.height[i].min(self.size);
            let carrying_cap = self.caps.contains(i);
            for kind in [
                MoveKind::SlideLeft,
                MoveKind::SlideRight,
                MoveKind::SlideUp,
                MoveKind::SlideDown,
            ] {
                let (dx, dy) = kind.direction().expect("slide kind");
                for take in 1..=limit {
                    self.drop_sequences(buf, x, y, kind, dx, dy, 1, take, Drops::EMPTY, carrying_cap);
                }
            }
        }
    }

    /// Emits every legal way to distribute `remaining` carried stones along
    /// the slide line, starting `step` squares from the origin.
    #[allow(clippy::too_many_arguments)]
    fn drop_sequences(
        &self,
        buf: &mut Vec<Move>,
        ox: u8,
        oy: u8,
        kind: MoveKind,
        dx: i32,
        dy: i32,
        step: i32,
        remaining: u8,
        drops: Drops,
        carrying_cap: bool,
    ) {
        let cx = ox as i32 + dx * step;
        let cy = oy as i32 + dy * step;
        if cx < 0 || cy < 0 || cx >= self.size as i32 || cy >= self.size as i32 {
            return;
        }
        let j = cy as usize * self.size as usize + cx as usize;
        if self.caps.contains(j) {
            return;
        }
        if self.standing.contains(j) {
            if carrying_cap && remaining == 1 {
                buf.push(Move::slide(ox, oy, kind, drops.push(1)));
            }
            return;
        }
        for d in 1..=remaining {
            if d == remaining {
                buf.push(Move::slide(ox, oy, kind, drops.push(d)));
            } else {
                self.drop_sequences(
                    buf,
                    ox,
                    oy,
                    kind,
                    dx,
                    dy,
                    step + 1,
                    remaining - d,
                    drops.push(d),
                    carrying_cap,
                );
            }
        }
    }
}

/// The low `n` bits set.
#[inline(always)]
const fn nbits(n: u32) -> u64 {
    if n == 0 {
        0
    } else {
        (1u64 << n) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(p: &Position, kind: MoveKind, x: u8, y: u8) -> Position {
        p.make_move(&Move::place(kind, x, y)).unwrap()
    }

    #[test]
    fn test_swap_opening() {
        let p = Position::new(5).unwrap();
        assert_eq!(p.to_move(), Color::White);

        // White's first placement puts down a *black* flat.
        let p = place(&p, MoveKind::PlaceFlat, 0, 0);
        assert_eq!(p.top_at(0, 0).unwrap().color(), Color::Black);
        assert_eq!(p.black_stones(), 20);
        assert_eq!(p.white_stones(), 21);
        assert_eq!(p.to_move(), Color::Black);

        // Black's first placement puts down a *white* flat.
        let p = place(&p, MoveKind::PlaceFlat, 4, 4);
        assert_eq!(p.top_at(4, 4).unwrap().color(), Color::White);
        assert_eq!(p.white_stones(), 20);

        // Standing placements are rejected during the opening.
        let fresh = Position::new(5).unwrap();
        assert_eq!(
            fresh.make_move(&Move::place(MoveKind::PlaceStanding, 0, 0)),
            Err(MoveError::OpeningRestriction)
        );
    }

    #[test]
    fn test_opening_moves_are_flat_placements() {
        let p = Position::new(5).unwrap();
        let mut buf = Vec::new();
        p.all_moves(&mut buf);
        assert_eq!(buf.len(), 25);
        assert!(buf.iter().all(|m| m.kind == MoveKind::PlaceFlat));
    }

    #[test]
    fn test_placement_on_occupied_square() {
        let p = Position::new(5).unwrap();
        let p = place(&p, MoveKind::PlaceFlat, 2, 2);
        assert_eq!(
            p.make_move(&Move::place(MoveKind::PlaceFlat, 2, 2)),
            Err(MoveError::Occupied)
        );
    }

    fn midgame() -> Position {
        // Past the swap opening, with a white stack on c3.
        let p = Position::new(5).unwrap();
        let p = place(&p, MoveKind::PlaceFlat, 0, 4); // black flat a5
        let p = place(&p, MoveKind::PlaceFlat, 4, 4); // white flat e5
        let p = place(&p, MoveKind::PlaceFlat, 2, 2); // white flat c3
        place(&p, MoveKind::PlaceFlat, 3, 3) // black flat d4
    }

    #[test]
    fn test_simple_slide() {
        let p = midgame();
        assert_eq!(p.to_move(), Color::White);
        let m = Move::slide(2, 2, MoveKind::SlideRight, Drops::single(1));
        let p = p.make_move(&m).unwrap();
        assert_eq!(p.height_at(2, 2), 0);
        assert_eq!(p.height_at(3, 2), 1);
        assert_eq!(p.top_at(3, 2).unwrap().color(), Color::White);
    }

    #[test]
    fn test_slide_stacking_and_multi_drop() {
        // Build a three-high white stack on c3, then spread it rightward.
        let mut p = Position::new(5).unwrap();
        p.set_stack(0, 4, &[Piece::new(Color::Black, PieceKind::Flat)])
            .unwrap();
        p.set_stack(4, 4, &[Piece::new(Color::White, PieceKind::Flat)])
            .unwrap();
        p.set_stack(
            2,
            2,
            &[
                Piece::new(Color::Black, PieceKind::Flat),
                Piece::new(Color::Black, PieceKind::Flat),
                Piece::new(Color::White, PieceKind::Flat),
            ],
        )
        .unwrap();
        p.set_move_number(6);
        p.rehash();

        // Carry all three, dropping 2 on d3 and 1 on e3.
        let m = Move::slide(2, 2, MoveKind::SlideRight, Drops::EMPTY.push(2).push(1));
        let p = p.make_move(&m).unwrap();
        assert_eq!(p.height_at(2, 2), 0);
        assert_eq!(p.height_at(3, 2), 2);
        assert_eq!(p.height_at(4, 2), 1);
        // d3: both black flats, black on top.
        assert_eq!(p.top_at(3, 2).unwrap(), Piece::new(Color::Black, PieceKind::Flat));
        assert_eq!(
            p.stack_at(3, 2, 1).unwrap(),
            Piece::new(Color::Black, PieceKind::Flat)
        );
        // e3: the original white top.
        assert_eq!(p.top_at(4, 2).unwrap(), Piece::new(Color::White, PieceKind::Flat));
    }

    #[test]
    fn test_wall_blocks_and_capstone_flattens() {
        let mut p = Position::new(5).unwrap();
        p.set_stack(0, 4, &[Piece::new(Color::Black, PieceKind::Flat)])
            .unwrap();
        p.set_stack(4, 4, &[Piece::new(Color::White, PieceKind::Flat)])
            .unwrap();
        p.set_stack(2, 2, &[Piece::new(Color::White, PieceKind::Capstone)])
            .unwrap();
        p.set_stack(3, 2, &[Piece::new(Color::Black, PieceKind::Standing)])
            .unwrap();
        p.set_stack(3, 1, &[Piece::new(Color::White, PieceKind::Flat)])
            .unwrap();
        p.set_move_number(6);
        p.rehash();

        // A flat cannot move onto the wall.
        let blocked = Move::slide(3, 1, MoveKind::SlideUp, Drops::single(1));
        assert_eq!(p.make_move(&blocked), Err(MoveError::Blocked));

        // The capstone flattens it.
        let smash = Move::slide(2, 2, MoveKind::SlideRight, Drops::single(1));
        let q = p.make_move(&smash).unwrap();
        assert_eq!(q.height_at(3, 2), 2);
        let top = q.top_at(3, 2).unwrap();
        assert_eq!(top, Piece::new(Color::White, PieceKind::Capstone));
        // The wall beneath is now a black flat.
        assert_eq!(
            q.stack_at(3, 2, 1).unwrap(),
            Piece::new(Color::Black, PieceKind::Flat)
        );

        // A capstone dropping together with another stone cannot flatten.
        let mut tall = Position::new(5).unwrap();
        tall.set_stack(0, 4, &[Piece::new(Color::Black, PieceKind::Flat)])
            .unwrap();
        tall.set_stack(
            3,
            3,
            &[
                Piece::new(Color::White, PieceKind::Flat),
                Piece::new(Color::White, PieceKind::Capstone),
            ],
        )
        .unwrap();
        tall.set_stack(3, 2, &[Piece::new(Color::Black, PieceKind::Standing)])
            .unwrap();
        tall.set_move_number(6);
        tall.rehash();
        let m = Move::slide(3, 3, MoveKind::SlideDown, Drops::single(2));
        assert_eq!(tall.make_move(&m), Err(MoveError::Blocked));
    }

    #[test]
    fn test_hash_toggles_side_to_move() {
        let p = midgame();
        let q = p.make_move(&Move::PASS).unwrap();
        assert_ne!(p.hash(), q.hash());
        let r = q.make_move(&Move::PASS).unwrap();
        assert_eq!(p.hash(), r.hash());
    }

    #[test]
    fn test_incremental_hash_matches_rehash() {
        let mut p = Position::new(5).unwrap();
        let moves = [
            Move::place(MoveKind::PlaceFlat, 0, 0),
            Move::place(MoveKind::PlaceFlat, 4, 4),
            Move::place(MoveKind::PlaceFlat, 2, 2),
            Move::place(MoveKind::PlaceStanding, 3, 2),
            Move::slide(2, 2, MoveKind::SlideUp, Drops::single(1)),
        ];
        for m in &moves {
            p = p.make_move(m).unwrap();
            let mut q = p;
            q.rehash();
            assert_eq!(p.hash(), q.hash(), "hash drifted after {m:?}");
        }
    }

    #[test]
    fn test_road_win() {
        let mut p = Position::new(5).unwrap();
        for x in 0..5 {
            p.set_stack(x, 0, &[Piece::new(Color::White, PieceKind::Flat)])
                .unwrap();
        }
        p.set_move_number(10);
        p.rehash();
        assert_eq!(p.game_over(), Some(GameOver::RoadWin(Color::White)));
    }

    #[test]
    fn test_wall_does_not_complete_road() {
        let mut p = Position::new(5).unwrap();
        for x in 0..4 {
            p.set_stack(x, 0, &[Piece::new(Color::White, PieceKind::Flat)])
                .unwrap();
        }
        p.set_stack(4, 0, &[Piece::new(Color::White, PieceKind::Standing)])
            .unwrap();
        p.set_move_number(10);
        p.rehash();
        assert_eq!(p.game_over(), None);
    }

    #[test]
    fn test_flats_win_on_full_board() {
        let mut p = Position::new(3).unwrap();
        // Fill the board: 5 white flats, 4 black flats, no road.
        // w b w
        // b w b  -> no same-colored orthogonal chain spans the board
        // w b w
        let colors = [
            Color::White,
            Color::Black,
            Color::White,
            Color::Black,
            Color::White,
            Color::Black,
            Color::White,
            Color::Black,
            Color::White,
        ];
        for (i, c) in colors.iter().enumerate() {
            p.set_stack(
                (i % 3) as u8,
                (i / 3) as u8,
                &[Piece::new(*c, PieceKind::Flat)],
            )
            .unwrap();
        }
        p.set_move_number(12);
        p.rehash();
        assert_eq!(p.game_over(), Some(GameOver::FlatsWin(Color::White)));
    }

    #[test]
    fn test_carry_limit() {
        let mut p = Position::new(3).unwrap();
        p.set_stack(0, 2, &[Piece::new(Color::Black, PieceKind::Flat)])
            .unwrap();
        p.set_stack(
            0,
            0,
            &[
                Piece::new(Color::White, PieceKind::Flat),
                Piece::new(Color::White, PieceKind::Flat),
                Piece::new(Color::White, PieceKind::Flat),
                Piece::new(Color::White, PieceKind::Flat),
            ],
        )
        .unwrap();
        p.set_move_number(6);
        p.rehash();
        // Carry limit on a 3x3 board is 3.
        let m = Move::slide(0, 0, MoveKind::SlideRight, Drops::EMPTY.push(2).push(2));
        assert_eq!(p.make_move(&m), Err(MoveError::BadCarry));
        let ok = Move::slide(0, 0, MoveKind::SlideRight, Drops::EMPTY.push(2).push(1));
        assert!(p.make_move(&ok).is_ok());
    }

    #[test]
    fn test_stale_tt_move_rejected() {
        // A move that was legal in one position must fail cleanly in another.
        let p = Position::new(5).unwrap();
        let m = Move::slide(2, 2, MoveKind::SlideRight, Drops::single(1));
        assert!(p.make_move(&m).is_err());
    }
}

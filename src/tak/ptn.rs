/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! PTN move notation and TPS position notation.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use super::{Drops, Move, MoveKind, Piece, PieceKind, Position};

/// Formats a move in PTN: `a1`, `Sa1`, `Ca1`, `c3>`, `3c3>111`.
///
/// The null move renders as `--`.
pub fn format_move(mv: &Move) -> String {
    let mut out = String::new();
    if mv.is_pass() {
        out.push_str("--");
        return out;
    }
    let square = |x: u8, y: u8| format!("{}{}", (b'a' + x) as char, y + 1);
    match mv.kind {
        MoveKind::PlaceFlat => out.push_str(&square(mv.x, mv.y)),
        MoveKind::PlaceStanding => {
            out.push('S');
            out.push_str(&square(mv.x, mv.y));
        }
        MoveKind::PlaceCapstone => {
            out.push('C');
            out.push_str(&square(mv.x, mv.y));
        }
        _ => {
            let count = mv.drops.total();
            if count > 1 {
                out.push((b'0' + count) as char);
            }
            out.push_str(&square(mv.x, mv.y));
            out.push(mv.kind.glyph().expect("slide kind"));
            if mv.drops.len() > 1 {
                for d in mv.drops.iter() {
                    out.push((b'0' + d) as char);
                }
            }
        }
    }
    out
}

/// Parses a PTN move.
pub fn parse_move(s: &str) -> Result<Move> {
    let s = s.trim();
    if s == "--" {
        return Ok(Move::PASS);
    }
    let bytes = s.as_bytes();
    let mut i = 0;

    // Optional carry count.
    let mut count: Option<u8> = None;
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        count = Some(bytes[i] - b'0');
        i += 1;
    }

    // Optional placement prefix.
    let mut place_kind = MoveKind::PlaceFlat;
    if i < bytes.len() && (bytes[i] == b'S' || bytes[i] == b'F' || bytes[i] == b'C') {
        place_kind = match bytes[i] {
            b'S' => MoveKind::PlaceStanding,
            b'C' => MoveKind::PlaceCapstone,
            _ => MoveKind::PlaceFlat,
        };
        i += 1;
    }

    // Square.
    if i + 2 > bytes.len() {
        bail!("move {s:?} is missing a square");
    }
    let file = bytes[i];
    let rank = bytes[i + 1];
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        bail!("move {s:?} has an invalid square");
    }
    let (x, y) = (file - b'a', rank - b'1');
    i += 2;

    // No direction: a placement.
    if i == bytes.len() {
        if count.is_some() {
            bail!("placement {s:?} cannot carry a count");
        }
        return Ok(Move::place(place_kind, x, y));
    }

    let kind = match bytes[i] {
        b'<' => MoveKind::SlideLeft,
        b'>' => MoveKind::SlideRight,
        b'+' => MoveKind::SlideUp,
        b'-' => MoveKind::SlideDown,
        c => bail!("move {s:?} has an invalid direction {:?}", c as char),
    };
    i += 1;
    if place_kind != MoveKind::PlaceFlat {
        bail!("slide {s:?} cannot have a stone prefix");
    }

    let count = count.unwrap_or(1);
    let mut drops = Drops::EMPTY;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        drops = drops.push(bytes[i] - b'0');
        i += 1;
    }
    // A trailing wall-smash marker is tolerated.
    if i < bytes.len() && bytes[i] == b'*' {
        i += 1;
    }
    if i != bytes.len() {
        bail!("trailing characters in move {s:?}");
    }
    if drops.is_empty() {
        drops = Drops::single(count);
    }
    if drops.total() != count {
        bail!("move {s:?} drops {} of {count} carried stones", drops.total());
    }
    Ok(Move::slide(x, y, kind, drops))
}

/// Formats a position in TPS: board, side to move, full-move number.
pub fn format_tps(p: &Position) -> String {
    let size = p.size() as u8;
    let mut rows = Vec::with_capacity(size as usize);
    for y in (0..size).rev() {
        let mut cells = Vec::with_capacity(size as usize);
        let mut x = 0;
        while x < size {
            if p.height_at(x, y) == 0 {
                let mut run = 1;
                while x + run < size && p.height_at(x + run, y) == 0 {
                    run += 1;
                }
                if run == 1 {
                    cells.push("x".to_string());
                } else {
                    cells.push(format!("x{run}"));
                }
                x += run;
            } else {
                let h = p.height_at(x, y);
                let mut cell = String::new();
                for d in (0..h).rev() {
                    let piece = p.stack_at(x, y, d).expect("stone in stack");
                    cell.push(if piece.color().is_white() { '1' } else { '2' });
                    if d == 0 {
                        cell.push_str(piece.kind().prefix());
                    }
                }
                cells.push(cell);
                x += 1;
            }
        }
        rows.push(cells.join(","));
    }
    let side = if p.to_move().is_white() { 1 } else { 2 };
    let full_move = p.move_number() / 2 + 1;
    format!("{} {side} {full_move}", rows.join("/"))
}

/// Parses a TPS position.
pub fn parse_tps(s: &str) -> Result<Position> {
    let mut parts = s.split_whitespace();
    let board = parts.next().context("TPS is empty")?;
    let side: u8 = parts
        .next()
        .context("TPS is missing the side to move")?
        .parse()
        .context("TPS side to move is not a number")?;
    let full_move: usize = parts
        .next()
        .context("TPS is missing the move number")?
        .parse()
        .context("TPS move number is not a number")?;
    if parts.next().is_some() {
        bail!("trailing fields in TPS {s:?}");
    }
    if side != 1 && side != 2 {
        bail!("TPS side to move must be 1 or 2, got {side}");
    }
    if full_move == 0 {
        bail!("TPS move numbers start at 1");
    }

    let rows: Vec<&str> = board.split('/').collect();
    let size = rows.len();
    let mut p = Position::new(size)?;

    for (r, row) in rows.iter().enumerate() {
        let y = (size - 1 - r) as u8;
        let mut x = 0usize;
        for cell in row.split(',') {
            if let Some(rest) = cell.strip_prefix('x') {
                let run: usize = if rest.is_empty() {
                    1
                } else {
                    rest.parse()
                        .map_err(|_| anyhow!("bad empty-run {cell:?} in TPS"))?
                };
                x += run;
                continue;
            }
            if x >= size {
                bail!("row {row:?} overflows a size-{size} board");
            }
            let mut pieces = Vec::new();
            let mut chars = cell.chars().peekable();
            while let Some(c) = chars.next() {
                match c {
                    '1' | '2' => {
                        let mut kind = PieceKind::Flat;
                        if chars.peek() == Some(&'S') {
                            chars.next();
                            kind = PieceKind::Standing;
                        } else if chars.peek() == Some(&'C') {
                            chars.next();
                            kind = PieceKind::Capstone;
                        }
                        pieces.push(Piece::from_tps_color(c, kind)?);
                    }
                    _ => bail!("bad stone {c:?} in TPS cell {cell:?}"),
                }
            }
            if pieces.is_empty() {
                bail!("empty TPS cell {cell:?}");
            }
            p.set_stack(x as u8, y, &pieces)?;
            x += 1;
        }
        if x != size {
            bail!("row {row:?} covers {x} of {size} squares");
        }
    }

    let move_no = (full_move - 1) * 2 + usize::from(side == 2);
    p.set_move_number(move_no);
    p.rehash();
    Ok(p)
}

impl FromStr for Position {
    type Err = anyhow::Error;

    #[inline(always)]
    fn from_str(s: &str) -> Result<Self> {
        parse_tps(s)
    }
}

impl fmt::Display for Position {
    /// Renders an ASCII board diagram, ranks from the top down.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.size() as u8;
        let width = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x, y)))
            .map(|(x, y)| self.height_at(x, y) as usize + 1)
            .max()
            .unwrap_or(2)
            .max(2);
        for y in (0..size).rev() {
            write!(f, "{} |", y + 1)?;
            for x in 0..size {
                let mut cell = String::new();
                let h = self.height_at(x, y);
                if h == 0 {
                    cell.push('.');
                } else {
                    for d in (0..h).rev() {
                        let piece = self.stack_at(x, y, d).expect("stone in stack");
                        cell.push(if piece.color().is_white() { '1' } else { '2' });
                        if d == 0 {
                            cell.push_str(piece.kind().prefix());
                        }
                    }
                }
                write!(f, " {cell:<width$}")?;
            }
            writeln!(f, " |")?;
        }
        write!(f, "   ")?;
        for x in 0..size {
            let file = (b'a' + x) as char;
            write!(f, " {file:<width$}")?;
        }
        writeln!(f)?;
        write!(
            f,
            "   {} to move (move {})",
            self.to_move(),
            self.move_number() / 2 + 1
        )
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({:?})", format_tps(self))
    }
}

impl fmt::Display for Move {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_move(self))
    }
}

impl FromStr for Move {
    type Err = anyhow::Error;

    #[inline(always)]
    fn from_str(s: &str) -> Result<Self> {
        parse_move(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tak::Color;

    #[test]
    fn test_move_round_trips() {
        for s in [
            "a1", "e5", "Sc3", "Ca4", "c3>", "c3<", "c3+", "c3-", "3c3>111", "2a5-11", "5d4+23",
        ] {
            let m = parse_move(s).unwrap();
            assert_eq!(format_move(&m), s, "round-trip of {s:?}");
        }
    }

    #[test]
    fn test_move_parse_normalizes() {
        // A bare count with a single implied drop.
        let m = parse_move("3c3>").unwrap();
        assert_eq!(m.drops.len(), 1);
        assert_eq!(m.drops.get(0), 3);
        assert_eq!(format_move(&m), "3c3>");

        // Wall-smash marker is tolerated.
        let m = parse_move("c3>*").unwrap();
        assert_eq!(format_move(&m), "c3>");
    }

    #[test]
    fn test_move_parse_rejects_garbage() {
        for s in ["", "z9", "c3^", "2c3>12", "Sc3>", "c"] {
            assert!(parse_move(s).is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn test_tps_round_trip() {
        for s in [
            "x5/x5/x5/x5/x5 1 1",
            "x5/x5/x2,2,x2/x2,1,x2/x5 1 3",
            "2,x4/x5/x2,121C,x2/x2,12S,x2/1,x4 2 7",
            "x3/x3/1,2,x 1 2",
        ] {
            let p = parse_tps(s).unwrap();
            assert_eq!(format_tps(&p), s, "round-trip of {s:?}");
        }
    }

    #[test]
    fn test_tps_side_and_move_number() {
        let p = parse_tps("x5/x5/x5/x5/1,1,1,1,x 1 5").unwrap();
        assert_eq!(p.to_move(), Color::White);
        assert_eq!(p.move_number(), 8);

        let p = parse_tps("x3/x3/1,2,x 2 2").unwrap();
        assert_eq!(p.to_move(), Color::Black);
        assert_eq!(p.move_number(), 3);
    }

    #[test]
    fn test_tps_reserve_accounting() {
        let p = parse_tps("x5/x5/x2,121C,x2/x5/x5 1 4").unwrap();
        // The stack holds two white stones (one cap) and one black stone.
        assert_eq!(p.white_stones(), 20);
        assert_eq!(p.reserves(Color::White).1, 0);
        assert_eq!(p.black_stones(), 20);
    }

    #[test]
    fn test_tps_rejects_garbage() {
        for s in [
            "",
            "x5/x5/x5/x5/x5",
            "x5/x5/x5/x5/x5 3 1",
            "x5/x5/x5/x5 1 1",
            "x6,1/x5/x5/x5/x5 1 1",
            "q/x2/x3 1 1",
        ] {
            assert!(parse_tps(s).is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn test_hash_depends_on_side_to_move() {
        let a = parse_tps("x3/x3/1,2,x 1 2").unwrap();
        let b = parse_tps("x3/x3/1,2,x 2 2").unwrap();
        assert_ne!(a.hash(), b.hash());
    }
}

/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use anyhow::{bail, Result};

/// The color of a player or stone.
///
/// White moves on even plies, so [`Color`] defaults to [`Color::White`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum Color {
    #[default]
    White,
    Black,
}

impl Color {
    /// Number of color variants.
    pub const COUNT: usize = 2;

    /// Creates a new [`Color`] from a `bool`, where `false = White`.
    #[inline(always)]
    pub const fn from_bool(black: bool) -> Self {
        if black {
            Self::Black
        } else {
            Self::White
        }
    }

    /// Returns `true` if this [`Color`] is White.
    #[inline(always)]
    pub const fn is_white(&self) -> bool {
        matches!(self, Self::White)
    }

    /// Returns `true` if this [`Color`] is Black.
    #[inline(always)]
    pub const fn is_black(&self) -> bool {
        matches!(self, Self::Black)
    }

    /// Returns this color's opponent.
    #[inline(always)]
    pub const fn opponent(&self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Returns this [`Color`] as a `usize`, for indexing into lists.
    #[inline(always)]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Returns this color's name, as a string.
    #[inline(always)]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The kind of a Tak stone.
///
/// Flats and capstones count toward roads; standing stones (walls) do not.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum PieceKind {
    #[default]
    Flat,
    Standing,
    Capstone,
}

impl PieceKind {
    /// Number of piece kinds.
    pub const COUNT: usize = 3;

    /// Returns `true` if this kind counts toward a road.
    #[inline(always)]
    pub const fn is_road(&self) -> bool {
        matches!(self, Self::Flat | Self::Capstone)
    }

    /// The PTN prefix for a placement of this kind (`S` and `C`; flats have none).
    #[inline(always)]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Flat => "",
            Self::Standing => "S",
            Self::Capstone => "C",
        }
    }
}

/// A stone: a color plus a kind.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub struct Piece {
    color: Color,
    kind: PieceKind,
}

impl Piece {
    /// Creates a new [`Piece`] from the given color and kind.
    #[inline(always)]
    pub const fn new(color: Color, kind: PieceKind) -> Self {
        Self { color, kind }
    }

    /// Fetches this piece's color.
    #[inline(always)]
    pub const fn color(&self) -> Color {
        self.color
    }

    /// Fetches this piece's kind.
    #[inline(always)]
    pub const fn kind(&self) -> PieceKind {
        self.kind
    }

    /// Returns `true` if this piece counts toward a road.
    #[inline(always)]
    pub const fn is_road(&self) -> bool {
        self.kind.is_road()
    }

    /// A small nonzero integer identifying this piece, mixed into stack hashes.
    #[inline(always)]
    pub const fn code(&self) -> u64 {
        1 + (self.kind as u64) * 2 + self.color as u64
    }

    /// Parses a piece from its TPS spelling: `1`/`2` for flats, with a
    /// trailing `S` or `C` handled by the caller.
    pub fn from_tps_color(c: char, kind: PieceKind) -> Result<Self> {
        let color = match c {
            '1' => Color::White,
            '2' => Color::Black,
            _ => bail!("invalid TPS stone color {c:?}: expected '1' or '2'"),
        };
        Ok(Self::new(color, kind))
    }
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self.color {
            Color::White => '1',
            Color::Black => '2',
        };
        write!(f, "{c}{}", self.kind.prefix())
    }
}

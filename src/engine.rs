use std::fmt;
use std::ops::{Add, Mul};
use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Largest supported board edge. Four bits per cell keeps a 4x4 board in a `u64`.
pub const MAX_BOARD_SIZE: usize = 4;

/// Board edges the engine can be instantiated with.
pub const BOARD_SIZES: [usize; 3] = [2, 3, 4];

/// A direction to move/merge tiles.
///
/// The discriminant is the action index used in policy and Q-value files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Move {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
}

impl Move {
    pub const ALL: [Move; 4] = [Move::Left, Move::Right, Move::Up, Move::Down];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Move> {
        Move::ALL.get(idx).copied()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Move::Left => "left",
            Move::Right => "right",
            Move::Up => "up",
            Move::Down => "down",
        };
        f.write_str(name)
    }
}

/// One row or column, `N` nibbles with the first cell in the high nibble.
pub(crate) type Line = u16;

struct LineTables {
    shift_left: Box<[Line]>,
    shift_right: Box<[Line]>,
}

static TABLES: [OnceLock<LineTables>; 3] = [OnceLock::new(), OnceLock::new(), OnceLock::new()];

#[inline(always)]
fn tables(size: usize) -> &'static LineTables {
    TABLES[size - 2].get_or_init(|| create_line_tables(size))
}

fn create_line_tables(size: usize) -> LineTables {
    // Allocate on the heap; the 4x4 tables have 65,536 entries each
    let len = 1usize << (4 * size);
    let mut shift_left = vec![0; len];
    let mut shift_right = vec![0; len];
    for val in 0..len {
        let tiles = line_to_vec(val as Line, size);
        shift_left[val] = vec_to_line(&shift_vec_left(tiles.clone()));
        shift_right[val] = vec_to_line(&shift_vec_right(tiles));
    }
    LineTables {
        shift_left: shift_left.into_boxed_slice(),
        shift_right: shift_right.into_boxed_slice(),
    }
}

/// Slide table for lines of `size` cells, towards the first cell or the last.
fn line_table(size: usize, towards_start: bool) -> &'static [Line] {
    let t = tables(size);
    if towards_start { &t.shift_left } else { &t.shift_right }
}

pub(crate) fn line_to_vec(line: Line, size: usize) -> Vec<u8> {
    (0..size).map(|i| ((line >> (4 * (size - 1 - i))) & 0xf) as u8).collect()
}

pub(crate) fn vec_to_line(tiles: &[u8]) -> Line {
    tiles.iter().fold(0, |acc, &t| (acc << 4) | Line::from(t))
}

fn shift_vec_right(vec: Vec<u8>) -> Vec<u8> {
    let rev_vec: Vec<u8> = vec.into_iter().rev().collect();
    shift_vec_left(rev_vec).into_iter().rev().collect()
}

fn shift_vec_left(mut vec: Vec<u8>) -> Vec<u8> {
    for i in 0..vec.len() {
        calculate_left_shift(&mut vec[i..]);
    }
    vec
}

fn calculate_left_shift(slice: &mut [u8]) {
    let mut acc = 0;
    for idx in 0..slice.len() {
        let val = slice[idx];
        if acc != 0 && acc == val && acc < 0xf {
            slice[idx] = 0;
            acc += 1;
            break;
        } else if acc != 0 && val != 0 {
            break;
        } else if acc == 0 && val != 0 {
            slice[idx] = 0;
            acc = val;
        };
    }
    slice[0] = acc;
}

/// Exact probability of a spawn outcome, kept as a rational until it is
/// combined with floating-point values.
#[derive(Debug, Clone, Copy)]
pub struct Probability {
    numerator: u64,
    denominator: u64,
}

impl Probability {
    pub const ONE: Probability = Probability { numerator: 1, denominator: 1 };

    pub fn new(numerator: u64, denominator: u64) -> Self {
        debug_assert!(denominator > 0);
        Self { numerator, denominator }
    }

    pub fn numerator(self) -> u64 {
        self.numerator
    }

    pub fn denominator(self) -> u64 {
        self.denominator
    }

    pub fn to_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    fn reduced(self) -> Self {
        let g = gcd(self.numerator, self.denominator).max(1);
        Self { numerator: self.numerator / g, denominator: self.denominator / g }
    }
}

pub(crate) fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl PartialEq for Probability {
    fn eq(&self, other: &Self) -> bool {
        u128::from(self.numerator) * u128::from(other.denominator)
            == u128::from(other.numerator) * u128::from(self.denominator)
    }
}

impl Eq for Probability {}

impl Add for Probability {
    type Output = Probability;

    fn add(self, rhs: Self) -> Self {
        if self.denominator == rhs.denominator {
            return Probability::new(self.numerator + rhs.numerator, self.denominator);
        }
        Probability::new(
            self.numerator * rhs.denominator + rhs.numerator * self.denominator,
            self.denominator * rhs.denominator,
        )
        .reduced()
    }
}

impl Mul for Probability {
    type Output = Probability;

    fn mul(self, rhs: Self) -> Self {
        Probability::new(self.numerator * rhs.numerator, self.denominator * rhs.denominator)
    }
}

/// Result of applying a move to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome<const N: usize> {
    pub state: State<N>,
    /// False when the move is a no-op, i.e. illegal.
    pub changed: bool,
    /// True when the resulting state holds a tile at or above the winning exponent.
    pub won: bool,
}

/// One of the eight board symmetries, as an optional transpose followed by
/// optional row and column flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symmetry(u8);

impl Symmetry {
    pub const IDENTITY: Symmetry = Symmetry(0);
    pub const ALL: [Symmetry; 8] = [
        Symmetry(0),
        Symmetry(1),
        Symmetry(2),
        Symmetry(3),
        Symmetry(4),
        Symmetry(5),
        Symmetry(6),
        Symmetry(7),
    ];

    /// Image of cell `idx` (row-major) on an `n`x`n` board.
    #[inline]
    pub fn map_cell(self, idx: usize, n: usize) -> usize {
        let (mut r, mut c) = (idx / n, idx % n);
        if self.0 & 1 != 0 {
            (r, c) = (c, r);
        }
        if self.0 & 2 != 0 {
            r = n - 1 - r;
        }
        if self.0 & 4 != 0 {
            c = n - 1 - c;
        }
        r * n + c
    }

    /// Image of a per-cell bit mask (bit `i` is cell `i`).
    pub fn map_mask(self, mask: u16, n: usize) -> u16 {
        (0..n * n)
            .filter(|&i| mask & (1 << i) != 0)
            .fold(0, |acc, i| acc | (1 << self.map_cell(i, n)))
    }
}

/// Packed N x N 2048 board, one 4-bit exponent per cell in a `u64`.
///
/// Cell 0 (top left, row-major) occupies the most significant nibble in use,
/// so ordering by the packed integer is the ordering used in layer files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct State<const N: usize>(u64);

impl<const N: usize> State<N> {
    /// Number of cells. Evaluating it rejects unsupported board sizes at compile time.
    pub const CELLS: usize = {
        assert!(N >= 2 && N <= MAX_BOARD_SIZE, "board size must be 2, 3 or 4");
        N * N
    };

    /// The all-zero state.
    pub const EMPTY: State<N> = State(0);

    const LINE_MASK: u64 = (1 << (4 * N)) - 1;

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        let _ = Self::CELLS;
        State(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Build a state from row-major cell exponents.
    pub fn from_cells(cells: &[u8]) -> Result<Self, ConfigError> {
        if cells.len() != Self::CELLS {
            return Err(ConfigError::UnsupportedStateArraySize(cells.len()));
        }
        let mut raw = 0u64;
        for &c in cells {
            if c > 0xf {
                return Err(ConfigError::TileOutOfRange(c));
            }
            raw = (raw << 4) | u64::from(c);
        }
        Ok(State(raw))
    }

    pub fn cells(self) -> Vec<u8> {
        (0..Self::CELLS).map(|i| self.get(i)).collect()
    }

    #[inline(always)]
    fn cell_shift(idx: usize) -> usize {
        4 * (Self::CELLS - 1 - idx)
    }

    /// Exponent at cell `idx` (0 = empty).
    #[inline]
    pub fn get(self, idx: usize) -> u8 {
        ((self.0 >> Self::cell_shift(idx)) & 0xf) as u8
    }

    #[inline]
    pub fn with_cell(self, idx: usize, exponent: u8) -> Self {
        let shift = Self::cell_shift(idx);
        State((self.0 & !(0xf << shift)) | (u64::from(exponent & 0xf) << shift))
    }

    pub fn transpose(self) -> Self {
        self.transform(Symmetry(1))
    }

    /// Apply a board symmetry.
    pub fn transform(self, sym: Symmetry) -> Self {
        if sym == Symmetry::IDENTITY {
            return self;
        }
        (0..Self::CELLS).fold(State(0), |acc, i| {
            let v = self.get(i);
            if v == 0 { acc } else { acc.with_cell(sym.map_cell(i, N), v) }
        })
    }

    /// The minimum packed value over all eight symmetries.
    pub fn canonicalize(self) -> Self {
        Symmetry::ALL[1..]
            .iter()
            .fold(self, |best, &sym| best.min(self.transform(sym)))
    }

    /// Slide/merge tiles in `dir` without spawning.
    #[inline]
    pub fn shift(self, dir: Move) -> Self {
        match dir {
            Move::Left => self.shift_rows(line_table(N, true)),
            Move::Right => self.shift_rows(line_table(N, false)),
            Move::Up => self.transpose().shift_rows(line_table(N, true)).transpose(),
            Move::Down => self.transpose().shift_rows(line_table(N, false)).transpose(),
        }
    }

    fn shift_rows(self, table: &[Line]) -> Self {
        let res = (0..N).fold(0u64, |new_board, r| {
            let shift = 4 * N * (N - 1 - r);
            let row_val = ((self.0 >> shift) & Self::LINE_MASK) as usize;
            new_board | (u64::from(table[row_val]) << shift)
        });
        State(res)
    }

    /// Apply a move, reporting whether it changed the board and whether the
    /// result holds a tile of at least `max_exponent`.
    ///
    /// ```
    /// use twenty48::engine::{Move, State};
    /// let s = State::<2>::from_cells(&[1, 1, 0, 0]).unwrap();
    /// let out = s.apply(Move::Left, 2);
    /// assert!(out.changed && out.won);
    /// ```
    pub fn apply(self, dir: Move, max_exponent: u8) -> MoveOutcome<N> {
        let state = self.shift(dir);
        MoveOutcome { state, changed: state != self, won: state.max_value() >= max_exponent }
    }

    /// Moves that change the board.
    pub fn legal_moves(self) -> impl Iterator<Item = (Move, State<N>)> {
        Move::ALL.into_iter().filter_map(move |mv| {
            let next = self.shift(mv);
            (next != self).then_some((mv, next))
        })
    }

    /// True if no move changes the board.
    pub fn is_lose(self) -> bool {
        Move::ALL.iter().all(|&mv| self.shift(mv) == self)
    }

    /// True if two orthogonally adjacent cells hold the same non-zero tile.
    pub fn has_adjacent_pair(self) -> bool {
        (0..N).any(|r| {
            (0..N).any(|c| {
                let v = self.get(r * N + c);
                v != 0
                    && ((c + 1 < N && self.get(r * N + c + 1) == v)
                        || (r + 1 < N && self.get((r + 1) * N + c) == v))
            })
        })
    }

    /// Sum of tile values, i.e. the layer this state belongs to.
    pub fn sum(self) -> u32 {
        (0..Self::CELLS)
            .map(|i| self.get(i))
            .filter(|&e| e != 0)
            .map(|e| 1u32 << e)
            .sum()
    }

    /// Largest exponent on the board.
    pub fn max_value(self) -> u8 {
        (0..Self::CELLS).map(|i| self.get(i)).max().unwrap_or(0)
    }

    pub fn count_empty(self) -> usize {
        let mut x = self.0;
        x |= x >> 1;
        x |= x >> 2;
        x &= 0x1111_1111_1111_1111;
        Self::CELLS - x.count_ones() as usize
    }

    /// Spawn outcomes in cell order, exponent 1 before exponent 2.
    ///
    /// Returns an empty vector for a full board.
    pub fn random_successors(self) -> Vec<(State<N>, Probability)> {
        let empty = self.count_empty() as u64;
        let mut out = Vec::with_capacity(2 * empty as usize);
        for i in (0..Self::CELLS).filter(|&i| self.get(i) == 0) {
            out.push((self.with_cell(i, 1), Probability::new(9, 10 * empty)));
            out.push((self.with_cell(i, 2), Probability::new(1, 10 * empty)));
        }
        out
    }

    /// Canonical spawn outcomes with merged probabilities, sorted by state.
    pub fn random_transitions(self) -> Vec<(State<N>, Probability)> {
        merge_outcomes(
            self.random_successors()
                .into_iter()
                .map(|(s, p)| (s.canonicalize(), p))
                .collect(),
        )
    }

    /// Insert a random 2 (90%) or 4 (10%) tile into a random empty cell.
    ///
    /// A full board is returned unchanged.
    ///
    /// ```
    /// use twenty48::engine::State;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let s = State::<3>::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(s.count_empty(), 7);
    /// ```
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        let empty = self.count_empty();
        if empty == 0 {
            return self;
        }
        let index = rng.gen_range(0..empty);
        let tile = generate_random_tile(rng);
        let cell = (0..Self::CELLS)
            .filter(|&i| self.get(i) == 0)
            .nth(index)
            .unwrap_or(0);
        self.with_cell(cell, tile)
    }
}

fn generate_random_tile<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    if rng.gen_range(0..10) < 9 { 1 } else { 2 }
}

/// Sort outcomes by state and add up the probabilities of duplicates.
pub fn merge_outcomes<const N: usize>(
    mut outcomes: Vec<(State<N>, Probability)>,
) -> Vec<(State<N>, Probability)> {
    outcomes.sort_by_key(|(s, _)| *s);
    let mut merged: Vec<(State<N>, Probability)> = Vec::with_capacity(outcomes.len());
    for (state, p) in outcomes {
        match merged.last_mut() {
            Some((last, acc)) if *last == state => *acc = *acc + p,
            _ => merged.push((state, p)),
        }
    }
    merged
}

/// Distribution of canonical start states: two spawns on an empty board.
pub fn start_states<const N: usize>() -> Vec<(State<N>, Probability)> {
    let mut out = Vec::new();
    for (first, p1) in State::<N>::EMPTY.random_successors() {
        for (second, p2) in first.random_successors() {
            out.push((second.canonicalize(), p1 * p2));
        }
    }
    merge_outcomes(out)
}

impl<const N: usize> fmt::Debug for State<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State<{}>({:#x})", N, self.0)
    }
}

impl<const N: usize> fmt::Display for State<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..N {
            let row: Vec<String> = (0..N).map(|c| format_val(self.get(r * N + c))).collect();
            writeln!(f, "{}", row.join("|"))?;
        }
        Ok(())
    }
}

impl<const N: usize> From<State<N>> for u64 {
    fn from(s: State<N>) -> Self {
        s.raw()
    }
}

fn format_val(val: u8) -> String {
    match val {
        0 => format!("{:>6}", ""),
        x => format!("{:>6}", 1u32 << x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn s2(cells: [u8; 4]) -> State<2> {
        State::from_cells(&cells).unwrap()
    }

    #[test]
    fn it_shift_vec_left() {
        assert_eq!(shift_vec_left(vec![0, 0, 0, 0]), vec![0, 0, 0, 0]);
        assert_eq!(shift_vec_left(vec![1, 2, 1, 2]), vec![1, 2, 1, 2]);
        assert_eq!(shift_vec_left(vec![1, 1, 2, 2]), vec![2, 3, 0, 0]);
        assert_eq!(shift_vec_left(vec![1, 0, 0, 1]), vec![2, 0, 0, 0]);
        assert_eq!(shift_vec_left(vec![1, 1, 1]), vec![2, 1, 0]);
        assert_eq!(shift_vec_left(vec![15, 15]), vec![15, 15]);
    }

    #[test]
    fn it_shift_vec_right() {
        assert_eq!(shift_vec_right(vec![1, 1, 2, 2]), vec![0, 0, 2, 3]);
        assert_eq!(shift_vec_right(vec![0, 2, 2, 2]), vec![0, 0, 2, 3]);
        assert_eq!(shift_vec_right(vec![1, 0]), vec![0, 1]);
    }

    #[test]
    fn shifts_match_4x4_layout() {
        let game = State::<4>::from_raw(0x1234133220021002);
        assert_eq!(game.shift(Move::Left), State::from_raw(0x1234142030001200));
        assert_eq!(game.shift(Move::Right), State::from_raw(0x1234014200030012));
        let game = State::<4>::from_raw(0x1121230033004222);
        assert_eq!(game.shift(Move::Up), State::from_raw(0x1131240232004000));
        assert_eq!(game.shift(Move::Down), State::from_raw(0x1000210034014232));
    }

    #[test]
    fn shifts_on_3x3() {
        let s = State::<3>::from_cells(&[1, 1, 0, 0, 2, 2, 3, 0, 3]).unwrap();
        assert_eq!(s.shift(Move::Left).cells(), vec![2, 0, 0, 3, 0, 0, 4, 0, 0]);
        assert_eq!(s.shift(Move::Down).cells(), vec![0, 0, 0, 1, 1, 2, 3, 2, 3]);
    }

    #[test]
    fn apply_reports_changed_and_won() {
        let s = s2([1, 1, 0, 0]);
        let out = s.apply(Move::Up, 3);
        assert!(!out.changed);
        assert!(!out.won);
        let out = s.apply(Move::Right, 2);
        assert_eq!(out.state, s2([0, 2, 0, 0]));
        assert!(out.changed && out.won);
    }

    #[test]
    fn from_cells_checks_length() {
        assert!(matches!(
            State::<2>::from_cells(&[0, 0, 0]),
            Err(ConfigError::UnsupportedStateArraySize(3))
        ));
        assert!(State::<3>::from_cells(&[0; 9]).is_ok());
    }

    #[test]
    fn sum_and_max_value() {
        let s = s2([1, 2, 0, 3]);
        assert_eq!(s.sum(), 2 + 4 + 8);
        assert_eq!(s.max_value(), 3);
        assert_eq!(s.count_empty(), 1);
        assert_eq!(State::<2>::EMPTY.count_empty(), 4);
    }

    #[test]
    fn lose_and_adjacent_pairs() {
        assert!(s2([1, 2, 2, 1]).is_lose());
        assert!(!s2([1, 2, 2, 1]).has_adjacent_pair());
        assert!(!s2([1, 1, 2, 3]).is_lose());
        assert!(s2([1, 1, 2, 3]).has_adjacent_pair());
        assert!(State::<2>::EMPTY.is_lose());
    }

    #[test]
    fn canonicalize_picks_minimum_over_symmetries() {
        assert_eq!(s2([1, 0, 0, 1]).canonicalize(), s2([0, 1, 1, 0]));
        assert_eq!(s2([0, 1, 0, 1]).canonicalize(), s2([0, 0, 1, 1]));
        assert_eq!(s2([2, 0, 0, 1]).canonicalize(), s2([0, 1, 2, 0]));
        let s = State::<3>::from_cells(&[3, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(s.canonicalize().cells(), vec![0, 0, 0, 0, 0, 0, 0, 0, 3]);
        for sym in Symmetry::ALL {
            assert_eq!(s.transform(sym).canonicalize(), s.canonicalize());
        }
    }

    #[test]
    fn random_successors_of_empty_2x2() {
        let succ = State::<2>::EMPTY.random_successors();
        let states: Vec<_> = succ.iter().map(|(s, _)| s.cells()).collect();
        assert_eq!(
            states,
            vec![
                vec![1, 0, 0, 0],
                vec![2, 0, 0, 0],
                vec![0, 1, 0, 0],
                vec![0, 2, 0, 0],
                vec![0, 0, 1, 0],
                vec![0, 0, 2, 0],
                vec![0, 0, 0, 1],
                vec![0, 0, 0, 2],
            ]
        );
        assert_eq!(succ[0].1, Probability::new(9, 40));
        assert_eq!(succ[1].1, Probability::new(1, 40));
    }

    #[test]
    fn random_transitions_merge_symmetric_spawns() {
        let tr = s2([0, 0, 0, 1]).random_transitions();
        let got: Vec<_> = tr.iter().map(|(s, p)| (s.cells(), *p)).collect();
        assert_eq!(
            got,
            vec![
                (vec![0, 0, 1, 1], Probability::new(6, 10)),
                (vec![0, 0, 1, 2], Probability::new(2, 30)),
                (vec![0, 1, 1, 0], Probability::new(3, 10)),
                (vec![0, 1, 2, 0], Probability::new(1, 30)),
            ]
        );
        let total = tr.iter().fold(Probability::new(0, 1), |acc, (_, p)| acc + *p);
        assert_eq!(total, Probability::ONE);
    }

    #[test]
    fn full_board_has_no_successors() {
        assert!(s2([1, 2, 2, 1]).random_successors().is_empty());
    }

    #[test]
    fn start_states_are_a_distribution() {
        let starts = start_states::<3>();
        let total = starts.iter().fold(Probability::new(0, 1), |acc, (_, p)| acc + *p);
        assert_eq!(total, Probability::ONE);
        for (s, _) in &starts {
            assert_eq!(*s, s.canonicalize());
            assert_eq!(s.count_empty(), 7);
            assert!([4, 6, 8].contains(&s.sum()));
        }
    }

    #[test]
    fn spawn_increases_sum_by_two_or_four() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut s = State::<3>::EMPTY.with_random_tile(&mut rng);
        for _ in 0..50 {
            let Some((_, moved)) = s.legal_moves().next() else { break };
            let next = moved.with_random_tile(&mut rng);
            assert!([2, 4].contains(&(next.sum() - s.sum())));
            s = next;
        }
    }
}

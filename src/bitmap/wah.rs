//! Word-aligned hybrid (WAH) bitmap over row numbers.
//!
//! Row numbers are packed into 31-bit groups. A 32-bit word is either a
//! literal (MSB clear, low 31 bits are the group) or a fill (MSB set, bit 30
//! is the fill value, low 30 bits count how many groups the fill spans).
//!
//! Small sets are kept as a sorted offset list; once more than `switchover`
//! bits are set the bitmap converts to WAH words and stays that way.

use std::borrow::Cow;
use crate::core::error::{Error, Result};

const GROUP_BITS: u32 = 31;
const LITERAL_MASK: u32 = 0x7FFF_FFFF;
const FILL_FLAG: u32 = 0x8000_0000;
const FILL_ONES: u32 = 0x4000_0000;
const MAX_FILL_GROUPS: u32 = 0x3FFF_FFFF;

pub const DEFAULT_SWITCHOVER: usize = 10;

/// Tag byte at the head of a persisted bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitmapEncoding {
    Wah = 1,
    Offsets = 2,
}

impl BitmapEncoding {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BitmapEncoding::Wah),
            2 => Some(BitmapEncoding::Offsets),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum Repr {
    Offsets(Vec<u32>),
    Wah(Vec<u32>),
}

#[derive(Debug, Clone)]
pub struct WahBitmap {
    repr: Repr,
    len: u32,
    switchover: usize,
}

impl WahBitmap {
    pub fn new() -> Self {
        Self::with_switchover(DEFAULT_SWITCHOVER)
    }

    pub fn with_switchover(switchover: usize) -> Self {
        WahBitmap {
            repr: Repr::Offsets(Vec::new()),
            len: 0,
            switchover,
        }
    }

    /// All ones over `[0, len)`.
    pub fn fill(len: u32) -> Self {
        let mut out = WordBuilder::default();
        out.push_fill(true, len / GROUP_BITS);
        let rem = len % GROUP_BITS;
        if rem > 0 {
            out.push_literal((1u32 << rem) - 1);
        }
        WahBitmap {
            repr: Repr::Wah(out.finish()),
            len,
            switchover: DEFAULT_SWITCHOVER,
        }
    }

    pub fn from_positions(positions: impl IntoIterator<Item = u32>) -> Self {
        let mut offsets: Vec<u32> = positions.into_iter().collect();
        offsets.sort_unstable();
        offsets.dedup();
        let len = offsets.last().map(|p| p + 1).unwrap_or(0);
        Self::from_sorted_offsets(offsets, len, DEFAULT_SWITCHOVER)
    }

    fn from_sorted_offsets(offsets: Vec<u32>, len: u32, switchover: usize) -> Self {
        let repr = if offsets.len() > switchover {
            Repr::Wah(offsets_to_words(&offsets))
        } else {
            Repr::Offsets(offsets)
        };
        WahBitmap { repr, len, switchover }
    }

    fn from_words(words: Vec<u32>, len: u32, switchover: usize) -> Self {
        WahBitmap {
            repr: Repr::Wah(words),
            len,
            switchover,
        }
    }

    /// Declared logical length.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.count_ones() == 0
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.repr, Repr::Wah(_))
    }

    pub fn switchover(&self) -> usize {
        self.switchover
    }

    pub fn get(&self, pos: u32) -> bool {
        match &self.repr {
            Repr::Offsets(offsets) => offsets.binary_search(&pos).is_ok(),
            Repr::Wah(words) => get_wah(words, pos),
        }
    }

    pub fn set(&mut self, pos: u32, value: bool) {
        if pos >= self.len {
            self.len = pos + 1;
        }

        match &mut self.repr {
            Repr::Offsets(offsets) => {
                match offsets.binary_search(&pos) {
                    Ok(i) if !value => {
                        offsets.remove(i);
                    }
                    Err(i) if value => {
                        offsets.insert(i, pos);
                    }
                    _ => {}
                }
                if offsets.len() > self.switchover {
                    self.repr = Repr::Wah(offsets_to_words(offsets));
                }
            }
            Repr::Wah(words) => set_wah(words, pos, value),
        }
    }

    pub fn count_ones(&self) -> usize {
        match &self.repr {
            Repr::Offsets(offsets) => offsets.len(),
            Repr::Wah(words) => words.iter().map(|&w| match Run::decode(w) {
                Run::Fill { ones: true, groups } => groups as usize * GROUP_BITS as usize,
                Run::Fill { ones: false, .. } => 0,
                Run::Literal(bits) => bits.count_ones() as usize,
            }).sum(),
        }
    }

    pub fn and(&self, other: &WahBitmap) -> WahBitmap {
        if let (Repr::Offsets(a), Repr::Offsets(b)) = (&self.repr, &other.repr) {
            return self.sparse_result(intersect_sorted(a, b), other);
        }
        self.word_result(combine(&self.words(), &other.words(), |x, y| x & y), other)
    }

    pub fn or(&self, other: &WahBitmap) -> WahBitmap {
        if let (Repr::Offsets(a), Repr::Offsets(b)) = (&self.repr, &other.repr) {
            return self.sparse_result(union_sorted(a, b), other);
        }
        self.word_result(combine(&self.words(), &other.words(), |x, y| x | y), other)
    }

    pub fn and_not(&self, other: &WahBitmap) -> WahBitmap {
        if let (Repr::Offsets(a), Repr::Offsets(b)) = (&self.repr, &other.repr) {
            return self.sparse_result(difference_sorted(a, b), other);
        }
        self.word_result(combine(&self.words(), &other.words(), |x, y| x & !y), other)
    }

    /// Complement within `[0, len)`. There is no implicit infinite universe.
    pub fn not(&self, len: u32) -> WahBitmap {
        let universe = WahBitmap::fill(len);
        let words = combine(&universe.words(), &self.words(), |x, y| x & !y);
        WahBitmap::from_words(words, len, self.switchover)
    }

    pub fn bit_indexes(&self) -> BitIndexes<'_> {
        match &self.repr {
            Repr::Offsets(offsets) => BitIndexes::Offsets(offsets.iter()),
            Repr::Wah(words) => BitIndexes::Wah(WahPositions {
                words,
                next_word: 0,
                group: 0,
                pending: Pending::Empty,
            }),
        }
    }

    /// Rough in-memory footprint, used for memory-pressure decisions.
    pub fn approx_bytes(&self) -> usize {
        let payload = match &self.repr {
            Repr::Offsets(v) | Repr::Wah(v) => v.capacity() * 4,
        };
        payload + std::mem::size_of::<Self>()
    }

    /// `[tag][u32 LE words...]`
    pub fn to_file_bytes(&self) -> Vec<u8> {
        let (tag, words) = match &self.repr {
            Repr::Offsets(offsets) => (BitmapEncoding::Offsets, offsets),
            Repr::Wah(words) => (BitmapEncoding::Wah, words),
        };
        let mut out = Vec::with_capacity(1 + words.len() * 4);
        out.push(tag as u8);
        for w in words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Inverse of [`to_file_bytes`]. A payload whose length is a multiple of
    /// four has no tag byte and is read as legacy WAH words.
    pub fn from_file_bytes(bytes: &[u8], switchover: usize) -> Result<Self> {
        let (encoding, body) = if bytes.len() % 4 == 0 {
            (BitmapEncoding::Wah, bytes)
        } else {
            let encoding = BitmapEncoding::from_tag(bytes[0])
                .ok_or_else(|| Error::corruption(format!("Unknown bitmap encoding tag {}", bytes[0])))?;
            (encoding, &bytes[1..])
        };

        if body.len() % 4 != 0 {
            return Err(Error::corruption(format!("Bitmap body of {} bytes is not word aligned", body.len())));
        }

        let words: Vec<u32> = body.chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let mut bitmap = match encoding {
            BitmapEncoding::Wah => WahBitmap::from_words(normalize(&words), 0, switchover),
            BitmapEncoding::Offsets => {
                let mut offsets = words;
                offsets.sort_unstable();
                offsets.dedup();
                WahBitmap::from_sorted_offsets(offsets, 0, switchover)
            }
        };
        bitmap.len = bitmap.bit_indexes().last().map(|p| p + 1).unwrap_or(0);
        Ok(bitmap)
    }

    fn words(&self) -> Cow<'_, [u32]> {
        match &self.repr {
            Repr::Offsets(offsets) => Cow::Owned(offsets_to_words(offsets)),
            Repr::Wah(words) => Cow::Borrowed(words),
        }
    }

    fn sparse_result(&self, offsets: Vec<u32>, other: &WahBitmap) -> WahBitmap {
        WahBitmap::from_sorted_offsets(offsets, self.len.max(other.len), self.switchover)
    }

    fn word_result(&self, words: Vec<u32>, other: &WahBitmap) -> WahBitmap {
        WahBitmap::from_words(words, self.len.max(other.len), self.switchover)
    }
}

impl Default for WahBitmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable equality: same set positions, regardless of encoding or length.
impl PartialEq for WahBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.bit_indexes().eq(other.bit_indexes())
    }
}

impl Eq for WahBitmap {}

impl FromIterator<u32> for WahBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        WahBitmap::from_positions(iter)
    }
}

/// Lazy ascending iterator over set positions.
pub enum BitIndexes<'a> {
    Offsets(std::slice::Iter<'a, u32>),
    Wah(WahPositions<'a>),
}

impl Iterator for BitIndexes<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            BitIndexes::Offsets(iter) => iter.next().copied(),
            BitIndexes::Wah(positions) => positions.next(),
        }
    }
}

pub struct WahPositions<'a> {
    words: &'a [u32],
    next_word: usize,
    group: u64,
    pending: Pending,
}

enum Pending {
    Empty,
    Range { next: u64, end: u64 },
    Bits { base: u64, bits: u32 },
}

impl Iterator for WahPositions<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            match &mut self.pending {
                Pending::Range { next, end } if *next < *end => {
                    let pos = *next;
                    *next += 1;
                    return Some(pos as u32);
                }
                Pending::Bits { base, bits } if *bits != 0 => {
                    let offset = bits.trailing_zeros() as u64;
                    *bits &= *bits - 1;
                    return Some((*base + offset) as u32);
                }
                _ => {}
            }

            let word = *self.words.get(self.next_word)?;
            self.next_word += 1;
            let base = self.group * GROUP_BITS as u64;

            self.pending = match Run::decode(word) {
                Run::Fill { ones, groups } => {
                    self.group += groups as u64;
                    if ones {
                        Pending::Range { next: base, end: base + groups as u64 * GROUP_BITS as u64 }
                    } else {
                        Pending::Empty
                    }
                }
                Run::Literal(bits) => {
                    self.group += 1;
                    Pending::Bits { base, bits }
                }
            };
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Run {
    Fill { ones: bool, groups: u32 },
    Literal(u32),
}

impl Run {
    fn decode(word: u32) -> Run {
        if word & FILL_FLAG != 0 {
            Run::Fill {
                ones: word & FILL_ONES != 0,
                groups: word & MAX_FILL_GROUPS,
            }
        } else {
            Run::Literal(word & LITERAL_MASK)
        }
    }

    fn groups(&self) -> u32 {
        match self {
            Run::Fill { groups, .. } => *groups,
            Run::Literal(_) => 1,
        }
    }

    /// The bits of one group covered by this run.
    fn literal(&self) -> u32 {
        match self {
            Run::Fill { ones: true, .. } => LITERAL_MASK,
            Run::Fill { ones: false, .. } => 0,
            Run::Literal(bits) => *bits,
        }
    }
}

/// Appends runs while keeping the word list canonical: no all-zero or
/// all-one literals, adjacent fills of equal value merged, no trailing
/// zero fill.
#[derive(Default)]
struct WordBuilder {
    words: Vec<u32>,
}

impl WordBuilder {
    fn from_words(words: Vec<u32>) -> Self {
        WordBuilder { words }
    }

    fn push_fill(&mut self, ones: bool, mut groups: u32) {
        if groups == 0 {
            return;
        }
        if let Some(last) = self.words.last_mut() {
            if *last & FILL_FLAG != 0 && (*last & FILL_ONES != 0) == ones {
                let take = (MAX_FILL_GROUPS - (*last & MAX_FILL_GROUPS)).min(groups);
                *last += take;
                groups -= take;
            }
        }
        while groups > 0 {
            let take = groups.min(MAX_FILL_GROUPS);
            let value = if ones { FILL_ONES } else { 0 };
            self.words.push(FILL_FLAG | value | take);
            groups -= take;
        }
    }

    fn push_literal(&mut self, bits: u32) {
        let bits = bits & LITERAL_MASK;
        if bits == 0 {
            self.push_fill(false, 1);
        } else if bits == LITERAL_MASK {
            self.push_fill(true, 1);
        } else {
            self.words.push(bits);
        }
    }

    fn push_run(&mut self, run: Run) {
        match run {
            Run::Fill { ones, groups } => self.push_fill(ones, groups),
            Run::Literal(bits) => self.push_literal(bits),
        }
    }

    fn finish(mut self) -> Vec<u32> {
        while let Some(&last) = self.words.last() {
            if last & FILL_FLAG != 0 && last & FILL_ONES == 0 {
                self.words.pop();
            } else {
                break;
            }
        }
        self.words
    }
}

struct RunCursor<'a> {
    words: &'a [u32],
    pos: usize,
    current: Option<Run>,
}

impl<'a> RunCursor<'a> {
    fn new(words: &'a [u32]) -> Self {
        let mut cursor = RunCursor { words, pos: 0, current: None };
        cursor.load();
        cursor
    }

    fn load(&mut self) {
        self.current = None;
        while self.pos < self.words.len() {
            let run = Run::decode(self.words[self.pos]);
            self.pos += 1;
            if run.groups() > 0 {
                self.current = Some(run);
                break;
            }
        }
    }

    fn peek(&self) -> Option<Run> {
        self.current
    }

    fn advance(&mut self, groups: u32) {
        match self.current {
            Some(Run::Fill { ones, groups: left }) if left > groups => {
                self.current = Some(Run::Fill { ones, groups: left - groups });
            }
            Some(_) => self.load(),
            None => {}
        }
    }
}

/// Run-by-run boolean combination; never expands fills into literals.
/// A side that runs out is treated as zeros.
fn combine(a: &[u32], b: &[u32], op: impl Fn(u32, u32) -> u32) -> Vec<u32> {
    let mut left = RunCursor::new(a);
    let mut right = RunCursor::new(b);
    let mut out = WordBuilder::default();

    loop {
        let (x, y) = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(x), None) => (x, Run::Fill { ones: false, groups: x.groups() }),
            (None, Some(y)) => (Run::Fill { ones: false, groups: y.groups() }, y),
            (Some(x), Some(y)) => (x, y),
        };

        let step = match (x, y) {
            (Run::Fill { groups: gx, .. }, Run::Fill { groups: gy, .. }) => {
                let groups = gx.min(gy);
                let bits = op(x.literal(), y.literal()) & LITERAL_MASK;
                out.push_fill(bits == LITERAL_MASK, groups);
                groups
            }
            _ => {
                out.push_literal(op(x.literal(), y.literal()));
                1
            }
        };

        left.advance(step);
        right.advance(step);
    }

    out.finish()
}

fn normalize(words: &[u32]) -> Vec<u32> {
    let mut out = WordBuilder::default();
    for &w in words {
        out.push_run(Run::decode(w));
    }
    out.finish()
}

fn offsets_to_words(offsets: &[u32]) -> Vec<u32> {
    let mut out = WordBuilder::default();
    let mut next_group = 0u32;
    let mut i = 0;

    while i < offsets.len() {
        let group = offsets[i] / GROUP_BITS;
        out.push_fill(false, group - next_group);

        let mut bits = 0u32;
        while i < offsets.len() && offsets[i] / GROUP_BITS == group {
            bits |= 1 << (offsets[i] % GROUP_BITS);
            i += 1;
        }
        out.push_literal(bits);
        next_group = group + 1;
    }

    out.finish()
}

fn get_wah(words: &[u32], pos: u32) -> bool {
    let target = (pos / GROUP_BITS) as u64;
    let mut start = 0u64;

    for &w in words {
        let run = Run::decode(w);
        let groups = run.groups() as u64;
        if target < start + groups {
            return match run {
                Run::Fill { ones, .. } => ones,
                Run::Literal(bits) => bits & (1 << (pos % GROUP_BITS)) != 0,
            };
        }
        start += groups;
    }
    false
}

fn set_wah(words: &mut Vec<u32>, pos: u32, value: bool) {
    let target = (pos / GROUP_BITS) as u64;
    let bit = 1u32 << (pos % GROUP_BITS);
    let mut start = 0u64;

    for i in 0..words.len() {
        let run = Run::decode(words[i]);
        let groups = run.groups() as u64;

        if target < start + groups {
            let mut out = WordBuilder::from_words(words[..i].to_vec());
            match run {
                Run::Literal(bits) => {
                    let updated = if value { bits | bit } else { bits & !bit };
                    if updated == bits {
                        return;
                    }
                    out.push_literal(updated);
                }
                Run::Fill { ones, groups } => {
                    if ones == value {
                        return;
                    }
                    let before = (target - start) as u32;
                    let after = groups - before - 1;
                    out.push_fill(ones, before);
                    out.push_literal(if ones { LITERAL_MASK & !bit } else { bit });
                    out.push_fill(ones, after);
                }
            }
            for &w in &words[i + 1..] {
                out.push_run(Run::decode(w));
            }
            *words = out.finish();
            return;
        }
        start += groups;
    }

    // Beyond the covered groups: everything there is already zero.
    if value {
        let mut out = WordBuilder::from_words(std::mem::take(words));
        out.push_fill(false, (target - start) as u32);
        out.push_literal(bit);
        *words = out.finish();
    }
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(a[i]);
            i += 1;
            j += 1;
        } else if a[i] < b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn union_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(a[i]);
            i += 1;
            j += 1;
        } else if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

fn difference_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j >= b.len() || b[j] != x {
            out.push(x);
        }
    }
    out
}

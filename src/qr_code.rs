use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};
use crate::reed_solomon::ReedSolomonEncoder;

/// The error correction level of a QR symbol, trading data capacity for resilience.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrectionLevel {
    /// Roughly 7% of the codewords can be restored.
    #[serde(rename = "L")]
    Low,
    /// Roughly 15% of the codewords can be restored.
    #[default]
    #[serde(rename = "M")]
    Medium,
    /// Roughly 25% of the codewords can be restored.
    #[serde(rename = "Q")]
    Quartile,
    /// Roughly 30% of the codewords can be restored.
    #[serde(rename = "H")]
    High,
}

impl ErrorCorrectionLevel {
    /// Row of the level in the block tables.
    fn ordinal(self) -> usize {
        match self {
            ErrorCorrectionLevel::Low => 0,
            ErrorCorrectionLevel::Medium => 1,
            ErrorCorrectionLevel::Quartile => 2,
            ErrorCorrectionLevel::High => 3,
        }
    }

    /// The two bits identifying the level inside the format information.
    fn format_bits(self) -> u32 {
        match self {
            ErrorCorrectionLevel::Low => 0b01,
            ErrorCorrectionLevel::Medium => 0b00,
            ErrorCorrectionLevel::Quartile => 0b11,
            ErrorCorrectionLevel::High => 0b10,
        }
    }
}

const MIN_VERSION: u8 = 1;
const MAX_VERSION: u8 = 40;

// Error correction codewords per block, indexed by level and then by version (index 0 unused)
#[rustfmt::skip]
const ECC_CODEWORDS_PER_BLOCK: [[u8; 41]; 4] = [
    [0, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28, 30, 30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [0, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28],
    [0, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30, 30, 30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
    [0, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30],
];

// Number of error correction blocks, indexed by level and then by version (index 0 unused)
#[rustfmt::skip]
const ERROR_CORRECTION_BLOCKS: [[u8; 41]; 4] = [
    [0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12, 13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25],
    [0, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21, 23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49],
    [0, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29, 34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68],
    [0, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35, 37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81],
];

const ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

// Penalty weights of the mask evaluation rules
const PENALTY_RUN: u32 = 3;
const PENALTY_BLOCK: u32 = 3;
const PENALTY_FINDER_LIKE: u32 = 40;
const PENALTY_BALANCE: u32 = 10;

/// Number of modules along one side of a symbol of the given version.
fn symbol_size(version: u8) -> usize {
    usize::from(version) * 4 + 17
}

/// Number of modules available for data and error correction codewords (including the
/// remainder bits) once all the function patterns have been placed.
fn raw_data_modules(version: u8) -> usize {
    let version = usize::from(version);
    let mut modules = (16 * version + 128) * version + 64;
    if version >= 2 {
        let alignment_count = version / 7 + 2;
        modules -= (25 * alignment_count - 10) * alignment_count - 55;
        if version >= 7 {
            modules -= 36;
        }
    }

    modules
}

/// Number of data codewords (excluding error correction) a symbol can hold.
fn data_codewords(version: u8, level: ErrorCorrectionLevel) -> usize {
    let level = level.ordinal();
    let version_index = usize::from(version);
    raw_data_modules(version) / 8
        - usize::from(ECC_CODEWORDS_PER_BLOCK[level][version_index])
            * usize::from(ERROR_CORRECTION_BLOCKS[level][version_index])
}

/// Centers of the alignment patterns along one axis, in ascending order.
fn alignment_pattern_positions(version: u8) -> Vec<usize> {
    if version == 1 {
        return Vec::new();
    }

    let size = symbol_size(version);
    let version = usize::from(version);
    let count = version / 7 + 2;
    let step = (version * 8 + count * 3 + 5) / (count * 4 - 4) * 2;
    let mut positions: Vec<usize> = (0..count - 1).map(|index| size - 7 - index * step).collect();
    positions.push(6);
    positions.reverse();

    positions
}

/// The single encoding mode used for the whole text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    Numeric,
    Alphanumeric,
    Byte,
}

impl EncodingMode {
    /// Picks the densest mode able to represent every character of the text.
    pub fn select(text: &str) -> EncodingMode {
        if text.chars().all(|character| character.is_ascii_digit()) {
            EncodingMode::Numeric
        } else if text
            .chars()
            .all(|character| ALPHANUMERIC_CHARSET.contains(character))
        {
            EncodingMode::Alphanumeric
        } else {
            EncodingMode::Byte
        }
    }

    fn indicator(self) -> u32 {
        match self {
            EncodingMode::Numeric => 0b0001,
            EncodingMode::Alphanumeric => 0b0010,
            EncodingMode::Byte => 0b0100,
        }
    }

    fn character_count_bits(self, version: u8) -> usize {
        let column = match version {
            1..=9 => 0,
            10..=26 => 1,
            _ => 2,
        };
        match self {
            EncodingMode::Numeric => [10, 12, 14][column],
            EncodingMode::Alphanumeric => [9, 11, 13][column],
            EncodingMode::Byte => [8, 16, 16][column],
        }
    }
}

/// An append-only sequence of bits, most significant bit first.
#[derive(Debug, Default, Clone)]
struct BitBuffer(Vec<bool>);

impl BitBuffer {
    fn push_bits(&mut self, value: u32, length: usize) {
        for bit in (0..length).rev() {
            self.0.push((value >> bit) & 1 == 1);
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn extend(&mut self, other: &BitBuffer) {
        self.0.extend_from_slice(&other.0);
    }

    /// Packs the bits into bytes, the length must be a multiple of eight.
    fn to_codewords(&self) -> Vec<u8> {
        self.0
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0u8, |byte, &bit| (byte << 1) | u8::from(bit))
            })
            .collect()
    }
}

/// Encodes the characters of the text (without mode indicator and character count).
fn encode_payload(text: &str, mode: EncodingMode) -> BitBuffer {
    let mut payload = BitBuffer::default();
    match mode {
        EncodingMode::Numeric => {
            for group in text.as_bytes().chunks(3) {
                let value = group
                    .iter()
                    .fold(0u32, |value, digit| value * 10 + u32::from(digit - b'0'));
                payload.push_bits(value, group.len() * 3 + 1);
            }
        }
        EncodingMode::Alphanumeric => {
            let values: Vec<u32> = text
                .chars()
                .filter_map(|character| ALPHANUMERIC_CHARSET.find(character))
                .map(|position| position as u32)
                .collect();
            for pair in values.chunks(2) {
                match pair {
                    [first, second] => payload.push_bits(first * 45 + second, 11),
                    [single] => payload.push_bits(*single, 6),
                    _ => unreachable!(),
                }
            }
        }
        EncodingMode::Byte => {
            for byte in text.as_bytes() {
                payload.push_bits(u32::from(*byte), 8);
            }
        }
    }

    payload
}

/// A square grid of dark and light modules forming a complete QR symbol,
/// stored row by row with row 0 at the top of the symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    version: u8,
    error_correction: ErrorCorrectionLevel,
    mask: u8,
    size: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Encodes the text into the smallest symbol able to hold it at the given error correction
    /// level. Fails when the text does not fit even in a version 40 symbol.
    pub fn generate(text: &str, level: ErrorCorrectionLevel) -> Result<QrMatrix, ContextError> {
        let mode = EncodingMode::select(text);
        let payload = encode_payload(text, mode);
        let character_count = match mode {
            EncodingMode::Byte => text.len(),
            _ => text.chars().count(),
        };

        // Select the first version whose capacity accommodates the whole segment
        let version = (MIN_VERSION..=MAX_VERSION)
            .find(|&version| {
                let count_bits = mode.character_count_bits(version);
                character_count < (1 << count_bits)
                    && 4 + count_bits + payload.len() <= data_codewords(version, level) * 8
            })
            .ok_or_else(|| {
                ContextError::with_context(
                    ErrorKind::EncodingOverflow,
                    format!(
                        "Unable to encode {} bytes of text in any QR version at level {:?}",
                        text.len(),
                        level
                    ),
                )
            })?;

        let mut data = BitBuffer::default();
        data.push_bits(mode.indicator(), 4);
        data.push_bits(character_count as u32, mode.character_count_bits(version));
        data.extend(&payload);

        // Terminate the data, align it to a byte boundary and fill the remaining capacity
        let capacity = data_codewords(version, level) * 8;
        let terminator = (capacity - data.len()).min(4);
        data.push_bits(0, terminator);
        data.push_bits(0, (8 - data.len() % 8) % 8);
        for pad in [0xEC, 0x11].into_iter().cycle() {
            if data.len() >= capacity {
                break;
            }
            data.push_bits(pad, 8);
        }

        let codewords = add_error_correction(&data.to_codewords(), version, level);
        log::trace!(
            "Encoded {} characters in {:?} mode into version {} ({} codewords)",
            character_count,
            mode,
            version,
            codewords.len()
        );

        let mut symbol = SymbolBuilder::new(version);
        symbol.draw_function_patterns(version, level);
        symbol.place_codewords(&codewords);

        // Evaluate every mask and keep the one with the lowest penalty, the first one on ties
        let mut best_mask = 0;
        let mut best_penalty = u32::MAX;
        for mask in 0..8 {
            symbol.apply_mask(mask);
            symbol.draw_format_bits(level, mask);
            let penalty = symbol.penalty();
            if penalty < best_penalty {
                best_mask = mask;
                best_penalty = penalty;
            }
            symbol.apply_mask(mask);
        }
        symbol.apply_mask(best_mask);
        symbol.draw_format_bits(level, best_mask);

        Ok(QrMatrix {
            version,
            error_correction: level,
            mask: best_mask,
            size: symbol.size,
            modules: symbol.modules,
        })
    }

    /// Number of modules along one side of the symbol.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn error_correction(&self) -> ErrorCorrectionLevel {
        self.error_correction
    }

    /// The mask pattern (0 to 7) applied to the data modules.
    pub fn mask(&self) -> u8 {
        self.mask
    }

    /// Whether the module at the given row (counted from the top) and column is dark.
    /// Positions outside the symbol are light.
    pub fn is_dark(&self, row: usize, column: usize) -> bool {
        row < self.size && column < self.size && self.modules[row * self.size + column]
    }

    /// Iterates over the positions `(row, column)` of all the dark modules, row by row.
    pub fn dark_modules(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.modules
            .iter()
            .enumerate()
            .filter(|(_, dark)| **dark)
            .map(move |(index, _)| (index / self.size, index % self.size))
    }
}

/// Splits the data codewords into blocks, appends the error correction codewords to each block
/// and interleaves the blocks into the final codeword sequence.
fn add_error_correction(data: &[u8], version: u8, level: ErrorCorrectionLevel) -> Vec<u8> {
    let version_index = usize::from(version);
    let block_count = usize::from(ERROR_CORRECTION_BLOCKS[level.ordinal()][version_index]);
    let ecc_length = usize::from(ECC_CODEWORDS_PER_BLOCK[level.ordinal()][version_index]);
    let raw_codewords = raw_data_modules(version) / 8;
    // The first blocks are one data codeword shorter than the last ones
    let short_block_count = block_count - raw_codewords % block_count;
    let short_block_length = raw_codewords / block_count;

    let encoder = ReedSolomonEncoder::new(ecc_length);
    let mut blocks: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(block_count);
    let mut offset = 0;
    for block_index in 0..block_count {
        let data_length =
            short_block_length - ecc_length + usize::from(block_index >= short_block_count);
        let block_data = data[offset..offset + data_length].to_vec();
        offset += data_length;
        let block_ecc = encoder.remainder(&block_data);
        blocks.push((block_data, block_ecc));
    }

    let mut codewords = Vec::with_capacity(raw_codewords);
    let longest_data = short_block_length - ecc_length + 1;
    for index in 0..longest_data {
        for (block_data, _) in &blocks {
            if let Some(codeword) = block_data.get(index) {
                codewords.push(*codeword);
            }
        }
    }
    for index in 0..ecc_length {
        for (_, block_ecc) in &blocks {
            codewords.push(block_ecc[index]);
        }
    }

    codewords
}

/// The mutable grid used while a symbol is being constructed, remembering which modules
/// belong to function patterns so that data placement and masking skip them.
struct SymbolBuilder {
    size: usize,
    modules: Vec<bool>,
    function: Vec<bool>,
}

impl SymbolBuilder {
    fn new(version: u8) -> Self {
        let size = symbol_size(version);
        SymbolBuilder {
            size,
            modules: vec![false; size * size],
            function: vec![false; size * size],
        }
    }

    fn get(&self, row: usize, column: usize) -> bool {
        self.modules[row * self.size + column]
    }

    fn set_function(&mut self, row: usize, column: usize, dark: bool) {
        let index = row * self.size + column;
        self.modules[index] = dark;
        self.function[index] = true;
    }

    fn draw_function_patterns(&mut self, version: u8, level: ErrorCorrectionLevel) {
        // Timing patterns, partially overwritten by the finder patterns afterwards
        for index in 0..self.size {
            self.set_function(6, index, index % 2 == 0);
            self.set_function(index, 6, index % 2 == 0);
        }

        let far = self.size - 4;
        self.draw_finder_pattern(3, 3);
        self.draw_finder_pattern(3, far);
        self.draw_finder_pattern(far, 3);

        let positions = alignment_pattern_positions(version);
        let last = positions.len().saturating_sub(1);
        for (row_index, &row) in positions.iter().enumerate() {
            for (column_index, &column) in positions.iter().enumerate() {
                // Skip the three corners occupied by the finder patterns
                let overlaps_finder = (row_index == 0 && column_index == 0)
                    || (row_index == 0 && column_index == last)
                    || (row_index == last && column_index == 0);
                if !overlaps_finder {
                    self.draw_alignment_pattern(row, column);
                }
            }
        }

        // Reserve the format areas, the real bits are drawn once the mask is known
        self.draw_format_bits(level, 0);
        self.draw_version_bits(version);
    }

    /// Draws a finder pattern together with its separator, clipped to the symbol.
    fn draw_finder_pattern(&mut self, center_row: usize, center_column: usize) {
        for row_offset in -4isize..=4 {
            for column_offset in -4isize..=4 {
                let row = center_row as isize + row_offset;
                let column = center_column as isize + column_offset;
                if row < 0 || column < 0 || row >= self.size as isize || column >= self.size as isize
                {
                    continue;
                }
                let distance = row_offset.abs().max(column_offset.abs());
                self.set_function(row as usize, column as usize, distance != 2 && distance != 4);
            }
        }
    }

    fn draw_alignment_pattern(&mut self, center_row: usize, center_column: usize) {
        for row_offset in -2isize..=2 {
            for column_offset in -2isize..=2 {
                let distance = row_offset.abs().max(column_offset.abs());
                self.set_function(
                    (center_row as isize + row_offset) as usize,
                    (center_column as isize + column_offset) as usize,
                    distance != 1,
                );
            }
        }
    }

    /// Draws both copies of the 15 bit format information (BCH protected and masked with
    /// 0x5412) together with the always dark module.
    fn draw_format_bits(&mut self, level: ErrorCorrectionLevel, mask: u8) {
        let data = level.format_bits() << 3 | u32::from(mask);
        let mut remainder = data;
        for _ in 0..10 {
            remainder = (remainder << 1) ^ ((remainder >> 9) * 0x537);
        }
        let bits = (data << 10 | remainder) ^ 0x5412;
        let bit = |index: usize| (bits >> index) & 1 == 1;

        // First copy, around the top left finder pattern
        for index in 0..=5 {
            self.set_function(index, 8, bit(index));
        }
        self.set_function(7, 8, bit(6));
        self.set_function(8, 8, bit(7));
        self.set_function(8, 7, bit(8));
        for index in 9..15 {
            self.set_function(8, 14 - index, bit(index));
        }

        // Second copy, split between the top right and the bottom left finder patterns
        let size = self.size;
        for index in 0..8 {
            self.set_function(8, size - 1 - index, bit(index));
        }
        for index in 8..15 {
            self.set_function(size - 15 + index, 8, bit(index));
        }
        self.set_function(size - 8, 8, true);
    }

    /// Draws the two copies of the 18 bit version information, only present from version 7.
    fn draw_version_bits(&mut self, version: u8) {
        if version < 7 {
            return;
        }

        let mut remainder = u32::from(version);
        for _ in 0..12 {
            remainder = (remainder << 1) ^ ((remainder >> 11) * 0x1F25);
        }
        let bits = u32::from(version) << 12 | remainder;

        for index in 0..18 {
            let dark = (bits >> index) & 1 == 1;
            let near = index / 3;
            let far = self.size - 11 + index % 3;
            self.set_function(near, far, dark);
            self.set_function(far, near, dark);
        }
    }

    /// Places the codewords in the two-column zig-zag order starting from the bottom right
    /// corner, skipping the vertical timing pattern and every function module.
    fn place_codewords(&mut self, codewords: &[u8]) {
        let total_bits = codewords.len() * 8;
        let mut bit_index = 0;
        let mut right = self.size as isize - 1;
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            let upward = (right + 1) & 2 == 0;
            for vertical in 0..self.size {
                let row = if upward {
                    self.size - 1 - vertical
                } else {
                    vertical
                };
                for offset in 0..2 {
                    let column = (right - offset) as usize;
                    let index = row * self.size + column;
                    if self.function[index] || bit_index >= total_bits {
                        continue;
                    }
                    let codeword = codewords[bit_index / 8];
                    self.modules[index] = (codeword >> (7 - bit_index % 8)) & 1 == 1;
                    bit_index += 1;
                }
            }
            right -= 2;
        }
    }

    /// Inverts the data modules selected by the mask. Applying the same mask twice restores
    /// the original modules.
    fn apply_mask(&mut self, mask: u8) {
        for row in 0..self.size {
            for column in 0..self.size {
                let index = row * self.size + column;
                if self.function[index] {
                    continue;
                }
                let invert = match mask {
                    0 => (row + column) % 2 == 0,
                    1 => row % 2 == 0,
                    2 => column % 3 == 0,
                    3 => (row + column) % 3 == 0,
                    4 => (row / 2 + column / 3) % 2 == 0,
                    5 => (row * column) % 2 + (row * column) % 3 == 0,
                    6 => ((row * column) % 2 + (row * column) % 3) % 2 == 0,
                    7 => ((row + column) % 2 + (row * column) % 3) % 2 == 0,
                    _ => unreachable!("there are only eight mask patterns"),
                };
                self.modules[index] ^= invert;
            }
        }
    }

    /// Scores the symbol with the four penalty rules, lower is better.
    fn penalty(&self) -> u32 {
        let mut penalty = 0;

        for line in 0..self.size {
            let row: Vec<bool> = (0..self.size).map(|column| self.get(line, column)).collect();
            let column: Vec<bool> = (0..self.size).map(|row| self.get(row, line)).collect();
            penalty += run_penalty(&row) + run_penalty(&column);
            penalty += finder_like_penalty(&row) + finder_like_penalty(&column);
        }

        for row in 0..self.size - 1 {
            for column in 0..self.size - 1 {
                let color = self.get(row, column);
                if self.get(row, column + 1) == color
                    && self.get(row + 1, column) == color
                    && self.get(row + 1, column + 1) == color
                {
                    penalty += PENALTY_BLOCK;
                }
            }
        }

        let total = self.size * self.size;
        let dark = self.modules.iter().filter(|dark| **dark).count();
        // Number of full 5% steps away from an even balance of dark and light modules
        let steps = (dark * 20).abs_diff(total * 10) / total;
        penalty += PENALTY_BALANCE * steps as u32;

        penalty
    }
}

/// Penalizes every run of five or more modules of the same color.
fn run_penalty(line: &[bool]) -> u32 {
    let mut penalty = 0;
    let mut run_length = 0;
    let mut run_color = None;
    for &module in line.iter().chain(std::iter::once(&!line[line.len() - 1])) {
        if Some(module) == run_color {
            run_length += 1;
            continue;
        }
        if run_length >= 5 {
            penalty += PENALTY_RUN + (run_length - 5);
        }
        run_color = Some(module);
        run_length = 1;
    }

    penalty
}

/// Penalizes the dark-light-dark-dark-dark-light-dark sequences preceded or followed by four
/// light modules, the area outside of the symbol counting as light.
fn finder_like_penalty(line: &[bool]) -> u32 {
    const CORE: [bool; 7] = [true, false, true, true, true, false, true];
    let light = |start: isize| {
        (start..start + 4).all(|index| {
            index < 0 || index as usize >= line.len() || !line[index as usize]
        })
    };

    let mut penalty = 0;
    for start in 0..line.len().saturating_sub(CORE.len() - 1) {
        if line[start..start + CORE.len()] != CORE {
            continue;
        }
        if light(start as isize - 4) {
            penalty += PENALTY_FINDER_LIKE;
        }
        if light((start + CORE.len()) as isize) {
            penalty += PENALTY_FINDER_LIKE;
        }
    }

    penalty
}

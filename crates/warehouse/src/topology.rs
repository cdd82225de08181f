//! Static rack topology: boxes on a lettered-column / numbered-row grid, each
//! split into labelled sub-slots.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use asrs_core::{BoxId, DomainError, DomainResult, Entity, ValueObject};

/// Grid column, a single uppercase ASCII letter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct Column(char);

impl Column {
    pub fn new(letter: char) -> DomainResult<Self> {
        if !letter.is_ascii_alphabetic() {
            return Err(DomainError::invalid_id(format!(
                "column must be a letter, got '{letter}'"
            )));
        }
        Ok(Self(letter.to_ascii_uppercase()))
    }

    pub fn letter(self) -> char {
        self.0
    }
}

impl TryFrom<char> for Column {
    type Error = DomainError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Column> for char {
    fn from(value: Column) -> Self {
        value.0
    }
}

impl core::fmt::Display for Column {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Column {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => Err(DomainError::invalid_id(format!(
                "column must be a single letter, got '{s}'"
            ))),
        }
    }
}

/// Sub-slot label within a box (`a`, `b`, `c`, ...). Lowercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubSlot(String);

impl SubSlot {
    pub fn new(label: impl AsRef<str>) -> DomainResult<Self> {
        let label = label.as_ref().trim();
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::invalid_id(format!(
                "sub-slot label must be letters, got '{label}'"
            )));
        }
        Ok(Self(label.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubSlot {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubSlot> for String {
    fn from(value: SubSlot) -> Self {
        value.0
    }
}

impl core::fmt::Display for SubSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of one compartment, e.g. `D4c`.
///
/// The derived ordering is the release order: column, then row (numerically),
/// then sub-slot label. Field order matters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    column: Column,
    row: u16,
    sub_slot: SubSlot,
}

impl ValueObject for Location {}

impl Location {
    pub fn new(column: Column, row: u16, sub_slot: SubSlot) -> DomainResult<Self> {
        if row == 0 {
            return Err(DomainError::invalid_id("row numbers start at 1"));
        }
        Ok(Self {
            column,
            row,
            sub_slot,
        })
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn row(&self) -> u16 {
        self.row
    }

    pub fn sub_slot(&self) -> &SubSlot {
        &self.sub_slot
    }

    /// Box-level tag the rack controller uses to pull a box out (`D4`).
    pub fn retrieve_tag(&self) -> String {
        format!("{}{}", self.column, self.row)
    }

    /// Box-level tag the rack controller uses to put a box back (`D4S`).
    pub fn store_tag(&self) -> String {
        format!("{}{}S", self.column, self.row)
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}{}", self.column, self.row, self.sub_slot)
    }
}

impl FromStr for Location {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || DomainError::invalid_id(format!("invalid location '{trimmed}'"));

        let mut chars = trimmed.char_indices();
        let column = match chars.next() {
            Some((_, c)) => Column::new(c).map_err(|_| invalid())?,
            None => return Err(invalid()),
        };

        let rest = &trimmed[1..];
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let row: u16 = rest[..digits_end].parse().map_err(|_| invalid())?;
        let sub_slot = SubSlot::new(&rest[digits_end..]).map_err(|_| invalid())?;

        Location::new(column, row, sub_slot).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Location {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

/// A physical box at a grid position. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBox {
    pub id: BoxId,
    pub column: Column,
    pub row: u16,
}

impl Entity for StorageBox {
    type Id = BoxId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Shape of the rack to provision: every column × every row is one box, and
/// every box carries the same set of sub-slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    columns: Vec<Column>,
    rows: u16,
    sub_slots: Vec<SubSlot>,
}

impl TopologySpec {
    pub fn new(mut columns: Vec<Column>, rows: u16, mut sub_slots: Vec<SubSlot>) -> DomainResult<Self> {
        if columns.is_empty() {
            return Err(DomainError::validation("topology needs at least one column"));
        }
        if rows == 0 {
            return Err(DomainError::validation("topology needs at least one row"));
        }
        if sub_slots.is_empty() {
            return Err(DomainError::validation("topology needs at least one sub-slot"));
        }

        columns.sort();
        let column_count = columns.len();
        columns.dedup();
        if columns.len() != column_count {
            return Err(DomainError::validation("duplicate column in topology"));
        }

        sub_slots.sort();
        let slot_count = sub_slots.len();
        sub_slots.dedup();
        if sub_slots.len() != slot_count {
            return Err(DomainError::validation("duplicate sub-slot in topology"));
        }

        Ok(Self {
            columns,
            rows,
            sub_slots,
        })
    }

    /// Parse a column set: either a range (`A-E`) or a comma list (`A,C,D`).
    pub fn parse_columns(raw: &str) -> DomainResult<Vec<Column>> {
        let raw = raw.trim();
        if let Some((start, end)) = raw.split_once('-') {
            let start: Column = start.parse()?;
            let end: Column = end.parse()?;
            if start > end {
                return Err(DomainError::validation(format!(
                    "column range '{raw}' is reversed"
                )));
            }
            return (start.letter()..=end.letter()).map(Column::new).collect();
        }
        raw.split(',').map(str::parse).collect()
    }

    /// Parse a comma-separated sub-slot list (`a,b,c`).
    pub fn parse_sub_slots(raw: &str) -> DomainResult<Vec<SubSlot>> {
        raw.split(',').map(SubSlot::new).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn sub_slots(&self) -> &[SubSlot] {
        &self.sub_slots
    }

    /// Grid positions of every box, in release order.
    pub fn box_positions(&self) -> impl Iterator<Item = (Column, u16)> + '_ {
        self.columns
            .iter()
            .flat_map(move |c| (1..=self.rows).map(move |r| (*c, r)))
    }

    /// Every compartment location, in release order.
    pub fn locations(&self) -> Vec<Location> {
        self.box_positions()
            .flat_map(|(column, row)| {
                self.sub_slots.iter().map(move |slot| Location {
                    column,
                    row,
                    sub_slot: slot.clone(),
                })
            })
            .collect()
    }

    pub fn compartment_count(&self) -> usize {
        self.columns.len() * usize::from(self.rows) * self.sub_slots.len()
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.columns.contains(&location.column)
            && location.row <= self.rows
            && self.sub_slots.contains(&location.sub_slot)
    }
}

impl Default for TopologySpec {
    /// The A–E × 1–7 rack with three sub-slots per box.
    fn default() -> Self {
        let columns = ('A'..='E').map(Column).collect();
        let sub_slots = ["a", "b", "c"]
            .into_iter()
            .map(|s| SubSlot(s.to_string()))
            .collect();
        Self {
            columns,
            rows: 7,
            sub_slots,
        }
    }
}

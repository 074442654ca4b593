use anyhow::{Context, Result};
use chrono::{NaiveDateTime, NaiveTime};

pub type CourseId = i64;

pub const DAY_NAMES: &[&str] = &["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];
pub const DAY_NAMES_SHORT: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri"];

/// Block start times of the standard university day: `(hour, minute, block)`.
const STANDARD_BLOCK_STARTS: &[(u32, u32, u8)] = &[
    (8, 0, 1),
    (9, 45, 2),
    (11, 30, 3),
    (14, 0, 4),
    (15, 45, 5),
    (17, 30, 6),
];

#[derive(Debug, Clone)]
pub struct Course {
    pub id: CourseId,
    pub number: i64,
    pub name: String,
    pub lecturers: Vec<String>,
    /// Sorted ascending by start time.
    pub appointments: Vec<Appointment>,
}

impl Course {
    pub fn lecturer_line(&self) -> String {
        self.lecturers.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub room: String,
}

/// Evaluation window; both bounds are exclusive. Survey configurations
/// account for the exclusive end by stopping one second before midnight.
#[derive(Debug, Clone, Copy)]
pub struct EvalWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl EvalWindow {
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        instant > self.start && instant < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBlock {
    pub start: NaiveTime,
    pub number: u8,
}

/// Ordered table of block start times covering a single day. Blocks do not
/// depend on the weekday.
#[derive(Debug, Clone)]
pub struct BlockTable {
    blocks: Vec<TimeBlock>,
}

impl BlockTable {
    pub fn new(mut blocks: Vec<TimeBlock>) -> Self {
        blocks.sort_by_key(|block| block.start);
        BlockTable { blocks }
    }

    pub fn standard() -> Result<Self> {
        let mut blocks = Vec::with_capacity(STANDARD_BLOCK_STARTS.len());
        for &(hour, minute, number) in STANDARD_BLOCK_STARTS {
            let start =
                NaiveTime::from_hms_opt(hour, minute, 0).context("invalid block start time")?;
            blocks.push(TimeBlock { start, number });
        }
        Ok(Self::new(blocks))
    }

    /// Block whose start is the greatest one at or before `start`. Anything
    /// at or after the last start lands in the last block; anything before
    /// the first start matches no block.
    pub fn classify(&self, start: NaiveTime) -> Option<u8> {
        let last = self.blocks.len().checked_sub(1)?;
        for (i, block) in self.blocks.iter().enumerate() {
            if start >= block.start && (i == last || start < self.blocks[i + 1].start) {
                return Some(block.number);
            }
        }
        None
    }

    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    pub fn numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.blocks.iter().map(|block| block.number)
    }
}
